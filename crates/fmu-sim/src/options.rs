//! Options for co-simulation and model-exchange runs.

use crate::cancel::CancelToken;
use crate::error::{SimError, SimResult};
use crate::inputs::InputTable;
use crate::integrator::IntegratorType;

/// Options for [`simulate_co_simulation`](crate::simulate_co_simulation).
#[derive(Clone, Debug)]
pub struct CoSimOptions {
    /// Start time (seconds)
    pub start: f64,
    /// Stop time, inclusive (seconds)
    pub stop: f64,
    /// Relative tolerance passed to the model
    pub tolerance: f64,
    /// Communication step size (seconds)
    pub step_size: f64,
    /// Recording interval; may exceed the step size
    pub output_interval: f64,
    /// Variables to record; empty records every output
    pub record: Vec<String>,
    pub inputs: InputTable,
    /// Record an extra row at each early return
    pub record_events: bool,
    /// Maximum number of steps (safety limit)
    pub max_steps: usize,
    pub cancel: CancelToken,
}

impl Default for CoSimOptions {
    fn default() -> Self {
        Self {
            start: 0.0,
            stop: 1.0,
            tolerance: 1e-4,
            step_size: 1e-2,
            output_interval: 1e-2,
            record: Vec::new(),
            inputs: InputTable::default(),
            record_events: false,
            max_steps: 1_000_000,
            cancel: CancelToken::default(),
        }
    }
}

impl CoSimOptions {
    pub fn validate(&self) -> SimResult<()> {
        validate_common(
            self.start,
            self.stop,
            self.tolerance,
            self.step_size,
            self.output_interval,
            self.max_steps,
        )
    }
}

/// Options for [`simulate_model_exchange`](crate::simulate_model_exchange).
#[derive(Clone, Debug)]
pub struct MeOptions {
    /// Start time (seconds)
    pub start: f64,
    /// Stop time, inclusive (seconds)
    pub stop: f64,
    /// Relative tolerance for step control and event location
    pub tolerance: f64,
    /// Solver step size; the initial guess for adaptive solvers
    pub step_size: f64,
    /// Recording interval, independent of solver steps
    pub output_interval: f64,
    pub solver: IntegratorType,
    /// Variables to record; empty records every output
    pub record: Vec<String>,
    pub inputs: InputTable,
    /// Record rows just before and just after each event
    pub record_events: bool,
    /// Record boundary rows at the interpolated state instead of the nearest step
    pub interpolate_outputs: bool,
    /// Maximum number of solver steps (safety limit)
    pub max_steps: usize,
    pub cancel: CancelToken,
}

impl Default for MeOptions {
    fn default() -> Self {
        Self {
            start: 0.0,
            stop: 1.0,
            tolerance: 1e-4,
            step_size: 1e-3,
            output_interval: 1e-2,
            solver: IntegratorType::default(),
            record: Vec::new(),
            inputs: InputTable::default(),
            record_events: false,
            interpolate_outputs: true,
            max_steps: 1_000_000,
            cancel: CancelToken::default(),
        }
    }
}

impl MeOptions {
    pub fn validate(&self) -> SimResult<()> {
        validate_common(
            self.start,
            self.stop,
            self.tolerance,
            self.step_size,
            self.output_interval,
            self.max_steps,
        )
    }
}

fn validate_common(
    start: f64,
    stop: f64,
    tolerance: f64,
    step_size: f64,
    output_interval: f64,
    max_steps: usize,
) -> SimResult<()> {
    if !start.is_finite() || !stop.is_finite() {
        return Err(SimError::InvalidArg {
            what: "start and stop must be finite",
        });
    }
    if stop < start {
        return Err(SimError::InvalidArg {
            what: "stop must not precede start",
        });
    }
    if !(tolerance > 0.0) {
        return Err(SimError::InvalidArg {
            what: "tolerance must be positive",
        });
    }
    if !(step_size > 0.0) {
        return Err(SimError::InvalidArg {
            what: "step size must be positive",
        });
    }
    if !(output_interval > 0.0) {
        return Err(SimError::InvalidArg {
            what: "output interval must be positive",
        });
    }
    if max_steps == 0 {
        return Err(SimError::InvalidArg {
            what: "max_steps must be positive",
        });
    }
    Ok(())
}
