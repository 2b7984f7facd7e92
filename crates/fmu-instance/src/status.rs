//! Status codes and call results reported by a model instance.

use core::fmt;
use fmu_core::ValueReference;
use thiserror::Error;

/// Status of a call into the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Warning,
    Discard,
    Error,
    Fatal,
    Pending,
}

impl Status {
    /// After `Error` or `Fatal` the instance may no longer be driven.
    pub fn poisons_instance(self) -> bool {
        matches!(self, Status::Error | Status::Fatal)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ok => "OK",
            Status::Warning => "Warning",
            Status::Discard => "Discard",
            Status::Error => "Error",
            Status::Fatal => "Fatal",
            Status::Pending => "Pending",
        };
        f.write_str(s)
    }
}

/// A non-OK result from the model.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{status}: {message}")]
pub struct FmiFault {
    pub status: Status,
    pub message: String,
    /// First variable the model could not access, when it says so.
    pub reference: Option<ValueReference>,
}

impl FmiFault {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            reference: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Status::Error, message)
    }

    pub fn discard(message: impl Into<String>) -> Self {
        Self::new(Status::Discard, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Status::Fatal, message)
    }

    pub fn with_reference(mut self, vr: ValueReference) -> Self {
        self.reference = Some(vr);
        self
    }
}

pub type FmiResult<T> = Result<T, FmiFault>;

/// Result of one event iteration (`newDiscreteStates`).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EventInfo {
    pub new_discrete_states_needed: bool,
    pub terminate_simulation: bool,
    pub nominals_of_continuous_states_changed: bool,
    pub values_of_continuous_states_changed: bool,
    /// Next time event, if the model has scheduled one.
    pub next_event_time: Option<f64>,
}

/// Answer to `completedIntegratorStep`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntegratorStepInfo {
    pub enter_event_mode: bool,
    pub terminate_simulation: bool,
}

/// Outcome of a successful co-simulation step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepOutcome {
    /// The full communication step was performed.
    Completed,
    /// The model stopped early at `time` to let the master handle an event.
    EarlyReturn { time: f64 },
    /// The model reached a terminal condition at `time`.
    Terminated { time: f64 },
}
