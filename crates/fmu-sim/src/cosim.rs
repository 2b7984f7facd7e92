//! Co-simulation loop.

use crate::error::{RunFailure, RunResult, SimError, SimResult};
use crate::inputs::InputTable;
use crate::options::CoSimOptions;
use crate::output::{OutputBuffer, Recorder};
use fmu_core::{FmuKind, boundary_count, time_epsilon};
use fmu_instance::{Capability, ModelError, ModelHandle, Phase, StepOutcome};

/// Drive a co-simulation handle from `opts.start` to `opts.stop`.
///
/// The handle must be freshly instantiated; the loop performs setup,
/// initialization and termination. Rows recorded before a failure are
/// returned in the [`RunFailure`].
pub fn simulate_co_simulation(
    handle: &mut ModelHandle,
    opts: &CoSimOptions,
) -> RunResult<OutputBuffer> {
    let mut run = match CoSimRun::prepare(handle, opts) {
        Ok(run) => run,
        Err(error) => return Err(RunFailure::new(error, OutputBuffer::default())),
    };
    match run.execute() {
        Ok(()) => Ok(run.out),
        Err(error) => {
            tracing::warn!(
                instance = run.handle.name(),
                rows = run.out.len(),
                "co-simulation stopped: {}",
                error
            );
            Err(RunFailure::new(error, run.out))
        }
    }
}

struct CoSimRun<'a> {
    handle: &'a mut ModelHandle,
    opts: &'a CoSimOptions,
    recorder: Recorder,
    inputs: InputTable,
    out: OutputBuffer,
}

impl<'a> CoSimRun<'a> {
    fn prepare(handle: &'a mut ModelHandle, opts: &'a CoSimOptions) -> SimResult<Self> {
        opts.validate()?;
        if handle.kind() != FmuKind::CoSimulation {
            return Err(ModelError::UnsupportedCapability {
                capability: Capability::CoSimulation,
            }
            .into());
        }
        let md = handle.description().clone();
        let recorder = Recorder::new(&md, &opts.record)?;
        let inputs = opts.inputs.bind(&md)?;
        let out = recorder.buffer();
        Ok(Self {
            handle,
            opts,
            recorder,
            inputs,
            out,
        })
    }

    fn record(&mut self, time: f64, event: bool) -> SimResult<()> {
        let row = self
            .recorder
            .sample(self.handle, time, event)
            .map_err(|e| SimError::failed_at(time, "getValue", e))?;
        self.out.push(row);
        Ok(())
    }

    fn initialize(&mut self) -> SimResult<()> {
        let (start, stop, tolerance) = (self.opts.start, self.opts.stop, self.opts.tolerance);
        let h = &mut *self.handle;
        h.setup_experiment(Some(tolerance), start, Some(stop))
            .map_err(|e| SimError::failed_at(start, "setupExperiment", e))?;
        h.enter_initialization_mode()
            .map_err(|e| SimError::failed_at(start, "enterInitializationMode", e))?;
        self.inputs
            .apply(h, start)
            .map_err(|e| SimError::failed_at(start, "setInputs", e))?;
        h.exit_initialization_mode()
            .map_err(|e| SimError::failed_at(start, "exitInitializationMode", e))?;
        Ok(())
    }

    fn execute(&mut self) -> SimResult<()> {
        let opts = self.opts;
        let (t0, t1, interval) = (opts.start, opts.stop, opts.output_interval);
        let eps = time_epsilon(t1, opts.tolerance);
        let boundaries = boundary_count(t0, t1, interval, eps);

        self.initialize()?;
        self.record(t0, false)?;

        let mut t = t0;
        let mut next = 1u64;
        let mut steps = 0usize;
        while t < t1 - eps {
            if opts.cancel.is_cancelled() {
                tracing::info!(instance = self.handle.name(), "cancelled at t = {}", t);
                return Err(SimError::Cancelled { time: t });
            }
            if steps >= opts.max_steps {
                return Err(SimError::failed_at(
                    t,
                    "doStep",
                    SimError::StepLimit {
                        max_steps: opts.max_steps,
                    },
                ));
            }

            let target = if next <= boundaries {
                (t0 + next as f64 * interval).min(t1)
            } else {
                t1
            };
            let mut h = opts.step_size;
            if t + h > target - eps {
                h = target - t;
            }

            self.inputs
                .apply(self.handle, t)
                .map_err(|e| SimError::failed_at(t, "setInputs", e))?;
            let outcome = self
                .handle
                .do_step(t, h, true)
                .map_err(|e| SimError::failed_at(t, "doStep", e))?;
            steps += 1;

            let mut terminated = false;
            match outcome {
                StepOutcome::Completed => {
                    t = if (t + h - target).abs() <= eps {
                        target
                    } else {
                        t + h
                    };
                }
                StepOutcome::EarlyReturn { time } => {
                    if time <= t + eps {
                        return Err(SimError::failed_at(
                            t,
                            "doStep",
                            SimError::Stalled { time: t },
                        ));
                    }
                    t = time.min(t + h);
                    tracing::debug!(instance = self.handle.name(), "early return at t = {}", t);
                    if opts.record_events {
                        self.record(t, true)?;
                    }
                }
                StepOutcome::Terminated { time } => {
                    t = time.clamp(t, t + h);
                    tracing::info!(
                        instance = self.handle.name(),
                        "model requested termination at t = {}",
                        t
                    );
                    terminated = true;
                }
            }

            while next <= boundaries && t >= t0 + next as f64 * interval - eps {
                self.record(t0 + next as f64 * interval, false)?;
                next += 1;
            }
            if terminated {
                if self.out.last_time() != Some(t) {
                    self.record(t, true)?;
                }
                break;
            }
        }

        if self.handle.phase() != Phase::Terminated {
            self.handle
                .terminate()
                .map_err(|e| SimError::failed_at(t, "terminate", e))?;
        }
        tracing::debug!(
            instance = self.handle.name(),
            steps,
            rows = self.out.len(),
            "co-simulation finished at t = {}",
            t
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_match_row_formula() {
        let eps = time_epsilon(1.0, 1e-4);
        assert_eq!(boundary_count(0.0, 1.0, 0.01, eps) + 1, 101);
        assert_eq!(boundary_count(0.0, 1.0, 0.3, eps) + 1, 4);
    }
}
