//! Model-exchange loop: ODE integration with event handling.

use crate::error::{RunFailure, RunResult, SimError, SimResult};
use crate::events::{Hermite, MAX_EVENT_ITERATIONS, any_crossing, locate, location_width};
use crate::inputs::InputTable;
use crate::integrator::{OdeSystem, State, error_norm, step_factor};
use crate::options::MeOptions;
use crate::output::{OutputBuffer, Recorder};
use fmu_core::{FmuKind, boundary_count, time_epsilon};
use fmu_instance::{Capability, EventInfo, ModelError, ModelHandle, Phase};

/// Drive a model-exchange handle from `opts.start` to `opts.stop`.
///
/// The handle must be freshly instantiated. Rows recorded before a failure
/// are returned in the [`RunFailure`].
pub fn simulate_model_exchange(
    handle: &mut ModelHandle,
    opts: &MeOptions,
) -> RunResult<OutputBuffer> {
    let mut run = match MeRun::prepare(handle, opts) {
        Ok(run) => run,
        Err(error) => return Err(RunFailure::new(error, OutputBuffer::default())),
    };
    match run.execute() {
        Ok(()) => Ok(run.out),
        Err(error) => {
            tracing::warn!(
                instance = run.handle.name(),
                rows = run.out.len(),
                "model-exchange run stopped: {}",
                error
            );
            Err(RunFailure::new(error, run.out))
        }
    }
}

/// Evaluates derivatives by writing time and states into the model.
struct ModelRhs<'h> {
    handle: &'h mut ModelHandle,
}

impl OdeSystem for ModelRhs<'_> {
    fn rhs(&mut self, t: f64, x: &State) -> SimResult<State> {
        self.handle.set_time(t)?;
        self.handle.set_continuous_states(x.as_slice())?;
        Ok(State::from_vec(self.handle.get_derivatives()?))
    }
}

struct MeRun<'a> {
    handle: &'a mut ModelHandle,
    opts: &'a MeOptions,
    recorder: Recorder,
    inputs: InputTable,
    out: OutputBuffer,
    events: usize,
}

impl<'a> MeRun<'a> {
    fn prepare(handle: &'a mut ModelHandle, opts: &'a MeOptions) -> SimResult<Self> {
        opts.validate()?;
        if handle.kind() != FmuKind::ModelExchange {
            return Err(ModelError::UnsupportedCapability {
                capability: Capability::ModelExchange,
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
            events: 0,
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

    fn set_point(&mut self, t: f64, x: &State) -> SimResult<()> {
        self.handle
            .set_time(t)
            .and_then(|()| self.handle.set_continuous_states(x.as_slice()))
            .map_err(|e| SimError::failed_at(t, "setContinuousStates", e))
    }

    fn states(&mut self, t: f64) -> SimResult<State> {
        let x = self
            .handle
            .get_continuous_states()
            .map_err(|e| SimError::failed_at(t, "getContinuousStates", e))?;
        Ok(State::from_vec(x))
    }

    fn indicators(&mut self, t: f64) -> SimResult<Vec<f64>> {
        self.handle
            .get_event_indicators()
            .map_err(|e| SimError::failed_at(t, "getEventIndicators", e))
    }

    /// Run `newDiscreteStates` until the model settles.
    fn event_iteration(&mut self, t: f64) -> SimResult<EventInfo> {
        let mut merged = EventInfo::default();
        for _ in 0..MAX_EVENT_ITERATIONS {
            let info = self
                .handle
                .new_discrete_states()
                .map_err(|e| SimError::failed_at(t, "newDiscreteStates", e))?;
            merged.values_of_continuous_states_changed |= info.values_of_continuous_states_changed;
            merged.nominals_of_continuous_states_changed |=
                info.nominals_of_continuous_states_changed;
            merged.next_event_time = info.next_event_time;
            merged.terminate_simulation = info.terminate_simulation;
            if info.terminate_simulation || !info.new_discrete_states_needed {
                return Ok(merged);
            }
        }
        Err(SimError::failed_at(
            t,
            "newDiscreteStates",
            SimError::EventIterationLimit {
                passes: MAX_EVENT_ITERATIONS,
            },
        ))
    }

    fn initialize(&mut self) -> SimResult<EventInfo> {
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
        self.event_iteration(start)
    }

    fn execute(&mut self) -> SimResult<()> {
        let opts = self.opts;
        let (t0, t1, interval) = (opts.start, opts.stop, opts.output_interval);
        let eps = time_epsilon(t1, opts.tolerance);
        let boundaries = boundary_count(t0, t1, interval, eps);
        let max_step = (t1 - t0).max(opts.step_size);
        let min_step = 16.0 * eps;

        let info = self.initialize()?;
        if info.terminate_simulation {
            self.record(t0, false)?;
            return self.finish(t0, 0);
        }
        let mut next_time_event = info.next_event_time;
        self.handle
            .enter_continuous_time_mode()
            .map_err(|e| SimError::failed_at(t0, "enterContinuousTimeMode", e))?;
        self.record(t0, false)?;

        let mut t = t0;
        let mut x = self.states(t)?;
        let mut z = self.indicators(t)?;
        let mut h = opts.step_size;
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
                    "integrate",
                    SimError::StepLimit {
                        max_steps: opts.max_steps,
                    },
                ));
            }
            steps += 1;

            self.inputs
                .apply(self.handle, t)
                .map_err(|e| SimError::failed_at(t, "setInputs", e))?;

            // Clip to stop time and to the next scheduled time event.
            let mut t_end = (t + h).min(t1);
            if t1 - t_end <= eps {
                t_end = t1;
            }
            let mut scheduled = None;
            if let Some(te) = next_time_event
                && te <= t_end + eps
                && te > t
            {
                t_end = te;
                scheduled = Some(te);
            }
            let clipped = t_end < t + h - eps;
            let dt = t_end - t;

            let (d0, result) = {
                let mut sys = ModelRhs {
                    handle: &mut *self.handle,
                };
                let d0 = sys
                    .rhs(t, &x)
                    .map_err(|e| SimError::failed_at(t, "getDerivatives", e))?;
                let result = opts
                    .solver
                    .step(&mut sys, t, &x, dt)
                    .map_err(|e| SimError::failed_at(t, "integrate", e))?;
                (d0, result)
            };

            if opts.solver.is_adaptive()
                && let Some(err) = &result.error
            {
                let norm = error_norm(err, &x, &result.x, opts.tolerance);
                let factor = step_factor(norm);
                if norm > 1.0 && dt > min_step {
                    h = (dt * factor).max(min_step);
                    tracing::trace!("rejected step at t = {} (h = {}, err = {})", t, dt, norm);
                    continue;
                }
                if !clipped {
                    h = (dt * factor).clamp(min_step, max_step);
                }
            }

            let mut x1 = result.x;
            let d1 = {
                let mut sys = ModelRhs {
                    handle: &mut *self.handle,
                };
                sys.rhs(t_end, &x1)
            }
            .map_err(|e| SimError::failed_at(t_end, "getDerivatives", e))?;
            let z1 = self.indicators(t_end)?;
            let herm = Hermite {
                t0: t,
                t1: t_end,
                x0: x.clone(),
                x1: x1.clone(),
                d0,
                d1,
            };

            // Indicators left at zero by the previous event take their sign
            // from just inside the step.
            let z_ref: Vec<f64> = if z.contains(&0.0) {
                let tm = t + (dt * 1e-3).max(min_step).min(dt);
                let xm = herm.eval(tm);
                self.set_point(tm, &xm)?;
                let zm = self.indicators(tm)?;
                z.iter()
                    .zip(&zm)
                    .map(|(z0, zm)| if *z0 == 0.0 { *zm } else { *z0 })
                    .collect()
            } else {
                z.clone()
            };

            let state_event = any_crossing(&z_ref, &z1);
            if state_event {
                let width = location_width(t_end, opts.tolerance);
                let (_, hi) = locate(t, t_end, &z_ref, width, |tm| {
                    let xm = herm.eval(tm);
                    self.set_point(tm, &xm)?;
                    self.indicators(tm)
                })?;
                t_end = hi;
                x1 = herm.eval(hi);
                tracing::debug!(
                    instance = self.handle.name(),
                    "state event located at t = {}",
                    t_end
                );
            }

            // Output boundaries passed during this step.
            while next <= boundaries {
                let tb = t0 + next as f64 * interval;
                if tb > t_end + eps {
                    break;
                }
                let xb = if opts.interpolate_outputs {
                    herm.eval(tb)
                } else if tb - t < t_end - tb {
                    x.clone()
                } else {
                    x1.clone()
                };
                self.set_point(tb, &xb)?;
                self.record(tb, false)?;
                next += 1;
            }
            self.set_point(t_end, &x1)?;

            t = t_end;
            x = x1;
            let step_info = self
                .handle
                .completed_integrator_step(true)
                .map_err(|e| SimError::failed_at(t, "completedIntegratorStep", e))?;
            if step_info.terminate_simulation {
                tracing::info!(instance = self.handle.name(), "model requested termination");
                break;
            }

            let time_event = scheduled.is_some_and(|te| (te - t).abs() <= eps);
            if !(state_event || time_event || step_info.enter_event_mode) {
                z = z1;
                continue;
            }

            if opts.record_events {
                self.record(t, true)?;
            }
            self.handle
                .enter_event_mode()
                .map_err(|e| SimError::failed_at(t, "enterEventMode", e))?;
            let info = self.event_iteration(t)?;
            self.events += 1;
            if info.terminate_simulation {
                tracing::info!(
                    instance = self.handle.name(),
                    "model requested termination at event t = {}",
                    t
                );
                break;
            }
            self.handle
                .enter_continuous_time_mode()
                .map_err(|e| SimError::failed_at(t, "enterContinuousTimeMode", e))?;
            h = opts.step_size;
            next_time_event = info.next_event_time;
            if info.values_of_continuous_states_changed {
                x = self.states(t)?;
            }
            if opts.record_events {
                self.record(t, true)?;
            }
            z = self.indicators(t)?;
        }

        self.finish(t, steps)
    }

    fn finish(&mut self, t: f64, steps: usize) -> SimResult<()> {
        if self.handle.phase() != Phase::Terminated {
            self.handle
                .terminate()
                .map_err(|e| SimError::failed_at(t, "terminate", e))?;
        }
        tracing::debug!(
            instance = self.handle.name(),
            steps,
            events = self.events,
            rows = self.out.len(),
            "model-exchange run finished at t = {}",
            t
        );
        Ok(())
    }
}
