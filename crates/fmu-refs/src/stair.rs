//! Stair: an integer counter driven purely by time events.
//!
//! The counter starts at 1 and goes up by one every `period` seconds. In
//! co-simulation a tick that falls strictly inside a communication step
//! ends the step early at the tick.

use crate::support::{decode, encode, restore, unknown_reference};
use fmu_core::{
    Causality, CoSimulationCapabilities, DefaultExperiment, FMI_VERSION, Initial,
    ModelDescription, ModelExchangeCapabilities, ModelVariable, Value, ValueReference,
    Variability, VariableType, time_epsilon,
};
use fmu_instance::{
    EventInfo, FmiFault, FmiResult, FmuInstance, FmuState, InstanceLogger, InstantiateContext,
    StepOutcome,
};
use serde::{Deserialize, Serialize};

pub const GUID: &str = "{bd403596-3166-4232-ab8d-d3b8e2b0e7c1}";
pub const MODEL_IDENTIFIER: &str = "Stair";

pub const VR_COUNTER: ValueReference = ValueReference::new(1);
pub const VR_PERIOD: ValueReference = ValueReference::new(2);

const REL_TOL: f64 = 1e-6;

pub fn description() -> ModelDescription {
    ModelDescription {
        fmi_version: FMI_VERSION.to_string(),
        model_name: "Stair".to_string(),
        guid: GUID.to_string(),
        description: Some("This model generates a stair signal using time events".to_string()),
        number_of_event_indicators: 0,
        variables: vec![
            ModelVariable::new(
                "counter",
                VR_COUNTER.get(),
                VariableType::Integer,
                Causality::Output,
                Variability::Discrete,
            )
            .with_initial(Initial::Exact)
            .with_start(Value::Integer(1)),
            ModelVariable::new(
                "period",
                VR_PERIOD.get(),
                VariableType::Real,
                Causality::Parameter,
                Variability::Fixed,
            )
            .with_initial(Initial::Exact)
            .with_start(Value::Real(1.0)),
        ],
        co_simulation: Some(CoSimulationCapabilities {
            model_identifier: MODEL_IDENTIFIER.to_string(),
            can_handle_variable_communication_step_size: true,
            can_get_and_set_fmu_state: true,
            can_serialize_fmu_state: true,
            can_interpolate_inputs: false,
        }),
        model_exchange: Some(ModelExchangeCapabilities {
            model_identifier: MODEL_IDENTIFIER.to_string(),
            completed_integrator_step_not_needed: true,
            can_get_and_set_fmu_state: true,
            can_serialize_fmu_state: true,
        }),
        default_experiment: Some(DefaultExperiment {
            start_time: Some(0.0),
            stop_time: Some(10.0),
            tolerance: None,
            step_size: Some(0.2),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StairState {
    start: f64,
    time: f64,
    period: f64,
    counter: i32,
    ticks: u32,
}

impl Default for StairState {
    fn default() -> Self {
        Self {
            start: 0.0,
            time: 0.0,
            period: 1.0,
            counter: 1,
            ticks: 0,
        }
    }
}

impl StairState {
    fn next_tick(&self) -> f64 {
        self.start + f64::from(self.ticks + 1) * self.period
    }

    fn tick(&mut self) {
        self.ticks += 1;
        self.counter += 1;
    }
}

pub struct Stair {
    state: StairState,
    logger: InstanceLogger,
}

impl Stair {
    pub fn new(logger: InstanceLogger) -> Self {
        Self {
            state: StairState::default(),
            logger,
        }
    }
}

pub fn factory(ctx: &InstantiateContext) -> FmiResult<Box<dyn FmuInstance>> {
    Ok(Box::new(Stair::new(ctx.logger.clone())))
}

impl FmuInstance for Stair {
    fn setup_experiment(
        &mut self,
        _tolerance: Option<f64>,
        start: f64,
        _stop: Option<f64>,
    ) -> FmiResult<()> {
        self.state.start = start;
        self.state.time = start;
        Ok(())
    }

    fn exit_initialization_mode(&mut self) -> FmiResult<()> {
        if !(self.state.period > 0.0) {
            return Err(FmiFault::error(format!(
                "period must be positive, got {}",
                self.state.period
            ))
            .with_reference(VR_PERIOD));
        }
        Ok(())
    }

    fn reset(&mut self) -> FmiResult<()> {
        self.state = StairState::default();
        Ok(())
    }

    fn get_real(&mut self, vrs: &[ValueReference], values: &mut [f64]) -> FmiResult<()> {
        for (vr, out) in vrs.iter().zip(values.iter_mut()) {
            *out = match *vr {
                VR_PERIOD => self.state.period,
                other => return Err(unknown_reference(other)),
            };
        }
        Ok(())
    }

    fn set_real(&mut self, vrs: &[ValueReference], values: &[f64]) -> FmiResult<()> {
        for (vr, value) in vrs.iter().zip(values) {
            match *vr {
                VR_PERIOD => self.state.period = *value,
                other => return Err(unknown_reference(other)),
            }
        }
        Ok(())
    }

    fn get_integer(&mut self, vrs: &[ValueReference], values: &mut [i32]) -> FmiResult<()> {
        for (vr, out) in vrs.iter().zip(values.iter_mut()) {
            *out = match *vr {
                VR_COUNTER => self.state.counter,
                other => return Err(unknown_reference(other)),
            };
        }
        Ok(())
    }

    fn set_integer(&mut self, vrs: &[ValueReference], values: &[i32]) -> FmiResult<()> {
        for (vr, value) in vrs.iter().zip(values) {
            match *vr {
                VR_COUNTER => self.state.counter = *value,
                other => return Err(unknown_reference(other)),
            }
        }
        Ok(())
    }

    fn get_fmu_state(&mut self) -> FmiResult<FmuState> {
        Ok(FmuState::new(self.state.clone()))
    }

    fn set_fmu_state(&mut self, state: &FmuState) -> FmiResult<()> {
        self.state = restore::<StairState>(state)?;
        Ok(())
    }

    fn serialize_fmu_state(&mut self, state: &FmuState) -> FmiResult<Vec<u8>> {
        encode::<StairState>(state)
    }

    fn deserialize_fmu_state(&mut self, bytes: &[u8]) -> FmiResult<FmuState> {
        decode::<StairState>(bytes)
    }

    fn do_step(
        &mut self,
        current_time: f64,
        step_size: f64,
        _no_set_prior_state: bool,
    ) -> FmiResult<StepOutcome> {
        let s = &mut self.state;
        let t_end = current_time + step_size;
        let eps = time_epsilon(t_end, REL_TOL);
        let tick = s.next_tick();

        if tick < t_end - eps {
            s.tick();
            s.time = tick;
            self.logger
                .event(&format!("Counter {} at t={:.6} s, returning early", s.counter, tick));
            return Ok(StepOutcome::EarlyReturn { time: tick });
        }
        if tick <= t_end + eps {
            s.tick();
            self.logger
                .event(&format!("Counter {} at t={:.6} s", s.counter, tick));
        }
        s.time = t_end;
        Ok(StepOutcome::Completed)
    }

    fn set_time(&mut self, time: f64) -> FmiResult<()> {
        self.state.time = time;
        Ok(())
    }

    fn set_continuous_states(&mut self, _x: &[f64]) -> FmiResult<()> {
        Ok(())
    }

    fn get_continuous_states(&mut self, _x: &mut [f64]) -> FmiResult<()> {
        Ok(())
    }

    fn get_derivatives(&mut self, _dx: &mut [f64]) -> FmiResult<()> {
        Ok(())
    }

    fn get_event_indicators(&mut self, _z: &mut [f64]) -> FmiResult<()> {
        Ok(())
    }

    fn new_discrete_states(&mut self) -> FmiResult<EventInfo> {
        let s = &mut self.state;
        if s.time >= s.next_tick() - time_epsilon(s.time, REL_TOL) {
            s.tick();
            self.logger
                .event(&format!("Counter {} at t={:.6} s", s.counter, s.time));
        }
        Ok(EventInfo {
            next_event_time: Some(s.next_tick()),
            ..EventInfo::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stair(period: f64) -> Stair {
        let mut m = Stair::new(InstanceLogger::new("stair", false));
        m.set_real(&[VR_PERIOD], &[period]).unwrap();
        m
    }

    fn counter(m: &mut Stair) -> i32 {
        let mut c = [0];
        m.get_integer(&[VR_COUNTER], &mut c).unwrap();
        c[0]
    }

    #[test]
    fn tick_inside_step_returns_early() {
        let mut m = stair(0.25);
        assert_eq!(
            m.do_step(0.2, 0.1, true).unwrap(),
            StepOutcome::EarlyReturn { time: 0.25 }
        );
        assert_eq!(counter(&mut m), 2);
        assert_eq!(m.do_step(0.25, 0.05, true).unwrap(), StepOutcome::Completed);
        assert_eq!(counter(&mut m), 2);
    }

    #[test]
    fn tick_on_step_boundary_completes() {
        let mut m = stair(0.5);
        for i in 0..5 {
            assert_eq!(
                m.do_step(f64::from(i) * 0.1, 0.1, true).unwrap(),
                StepOutcome::Completed
            );
        }
        assert_eq!(counter(&mut m), 2);
    }

    #[test]
    fn event_mode_schedules_next_tick() {
        let mut m = stair(1.0);
        let info = m.new_discrete_states().unwrap();
        assert_eq!(info.next_event_time, Some(1.0));
        m.set_time(1.0).unwrap();
        let info = m.new_discrete_states().unwrap();
        assert_eq!(counter(&mut m), 2);
        assert_eq!(info.next_event_time, Some(2.0));
    }

    #[test]
    fn non_positive_period_is_refused() {
        let mut m = stair(0.0);
        let fault = m.exit_initialization_mode().unwrap_err();
        assert_eq!(fault.reference, Some(VR_PERIOD));
    }
}
