//! Bouncing ball: the classic hybrid model.
//!
//! Two continuous states (height and velocity), one event indicator (the
//! height). On impact the velocity is reversed and damped by `e`; once the
//! rebound is slower than `v_min` the ball comes to rest.

use crate::support::{decode, encode, read_only, restore, substeps, unknown_reference};
use fmu_core::{
    Causality, CoSimulationCapabilities, DefaultExperiment, FMI_VERSION, Initial,
    ModelDescription, ModelExchangeCapabilities, ModelVariable, Value, ValueReference,
    Variability, VariableType,
};
use fmu_instance::{
    EventInfo, FmiResult, FmuInstance, FmuState, InstanceLogger, InstantiateContext,
    StepOutcome,
};
use serde::{Deserialize, Serialize};

pub const GUID: &str = "{2d5ad039-5b33-4b1a-9405-e2455d930aed}";
pub const MODEL_IDENTIFIER: &str = "BouncingBall";

pub const VR_H: ValueReference = ValueReference::new(1);
pub const VR_DER_H: ValueReference = ValueReference::new(2);
pub const VR_V: ValueReference = ValueReference::new(3);
pub const VR_DER_V: ValueReference = ValueReference::new(4);
pub const VR_G: ValueReference = ValueReference::new(5);
pub const VR_E: ValueReference = ValueReference::new(6);
pub const VR_V_MIN: ValueReference = ValueReference::new(7);

const V_MIN: f64 = 0.1;
/// Internal Euler step used by `doStep`.
const FIXED_SOLVER_STEP: f64 = 1e-3;

pub fn description() -> ModelDescription {
    let real = |name: &str, vr: ValueReference, causality, variability| {
        ModelVariable::new(name, vr.get(), VariableType::Real, causality, variability)
    };
    ModelDescription {
        fmi_version: FMI_VERSION.to_string(),
        model_name: "BouncingBall".to_string(),
        guid: GUID.to_string(),
        description: Some("This model calculates the trajectory of a bouncing ball".to_string()),
        number_of_event_indicators: 1,
        variables: vec![
            real("h", VR_H, Causality::Output, Variability::Continuous)
                .with_initial(Initial::Exact)
                .with_start(Value::Real(1.0)),
            real("der(h)", VR_DER_H, Causality::Local, Variability::Continuous)
                .with_initial(Initial::Calculated)
                .with_derivative(1),
            real("v", VR_V, Causality::Output, Variability::Continuous)
                .with_initial(Initial::Exact)
                .with_start(Value::Real(0.0)),
            real("der(v)", VR_DER_V, Causality::Local, Variability::Continuous)
                .with_initial(Initial::Calculated)
                .with_derivative(3),
            real("g", VR_G, Causality::Parameter, Variability::Fixed)
                .with_initial(Initial::Exact)
                .with_start(Value::Real(-9.81)),
            real("e", VR_E, Causality::Parameter, Variability::Tunable)
                .with_initial(Initial::Exact)
                .with_start(Value::Real(0.7)),
            real("v_min", VR_V_MIN, Causality::Local, Variability::Constant)
                .with_start(Value::Real(V_MIN)),
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
            stop_time: Some(3.0),
            tolerance: None,
            step_size: Some(0.01),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BallState {
    time: f64,
    h: f64,
    v: f64,
    g: f64,
    e: f64,
    /// Event indicator at the end of the last internal step (doStep only).
    pre_z: f64,
}

impl Default for BallState {
    fn default() -> Self {
        Self {
            time: 0.0,
            h: 1.0,
            v: 0.0,
            g: -9.81,
            e: 0.7,
            pre_z: 1.0,
        }
    }
}

impl BallState {
    fn indicator(&self) -> f64 {
        if self.h == 0.0 && self.v == 0.0 {
            1.0
        } else {
            self.h
        }
    }

    /// Apply an impact, if the ball is at or below the ground and falling.
    fn bounce(&mut self) -> bool {
        if self.h <= 0.0 && self.v < 0.0 {
            self.h = 0.0;
            self.v = -self.v * self.e;
            if self.v < V_MIN {
                self.v = 0.0;
                self.g = 0.0;
            }
            true
        } else {
            false
        }
    }
}

pub struct BouncingBall {
    state: BallState,
    logger: InstanceLogger,
}

impl BouncingBall {
    pub fn new(logger: InstanceLogger) -> Self {
        Self {
            state: BallState::default(),
            logger,
        }
    }
}

pub fn factory(ctx: &InstantiateContext) -> FmiResult<Box<dyn FmuInstance>> {
    Ok(Box::new(BouncingBall::new(ctx.logger.clone())))
}

impl FmuInstance for BouncingBall {
    fn setup_experiment(
        &mut self,
        _tolerance: Option<f64>,
        start: f64,
        _stop: Option<f64>,
    ) -> FmiResult<()> {
        self.state.time = start;
        Ok(())
    }

    fn exit_initialization_mode(&mut self) -> FmiResult<()> {
        self.state.pre_z = self.state.indicator();
        Ok(())
    }

    fn reset(&mut self) -> FmiResult<()> {
        self.state = BallState::default();
        Ok(())
    }

    fn get_real(&mut self, vrs: &[ValueReference], values: &mut [f64]) -> FmiResult<()> {
        let s = &self.state;
        for (vr, out) in vrs.iter().zip(values.iter_mut()) {
            *out = match *vr {
                VR_H => s.h,
                VR_DER_H => s.v,
                VR_V => s.v,
                VR_DER_V => s.g,
                VR_G => s.g,
                VR_E => s.e,
                VR_V_MIN => V_MIN,
                other => return Err(unknown_reference(other)),
            };
        }
        Ok(())
    }

    fn set_real(&mut self, vrs: &[ValueReference], values: &[f64]) -> FmiResult<()> {
        for (vr, value) in vrs.iter().zip(values) {
            match *vr {
                VR_H => self.state.h = *value,
                VR_V => self.state.v = *value,
                VR_G => self.state.g = *value,
                VR_E => self.state.e = *value,
                VR_V_MIN => return Err(read_only(*vr, "v_min")),
                VR_DER_H => return Err(read_only(*vr, "der(h)")),
                VR_DER_V => return Err(read_only(*vr, "der(v)")),
                other => return Err(unknown_reference(other)),
            }
        }
        Ok(())
    }

    fn get_fmu_state(&mut self) -> FmiResult<FmuState> {
        Ok(FmuState::new(self.state.clone()))
    }

    fn set_fmu_state(&mut self, state: &FmuState) -> FmiResult<()> {
        self.state = restore::<BallState>(state)?;
        Ok(())
    }

    fn serialize_fmu_state(&mut self, state: &FmuState) -> FmiResult<Vec<u8>> {
        encode::<BallState>(state)
    }

    fn deserialize_fmu_state(&mut self, bytes: &[u8]) -> FmiResult<FmuState> {
        decode::<BallState>(bytes)
    }

    fn do_step(
        &mut self,
        current_time: f64,
        step_size: f64,
        _no_set_prior_state: bool,
    ) -> FmiResult<StepOutcome> {
        let n = substeps(step_size, FIXED_SOLVER_STEP);
        let dt = step_size / n as f64;
        let s = &mut self.state;
        s.time = current_time;
        for i in 1..=n {
            s.h += dt * s.v;
            s.v += dt * s.g;
            s.time = current_time + dt * i as f64;

            let z = s.indicator();
            let crossed = (s.pre_z < 0.0 && z >= 0.0) || (s.pre_z > 0.0 && z <= 0.0);
            s.pre_z = z;
            if crossed {
                self.logger
                    .event(&format!("State event detected at t={:.6} s.", s.time));
                s.bounce();
                s.pre_z = s.indicator();
            }
        }
        Ok(StepOutcome::Completed)
    }

    fn new_discrete_states(&mut self) -> FmiResult<EventInfo> {
        let changed = self.state.bounce();
        if changed {
            self.logger.event(&format!(
                "Impact at t={:.6} s, rebound velocity {:.4} m/s",
                self.state.time, self.state.v
            ));
        }
        Ok(EventInfo {
            values_of_continuous_states_changed: changed,
            ..EventInfo::default()
        })
    }

    fn set_time(&mut self, time: f64) -> FmiResult<()> {
        self.state.time = time;
        Ok(())
    }

    fn set_continuous_states(&mut self, x: &[f64]) -> FmiResult<()> {
        if let [h, v] = x {
            self.state.h = *h;
            self.state.v = *v;
        }
        Ok(())
    }

    fn get_continuous_states(&mut self, x: &mut [f64]) -> FmiResult<()> {
        if let [h, v] = x {
            *h = self.state.h;
            *v = self.state.v;
        }
        Ok(())
    }

    fn get_derivatives(&mut self, dx: &mut [f64]) -> FmiResult<()> {
        if let [dh, dv] = dx {
            *dh = self.state.v;
            *dv = self.state.g;
        }
        Ok(())
    }

    fn get_event_indicators(&mut self, z: &mut [f64]) -> FmiResult<()> {
        if let [z0] = z {
            *z0 = self.state.indicator();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball() -> BouncingBall {
        BouncingBall::new(InstanceLogger::new("ball", false))
    }

    #[test]
    fn indicator_is_one_at_rest_on_the_ground() {
        let mut s = BallState::default();
        assert_eq!(s.indicator(), 1.0);
        s.h = 0.0;
        s.v = 0.0;
        assert_eq!(s.indicator(), 1.0);
        s.v = 0.5;
        assert_eq!(s.indicator(), 0.0);
    }

    #[test]
    fn bounce_reverses_and_damps() {
        let mut s = BallState {
            h: -1e-6,
            v: -3.0,
            ..BallState::default()
        };
        assert!(s.bounce());
        assert_eq!(s.h, 0.0);
        assert!((s.v - 2.1).abs() < 1e-12);
        assert!(!s.bounce());
    }

    #[test]
    fn slow_rebound_comes_to_rest() {
        let mut s = BallState {
            h: 0.0,
            v: -0.1,
            ..BallState::default()
        };
        assert!(s.bounce());
        assert_eq!((s.v, s.g), (0.0, 0.0));
    }

    #[test]
    fn do_step_bounces_near_expected_time() {
        let mut m = ball();
        m.exit_initialization_mode().unwrap();
        let mut t = 0.0;
        let mut v = [0.0];
        let mut bounced_at = None;
        while t < 0.6 {
            m.do_step(t, 0.01, true).unwrap();
            t += 0.01;
            m.get_real(&[VR_V], &mut v).unwrap();
            if v[0] > 0.0 && bounced_at.is_none() {
                bounced_at = Some(t);
            }
        }
        let t_hit = bounced_at.unwrap();
        assert!((t_hit - 0.4515).abs() < 0.02, "bounce at {t_hit}");
    }

    #[test]
    fn constant_cannot_be_set() {
        let mut m = ball();
        let err = m.set_real(&[VR_V_MIN], &[1.0]).unwrap_err();
        assert_eq!(err.reference, Some(VR_V_MIN));
    }
}
