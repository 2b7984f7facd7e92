//! Dahlquist test equation `der(x) = -k * x`.

use crate::support::{decode, encode, read_only, restore, unknown_reference};
use fmu_core::{
    Causality, CoSimulationCapabilities, DefaultExperiment, FMI_VERSION, Initial,
    ModelDescription, ModelExchangeCapabilities, ModelVariable, Value, ValueReference,
    Variability, VariableType,
};
use fmu_instance::{
    EventInfo, FmiResult, FmuInstance, FmuState, InstantiateContext, StepOutcome,
};
use serde::{Deserialize, Serialize};

pub const GUID: &str = "{221063d2-ff7c-4a4f-a7d4-2b2cc2b7dd1c}";
pub const MODEL_IDENTIFIER: &str = "Dahlquist";

pub const VR_X: ValueReference = ValueReference::new(1);
pub const VR_DER_X: ValueReference = ValueReference::new(2);
pub const VR_K: ValueReference = ValueReference::new(3);

pub fn description() -> ModelDescription {
    ModelDescription {
        fmi_version: FMI_VERSION.to_string(),
        model_name: "Dahlquist".to_string(),
        guid: GUID.to_string(),
        description: Some("This model implements the Dahlquist test equation".to_string()),
        number_of_event_indicators: 0,
        variables: vec![
            ModelVariable::new(
                "x",
                VR_X.get(),
                VariableType::Real,
                Causality::Output,
                Variability::Continuous,
            )
            .with_initial(Initial::Exact)
            .with_start(Value::Real(1.0)),
            ModelVariable::new(
                "der(x)",
                VR_DER_X.get(),
                VariableType::Real,
                Causality::Local,
                Variability::Continuous,
            )
            .with_initial(Initial::Calculated)
            .with_derivative(1),
            ModelVariable::new(
                "k",
                VR_K.get(),
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
            step_size: Some(0.1),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DahlquistState {
    time: f64,
    x: f64,
    k: f64,
}

impl Default for DahlquistState {
    fn default() -> Self {
        Self {
            time: 0.0,
            x: 1.0,
            k: 1.0,
        }
    }
}

#[derive(Default)]
pub struct Dahlquist {
    state: DahlquistState,
}

pub fn factory(_ctx: &InstantiateContext) -> FmiResult<Box<dyn FmuInstance>> {
    Ok(Box::new(Dahlquist::default()))
}

impl FmuInstance for Dahlquist {
    fn setup_experiment(
        &mut self,
        _tolerance: Option<f64>,
        start: f64,
        _stop: Option<f64>,
    ) -> FmiResult<()> {
        self.state.time = start;
        Ok(())
    }

    fn reset(&mut self) -> FmiResult<()> {
        self.state = DahlquistState::default();
        Ok(())
    }

    fn get_real(&mut self, vrs: &[ValueReference], values: &mut [f64]) -> FmiResult<()> {
        let s = &self.state;
        for (vr, out) in vrs.iter().zip(values.iter_mut()) {
            *out = match *vr {
                VR_X => s.x,
                VR_DER_X => -s.k * s.x,
                VR_K => s.k,
                other => return Err(unknown_reference(other)),
            };
        }
        Ok(())
    }

    fn set_real(&mut self, vrs: &[ValueReference], values: &[f64]) -> FmiResult<()> {
        for (vr, value) in vrs.iter().zip(values) {
            match *vr {
                VR_X => self.state.x = *value,
                VR_K => self.state.k = *value,
                VR_DER_X => return Err(read_only(*vr, "der(x)")),
                other => return Err(unknown_reference(other)),
            }
        }
        Ok(())
    }

    fn get_fmu_state(&mut self) -> FmiResult<FmuState> {
        Ok(FmuState::new(self.state.clone()))
    }

    fn set_fmu_state(&mut self, state: &FmuState) -> FmiResult<()> {
        self.state = restore::<DahlquistState>(state)?;
        Ok(())
    }

    fn serialize_fmu_state(&mut self, state: &FmuState) -> FmiResult<Vec<u8>> {
        encode::<DahlquistState>(state)
    }

    fn deserialize_fmu_state(&mut self, bytes: &[u8]) -> FmiResult<FmuState> {
        decode::<DahlquistState>(bytes)
    }

    /// Steps use the exact solution, so results do not depend on step size.
    fn do_step(
        &mut self,
        current_time: f64,
        step_size: f64,
        _no_set_prior_state: bool,
    ) -> FmiResult<StepOutcome> {
        self.state.x *= (-self.state.k * step_size).exp();
        self.state.time = current_time + step_size;
        Ok(StepOutcome::Completed)
    }

    fn set_time(&mut self, time: f64) -> FmiResult<()> {
        self.state.time = time;
        Ok(())
    }

    fn set_continuous_states(&mut self, x: &[f64]) -> FmiResult<()> {
        if let [x0] = x {
            self.state.x = *x0;
        }
        Ok(())
    }

    fn get_continuous_states(&mut self, x: &mut [f64]) -> FmiResult<()> {
        if let [x0] = x {
            *x0 = self.state.x;
        }
        Ok(())
    }

    fn get_derivatives(&mut self, dx: &mut [f64]) -> FmiResult<()> {
        if let [dx0] = dx {
            *dx0 = -self.state.k * self.state.x;
        }
        Ok(())
    }

    fn get_event_indicators(&mut self, _z: &mut [f64]) -> FmiResult<()> {
        Ok(())
    }

    fn new_discrete_states(&mut self) -> FmiResult<EventInfo> {
        Ok(EventInfo::default())
    }
}
