//! Feedthrough: every input is copied straight to the matching output.

use crate::support::{decode, encode, read_only, restore, unknown_reference};
use fmu_core::{
    Causality, CoSimulationCapabilities, DefaultExperiment, FMI_VERSION, Initial,
    ModelDescription, ModelExchangeCapabilities, ModelVariable, Value, ValueReference,
    Variability, VariableType,
};
use fmu_instance::{EventInfo, FmiResult, FmuInstance, FmuState, InstantiateContext, StepOutcome};
use serde::{Deserialize, Serialize};

pub const GUID: &str = "{37b954f1-cc86-4d8f-b97f-cffb0b23ea9a}";
pub const MODEL_IDENTIFIER: &str = "Feedthrough";

pub const VR_FIXED_REAL_PARAMETER: ValueReference = ValueReference::new(1);
pub const VR_TUNABLE_REAL_PARAMETER: ValueReference = ValueReference::new(2);
pub const VR_CONTINUOUS_REAL_IN: ValueReference = ValueReference::new(3);
pub const VR_CONTINUOUS_REAL_OUT: ValueReference = ValueReference::new(4);
pub const VR_DISCRETE_REAL_IN: ValueReference = ValueReference::new(5);
pub const VR_DISCRETE_REAL_OUT: ValueReference = ValueReference::new(6);
pub const VR_INT_IN: ValueReference = ValueReference::new(7);
pub const VR_INT_OUT: ValueReference = ValueReference::new(8);
pub const VR_BOOL_IN: ValueReference = ValueReference::new(9);
pub const VR_BOOL_OUT: ValueReference = ValueReference::new(10);
pub const VR_STRING_IN: ValueReference = ValueReference::new(11);
pub const VR_STRING_OUT: ValueReference = ValueReference::new(12);
pub const VR_ENUM_IN: ValueReference = ValueReference::new(13);
pub const VR_ENUM_OUT: ValueReference = ValueReference::new(14);

fn var(
    name: &str,
    vr: ValueReference,
    ty: VariableType,
    causality: Causality,
    variability: Variability,
) -> ModelVariable {
    ModelVariable::new(name, vr.get(), ty, causality, variability)
}

pub fn description() -> ModelDescription {
    use Causality::{Input, Output, Parameter};
    use Variability::{Continuous, Discrete, Fixed, Tunable};
    use VariableType::{Boolean, Enumeration, Integer, Real};

    let output = |name, vr, ty, variability| {
        var(name, vr, ty, Output, variability).with_initial(Initial::Calculated)
    };
    ModelDescription {
        fmi_version: FMI_VERSION.to_string(),
        model_name: "Feedthrough".to_string(),
        guid: GUID.to_string(),
        description: Some("A model to test different variable types".to_string()),
        number_of_event_indicators: 0,
        variables: vec![
            var("fixed_real_parameter", VR_FIXED_REAL_PARAMETER, Real, Parameter, Fixed)
                .with_initial(Initial::Exact)
                .with_start(Value::Real(0.0)),
            var("tunable_real_parameter", VR_TUNABLE_REAL_PARAMETER, Real, Parameter, Tunable)
                .with_initial(Initial::Exact)
                .with_start(Value::Real(0.0)),
            var("continuous_real_in", VR_CONTINUOUS_REAL_IN, Real, Input, Continuous)
                .with_start(Value::Real(0.0)),
            output("continuous_real_out", VR_CONTINUOUS_REAL_OUT, Real, Continuous),
            var("discrete_real_in", VR_DISCRETE_REAL_IN, Real, Input, Discrete)
                .with_start(Value::Real(0.0)),
            output("discrete_real_out", VR_DISCRETE_REAL_OUT, Real, Discrete),
            var("int_in", VR_INT_IN, Integer, Input, Discrete).with_start(Value::Integer(0)),
            output("int_out", VR_INT_OUT, Integer, Discrete),
            var("bool_in", VR_BOOL_IN, Boolean, Input, Discrete).with_start(Value::Boolean(false)),
            output("bool_out", VR_BOOL_OUT, Boolean, Discrete),
            var("string_in", VR_STRING_IN, VariableType::String, Input, Discrete)
                .with_start(Value::String("Set me!".to_string())),
            output("string_out", VR_STRING_OUT, VariableType::String, Discrete),
            var("enum_in", VR_ENUM_IN, Enumeration, Input, Discrete).with_start(Value::Integer(1)),
            output("enum_out", VR_ENUM_OUT, Enumeration, Discrete),
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
            stop_time: Some(2.0),
            tolerance: None,
            step_size: Some(0.1),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FeedthroughState {
    fixed_real_parameter: f64,
    tunable_real_parameter: f64,
    continuous_real: f64,
    discrete_real: f64,
    int: i32,
    boolean: bool,
    string: String,
    enumeration: i32,
}

impl Default for FeedthroughState {
    fn default() -> Self {
        Self {
            fixed_real_parameter: 0.0,
            tunable_real_parameter: 0.0,
            continuous_real: 0.0,
            discrete_real: 0.0,
            int: 0,
            boolean: false,
            string: "Set me!".to_string(),
            enumeration: 1,
        }
    }
}

#[derive(Default)]
pub struct Feedthrough {
    state: FeedthroughState,
}

pub fn factory(_ctx: &InstantiateContext) -> FmiResult<Box<dyn FmuInstance>> {
    Ok(Box::new(Feedthrough::default()))
}

impl FmuInstance for Feedthrough {
    fn reset(&mut self) -> FmiResult<()> {
        self.state = FeedthroughState::default();
        Ok(())
    }

    fn get_real(&mut self, vrs: &[ValueReference], values: &mut [f64]) -> FmiResult<()> {
        let s = &self.state;
        for (vr, out) in vrs.iter().zip(values.iter_mut()) {
            *out = match *vr {
                VR_FIXED_REAL_PARAMETER => s.fixed_real_parameter,
                VR_TUNABLE_REAL_PARAMETER => s.tunable_real_parameter,
                VR_CONTINUOUS_REAL_IN | VR_CONTINUOUS_REAL_OUT => s.continuous_real,
                VR_DISCRETE_REAL_IN | VR_DISCRETE_REAL_OUT => s.discrete_real,
                other => return Err(unknown_reference(other)),
            };
        }
        Ok(())
    }

    fn set_real(&mut self, vrs: &[ValueReference], values: &[f64]) -> FmiResult<()> {
        for (vr, value) in vrs.iter().zip(values) {
            match *vr {
                VR_FIXED_REAL_PARAMETER => self.state.fixed_real_parameter = *value,
                VR_TUNABLE_REAL_PARAMETER => self.state.tunable_real_parameter = *value,
                VR_CONTINUOUS_REAL_IN => self.state.continuous_real = *value,
                VR_DISCRETE_REAL_IN => self.state.discrete_real = *value,
                VR_CONTINUOUS_REAL_OUT | VR_DISCRETE_REAL_OUT => {
                    return Err(read_only(*vr, "real output"));
                }
                other => return Err(unknown_reference(other)),
            }
        }
        Ok(())
    }

    fn get_integer(&mut self, vrs: &[ValueReference], values: &mut [i32]) -> FmiResult<()> {
        for (vr, out) in vrs.iter().zip(values.iter_mut()) {
            *out = match *vr {
                VR_INT_IN | VR_INT_OUT => self.state.int,
                VR_ENUM_IN | VR_ENUM_OUT => self.state.enumeration,
                other => return Err(unknown_reference(other)),
            };
        }
        Ok(())
    }

    fn set_integer(&mut self, vrs: &[ValueReference], values: &[i32]) -> FmiResult<()> {
        for (vr, value) in vrs.iter().zip(values) {
            match *vr {
                VR_INT_IN => self.state.int = *value,
                VR_ENUM_IN => self.state.enumeration = *value,
                VR_INT_OUT | VR_ENUM_OUT => return Err(read_only(*vr, "integer output")),
                other => return Err(unknown_reference(other)),
            }
        }
        Ok(())
    }

    fn get_boolean(&mut self, vrs: &[ValueReference], values: &mut [bool]) -> FmiResult<()> {
        for (vr, out) in vrs.iter().zip(values.iter_mut()) {
            *out = match *vr {
                VR_BOOL_IN | VR_BOOL_OUT => self.state.boolean,
                other => return Err(unknown_reference(other)),
            };
        }
        Ok(())
    }

    fn set_boolean(&mut self, vrs: &[ValueReference], values: &[bool]) -> FmiResult<()> {
        for (vr, value) in vrs.iter().zip(values) {
            match *vr {
                VR_BOOL_IN => self.state.boolean = *value,
                VR_BOOL_OUT => return Err(read_only(*vr, "bool_out")),
                other => return Err(unknown_reference(other)),
            }
        }
        Ok(())
    }

    fn get_string(&mut self, vrs: &[ValueReference], values: &mut [String]) -> FmiResult<()> {
        for (vr, out) in vrs.iter().zip(values.iter_mut()) {
            *out = match *vr {
                VR_STRING_IN | VR_STRING_OUT => self.state.string.clone(),
                other => return Err(unknown_reference(other)),
            };
        }
        Ok(())
    }

    fn set_string(&mut self, vrs: &[ValueReference], values: &[String]) -> FmiResult<()> {
        for (vr, value) in vrs.iter().zip(values) {
            match *vr {
                VR_STRING_IN => self.state.string = value.clone(),
                VR_STRING_OUT => return Err(read_only(*vr, "string_out")),
                other => return Err(unknown_reference(other)),
            }
        }
        Ok(())
    }

    fn get_fmu_state(&mut self) -> FmiResult<FmuState> {
        Ok(FmuState::new(self.state.clone()))
    }

    fn set_fmu_state(&mut self, state: &FmuState) -> FmiResult<()> {
        self.state = restore::<FeedthroughState>(state)?;
        Ok(())
    }

    fn serialize_fmu_state(&mut self, state: &FmuState) -> FmiResult<Vec<u8>> {
        encode::<FeedthroughState>(state)
    }

    fn deserialize_fmu_state(&mut self, bytes: &[u8]) -> FmiResult<FmuState> {
        decode::<FeedthroughState>(bytes)
    }

    fn do_step(&mut self, _t: f64, _h: f64, _no_set_prior_state: bool) -> FmiResult<StepOutcome> {
        Ok(StepOutcome::Completed)
    }

    fn new_discrete_states(&mut self) -> FmiResult<EventInfo> {
        Ok(EventInfo::default())
    }

    fn set_time(&mut self, _time: f64) -> FmiResult<()> {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_appear_on_outputs() {
        let mut m = Feedthrough::default();
        m.set_real(&[VR_CONTINUOUS_REAL_IN], &[2.5]).unwrap();
        m.set_integer(&[VR_INT_IN, VR_ENUM_IN], &[7, 3]).unwrap();
        m.set_boolean(&[VR_BOOL_IN], &[true]).unwrap();
        m.set_string(&[VR_STRING_IN], &["hi".to_string()]).unwrap();

        let mut r = [0.0];
        m.get_real(&[VR_CONTINUOUS_REAL_OUT], &mut r).unwrap();
        let mut i = [0; 2];
        m.get_integer(&[VR_INT_OUT, VR_ENUM_OUT], &mut i).unwrap();
        let mut b = [false];
        m.get_boolean(&[VR_BOOL_OUT], &mut b).unwrap();
        let mut s = [String::new()];
        m.get_string(&[VR_STRING_OUT], &mut s).unwrap();

        assert_eq!(r, [2.5]);
        assert_eq!(i, [7, 3]);
        assert_eq!(b, [true]);
        assert_eq!(s[0], "hi");
    }

    #[test]
    fn outputs_are_read_only() {
        let mut m = Feedthrough::default();
        let fault = m.set_integer(&[VR_INT_IN, VR_INT_OUT], &[1, 2]).unwrap_err();
        assert_eq!(fault.reference, Some(VR_INT_OUT));
    }
}
