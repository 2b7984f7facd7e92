//! The call surface of a loaded model.

use crate::status::{EventInfo, FmiFault, FmiResult, IntegratorStepInfo, StepOutcome};
use core::any::Any;
use core::fmt;
use fmu_core::ValueReference;

/// Opaque model state owned by the instance that produced it.
pub struct FmuState(Box<dyn Any + Send>);

impl FmuState {
    pub fn new<T: Any + Send>(state: T) -> Self {
        Self(Box::new(state))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for FmuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FmuState(..)")
    }
}

fn unsupported<T>(call: &str) -> FmiResult<T> {
    Err(FmiFault::error(format!("{call} is not supported by this model")))
}

/// Trait for one live model instance.
///
/// This is the raw surface: it does no call-sequence checking and trusts
/// its arguments to be consistent with the model description. Callers go
/// through [`ModelHandle`](crate::ModelHandle), which enforces both.
///
/// Getters write into caller-provided buffers of the same length as `vrs`.
/// Methods a model does not implement report an `Error` fault.
pub trait FmuInstance: Send {
    fn setup_experiment(
        &mut self,
        _tolerance: Option<f64>,
        _start: f64,
        _stop: Option<f64>,
    ) -> FmiResult<()> {
        Ok(())
    }

    fn enter_initialization_mode(&mut self) -> FmiResult<()> {
        Ok(())
    }

    fn exit_initialization_mode(&mut self) -> FmiResult<()> {
        Ok(())
    }

    fn terminate(&mut self) -> FmiResult<()> {
        Ok(())
    }

    /// Return to the freshly instantiated state.
    fn reset(&mut self) -> FmiResult<()>;

    fn get_real(&mut self, vrs: &[ValueReference], values: &mut [f64]) -> FmiResult<()>;

    fn get_integer(&mut self, _vrs: &[ValueReference], _values: &mut [i32]) -> FmiResult<()> {
        unsupported("getInteger")
    }

    fn get_boolean(&mut self, _vrs: &[ValueReference], _values: &mut [bool]) -> FmiResult<()> {
        unsupported("getBoolean")
    }

    fn get_string(&mut self, _vrs: &[ValueReference], _values: &mut [String]) -> FmiResult<()> {
        unsupported("getString")
    }

    fn set_real(&mut self, vrs: &[ValueReference], values: &[f64]) -> FmiResult<()>;

    fn set_integer(&mut self, _vrs: &[ValueReference], _values: &[i32]) -> FmiResult<()> {
        unsupported("setInteger")
    }

    fn set_boolean(&mut self, _vrs: &[ValueReference], _values: &[bool]) -> FmiResult<()> {
        unsupported("setBoolean")
    }

    fn set_string(&mut self, _vrs: &[ValueReference], _values: &[String]) -> FmiResult<()> {
        unsupported("setString")
    }

    // State snapshots

    fn get_fmu_state(&mut self) -> FmiResult<FmuState> {
        unsupported("getFMUstate")
    }

    fn set_fmu_state(&mut self, _state: &FmuState) -> FmiResult<()> {
        unsupported("setFMUstate")
    }

    fn free_fmu_state(&mut self, state: FmuState) -> FmiResult<()> {
        drop(state);
        Ok(())
    }

    fn serialize_fmu_state(&mut self, _state: &FmuState) -> FmiResult<Vec<u8>> {
        unsupported("serializeFMUstate")
    }

    fn deserialize_fmu_state(&mut self, _bytes: &[u8]) -> FmiResult<FmuState> {
        unsupported("deSerializeFMUstate")
    }

    // Co-simulation

    fn do_step(
        &mut self,
        _current_time: f64,
        _step_size: f64,
        _no_set_prior_state: bool,
    ) -> FmiResult<StepOutcome> {
        unsupported("doStep")
    }

    // Model exchange

    fn enter_event_mode(&mut self) -> FmiResult<()> {
        Ok(())
    }

    fn new_discrete_states(&mut self) -> FmiResult<EventInfo> {
        unsupported("newDiscreteStates")
    }

    fn enter_continuous_time_mode(&mut self) -> FmiResult<()> {
        Ok(())
    }

    fn completed_integrator_step(
        &mut self,
        _no_set_prior_state: bool,
    ) -> FmiResult<IntegratorStepInfo> {
        Ok(IntegratorStepInfo::default())
    }

    fn set_time(&mut self, _time: f64) -> FmiResult<()> {
        unsupported("setTime")
    }

    fn set_continuous_states(&mut self, _x: &[f64]) -> FmiResult<()> {
        unsupported("setContinuousStates")
    }

    fn get_continuous_states(&mut self, _x: &mut [f64]) -> FmiResult<()> {
        unsupported("getContinuousStates")
    }

    fn get_derivatives(&mut self, _dx: &mut [f64]) -> FmiResult<()> {
        unsupported("getDerivatives")
    }

    fn get_event_indicators(&mut self, _z: &mut [f64]) -> FmiResult<()> {
        unsupported("getEventIndicators")
    }

    fn get_nominals_of_continuous_states(&mut self, nominals: &mut [f64]) -> FmiResult<()> {
        nominals.fill(1.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;

    struct Constant(f64);

    impl FmuInstance for Constant {
        fn reset(&mut self) -> FmiResult<()> {
            Ok(())
        }

        fn get_real(&mut self, _vrs: &[ValueReference], values: &mut [f64]) -> FmiResult<()> {
            values.fill(self.0);
            Ok(())
        }

        fn set_real(&mut self, _vrs: &[ValueReference], values: &[f64]) -> FmiResult<()> {
            if let Some(v) = values.first() {
                self.0 = *v;
            }
            Ok(())
        }
    }

    #[test]
    fn unimplemented_calls_report_error() {
        let mut m = Constant(1.0);
        let err = m.do_step(0.0, 0.1, true).unwrap_err();
        assert_eq!(err.status, Status::Error);
        assert!(err.message.contains("doStep"));
        assert!(m.get_fmu_state().is_err());
    }

    #[test]
    fn nominals_default_to_one() {
        let mut m = Constant(1.0);
        let mut nominals = [0.0; 3];
        m.get_nominals_of_continuous_states(&mut nominals).unwrap();
        assert_eq!(nominals, [1.0; 3]);
    }

    #[test]
    fn opaque_state_downcasts() {
        let state = FmuState::new(vec![1.0_f64, 2.0]);
        assert_eq!(state.downcast_ref::<Vec<f64>>(), Some(&vec![1.0, 2.0]));
        assert!(state.downcast_ref::<String>().is_none());
    }
}
