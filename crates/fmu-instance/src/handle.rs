//! Model handle: the guarded call surface of one live instance.
//!
//! Every public method runs the same pipeline:
//! 1. lifecycle check (freed handles report `UseAfterFree`, out-of-order
//!    calls report `ProtocolViolation`)
//! 2. capability and description checks
//! 3. the call into the model
//! 4. phase update, or fault bookkeeping when the model refuses
//!
//! A handle is `Send` but deliberately not `Sync`: one instance is driven
//! from one thread at a time.

use crate::capability::Capability;
use crate::error::{ModelError, ModelResult};
use crate::instance::FmuInstance;
use crate::lifecycle::{Lifecycle, Operation, Phase};
use crate::logging::InstanceLogger;
use crate::snapshot::{SerializedState, SnapshotGuard, SnapshotTable, StateSnapshot};
use crate::source::UnpackedFmu;
use crate::status::{EventInfo, FmiFault, FmiResult, IntegratorStepInfo, StepOutcome};
use core::fmt;
use fmu_core::{
    Causality, FmuKind, Initial, ModelDescription, ModelVariable, Value, ValueReference,
    Variability, VariableType, ensure_finite,
};
use std::sync::Arc;

/// Identity of one instantiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId(uuid::Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Horizon recorded by `setupExperiment`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Experiment {
    pub tolerance: Option<f64>,
    pub start: f64,
    pub stop: Option<f64>,
}

/// Lifecycle plus the model it guards.
struct Core {
    lifecycle: Lifecycle,
    instance: Option<Box<dyn FmuInstance>>,
}

impl Core {
    /// Call into the model and update the phase from the outcome.
    /// The caller has already run `lifecycle.check(op)`.
    fn call<T>(
        &mut self,
        op: Operation,
        f: impl FnOnce(&mut dyn FmuInstance) -> FmiResult<T>,
    ) -> FmiResult<T> {
        let Some(instance) = self.instance.as_deref_mut() else {
            return Err(FmiFault::fatal("model instance already released"));
        };
        match f(instance) {
            Ok(value) => {
                let before = self.lifecycle.phase();
                self.lifecycle.complete(op);
                let after = self.lifecycle.phase();
                if before != after {
                    tracing::debug!("{}: {} -> {}", op, before, after);
                }
                Ok(value)
            }
            Err(fault) => {
                self.lifecycle.fault(op, fault.status);
                tracing::warn!(
                    "{} failed in phase {}: {}",
                    op,
                    self.lifecycle.phase(),
                    fault
                );
                Err(fault)
            }
        }
    }
}

fn call_failed(op: Operation, fault: FmiFault) -> ModelError {
    ModelError::CallFailed {
        operation: op,
        status: fault.status,
        message: fault.message,
    }
}

fn set_failed(vrs: &[ValueReference], fault: FmiFault) -> ModelError {
    ModelError::SetValueFailed {
        reference: fault.reference.or(vrs.first().copied()).unwrap_or_default(),
        reason: fault.to_string(),
    }
}

fn get_failed(vrs: &[ValueReference], fault: FmiFault) -> ModelError {
    ModelError::GetValueFailed {
        reference: fault.reference.or(vrs.first().copied()).unwrap_or_default(),
        reason: fault.to_string(),
    }
}

/// Owned handle to one instantiated model.
pub struct ModelHandle {
    id: InstanceId,
    name: String,
    description: Arc<ModelDescription>,
    core: Core,
    snapshots: SnapshotTable,
    logger: InstanceLogger,
    experiment: Option<Experiment>,
    // Keeps an extracted archive on disk for as long as the model runs.
    _unpacked: Option<Arc<UnpackedFmu>>,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.core.lifecycle.kind())
            .field("phase", &self.core.lifecycle.phase())
            .field("live_snapshots", &self.snapshots.len())
            .finish()
    }
}

impl ModelHandle {
    pub(crate) fn new(
        name: String,
        kind: FmuKind,
        description: Arc<ModelDescription>,
        instance: Box<dyn FmuInstance>,
        logger: InstanceLogger,
        unpacked: Option<Arc<UnpackedFmu>>,
    ) -> Self {
        let id = InstanceId::new();
        tracing::debug!("Instantiated {} ({:?}) as {}", name, kind, id);
        Self {
            id,
            name,
            description,
            core: Core {
                lifecycle: Lifecycle::new(kind),
                instance: Some(instance),
            },
            snapshots: SnapshotTable::new(id),
            logger,
            experiment: None,
            _unpacked: unpacked,
        }
    }

    // ---- Accessors ----

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FmuKind {
        self.core.lifecycle.kind()
    }

    pub fn phase(&self) -> Phase {
        self.core.lifecycle.phase()
    }

    pub fn description(&self) -> &Arc<ModelDescription> {
        &self.description
    }

    /// Horizon from the last `setupExperiment`, if any.
    pub fn experiment(&self) -> Option<Experiment> {
        self.experiment
    }

    pub fn logger(&self) -> &InstanceLogger {
        &self.logger
    }

    pub fn live_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    pub fn supports(&self, capability: Capability) -> bool {
        let kind = self.kind();
        match capability {
            Capability::CoSimulation => self.description.supports_kind(FmuKind::CoSimulation),
            Capability::ModelExchange => self.description.supports_kind(FmuKind::ModelExchange),
            Capability::GetAndSetFmuState => self.description.can_get_and_set_fmu_state(kind),
            Capability::SerializeFmuState => self.description.can_serialize_fmu_state(kind),
        }
    }

    fn require(&self, capability: Capability) -> ModelResult<()> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(ModelError::UnsupportedCapability { capability })
        }
    }

    fn invoke<T>(
        &mut self,
        op: Operation,
        f: impl FnOnce(&mut dyn FmuInstance) -> FmiResult<T>,
    ) -> ModelResult<T> {
        self.core.lifecycle.check(op)?;
        self.core.call(op, f).map_err(|fault| call_failed(op, fault))
    }

    // ---- Setup and teardown ----

    pub fn set_debug_logging(&mut self, logging_on: bool, categories: &[&str]) -> ModelResult<()> {
        self.core.lifecycle.check(Operation::SetDebugLogging)?;
        self.logger
            .set_debug_logging(logging_on, categories)
            .map_err(|what| ModelError::InvalidArgument { what })
    }

    pub fn setup_experiment(
        &mut self,
        tolerance: Option<f64>,
        start: f64,
        stop: Option<f64>,
    ) -> ModelResult<()> {
        self.core.lifecycle.check(Operation::SetupExperiment)?;
        ensure_finite(start, "start time")?;
        if let Some(stop) = stop
            && ensure_finite(stop, "stop time")? < start
        {
            return Err(ModelError::InvalidArgument {
                what: format!("stop time {stop} before start time {start}"),
            });
        }
        if let Some(tol) = tolerance
            && ensure_finite(tol, "tolerance")? <= 0.0
        {
            return Err(ModelError::InvalidArgument {
                what: format!("tolerance {tol}"),
            });
        }
        self.invoke(Operation::SetupExperiment, |m| {
            m.setup_experiment(tolerance, start, stop)
        })?;
        self.experiment = Some(Experiment {
            tolerance,
            start,
            stop,
        });
        Ok(())
    }

    pub fn enter_initialization_mode(&mut self) -> ModelResult<()> {
        self.invoke(Operation::EnterInitializationMode, |m| {
            m.enter_initialization_mode()
        })
    }

    pub fn exit_initialization_mode(&mut self) -> ModelResult<()> {
        self.invoke(Operation::ExitInitializationMode, |m| {
            m.exit_initialization_mode()
        })
    }

    pub fn terminate(&mut self) -> ModelResult<()> {
        self.invoke(Operation::Terminate, |m| m.terminate())
    }

    /// Return to `Instantiated`. Live snapshots stay valid.
    pub fn reset(&mut self) -> ModelResult<()> {
        self.invoke(Operation::Reset, |m| m.reset())?;
        self.experiment = None;
        Ok(())
    }

    /// Release the instance and every live snapshot. Terminal.
    pub fn free_instance(&mut self) -> ModelResult<()> {
        self.core.lifecycle.check(Operation::FreeInstance)?;
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        let states = self.snapshots.drain();
        if let Some(mut instance) = self.core.instance.take() {
            for state in states {
                if let Err(fault) = instance.free_fmu_state(state) {
                    tracing::warn!("{} failed during free: {}", Operation::FreeFmuState, fault);
                }
            }
        }
        self.core.lifecycle.complete(Operation::FreeInstance);
        tracing::debug!("Freed instance {} ({})", self.name, self.id);
    }

    // ---- Variable access ----

    fn check_lengths(refs: usize, values: usize) -> ModelResult<()> {
        if refs == values {
            Ok(())
        } else {
            Err(ModelError::InvalidArgument {
                what: format!("{refs} value references but {values} values"),
            })
        }
    }

    fn check_writable(&self, vrs: &[ValueReference], ty: VariableType) -> ModelResult<()> {
        let in_init = self.phase() == Phase::InitializationMode;
        for &vr in vrs {
            let Some(var) = self.description.by_reference(vr, ty) else {
                return Err(ModelError::SetValueFailed {
                    reference: vr,
                    reason: format!("no {} variable with this reference", ty.storage()),
                });
            };
            let refusal = if var.variability == Variability::Constant {
                Some("variable is constant")
            } else if var.causality == Causality::Independent {
                Some("independent variable cannot be set")
            } else if var.initial == Some(Initial::Calculated) {
                Some("variable is calculated")
            } else if var.initial == Some(Initial::Exact)
                && !in_init
                && var.causality != Causality::Input
                && var.variability != Variability::Tunable
            {
                Some("initial=exact variable can only be set during initialization")
            } else {
                None
            };
            if let Some(reason) = refusal {
                return Err(ModelError::SetValueFailed {
                    reference: vr,
                    reason: format!("{} ({})", reason, var.name),
                });
            }
        }
        Ok(())
    }

    fn check_readable(&self, vrs: &[ValueReference], ty: VariableType) -> ModelResult<()> {
        for &vr in vrs {
            if self.description.by_reference(vr, ty).is_none() {
                return Err(ModelError::GetValueFailed {
                    reference: vr,
                    reason: format!("no {} variable with this reference", ty.storage()),
                });
            }
        }
        Ok(())
    }

    fn write<T>(
        &mut self,
        op: Operation,
        ty: VariableType,
        vrs: &[ValueReference],
        values: &[T],
        f: impl FnOnce(&mut dyn FmuInstance, &[ValueReference], &[T]) -> FmiResult<()>,
    ) -> ModelResult<()> {
        self.core.lifecycle.check(op)?;
        Self::check_lengths(vrs.len(), values.len())?;
        self.check_writable(vrs, ty)?;
        self.core
            .call(op, |m| f(m, vrs, values))
            .map_err(|fault| set_failed(vrs, fault))
    }

    fn read<T: Clone + Default>(
        &mut self,
        op: Operation,
        ty: VariableType,
        vrs: &[ValueReference],
        f: impl FnOnce(&mut dyn FmuInstance, &[ValueReference], &mut [T]) -> FmiResult<()>,
    ) -> ModelResult<Vec<T>> {
        self.core.lifecycle.check(op)?;
        self.check_readable(vrs, ty)?;
        let mut values = vec![T::default(); vrs.len()];
        self.core
            .call(op, |m| f(m, vrs, &mut values))
            .map_err(|fault| get_failed(vrs, fault))?;
        Ok(values)
    }

    pub fn set_real(&mut self, vrs: &[ValueReference], values: &[f64]) -> ModelResult<()> {
        self.write(Operation::SetReal, VariableType::Real, vrs, values, |m, r, v| {
            m.set_real(r, v)
        })
    }

    pub fn set_integer(&mut self, vrs: &[ValueReference], values: &[i32]) -> ModelResult<()> {
        self.write(
            Operation::SetInteger,
            VariableType::Integer,
            vrs,
            values,
            |m, r, v| m.set_integer(r, v),
        )
    }

    pub fn set_boolean(&mut self, vrs: &[ValueReference], values: &[bool]) -> ModelResult<()> {
        self.write(
            Operation::SetBoolean,
            VariableType::Boolean,
            vrs,
            values,
            |m, r, v| m.set_boolean(r, v),
        )
    }

    pub fn set_string(&mut self, vrs: &[ValueReference], values: &[String]) -> ModelResult<()> {
        self.write(
            Operation::SetString,
            VariableType::String,
            vrs,
            values,
            |m, r, v| m.set_string(r, v),
        )
    }

    pub fn get_real(&mut self, vrs: &[ValueReference]) -> ModelResult<Vec<f64>> {
        self.read(Operation::GetReal, VariableType::Real, vrs, |m, r, v| {
            m.get_real(r, v)
        })
    }

    pub fn get_integer(&mut self, vrs: &[ValueReference]) -> ModelResult<Vec<i32>> {
        self.read(Operation::GetInteger, VariableType::Integer, vrs, |m, r, v| {
            m.get_integer(r, v)
        })
    }

    pub fn get_boolean(&mut self, vrs: &[ValueReference]) -> ModelResult<Vec<bool>> {
        self.read(Operation::GetBoolean, VariableType::Boolean, vrs, |m, r, v| {
            m.get_boolean(r, v)
        })
    }

    pub fn get_string(&mut self, vrs: &[ValueReference]) -> ModelResult<Vec<String>> {
        self.read(Operation::GetString, VariableType::String, vrs, |m, r, v| {
            m.get_string(r, v)
        })
    }

    /// Read one variable with the getter its type calls for.
    pub fn get_value(&mut self, var: &ModelVariable) -> ModelResult<Value> {
        let vr = [var.value_reference];
        let missing = || ModelError::GetValueFailed {
            reference: var.value_reference,
            reason: "model returned no value".to_string(),
        };
        let value = match var.var_type.storage() {
            VariableType::Real => Value::Real(*self.get_real(&vr)?.first().ok_or_else(missing)?),
            VariableType::Boolean => {
                Value::Boolean(*self.get_boolean(&vr)?.first().ok_or_else(missing)?)
            }
            VariableType::String => {
                Value::String(self.get_string(&vr)?.into_iter().next().ok_or_else(missing)?)
            }
            _ => Value::Integer(*self.get_integer(&vr)?.first().ok_or_else(missing)?),
        };
        Ok(value)
    }

    /// Write one variable, widening integers to reals where the type asks.
    pub fn set_value(&mut self, var: &ModelVariable, value: Value) -> ModelResult<()> {
        let vr = [var.value_reference];
        let found = value.storage_type();
        let Some(value) = value.coerce(var.var_type) else {
            return Err(ModelError::SetValueFailed {
                reference: var.value_reference,
                reason: format!("{found} value does not fit {}", var.var_type),
            });
        };
        match value {
            Value::Real(x) => self.set_real(&vr, &[x]),
            Value::Integer(i) => self.set_integer(&vr, &[i]),
            Value::Boolean(b) => self.set_boolean(&vr, &[b]),
            Value::String(s) => self.set_string(&vr, &[s]),
        }
    }

    // ---- Co-simulation ----

    /// Advance by one communication step.
    pub fn do_step(
        &mut self,
        current_time: f64,
        step_size: f64,
        no_set_prior_state: bool,
    ) -> ModelResult<StepOutcome> {
        self.core.lifecycle.check(Operation::DoStep)?;
        self.require(Capability::CoSimulation)?;
        if !(step_size > 0.0) || !current_time.is_finite() {
            return Err(ModelError::InvalidArgument {
                what: format!("step of {step_size} from t = {current_time}"),
            });
        }
        self.invoke(Operation::DoStep, |m| {
            m.do_step(current_time, step_size, no_set_prior_state)
        })
    }

    // ---- Model exchange ----

    pub fn enter_event_mode(&mut self) -> ModelResult<()> {
        self.invoke(Operation::EnterEventMode, |m| m.enter_event_mode())
    }

    pub fn new_discrete_states(&mut self) -> ModelResult<EventInfo> {
        self.invoke(Operation::NewDiscreteStates, |m| m.new_discrete_states())
    }

    pub fn enter_continuous_time_mode(&mut self) -> ModelResult<()> {
        self.invoke(Operation::EnterContinuousTimeMode, |m| {
            m.enter_continuous_time_mode()
        })
    }

    pub fn completed_integrator_step(
        &mut self,
        no_set_prior_state: bool,
    ) -> ModelResult<IntegratorStepInfo> {
        self.invoke(Operation::CompletedIntegratorStep, |m| {
            m.completed_integrator_step(no_set_prior_state)
        })
    }

    pub fn set_time(&mut self, time: f64) -> ModelResult<()> {
        self.invoke(Operation::SetTime, |m| m.set_time(time))
    }

    pub fn number_of_continuous_states(&self) -> usize {
        self.description.number_of_continuous_states()
    }

    pub fn number_of_event_indicators(&self) -> usize {
        self.description.number_of_event_indicators
    }

    pub fn set_continuous_states(&mut self, x: &[f64]) -> ModelResult<()> {
        self.core.lifecycle.check(Operation::SetContinuousStates)?;
        Self::check_lengths(self.number_of_continuous_states(), x.len())?;
        self.invoke(Operation::SetContinuousStates, |m| m.set_continuous_states(x))
    }

    fn fetch(
        &mut self,
        op: Operation,
        len: usize,
        f: impl FnOnce(&mut dyn FmuInstance, &mut [f64]) -> FmiResult<()>,
    ) -> ModelResult<Vec<f64>> {
        let mut out = vec![0.0; len];
        self.invoke(op, |m| f(m, &mut out))?;
        Ok(out)
    }

    pub fn get_continuous_states(&mut self) -> ModelResult<Vec<f64>> {
        let n = self.number_of_continuous_states();
        self.fetch(Operation::GetContinuousStates, n, |m, x| {
            m.get_continuous_states(x)
        })
    }

    pub fn get_derivatives(&mut self) -> ModelResult<Vec<f64>> {
        let n = self.number_of_continuous_states();
        self.fetch(Operation::GetDerivatives, n, |m, dx| m.get_derivatives(dx))
    }

    pub fn get_event_indicators(&mut self) -> ModelResult<Vec<f64>> {
        let n = self.number_of_event_indicators();
        self.fetch(Operation::GetEventIndicators, n, |m, z| {
            m.get_event_indicators(z)
        })
    }

    pub fn get_nominals_of_continuous_states(&mut self) -> ModelResult<Vec<f64>> {
        let n = self.number_of_continuous_states();
        self.fetch(Operation::GetNominalsOfContinuousStates, n, |m, x| {
            m.get_nominals_of_continuous_states(x)
        })
    }

    // ---- State snapshots ----

    pub fn get_fmu_state(&mut self) -> ModelResult<StateSnapshot> {
        self.core.lifecycle.check(Operation::GetFmuState)?;
        self.require(Capability::GetAndSetFmuState)?;
        let state = self.invoke(Operation::GetFmuState, |m| m.get_fmu_state())?;
        let snapshot = self.snapshots.insert(state);
        tracing::debug!("Captured snapshot {} of {}", snapshot.id(), self.name);
        Ok(snapshot)
    }

    pub fn set_fmu_state(&mut self, snapshot: &StateSnapshot) -> ModelResult<()> {
        let op = Operation::SetFmuState;
        self.core.lifecycle.check(op)?;
        self.require(Capability::GetAndSetFmuState)?;
        let state = self.snapshots.get(op, snapshot)?;
        self.core
            .call(op, |m| m.set_fmu_state(state))
            .map_err(|fault| call_failed(op, fault))
    }

    pub fn free_fmu_state(&mut self, snapshot: &StateSnapshot) -> ModelResult<()> {
        let op = Operation::FreeFmuState;
        self.core.lifecycle.check(op)?;
        let state = self.snapshots.remove(op, snapshot)?;
        self.core
            .call(op, |m| m.free_fmu_state(state))
            .map_err(|fault| call_failed(op, fault))
    }

    pub fn serialize_fmu_state(&mut self, snapshot: &StateSnapshot) -> ModelResult<SerializedState> {
        let op = Operation::SerializeFmuState;
        self.core.lifecycle.check(op)?;
        self.require(Capability::SerializeFmuState)?;
        let state = self.snapshots.get(op, snapshot)?;
        let payload = self
            .core
            .call(op, |m| m.serialize_fmu_state(state))
            .map_err(|fault| call_failed(op, fault))?;
        Ok(SerializedState::seal(
            &self.description.guid,
            &self.description.fmi_version,
            payload,
        ))
    }

    /// Rebuild a snapshot owned by this handle from serialized bytes.
    pub fn deserialize_fmu_state(&mut self, serialized: &SerializedState) -> ModelResult<StateSnapshot> {
        let op = Operation::DeserializeFmuState;
        self.core.lifecycle.check(op)?;
        self.require(Capability::SerializeFmuState)?;
        let payload = serialized.open(&self.description.guid, &self.description.fmi_version)?;
        let state = self
            .core
            .call(op, |m| m.deserialize_fmu_state(payload))
            .map_err(|fault| call_failed(op, fault))?;
        Ok(self.snapshots.insert(state))
    }

    /// Capture the current state; it is freed when the guard goes away.
    pub fn capture_scoped(&mut self) -> ModelResult<SnapshotGuard<'_>> {
        let snapshot = self.get_fmu_state()?;
        Ok(SnapshotGuard::new(self, snapshot))
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        if !self.core.lifecycle.is_freed() {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::FmuState;
    use fmu_core::{CoSimulationCapabilities, CoreError, FMI_VERSION};
    use std::collections::HashMap;

    /// Real-only model with a plain map of values.
    #[derive(Default)]
    struct MapModel {
        values: HashMap<u32, f64>,
    }

    impl FmuInstance for MapModel {
        fn reset(&mut self) -> FmiResult<()> {
            self.values.clear();
            Ok(())
        }

        fn get_real(&mut self, vrs: &[ValueReference], values: &mut [f64]) -> FmiResult<()> {
            for (vr, out) in vrs.iter().zip(values.iter_mut()) {
                *out = self.values.get(&vr.get()).copied().unwrap_or(0.0);
            }
            Ok(())
        }

        fn set_real(&mut self, vrs: &[ValueReference], values: &[f64]) -> FmiResult<()> {
            for (vr, v) in vrs.iter().zip(values) {
                if *v < 0.0 {
                    return Err(FmiFault::error("negative").with_reference(*vr));
                }
                self.values.insert(vr.get(), *v);
            }
            Ok(())
        }

        fn get_fmu_state(&mut self) -> FmiResult<FmuState> {
            Ok(FmuState::new(self.values.clone()))
        }

        fn set_fmu_state(&mut self, state: &FmuState) -> FmiResult<()> {
            let values = state
                .downcast_ref::<HashMap<u32, f64>>()
                .ok_or_else(|| FmiFault::error("foreign state"))?;
            self.values = values.clone();
            Ok(())
        }

        fn do_step(&mut self, _t: f64, _h: f64, _no_set: bool) -> FmiResult<StepOutcome> {
            Ok(StepOutcome::Completed)
        }
    }

    fn description() -> Arc<ModelDescription> {
        Arc::new(ModelDescription {
            fmi_version: FMI_VERSION.to_string(),
            model_name: "Map".to_string(),
            guid: "{map}".to_string(),
            description: None,
            number_of_event_indicators: 0,
            variables: vec![
                ModelVariable::new(
                    "p",
                    1,
                    VariableType::Real,
                    Causality::Parameter,
                    Variability::Fixed,
                )
                .with_initial(Initial::Exact)
                .with_start(Value::Real(1.0)),
                ModelVariable::new(
                    "u",
                    2,
                    VariableType::Real,
                    Causality::Input,
                    Variability::Continuous,
                )
                .with_start(Value::Real(0.0)),
                ModelVariable::new(
                    "c",
                    3,
                    VariableType::Real,
                    Causality::Local,
                    Variability::Constant,
                )
                .with_start(Value::Real(3.0)),
            ],
            co_simulation: Some(CoSimulationCapabilities {
                model_identifier: "Map".to_string(),
                can_get_and_set_fmu_state: true,
                ..Default::default()
            }),
            model_exchange: None,
            default_experiment: None,
        })
    }

    fn handle() -> ModelHandle {
        let md = description();
        ModelHandle::new(
            "Map".to_string(),
            FmuKind::CoSimulation,
            md,
            Box::new(MapModel::default()),
            InstanceLogger::new("Map", false),
            None,
        )
    }

    fn vr(n: u32) -> ValueReference {
        ValueReference::new(n)
    }

    #[test]
    fn initial_exact_only_in_initialization() {
        let mut h = handle();
        h.enter_initialization_mode().unwrap();
        h.set_real(&[vr(1)], &[2.0]).unwrap();
        h.exit_initialization_mode().unwrap();

        let err = h.set_real(&[vr(1)], &[5.0]).unwrap_err();
        assert!(matches!(err, ModelError::SetValueFailed { reference, .. } if reference == vr(1)));
        h.set_real(&[vr(2)], &[5.0]).unwrap();
        assert_eq!(h.get_real(&[vr(1), vr(2)]).unwrap(), vec![2.0, 5.0]);
    }

    #[test]
    fn write_rules_and_length_check() {
        let mut h = handle();
        h.enter_initialization_mode().unwrap();
        assert!(matches!(
            h.set_real(&[vr(3)], &[1.0]),
            Err(ModelError::SetValueFailed { .. })
        ));
        assert!(matches!(
            h.set_real(&[vr(1), vr(2)], &[1.0]),
            Err(ModelError::InvalidArgument { .. })
        ));
        assert!(matches!(
            h.get_real(&[vr(99)]),
            Err(ModelError::GetValueFailed { reference, .. }) if reference == vr(99)
        ));
    }

    #[test]
    fn native_failure_names_reported_reference() {
        let mut h = handle();
        h.enter_initialization_mode().unwrap();
        let err = h.set_real(&[vr(1), vr(2)], &[1.0, -1.0]).unwrap_err();
        assert!(matches!(err, ModelError::SetValueFailed { reference, .. } if reference == vr(2)));
        // An Error fault poisons the instance.
        assert_eq!(h.phase(), Phase::Error);
        assert!(h.get_real(&[vr(1)]).is_ok());
        assert!(matches!(
            h.exit_initialization_mode(),
            Err(ModelError::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn snapshot_restore_and_free() {
        let mut h = handle();
        h.enter_initialization_mode().unwrap();
        h.exit_initialization_mode().unwrap();
        h.set_real(&[vr(2)], &[1.5]).unwrap();
        let snap = h.get_fmu_state().unwrap();
        h.set_real(&[vr(2)], &[9.0]).unwrap();
        h.set_fmu_state(&snap).unwrap();
        assert_eq!(h.get_real(&[vr(2)]).unwrap(), vec![1.5]);

        h.free_fmu_state(&snap).unwrap();
        assert!(matches!(
            h.set_fmu_state(&snap),
            Err(ModelError::UseAfterFree { what: "snapshot", .. })
        ));
    }

    #[test]
    fn serialization_needs_capability() {
        let mut h = handle();
        h.enter_initialization_mode().unwrap();
        let snap = h.get_fmu_state().unwrap();
        assert!(matches!(
            h.serialize_fmu_state(&snap),
            Err(ModelError::UnsupportedCapability {
                capability: Capability::SerializeFmuState
            })
        ));
    }

    #[test]
    fn snapshots_do_not_cross_handles() {
        let mut a = handle();
        let mut b = handle();
        a.enter_initialization_mode().unwrap();
        b.enter_initialization_mode().unwrap();
        let snap = a.get_fmu_state().unwrap();
        assert!(matches!(
            b.set_fmu_state(&snap),
            Err(ModelError::SnapshotMismatch { .. })
        ));
    }

    #[test]
    fn scoped_capture_releases_on_drop() {
        let mut h = handle();
        h.enter_initialization_mode().unwrap();
        h.exit_initialization_mode().unwrap();
        h.set_real(&[vr(2)], &[1.0]).unwrap();
        {
            let mut guard = h.capture_scoped().unwrap();
            guard.handle().set_real(&[vr(2)], &[4.0]).unwrap();
            guard.restore().unwrap();
        }
        assert_eq!(h.live_snapshots(), 0);
        assert_eq!(h.get_real(&[vr(2)]).unwrap(), vec![1.0]);
    }

    #[test]
    fn free_instance_is_terminal() {
        let mut h = handle();
        h.enter_initialization_mode().unwrap();
        let snap = h.get_fmu_state().unwrap();
        h.free_instance().unwrap();
        assert_eq!(h.live_snapshots(), 0);
        assert!(matches!(
            h.free_instance(),
            Err(ModelError::UseAfterFree { what: "instance", .. })
        ));
        assert!(matches!(
            h.set_fmu_state(&snap),
            Err(ModelError::UseAfterFree { .. })
        ));
        assert!(matches!(
            h.do_step(0.0, 0.1, true),
            Err(ModelError::UseAfterFree { .. })
        ));
    }

    #[test]
    fn setup_experiment_records_horizon() {
        let mut h = handle();
        h.setup_experiment(Some(1e-4), 0.0, Some(2.0)).unwrap();
        assert_eq!(
            h.experiment(),
            Some(Experiment {
                tolerance: Some(1e-4),
                start: 0.0,
                stop: Some(2.0)
            })
        );
        assert!(matches!(
            h.setup_experiment(None, 3.0, Some(1.0)),
            Err(ModelError::InvalidArgument { .. })
        ));
        assert!(matches!(
            h.setup_experiment(None, f64::NAN, None),
            Err(ModelError::Core(CoreError::NonFinite { what: "start time", .. }))
        ));
        assert!(matches!(
            h.setup_experiment(Some(f64::INFINITY), 0.0, None),
            Err(ModelError::Core(CoreError::NonFinite { what: "tolerance", .. }))
        ));
        h.enter_initialization_mode().unwrap();
        assert!(matches!(
            h.setup_experiment(None, 0.0, None),
            Err(ModelError::ProtocolViolation { .. })
        ));
    }
}
