//! Call-sequence state machine.
//!
//! Every operation on a [`ModelHandle`](crate::ModelHandle) declares the
//! phases it may fire from. The handle checks the table before anything
//! reaches the model, and advances the phase only after the model accepted
//! the call.
//!
//! ```text
//! Instantiated -> InitializationMode -> StepComplete (CS)
//!                                    -> EventMode <-> ContinuousTimeMode (ME)
//!                                    -> Terminated -> Freed
//! ```

use crate::error::{ModelError, ModelResult};
use crate::status::Status;
use core::fmt;
use fmu_core::FmuKind;

/// Lifecycle phase of a model instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Instantiated,
    InitializationMode,
    StepComplete,
    StepFailed,
    EventMode,
    ContinuousTimeMode,
    Terminated,
    Error,
    Freed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Operations on a model handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    SetDebugLogging,
    SetupExperiment,
    EnterInitializationMode,
    ExitInitializationMode,
    Terminate,
    Reset,
    FreeInstance,
    GetReal,
    GetInteger,
    GetBoolean,
    GetString,
    SetReal,
    SetInteger,
    SetBoolean,
    SetString,
    GetFmuState,
    SetFmuState,
    FreeFmuState,
    SerializeFmuState,
    DeserializeFmuState,
    DoStep,
    EnterEventMode,
    NewDiscreteStates,
    EnterContinuousTimeMode,
    CompletedIntegratorStep,
    SetTime,
    SetContinuousStates,
    GetContinuousStates,
    GetDerivatives,
    GetEventIndicators,
    GetNominalsOfContinuousStates,
}

use Phase::*;

const ALIVE: &[Phase] = &[
    Instantiated,
    InitializationMode,
    StepComplete,
    StepFailed,
    EventMode,
    ContinuousTimeMode,
    Terminated,
    Error,
];
const READABLE: &[Phase] = &[
    InitializationMode,
    StepComplete,
    StepFailed,
    EventMode,
    ContinuousTimeMode,
    Terminated,
    Error,
];
const WRITABLE: &[Phase] = &[
    InitializationMode,
    StepComplete,
    EventMode,
    ContinuousTimeMode,
];
const STATEFUL: &[Phase] = &[
    InitializationMode,
    StepComplete,
    StepFailed,
    EventMode,
    ContinuousTimeMode,
    Terminated,
];
const ME_QUERY: &[Phase] = &[EventMode, ContinuousTimeMode, Terminated, Error];

impl Operation {
    /// Name of the underlying model function.
    pub fn name(self) -> &'static str {
        match self {
            Operation::SetDebugLogging => "setDebugLogging",
            Operation::SetupExperiment => "setupExperiment",
            Operation::EnterInitializationMode => "enterInitializationMode",
            Operation::ExitInitializationMode => "exitInitializationMode",
            Operation::Terminate => "terminate",
            Operation::Reset => "reset",
            Operation::FreeInstance => "freeInstance",
            Operation::GetReal => "getReal",
            Operation::GetInteger => "getInteger",
            Operation::GetBoolean => "getBoolean",
            Operation::GetString => "getString",
            Operation::SetReal => "setReal",
            Operation::SetInteger => "setInteger",
            Operation::SetBoolean => "setBoolean",
            Operation::SetString => "setString",
            Operation::GetFmuState => "getFMUstate",
            Operation::SetFmuState => "setFMUstate",
            Operation::FreeFmuState => "freeFMUstate",
            Operation::SerializeFmuState => "serializeFMUstate",
            Operation::DeserializeFmuState => "deSerializeFMUstate",
            Operation::DoStep => "doStep",
            Operation::EnterEventMode => "enterEventMode",
            Operation::NewDiscreteStates => "newDiscreteStates",
            Operation::EnterContinuousTimeMode => "enterContinuousTimeMode",
            Operation::CompletedIntegratorStep => "completedIntegratorStep",
            Operation::SetTime => "setTime",
            Operation::SetContinuousStates => "setContinuousStates",
            Operation::GetContinuousStates => "getContinuousStates",
            Operation::GetDerivatives => "getDerivatives",
            Operation::GetEventIndicators => "getEventIndicators",
            Operation::GetNominalsOfContinuousStates => "getNominalsOfContinuousStates",
        }
    }

    /// Phases from which this operation may legally fire.
    pub fn legal_phases(self) -> &'static [Phase] {
        match self {
            Operation::SetDebugLogging | Operation::Reset | Operation::FreeFmuState => ALIVE,
            Operation::FreeInstance => ALIVE,
            Operation::SetupExperiment | Operation::EnterInitializationMode => &[Instantiated],
            Operation::ExitInitializationMode => &[InitializationMode],
            Operation::Terminate => &[StepComplete, StepFailed, EventMode, ContinuousTimeMode],
            Operation::GetReal
            | Operation::GetInteger
            | Operation::GetBoolean
            | Operation::GetString => READABLE,
            Operation::SetReal
            | Operation::SetInteger
            | Operation::SetBoolean
            | Operation::SetString => WRITABLE,
            Operation::GetFmuState
            | Operation::SetFmuState
            | Operation::SerializeFmuState
            | Operation::DeserializeFmuState => STATEFUL,
            Operation::DoStep => &[StepComplete],
            Operation::EnterEventMode | Operation::CompletedIntegratorStep => {
                &[ContinuousTimeMode]
            }
            Operation::SetContinuousStates => &[ContinuousTimeMode],
            Operation::NewDiscreteStates | Operation::EnterContinuousTimeMode => &[EventMode],
            Operation::SetTime => &[EventMode, ContinuousTimeMode],
            Operation::GetContinuousStates
            | Operation::GetDerivatives
            | Operation::GetEventIndicators
            | Operation::GetNominalsOfContinuousStates => ME_QUERY,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Phase tracker for one instance.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    kind: FmuKind,
    phase: Phase,
}

impl Lifecycle {
    pub fn new(kind: FmuKind) -> Self {
        Self {
            kind,
            phase: Instantiated,
        }
    }

    pub fn kind(&self) -> FmuKind {
        self.kind
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_freed(&self) -> bool {
        self.phase == Freed
    }

    /// Reject `op` unless the current phase allows it.
    pub fn check(&self, op: Operation) -> ModelResult<()> {
        if self.phase == Freed {
            return Err(ModelError::UseAfterFree {
                operation: op,
                what: "instance",
            });
        }
        if !op.legal_phases().contains(&self.phase) {
            return Err(ModelError::ProtocolViolation {
                operation: op,
                phase: self.phase,
            });
        }
        Ok(())
    }

    /// Advance after the model accepted `op`.
    pub fn complete(&mut self, op: Operation) {
        self.phase = match op {
            Operation::EnterInitializationMode => InitializationMode,
            Operation::ExitInitializationMode => match self.kind {
                FmuKind::CoSimulation => StepComplete,
                FmuKind::ModelExchange => EventMode,
            },
            Operation::DoStep => StepComplete,
            Operation::EnterEventMode => EventMode,
            Operation::EnterContinuousTimeMode => ContinuousTimeMode,
            Operation::Terminate => Terminated,
            Operation::Reset => Instantiated,
            Operation::FreeInstance => Freed,
            _ => self.phase,
        };
    }

    /// Record that the model rejected `op` with `status`.
    pub fn fault(&mut self, op: Operation, status: Status) {
        if status.poisons_instance() {
            self.phase = Error;
        } else if status == Status::Discard && op == Operation::DoStep {
            self.phase = StepFailed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn cosim_happy_path() {
        let mut lc = Lifecycle::new(FmuKind::CoSimulation);
        for op in [
            Operation::SetupExperiment,
            Operation::EnterInitializationMode,
            Operation::ExitInitializationMode,
            Operation::DoStep,
            Operation::DoStep,
            Operation::Terminate,
            Operation::FreeInstance,
        ] {
            lc.check(op).unwrap();
            lc.complete(op);
        }
        assert!(lc.is_freed());
    }

    #[test]
    fn model_exchange_cycles_modes() {
        let mut lc = Lifecycle::new(FmuKind::ModelExchange);
        lc.complete(Operation::EnterInitializationMode);
        lc.complete(Operation::ExitInitializationMode);
        assert_eq!(lc.phase(), EventMode);
        lc.check(Operation::NewDiscreteStates).unwrap();
        lc.check(Operation::EnterContinuousTimeMode).unwrap();
        lc.complete(Operation::EnterContinuousTimeMode);
        lc.check(Operation::SetContinuousStates).unwrap();
        lc.check(Operation::CompletedIntegratorStep).unwrap();
        assert!(lc.check(Operation::DoStep).is_err());
        lc.complete(Operation::EnterEventMode);
        assert_eq!(lc.phase(), EventMode);
    }

    #[test]
    fn enter_initialization_only_from_instantiated() {
        let mut lc = Lifecycle::new(FmuKind::CoSimulation);
        lc.complete(Operation::EnterInitializationMode);
        let err = lc.check(Operation::EnterInitializationMode).unwrap_err();
        assert!(matches!(
            err,
            ModelError::ProtocolViolation {
                operation: Operation::EnterInitializationMode,
                phase: InitializationMode,
            }
        ));
        lc.complete(Operation::ExitInitializationMode);
        assert!(lc.check(Operation::EnterInitializationMode).is_err());
    }

    #[test]
    fn values_are_gated_before_initialization() {
        let lc = Lifecycle::new(FmuKind::CoSimulation);
        for op in [Operation::GetReal, Operation::SetString, Operation::DoStep] {
            assert!(matches!(
                lc.check(op),
                Err(ModelError::ProtocolViolation { .. })
            ));
        }
    }

    #[test]
    fn freed_reports_use_after_free_for_everything() {
        let mut lc = Lifecycle::new(FmuKind::CoSimulation);
        lc.complete(Operation::FreeInstance);
        for op in [
            Operation::FreeInstance,
            Operation::GetReal,
            Operation::SetupExperiment,
            Operation::Reset,
        ] {
            assert!(matches!(lc.check(op), Err(ModelError::UseAfterFree { .. })));
        }
    }

    #[test]
    fn faults_move_to_error_or_step_failed() {
        let mut lc = Lifecycle::new(FmuKind::CoSimulation);
        lc.complete(Operation::EnterInitializationMode);
        lc.complete(Operation::ExitInitializationMode);

        lc.fault(Operation::DoStep, Status::Discard);
        assert_eq!(lc.phase(), StepFailed);
        assert!(lc.check(Operation::DoStep).is_err());
        lc.check(Operation::GetReal).unwrap();
        lc.check(Operation::Terminate).unwrap();

        lc.fault(Operation::GetReal, Status::Fatal);
        assert_eq!(lc.phase(), Error);
        assert!(lc.check(Operation::Terminate).is_err());
        lc.check(Operation::Reset).unwrap();
        lc.complete(Operation::Reset);
        assert_eq!(lc.phase(), Instantiated);
    }

    #[test]
    fn error_phase_allows_cleanup_and_reads_only() {
        let mut lc = Lifecycle::new(FmuKind::ModelExchange);
        lc.complete(Operation::EnterInitializationMode);
        lc.fault(Operation::ExitInitializationMode, Status::Error);
        assert_eq!(lc.phase(), Error);
        for op in [
            Operation::GetReal,
            Operation::GetString,
            Operation::GetContinuousStates,
            Operation::SetDebugLogging,
            Operation::FreeFmuState,
            Operation::Reset,
            Operation::FreeInstance,
        ] {
            lc.check(op).unwrap();
        }
        for op in [
            Operation::SetReal,
            Operation::GetFmuState,
            Operation::SetFmuState,
            Operation::SerializeFmuState,
            Operation::Terminate,
            Operation::SetTime,
        ] {
            assert!(matches!(
                lc.check(op),
                Err(ModelError::ProtocolViolation { phase: Error, .. })
            ));
        }
    }

    const ALL: [Operation; 31] = [
        Operation::SetDebugLogging,
        Operation::SetupExperiment,
        Operation::EnterInitializationMode,
        Operation::ExitInitializationMode,
        Operation::Terminate,
        Operation::Reset,
        Operation::FreeInstance,
        Operation::GetReal,
        Operation::GetInteger,
        Operation::GetBoolean,
        Operation::GetString,
        Operation::SetReal,
        Operation::SetInteger,
        Operation::SetBoolean,
        Operation::SetString,
        Operation::GetFmuState,
        Operation::SetFmuState,
        Operation::FreeFmuState,
        Operation::SerializeFmuState,
        Operation::DeserializeFmuState,
        Operation::DoStep,
        Operation::EnterEventMode,
        Operation::NewDiscreteStates,
        Operation::EnterContinuousTimeMode,
        Operation::CompletedIntegratorStep,
        Operation::SetTime,
        Operation::SetContinuousStates,
        Operation::GetContinuousStates,
        Operation::GetDerivatives,
        Operation::GetEventIndicators,
        Operation::GetNominalsOfContinuousStates,
    ];

    #[test]
    fn every_operation_is_legal_somewhere() {
        for op in ALL {
            assert!(!op.legal_phases().is_empty(), "{op}");
            assert!(!op.legal_phases().contains(&Freed), "{op}");
        }
    }

    proptest! {
        #[test]
        fn random_call_sequences_follow_the_table(
            co_simulation in any::<bool>(),
            ops in prop::collection::vec(prop::sample::select(ALL.to_vec()), 0..60),
        ) {
            let kind = if co_simulation {
                FmuKind::CoSimulation
            } else {
                FmuKind::ModelExchange
            };
            let mut lc = Lifecycle::new(kind);
            for op in ops {
                let before = lc.phase();
                match lc.check(op) {
                    Ok(()) => {
                        prop_assert!(op.legal_phases().contains(&before));
                        if op == Operation::EnterInitializationMode {
                            prop_assert_eq!(before, Instantiated);
                        }
                        lc.complete(op);
                        prop_assert_eq!(lc.phase() == Freed, op == Operation::FreeInstance);
                    }
                    Err(ModelError::UseAfterFree { operation, .. }) => {
                        prop_assert_eq!(before, Freed);
                        prop_assert_eq!(operation, op);
                    }
                    Err(ModelError::ProtocolViolation { operation, phase }) => {
                        prop_assert_eq!(operation, op);
                        prop_assert_eq!(phase, before);
                        prop_assert!(!op.legal_phases().contains(&before));
                    }
                    Err(other) => prop_assert!(false, "unexpected error {}", other),
                }
                prop_assert_eq!(lc.kind(), kind);
            }
        }
    }
}
