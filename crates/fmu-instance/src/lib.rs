//! Model instance layer: the native call surface and everything that guards it.
//!
//! Provides:
//! - `FmuInstance`, the call surface a loaded model implements
//! - Call-sequence state machine (`Lifecycle`) gating every call
//! - `ModelHandle`, the owned, single-threaded handle to one live instance
//! - State snapshots with ownership tracking and checked serialization
//! - Model registry keyed by GUID, plus on-demand archive unpacking
//! - Per-instance log categories routed into `tracing`

pub mod capability;
pub mod error;
pub mod handle;
pub mod instance;
pub mod lifecycle;
pub mod loader;
pub mod logging;
pub mod snapshot;
pub mod source;
pub mod status;

pub use capability::Capability;
pub use error::{ModelError, ModelResult};
pub use handle::{Experiment, InstanceId, ModelHandle};
pub use instance::{FmuInstance, FmuState};
pub use lifecycle::{Lifecycle, Operation, Phase};
pub use loader::{InstantiateContext, ModelFactory, ModelRegistry};
pub use logging::{InstanceLogger, LogCategory};
pub use snapshot::{SerializedState, SnapshotGuard, StateSnapshot};
pub use source::{ArchiveExtractor, FmuSource, UnpackedFmu};
pub use status::{EventInfo, FmiFault, FmiResult, IntegratorStepInfo, Status, StepOutcome};
