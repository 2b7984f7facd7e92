//! Error types for model instance operations.

use crate::capability::Capability;
use crate::handle::InstanceId;
use crate::lifecycle::{Operation, Phase};
use crate::status::Status;
use fmu_core::{CoreError, ValueReference};
use thiserror::Error;

/// Errors surfaced by a [`ModelHandle`](crate::ModelHandle).
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Illegal call sequence: {operation} is not allowed in phase {phase}")]
    ProtocolViolation { operation: Operation, phase: Phase },

    #[error("Unsupported capability: {capability}")]
    UnsupportedCapability { capability: Capability },

    #[error("Setting value reference {reference} failed: {reason}")]
    SetValueFailed {
        reference: ValueReference,
        reason: String,
    },

    #[error("Getting value reference {reference} failed: {reason}")]
    GetValueFailed {
        reference: ValueReference,
        reason: String,
    },

    #[error("{operation} called on a freed {what}")]
    UseAfterFree {
        operation: Operation,
        what: &'static str,
    },

    #[error("Invalid argument: {what}")]
    InvalidArgument { what: String },

    #[error("Snapshot belongs to instance {owner}, not {instance}")]
    SnapshotMismatch {
        owner: InstanceId,
        instance: InstanceId,
    },

    #[error("Serialized state is for {found}, expected {expected}")]
    IncompatibleState { expected: String, found: String },

    #[error("Serialized state failed its integrity check")]
    CorruptState,

    #[error("Instantiation failed: {reason}")]
    InstantiationFailed { reason: String },

    #[error("{operation} returned {status}: {message}")]
    CallFailed {
        operation: Operation,
        status: Status,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type ModelResult<T> = Result<T, ModelError>;
