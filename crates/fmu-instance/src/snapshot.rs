//! State snapshots.
//!
//! A [`StateSnapshot`] is a token: the opaque state itself stays in the
//! table of the handle that captured it. Tokens are not `Clone`, so each
//! capture has exactly one owner, and a token can be checked against the
//! handle it is presented to.

use crate::error::{ModelError, ModelResult};
use crate::handle::{InstanceId, ModelHandle};
use crate::instance::FmuState;
use crate::lifecycle::{Operation, Phase};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Token for one captured model state.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct StateSnapshot {
    owner: InstanceId,
    id: u64,
}

impl StateSnapshot {
    /// Instance that captured this state.
    pub fn owner(&self) -> InstanceId {
        self.owner
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Live states of one handle.
#[derive(Debug)]
pub(crate) struct SnapshotTable {
    owner: InstanceId,
    next_id: u64,
    live: HashMap<u64, FmuState>,
}

impl SnapshotTable {
    pub(crate) fn new(owner: InstanceId) -> Self {
        Self {
            owner,
            next_id: 0,
            live: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, state: FmuState) -> StateSnapshot {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, state);
        StateSnapshot {
            owner: self.owner,
            id,
        }
    }

    fn check(&self, op: Operation, snapshot: &StateSnapshot) -> ModelResult<()> {
        if snapshot.owner != self.owner {
            return Err(ModelError::SnapshotMismatch {
                owner: snapshot.owner,
                instance: self.owner,
            });
        }
        if !self.live.contains_key(&snapshot.id) {
            return Err(ModelError::UseAfterFree {
                operation: op,
                what: "snapshot",
            });
        }
        Ok(())
    }

    pub(crate) fn get(&self, op: Operation, snapshot: &StateSnapshot) -> ModelResult<&FmuState> {
        self.check(op, snapshot)?;
        self.live
            .get(&snapshot.id)
            .ok_or(ModelError::UseAfterFree {
                operation: op,
                what: "snapshot",
            })
    }

    pub(crate) fn remove(
        &mut self,
        op: Operation,
        snapshot: &StateSnapshot,
    ) -> ModelResult<FmuState> {
        self.check(op, snapshot)?;
        self.live
            .remove(&snapshot.id)
            .ok_or(ModelError::UseAfterFree {
                operation: op,
                what: "snapshot",
            })
    }

    pub(crate) fn drain(&mut self) -> Vec<FmuState> {
        self.live.drain().map(|(_, state)| state).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }
}

/// Serialized model state with enough metadata to refuse foreign input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedState {
    pub model_guid: String,
    pub fmi_version: String,
    /// Hex SHA-256 of `payload`.
    pub digest: String,
    pub payload: Vec<u8>,
}

fn digest(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

impl SerializedState {
    pub(crate) fn seal(model_guid: &str, fmi_version: &str, payload: Vec<u8>) -> Self {
        Self {
            model_guid: model_guid.to_string(),
            fmi_version: fmi_version.to_string(),
            digest: digest(&payload),
            payload,
        }
    }

    /// Payload, if this state was produced by the given model and is intact.
    pub(crate) fn open(&self, model_guid: &str, fmi_version: &str) -> ModelResult<&[u8]> {
        if self.model_guid != model_guid || self.fmi_version != fmi_version {
            return Err(ModelError::IncompatibleState {
                expected: format!("{model_guid} (FMI {fmi_version})"),
                found: format!("{} (FMI {})", self.model_guid, self.fmi_version),
            });
        }
        if digest(&self.payload) != self.digest {
            return Err(ModelError::CorruptState);
        }
        Ok(&self.payload)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn to_bytes(&self) -> ModelResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse bytes written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> ModelResult<Self> {
        serde_json::from_slice(bytes).map_err(|_| ModelError::CorruptState)
    }
}

/// Scoped snapshot: frees the captured state when dropped.
pub struct SnapshotGuard<'a> {
    handle: &'a mut ModelHandle,
    snapshot: Option<StateSnapshot>,
}

impl<'a> SnapshotGuard<'a> {
    pub(crate) fn new(handle: &'a mut ModelHandle, snapshot: StateSnapshot) -> Self {
        Self {
            handle,
            snapshot: Some(snapshot),
        }
    }

    fn token(&self) -> ModelResult<&StateSnapshot> {
        self.snapshot.as_ref().ok_or(ModelError::UseAfterFree {
            operation: Operation::SetFmuState,
            what: "snapshot",
        })
    }

    /// Roll the model back to the captured state.
    pub fn restore(&mut self) -> ModelResult<()> {
        let snapshot = self.snapshot.as_ref().ok_or(ModelError::UseAfterFree {
            operation: Operation::SetFmuState,
            what: "snapshot",
        })?;
        self.handle.set_fmu_state(snapshot)
    }

    pub fn serialize(&mut self) -> ModelResult<SerializedState> {
        let snapshot = self.snapshot.as_ref().ok_or(ModelError::UseAfterFree {
            operation: Operation::SerializeFmuState,
            what: "snapshot",
        })?;
        self.handle.serialize_fmu_state(snapshot)
    }

    pub fn snapshot(&self) -> ModelResult<&StateSnapshot> {
        self.token()
    }

    /// The guarded handle, for driving the model between capture and restore.
    pub fn handle(&mut self) -> &mut ModelHandle {
        self.handle
    }

    /// Free the snapshot now and report any failure.
    pub fn release(mut self) -> ModelResult<()> {
        match self.snapshot.take() {
            Some(snapshot) => self.handle.free_fmu_state(&snapshot),
            None => Ok(()),
        }
    }
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };
        if self.handle.phase() == Phase::Freed {
            return;
        }
        if let Err(e) = self.handle.free_fmu_state(&snapshot) {
            tracing::warn!("Failed to release snapshot {}: {}", snapshot.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_tracks_ownership_and_liveness() {
        let a = InstanceId::new();
        let b = InstanceId::new();
        let mut table = SnapshotTable::new(a);
        let other = SnapshotTable::new(b);

        let s0 = table.insert(FmuState::new(1_u8));
        let s1 = table.insert(FmuState::new(2_u8));
        assert_ne!(s0.id(), s1.id());
        assert_eq!(table.len(), 2);

        assert!(matches!(
            other.get(Operation::SetFmuState, &s0),
            Err(ModelError::SnapshotMismatch { .. })
        ));

        table.remove(Operation::FreeFmuState, &s0).unwrap();
        assert!(matches!(
            table.get(Operation::SetFmuState, &s0),
            Err(ModelError::UseAfterFree { .. })
        ));
        assert!(matches!(
            table.remove(Operation::FreeFmuState, &s0),
            Err(ModelError::UseAfterFree { .. })
        ));

        let state = table.get(Operation::SetFmuState, &s1).unwrap();
        assert_eq!(state.downcast_ref::<u8>(), Some(&2));
        assert_eq!(table.drain().len(), 1);
    }

    #[test]
    fn sealed_state_checks_origin_and_digest() {
        let sealed = SerializedState::seal("{guid}", "2.0", vec![1, 2, 3]);
        assert_eq!(sealed.digest.len(), 64);
        assert_eq!(sealed.open("{guid}", "2.0").unwrap(), &[1, 2, 3]);

        assert!(matches!(
            sealed.open("{other}", "2.0"),
            Err(ModelError::IncompatibleState { .. })
        ));

        let mut tampered = sealed.clone();
        tampered.payload[0] = 9;
        assert!(matches!(
            tampered.open("{guid}", "2.0"),
            Err(ModelError::CorruptState)
        ));
    }

    #[test]
    fn byte_form_survives_and_rejects_garbage() {
        let sealed = SerializedState::seal("{guid}", "2.0", vec![7; 16]);
        let bytes = sealed.to_bytes().unwrap();
        assert_eq!(SerializedState::from_bytes(&bytes).unwrap(), sealed);
        assert!(matches!(
            SerializedState::from_bytes(b"not a state"),
            Err(ModelError::CorruptState)
        ));
    }
}
