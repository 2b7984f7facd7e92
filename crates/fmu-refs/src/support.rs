//! Helpers shared by the reference models.

use fmu_core::ValueReference;
use fmu_instance::{FmiFault, FmiResult, FmuState};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub(crate) fn unknown_reference(vr: ValueReference) -> FmiFault {
    FmiFault::error(format!("unknown value reference {vr}")).with_reference(vr)
}

pub(crate) fn read_only(vr: ValueReference, name: &str) -> FmiFault {
    FmiFault::error(format!("variable {name} cannot be set")).with_reference(vr)
}

/// Copy a model's state struct out of an opaque snapshot.
pub(crate) fn restore<T: Clone + 'static>(state: &FmuState) -> FmiResult<T> {
    state
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| FmiFault::error("snapshot was taken from a different model"))
}

pub(crate) fn encode<T: Serialize + 'static>(state: &FmuState) -> FmiResult<Vec<u8>> {
    let state = state
        .downcast_ref::<T>()
        .ok_or_else(|| FmiFault::error("snapshot was taken from a different model"))?;
    serde_json::to_vec(state).map_err(|e| FmiFault::error(format!("encoding state: {e}")))
}

pub(crate) fn decode<T: DeserializeOwned + Send + 'static>(bytes: &[u8]) -> FmiResult<FmuState> {
    let state: T = serde_json::from_slice(bytes)
        .map_err(|e| FmiFault::error(format!("decoding state: {e}")))?;
    Ok(FmuState::new(state))
}

/// Number of equal sub-steps no longer than `max_step` that cover `span`.
pub(crate) fn substeps(span: f64, max_step: f64) -> usize {
    if span <= 0.0 {
        return 0;
    }
    ((span / max_step) - 1e-9).ceil().max(1.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substeps_cover_span_exactly() {
        assert_eq!(substeps(0.01, 1e-3), 10);
        assert_eq!(substeps(0.0105, 1e-3), 11);
        assert_eq!(substeps(1e-4, 1e-3), 1);
        assert_eq!(substeps(0.0, 1e-3), 0);
    }

    #[test]
    fn foreign_snapshots_are_refused() {
        let state = FmuState::new(1.5_f64);
        assert_eq!(restore::<f64>(&state).unwrap(), 1.5);
        assert!(restore::<u8>(&state).is_err());
        let bytes = encode::<f64>(&state).unwrap();
        let back = decode::<f64>(&bytes).unwrap();
        assert_eq!(back.downcast_ref::<f64>(), Some(&1.5));
        assert!(decode::<f64>(b"{").is_err());
    }
}
