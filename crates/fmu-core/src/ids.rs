use core::fmt;
use serde::{Deserialize, Serialize};

/// Handle of a variable slot inside a model instance.
///
/// Value references are only unique per variable type: a Real and an
/// Integer may share the same number.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueReference(u32);

impl ValueReference {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for ValueReference {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for ValueReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vr({})", self.0)
    }
}

impl fmt::Display for ValueReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_plain_number() {
        let vr = ValueReference::new(7);
        assert_eq!(serde_json::to_string(&vr).unwrap(), "7");
        let back: ValueReference = serde_json::from_str("7").unwrap();
        assert_eq!(back, vr);
    }

    #[test]
    fn zero_is_a_valid_reference() {
        assert_eq!(ValueReference::new(0).get(), 0);
    }
}
