//! Typed variable values.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Base type of a model variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    Real,
    Integer,
    Boolean,
    String,
    Enumeration,
}

impl VariableType {
    /// Enumerations are accessed through the integer call family.
    pub fn storage(self) -> VariableType {
        match self {
            VariableType::Enumeration => VariableType::Integer,
            other => other,
        }
    }

    /// Real variables are interpolated; everything else is held.
    pub fn is_continuous_valued(self) -> bool {
        matches!(self, VariableType::Real)
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VariableType::Real => "Real",
            VariableType::Integer => "Integer",
            VariableType::Boolean => "Boolean",
            VariableType::String => "String",
            VariableType::Enumeration => "Enumeration",
        };
        f.write_str(s)
    }
}

/// A single variable value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i32),
    Real(f64),
    String(String),
}

impl Value {
    /// Storage type of this value (enumerations report `Integer`).
    pub fn storage_type(&self) -> VariableType {
        match self {
            Value::Real(_) => VariableType::Real,
            Value::Integer(_) => VariableType::Integer,
            Value::Boolean(_) => VariableType::Boolean,
            Value::String(_) => VariableType::String,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// True if this value can be stored in a variable of type `ty`.
    pub fn fits(&self, ty: VariableType) -> bool {
        self.storage_type() == ty.storage()
    }

    /// Convert to the storage type of `ty`, widening integers to reals.
    ///
    /// Loosely typed config files write `1` where a Real is meant.
    pub fn coerce(self, ty: VariableType) -> Option<Value> {
        match (self, ty.storage()) {
            (Value::Integer(v), VariableType::Real) => Some(Value::Real(f64::from(v))),
            (value, _) if value.fits(ty) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Real(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
        }
    }
}
