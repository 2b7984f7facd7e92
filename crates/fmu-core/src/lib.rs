//! fmu-core: shared foundation for the FMU driver.
//!
//! Contains:
//! - numeric (finiteness and time comparison helpers)
//! - ids (value references)
//! - value (typed variable values)
//! - description (read-only model description data model)
//! - validate (structural checks on a parsed description)
//! - error (shared error types)

pub mod description;
pub mod error;
pub mod ids;
pub mod numeric;
pub mod validate;
pub mod value;

// Re-exports: nice ergonomics for downstream crates
pub use description::*;
pub use error::{CoreError, CoreResult};
pub use ids::ValueReference;
pub use numeric::*;
pub use validate::{ValidationError, validate_description};
pub use value::{Value, VariableType};
