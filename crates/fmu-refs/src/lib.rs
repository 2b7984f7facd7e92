//! Reference models implemented in Rust against the model call surface.
//!
//! Includes:
//! - BouncingBall (state events, ME + CS)
//! - Dahlquist (linear decay, ME + CS)
//! - Stair (time events, early return in CS)
//! - Feedthrough (every variable type)
//!
//! [`reference_registry`] registers all of them by GUID.

pub mod bouncing_ball;
pub mod dahlquist;
pub mod feedthrough;
pub mod stair;

mod support;

use fmu_core::ModelDescription;
use fmu_instance::{ModelRegistry, ModelResult};

pub use bouncing_ball::BouncingBall;
pub use dahlquist::Dahlquist;
pub use feedthrough::Feedthrough;
pub use stair::Stair;

/// Descriptions of every reference model.
pub fn reference_descriptions() -> Vec<ModelDescription> {
    vec![
        bouncing_ball::description(),
        dahlquist::description(),
        stair::description(),
        feedthrough::description(),
    ]
}

/// Registry containing every reference model.
pub fn reference_registry() -> ModelResult<ModelRegistry> {
    let mut registry = ModelRegistry::new();
    registry.register(bouncing_ball::GUID, bouncing_ball::factory)?;
    registry.register(dahlquist::GUID, dahlquist::factory)?;
    registry.register(stair::GUID, stair::factory)?;
    registry.register(feedthrough::GUID, feedthrough::factory)?;
    Ok(registry)
}
