//! Simulation loops that drive a model handle over a time horizon.
//!
//! Provides:
//! - Co-simulation loop with record boundaries and early-return handling
//! - Model-exchange loop with Euler, RK4 and Dormand-Prince integrators
//! - State-event location (Hermite interpolation + bisection)
//! - Time-indexed input tables and a recorded output buffer
//! - Run configuration from YAML or JSON
//! - Cooperative cancellation and parallel batch runs

pub mod batch;
pub mod cancel;
pub mod config;
pub mod cosim;
pub mod error;
pub mod events;
pub mod inputs;
pub mod integrator;
pub mod me;
pub mod options;
pub mod output;

pub use batch::{BatchJob, BatchOutcome, HandleFactory, run_batch};
pub use cancel::CancelToken;
pub use config::{ResolvedRun, RunConfig};
pub use cosim::simulate_co_simulation;
pub use error::{RunFailure, RunResult, SimError, SimResult};
pub use inputs::{InputSeries, InputTable};
pub use integrator::{Dopri45, ForwardEuler, Integrator, IntegratorType, OdeSystem, RK4};
pub use me::simulate_model_exchange;
pub use options::{CoSimOptions, MeOptions};
pub use output::{OutputBuffer, Record};
