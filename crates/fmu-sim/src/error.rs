//! Error types for simulation runs.

use crate::output::OutputBuffer;
use fmu_instance::ModelError;
use thiserror::Error;

/// Errors encountered while driving a simulation.
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Simulation failed at t = {time} during {operation}: {source}")]
    SimulationFailed {
        time: f64,
        operation: &'static str,
        #[source]
        source: Box<SimError>,
    },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Unknown solver: {name}")]
    UnknownSolver { name: String },

    #[error("Event iteration did not settle after {passes} passes")]
    EventIterationLimit { passes: usize },

    #[error("Step limit of {max_steps} reached")]
    StepLimit { max_steps: usize },

    #[error("Step from t = {time} made no progress")]
    Stalled { time: f64 },

    #[error("Simulation cancelled at t = {time}")]
    Cancelled { time: f64 },

    #[error("Unknown variable: {name}")]
    UnknownVariable { name: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    /// Wrap an error raised while performing `operation` at `time`.
    pub fn failed_at(time: f64, operation: &'static str, source: impl Into<SimError>) -> Self {
        SimError::SimulationFailed {
            time,
            operation,
            source: Box::new(source.into()),
        }
    }
}

/// A run that stopped early, with the rows recorded before it did.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: SimError,
    pub partial: OutputBuffer,
}

impl RunFailure {
    pub fn new(error: SimError, partial: OutputBuffer) -> Self {
        Self { error, partial }
    }
}

pub type RunResult<T> = Result<T, RunFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_names_time_and_operation() {
        let err = SimError::failed_at(0.25, "doStep", SimError::InvalidArg { what: "h" });
        let msg = err.to_string();
        assert!(msg.contains("0.25"));
        assert!(msg.contains("doStep"));
    }

    #[test]
    fn limits_report_their_bound() {
        let err = SimError::failed_at(
            1.5,
            "newDiscreteStates",
            SimError::EventIterationLimit { passes: 100 },
        );
        assert!(err.to_string().contains("100 passes"));
        let err = SimError::StepLimit { max_steps: 7 };
        assert_eq!(err.to_string(), "Step limit of 7 reached");
    }
}
