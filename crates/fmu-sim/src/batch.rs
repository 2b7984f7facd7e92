//! Independent co-simulation runs on the rayon pool.

use crate::cosim::simulate_co_simulation;
use crate::error::{RunFailure, RunResult};
use crate::options::CoSimOptions;
use crate::output::OutputBuffer;
use fmu_instance::{ModelHandle, ModelResult};
use rayon::prelude::*;

/// Creates the handle a job runs on. Called on the worker thread.
pub type HandleFactory = Box<dyn Fn() -> ModelResult<ModelHandle> + Send + Sync>;

/// One scenario: its own handle and its own options.
pub struct BatchJob {
    pub name: String,
    pub make_handle: HandleFactory,
    pub options: CoSimOptions,
}

impl BatchJob {
    pub fn new(
        name: impl Into<String>,
        make_handle: impl Fn() -> ModelResult<ModelHandle> + Send + Sync + 'static,
        options: CoSimOptions,
    ) -> Self {
        Self {
            name: name.into(),
            make_handle: Box::new(make_handle),
            options,
        }
    }
}

/// Result of one job, in submission order.
#[derive(Debug)]
pub struct BatchOutcome {
    pub name: String,
    pub result: RunResult<OutputBuffer>,
}

/// Run every job in parallel. Each job builds, drives and frees its own handle.
pub fn run_batch(jobs: Vec<BatchJob>) -> Vec<BatchOutcome> {
    tracing::debug!("running batch of {} jobs", jobs.len());
    jobs.into_par_iter()
        .map(|job| {
            let result = run_job(&job);
            BatchOutcome {
                name: job.name,
                result,
            }
        })
        .collect()
}

fn run_job(job: &BatchJob) -> RunResult<OutputBuffer> {
    let mut handle = (job.make_handle)()
        .map_err(|e| RunFailure::new(e.into(), OutputBuffer::default()))?;
    let result = simulate_co_simulation(&mut handle, &job.options);
    if let Err(e) = handle.free_instance() {
        tracing::warn!(job = job.name.as_str(), "freeing instance failed: {}", e);
    }
    result
}
