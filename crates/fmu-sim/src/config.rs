//! Run configuration loaded from YAML or JSON.

use crate::error::{SimError, SimResult};
use crate::inputs::InputTable;
use crate::integrator::IntegratorType;
use crate::options::{CoSimOptions, MeOptions};
use fmu_core::ModelDescription;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_TOLERANCE: f64 = 1e-4;
const DEFAULT_STEPS: f64 = 500.0;

/// Settings for one run. Anything left out comes from the model's
/// default experiment or a driver default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub start: Option<f64>,
    pub stop: Option<f64>,
    pub tolerance: Option<f64>,
    pub step_size: Option<f64>,
    pub output_interval: Option<f64>,
    pub solver: Option<String>,
    pub record: Option<Vec<String>>,
    pub record_events: bool,
    pub interpolate_outputs: Option<bool>,
    pub max_steps: Option<usize>,
    pub inputs: InputTable,
}

/// Fully resolved settings shared by both loops.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedRun {
    pub start: f64,
    pub stop: f64,
    pub tolerance: f64,
    pub step_size: f64,
    pub output_interval: f64,
    pub solver: IntegratorType,
    pub record: Vec<String>,
}

impl RunConfig {
    pub fn load_yaml(path: &Path) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn load_json(path: &Path) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> SimResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn save_yaml(&self, path: &Path) -> SimResult<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Fill in missing settings from `md`.
    pub fn resolve(&self, md: &ModelDescription) -> SimResult<ResolvedRun> {
        let de = md.experiment();
        let start = self.start.or(de.start_time).unwrap_or(0.0);
        let stop = match self.stop {
            Some(stop) => stop,
            None => de.stop_time.filter(|s| *s >= start).unwrap_or(start + 1.0),
        };
        if stop < start {
            return Err(SimError::Config {
                message: format!("stop time {stop} precedes start time {start}"),
            });
        }
        let tolerance = self.tolerance.or(de.tolerance).unwrap_or(DEFAULT_TOLERANCE);
        let step_size = match self.step_size.or(de.step_size) {
            Some(h) => h,
            None if stop > start => (stop - start) / DEFAULT_STEPS,
            None => 1.0 / DEFAULT_STEPS,
        };
        let output_interval = self.output_interval.unwrap_or(step_size);
        let solver = match &self.solver {
            Some(name) => name.parse()?,
            None => IntegratorType::default(),
        };
        let record = match &self.record {
            Some(names) => names.clone(),
            None => md.outputs().map(|v| v.name.clone()).collect(),
        };
        for name in &record {
            if md.variable(name).is_none() {
                return Err(SimError::UnknownVariable { name: name.clone() });
            }
        }
        self.inputs.bind(md)?;
        Ok(ResolvedRun {
            start,
            stop,
            tolerance,
            step_size,
            output_interval,
            solver,
            record,
        })
    }

    pub fn co_sim_options(&self, md: &ModelDescription) -> SimResult<CoSimOptions> {
        let r = self.resolve(md)?;
        let defaults = CoSimOptions::default();
        let opts = CoSimOptions {
            start: r.start,
            stop: r.stop,
            tolerance: r.tolerance,
            step_size: r.step_size,
            output_interval: r.output_interval,
            record: r.record,
            inputs: self.inputs.clone(),
            record_events: self.record_events,
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
            cancel: defaults.cancel,
        };
        opts.validate()?;
        Ok(opts)
    }

    pub fn me_options(&self, md: &ModelDescription) -> SimResult<MeOptions> {
        let r = self.resolve(md)?;
        let defaults = MeOptions::default();
        let opts = MeOptions {
            start: r.start,
            stop: r.stop,
            tolerance: r.tolerance,
            step_size: r.step_size,
            output_interval: r.output_interval,
            solver: r.solver,
            record: r.record,
            inputs: self.inputs.clone(),
            record_events: self.record_events,
            interpolate_outputs: self
                .interpolate_outputs
                .unwrap_or(defaults.interpolate_outputs),
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
            cancel: defaults.cancel,
        };
        opts.validate()?;
        Ok(opts)
    }
}
