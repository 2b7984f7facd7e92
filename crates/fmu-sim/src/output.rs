//! Recorded simulation output.

use crate::error::{SimError, SimResult};
use fmu_core::{ModelDescription, ModelVariable, Value};
use fmu_instance::ModelHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One recorded row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub time: f64,
    pub values: BTreeMap<String, Value>,
    /// Extra row taken around an event rather than at a recording boundary.
    #[serde(default)]
    pub event: bool,
}

/// Time-ordered rows, one per recording boundary plus any event rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputBuffer {
    pub variables: Vec<String>,
    pub rows: Vec<Record>,
}

impl OutputBuffer {
    pub fn new(variables: Vec<String>) -> Self {
        Self {
            variables,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Record) {
        self.rows.push(record);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.rows.last().map(|r| r.time)
    }

    pub fn times(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.time).collect()
    }

    /// Rows recorded at boundaries, without event rows.
    pub fn samples(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter().filter(|r| !r.event)
    }

    pub fn events(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter().filter(|r| r.event)
    }

    /// Real values of `name`, one per row. Non-real values are skipped.
    pub fn real_column(&self, name: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|r| r.values.get(name).and_then(Value::as_real))
            .collect()
    }

    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Reads the recorded variables from a handle.
#[derive(Clone, Debug)]
pub(crate) struct Recorder {
    variables: Vec<ModelVariable>,
}

impl Recorder {
    /// Resolve `names`; an empty list records every output.
    pub(crate) fn new(md: &ModelDescription, names: &[String]) -> SimResult<Self> {
        let variables = if names.is_empty() {
            md.outputs().cloned().collect()
        } else {
            names
                .iter()
                .map(|name| {
                    md.variable(name)
                        .cloned()
                        .ok_or_else(|| SimError::UnknownVariable { name: name.clone() })
                })
                .collect::<SimResult<Vec<_>>>()?
        };
        Ok(Self { variables })
    }

    pub(crate) fn buffer(&self) -> OutputBuffer {
        OutputBuffer::new(self.variables.iter().map(|v| v.name.clone()).collect())
    }

    pub(crate) fn sample(&self, handle: &mut ModelHandle, time: f64, event: bool) -> SimResult<Record> {
        let mut values = BTreeMap::new();
        for var in &self.variables {
            values.insert(var.name.clone(), handle.get_value(var)?);
        }
        Ok(Record {
            time,
            values,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(time: f64, h: f64, event: bool) -> Record {
        Record {
            time,
            values: BTreeMap::from([("h".to_string(), Value::Real(h))]),
            event,
        }
    }

    #[test]
    fn columns_and_event_filters() {
        let mut out = OutputBuffer::new(vec!["h".to_string()]);
        out.push(row(0.0, 1.0, false));
        out.push(row(0.4, 0.0, true));
        out.push(row(0.5, 0.2, false));
        assert_eq!(out.len(), 3);
        assert_eq!(out.real_column("h"), vec![1.0, 0.0, 0.2]);
        assert_eq!(out.samples().count(), 2);
        assert_eq!(out.events().count(), 1);
        assert_eq!(out.last_time(), Some(0.5));
    }

    #[test]
    fn buffer_serializes_to_json() {
        let mut out = OutputBuffer::new(vec!["h".to_string()]);
        out.push(row(0.0, 1.0, false));
        let json = out.to_json().unwrap();
        let back: OutputBuffer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, out);
    }
}
