//! Time-indexed external inputs.

use crate::error::{SimError, SimResult};
use fmu_core::{ModelDescription, Value, VariableType};
use fmu_instance::ModelHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Samples of one input variable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSeries {
    pub times: Vec<f64>,
    pub values: Vec<Value>,
}

impl InputSeries {
    pub fn new(times: Vec<f64>, values: Vec<Value>) -> SimResult<Self> {
        let series = Self { times, values };
        series.validate()?;
        Ok(series)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.times.is_empty() {
            return Err(SimError::InvalidArg {
                what: "input series must have at least one sample",
            });
        }
        if self.times.len() != self.values.len() {
            return Err(SimError::InvalidArg {
                what: "input series times and values differ in length",
            });
        }
        if self.times.iter().any(|t| !t.is_finite()) {
            return Err(SimError::InvalidArg {
                what: "input series times must be finite",
            });
        }
        if self.times.windows(2).any(|w| w[1] < w[0]) {
            return Err(SimError::InvalidArg {
                what: "input series times must be non-decreasing",
            });
        }
        Ok(())
    }

    /// Value at `t`.
    ///
    /// Real samples interpolate linearly when `interpolate` is set; all other
    /// values hold the last sample. Times outside the series clamp to its
    /// ends, and at repeated times the later sample applies.
    pub fn sample(&self, t: f64, interpolate: bool) -> Option<Value> {
        let first = self.values.first()?;
        let idx = self.times.partition_point(|&ti| ti <= t);
        if idx == 0 {
            return Some(first.clone());
        }
        let i = idx - 1;
        let held = &self.values[i];
        if !interpolate || idx == self.times.len() {
            return Some(held.clone());
        }
        match (held, &self.values[idx]) {
            (Value::Real(a), Value::Real(b)) => {
                let (t0, t1) = (self.times[i], self.times[idx]);
                let w = (t - t0) / (t1 - t0);
                Some(Value::Real(a + w * (b - a)))
            }
            _ => Some(held.clone()),
        }
    }
}

/// Inputs keyed by variable name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputTable {
    series: BTreeMap<String, InputSeries>,
}

impl InputTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, series: InputSeries) -> SimResult<()> {
        series.validate()?;
        self.series.insert(name.into(), series);
        Ok(())
    }

    pub fn with(mut self, name: impl Into<String>, series: InputSeries) -> SimResult<Self> {
        self.insert(name, series)?;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&InputSeries> {
        self.series.get(name)
    }

    /// Check every series against the description it will drive and coerce
    /// its samples to the variable types.
    pub fn bind(&self, md: &ModelDescription) -> SimResult<InputTable> {
        let mut bound = InputTable::new();
        for (name, series) in &self.series {
            series.validate()?;
            let var = md.variable(name).ok_or_else(|| SimError::UnknownVariable {
                name: name.clone(),
            })?;
            let mut values = Vec::with_capacity(series.values.len());
            for v in &series.values {
                let found = v.storage_type();
                let coerced = v.clone().coerce(var.var_type).ok_or_else(|| SimError::Config {
                    message: format!("input {name}: {found} sample does not fit {}", var.var_type),
                })?;
                values.push(coerced);
            }
            bound.series.insert(
                name.clone(),
                InputSeries {
                    times: series.times.clone(),
                    values,
                },
            );
        }
        Ok(bound)
    }

    /// Write every input's value at `t` into the model.
    pub fn apply(&self, handle: &mut ModelHandle, t: f64) -> SimResult<()> {
        if self.series.is_empty() {
            return Ok(());
        }
        let md = handle.description().clone();
        for (name, series) in &self.series {
            let var = md.variable(name).ok_or_else(|| SimError::UnknownVariable {
                name: name.clone(),
            })?;
            let interpolate = var.var_type == VariableType::Real;
            if let Some(value) = series.sample(t, interpolate) {
                handle.set_value(var, value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reals(times: &[f64], values: &[f64]) -> InputSeries {
        InputSeries::new(
            times.to_vec(),
            values.iter().copied().map(Value::Real).collect(),
        )
        .unwrap()
    }

    #[test]
    fn real_series_interpolates_and_clamps() {
        let s = reals(&[0.0, 1.0, 2.0], &[0.0, 10.0, 0.0]);
        assert_eq!(s.sample(-1.0, true), Some(Value::Real(0.0)));
        assert_eq!(s.sample(0.5, true), Some(Value::Real(5.0)));
        assert_eq!(s.sample(1.5, true), Some(Value::Real(5.0)));
        assert_eq!(s.sample(3.0, true), Some(Value::Real(0.0)));
        assert_eq!(s.sample(0.5, false), Some(Value::Real(0.0)));
    }

    #[test]
    fn discrete_series_holds_last_value() {
        let s = InputSeries::new(
            vec![0.0, 1.0],
            vec![Value::Integer(1), Value::Integer(5)],
        )
        .unwrap();
        assert_eq!(s.sample(0.99, true), Some(Value::Integer(1)));
        assert_eq!(s.sample(1.0, true), Some(Value::Integer(5)));
    }

    #[test]
    fn later_sample_wins_at_repeated_time() {
        let s = reals(&[0.0, 1.0, 1.0, 2.0], &[0.0, 1.0, 3.0, 3.0]);
        assert_eq!(s.sample(1.0, true), Some(Value::Real(3.0)));
        assert_eq!(s.sample(0.5, true), Some(Value::Real(0.5)));
    }

    #[test]
    fn bind_coerces_and_checks_names() {
        let md = input_description();
        let table = InputTable::new()
            .with(
                "u",
                InputSeries::new(vec![0.0, 1.0], vec![Value::Integer(0), Value::Real(2.0)]).unwrap(),
            )
            .unwrap();
        let bound = table.bind(&md).unwrap();
        assert_eq!(
            bound.get("u").unwrap().sample(0.5, true),
            Some(Value::Real(1.0))
        );

        let unknown = InputTable::new()
            .with("w", InputSeries::new(vec![0.0], vec![Value::Real(0.0)]).unwrap())
            .unwrap();
        assert!(matches!(
            unknown.bind(&md),
            Err(SimError::UnknownVariable { .. })
        ));

        let wrong = InputTable::new()
            .with("u", InputSeries::new(vec![0.0], vec![Value::Boolean(true)]).unwrap())
            .unwrap();
        assert!(matches!(wrong.bind(&md), Err(SimError::Config { .. })));
    }

    fn input_description() -> ModelDescription {
        use fmu_core::{Causality, ModelVariable, Variability};
        ModelDescription {
            fmi_version: fmu_core::FMI_VERSION.to_string(),
            model_name: "Input".to_string(),
            guid: "{input}".to_string(),
            description: None,
            number_of_event_indicators: 0,
            variables: vec![
                ModelVariable::new(
                    "u",
                    1,
                    VariableType::Real,
                    Causality::Input,
                    Variability::Continuous,
                )
                .with_start(Value::Real(0.0)),
            ],
            co_simulation: None,
            model_exchange: None,
            default_experiment: None,
        }
    }

    #[test]
    fn malformed_series_are_rejected() {
        assert!(InputSeries::new(vec![], vec![]).is_err());
        assert!(InputSeries::new(vec![0.0], vec![]).is_err());
        assert!(
            InputSeries::new(vec![1.0, 0.0], vec![Value::Real(0.0), Value::Real(1.0)]).is_err()
        );
    }

    proptest! {
        #[test]
        fn interpolation_stays_within_sample_range(
            samples in prop::collection::vec(-1e3f64..1e3, 2..12),
            t in -5.0f64..20.0,
        ) {
            let times: Vec<f64> = (0..samples.len()).map(|i| i as f64).collect();
            let s = reals(&times, &samples);
            let lo = samples.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let v = s.sample(t, true).and_then(|v| v.as_real()).unwrap();
            prop_assert!(v >= lo - 1e-9 && v <= hi + 1e-9);
        }
    }
}
