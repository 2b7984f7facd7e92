//! Read-only model description.
//!
//! A description is produced by an external parser and shared by every
//! handle and loop that works on the same model. Nothing in the driver
//! mutates it after construction.

use crate::ids::ValueReference;
use crate::value::{Value, VariableType};
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// FMI version this driver speaks.
pub const FMI_VERSION: &str = "2.0";

/// Execution interface of a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FmuKind {
    ModelExchange,
    CoSimulation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Causality {
    Parameter,
    CalculatedParameter,
    Input,
    Output,
    Local,
    Independent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Variability {
    Constant,
    Fixed,
    Tunable,
    Discrete,
    Continuous,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Initial {
    Exact,
    Approx,
    Calculated,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelVariable {
    pub name: String,
    pub value_reference: ValueReference,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    pub causality: Causality,
    pub variability: Variability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<Initial>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Value>,
    /// 1-based index of the state variable this one is the derivative of.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivative: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModelVariable {
    pub fn new(
        name: impl Into<String>,
        value_reference: u32,
        var_type: VariableType,
        causality: Causality,
        variability: Variability,
    ) -> Self {
        Self {
            name: name.into(),
            value_reference: ValueReference::new(value_reference),
            var_type,
            causality,
            variability,
            initial: None,
            start: None,
            derivative: None,
            description: None,
        }
    }

    pub fn with_initial(mut self, initial: Initial) -> Self {
        self.initial = Some(initial);
        self
    }

    pub fn with_start(mut self, start: Value) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_derivative(mut self, state_index: u32) -> Self {
        self.derivative = Some(state_index);
        self
    }

    /// Slot identity: the reference is only unique together with the type.
    pub fn slot(&self) -> (ValueReference, VariableType) {
        (self.value_reference, self.var_type.storage())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoSimulationCapabilities {
    pub model_identifier: String,
    #[serde(default)]
    pub can_handle_variable_communication_step_size: bool,
    #[serde(default)]
    pub can_get_and_set_fmu_state: bool,
    #[serde(default)]
    pub can_serialize_fmu_state: bool,
    #[serde(default)]
    pub can_interpolate_inputs: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelExchangeCapabilities {
    pub model_identifier: String,
    #[serde(default)]
    pub completed_integrator_step_not_needed: bool,
    #[serde(default)]
    pub can_get_and_set_fmu_state: bool,
    #[serde(default)]
    pub can_serialize_fmu_state: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DefaultExperiment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_size: Option<f64>,
}

impl DefaultExperiment {
    /// Start time, defaulting to 0.
    pub fn start(&self) -> f64 {
        self.start_time.unwrap_or(0.0)
    }

    /// Stop time, defaulting to one second after start.
    pub fn stop(&self) -> f64 {
        self.stop_time.unwrap_or(self.start() + 1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescription {
    pub fmi_version: String,
    pub model_name: String,
    pub guid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub number_of_event_indicators: usize,
    #[serde(default)]
    pub variables: Vec<ModelVariable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co_simulation: Option<CoSimulationCapabilities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_exchange: Option<ModelExchangeCapabilities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_experiment: Option<DefaultExperiment>,
}

impl ModelDescription {
    /// Look a variable up by name.
    pub fn variable(&self, name: &str) -> Option<&ModelVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Like [`variable`](Self::variable) but with a typed error.
    pub fn require(&self, name: &str) -> CoreResult<&ModelVariable> {
        self.variable(name).ok_or_else(|| CoreError::UnknownVariable {
            name: name.to_string(),
        })
    }

    /// Look a variable up by its slot (reference + storage type).
    pub fn by_reference(&self, vr: ValueReference, ty: VariableType) -> Option<&ModelVariable> {
        self.variables
            .iter()
            .find(|v| v.value_reference == vr && v.var_type.storage() == ty.storage())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &ModelVariable> {
        self.variables
            .iter()
            .filter(|v| v.causality == Causality::Output)
    }

    /// Continuous states are the variables some derivative points at.
    pub fn number_of_continuous_states(&self) -> usize {
        self.variables
            .iter()
            .filter(|v| v.derivative.is_some())
            .count()
    }

    pub fn supports_kind(&self, kind: FmuKind) -> bool {
        match kind {
            FmuKind::CoSimulation => self.co_simulation.is_some(),
            FmuKind::ModelExchange => self.model_exchange.is_some(),
        }
    }

    /// Model identifier declared for the given interface.
    pub fn model_identifier(&self, kind: FmuKind) -> Option<&str> {
        match kind {
            FmuKind::CoSimulation => self
                .co_simulation
                .as_ref()
                .map(|c| c.model_identifier.as_str()),
            FmuKind::ModelExchange => self
                .model_exchange
                .as_ref()
                .map(|c| c.model_identifier.as_str()),
        }
    }

    pub fn can_get_and_set_fmu_state(&self, kind: FmuKind) -> bool {
        match kind {
            FmuKind::CoSimulation => self
                .co_simulation
                .as_ref()
                .is_some_and(|c| c.can_get_and_set_fmu_state),
            FmuKind::ModelExchange => self
                .model_exchange
                .as_ref()
                .is_some_and(|c| c.can_get_and_set_fmu_state),
        }
    }

    pub fn can_serialize_fmu_state(&self, kind: FmuKind) -> bool {
        match kind {
            FmuKind::CoSimulation => self
                .co_simulation
                .as_ref()
                .is_some_and(|c| c.can_serialize_fmu_state),
            FmuKind::ModelExchange => self
                .model_exchange
                .as_ref()
                .is_some_and(|c| c.can_serialize_fmu_state),
        }
    }

    /// Default experiment, or an empty one that yields driver defaults.
    pub fn experiment(&self) -> DefaultExperiment {
        self.default_experiment.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModelDescription {
        ModelDescription {
            fmi_version: FMI_VERSION.to_string(),
            model_name: "Sample".to_string(),
            guid: "{sample}".to_string(),
            description: None,
            number_of_event_indicators: 0,
            variables: vec![
                ModelVariable::new(
                    "x",
                    1,
                    VariableType::Real,
                    Causality::Output,
                    Variability::Continuous,
                ),
                ModelVariable::new(
                    "der(x)",
                    2,
                    VariableType::Real,
                    Causality::Local,
                    Variability::Continuous,
                )
                .with_derivative(1),
                ModelVariable::new(
                    "mode",
                    1,
                    VariableType::Enumeration,
                    Causality::Parameter,
                    Variability::Fixed,
                )
                .with_initial(Initial::Exact)
                .with_start(Value::Integer(1)),
            ],
            co_simulation: Some(CoSimulationCapabilities {
                model_identifier: "Sample".to_string(),
                can_get_and_set_fmu_state: true,
                ..Default::default()
            }),
            model_exchange: None,
            default_experiment: None,
        }
    }

    #[test]
    fn lookup_by_slot_distinguishes_types() {
        let md = sample();
        let vr = ValueReference::new(1);
        assert_eq!(md.by_reference(vr, VariableType::Real).unwrap().name, "x");
        assert_eq!(
            md.by_reference(vr, VariableType::Integer).unwrap().name,
            "mode"
        );
        assert!(md.by_reference(vr, VariableType::Boolean).is_none());
    }

    #[test]
    fn counts_states_and_capabilities() {
        let md = sample();
        assert_eq!(md.number_of_continuous_states(), 1);
        assert!(md.supports_kind(FmuKind::CoSimulation));
        assert!(!md.supports_kind(FmuKind::ModelExchange));
        assert!(md.can_get_and_set_fmu_state(FmuKind::CoSimulation));
        assert!(!md.can_serialize_fmu_state(FmuKind::CoSimulation));
    }

    #[test]
    fn default_experiment_fallbacks() {
        let md = sample();
        let exp = md.experiment();
        assert_eq!(exp.start(), 0.0);
        assert_eq!(exp.stop(), 1.0);

        let exp = DefaultExperiment {
            start_time: Some(2.0),
            ..Default::default()
        };
        assert_eq!(exp.stop(), 3.0);
    }

    #[test]
    fn require_reports_unknown_name() {
        let md = sample();
        let err = md.require("nope").unwrap_err();
        assert_eq!(
            err,
            CoreError::UnknownVariable {
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn json_roundtrip_uses_camel_case() {
        let md = sample();
        let json = serde_json::to_string(&md).unwrap();
        assert!(json.contains("\"valueReference\":1"));
        assert!(json.contains("\"canGetAndSetFmuState\":true"));
        let back: ModelDescription = serde_json::from_str(&json).unwrap();
        assert_eq!(back, md);
    }
}
