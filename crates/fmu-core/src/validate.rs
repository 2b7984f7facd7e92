//! Structural checks on a parsed model description.
//!
//! Unlike schema validation of the raw document, these checks look at the
//! properties the driver relies on. All problems are collected so a caller
//! can report them together; an empty list means the description is usable.

use crate::description::{DefaultExperiment, FMI_VERSION, Initial, ModelDescription, Variability};
use std::collections::HashSet;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing field: {field}")]
    Missing { field: &'static str },

    #[error("Unsupported FMI version: {version}")]
    UnsupportedVersion { version: String },

    #[error("Description declares neither CoSimulation nor ModelExchange")]
    NoInterface,

    #[error("Duplicate variable name: {name}")]
    DuplicateName { name: String },

    #[error("Duplicate value reference {reference} for type {var_type} ({name})")]
    DuplicateReference {
        name: String,
        reference: u32,
        var_type: String,
    },

    #[error("Variable {name}: {reason}")]
    InvalidVariable { name: String, reason: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
}

pub fn validate_description(md: &ModelDescription) -> Vec<ValidationError> {
    let mut problems = Vec::new();

    if md.guid.trim().is_empty() {
        problems.push(ValidationError::Missing { field: "guid" });
    }
    if md.model_name.trim().is_empty() {
        problems.push(ValidationError::Missing { field: "modelName" });
    }
    if md.fmi_version != FMI_VERSION {
        problems.push(ValidationError::UnsupportedVersion {
            version: md.fmi_version.clone(),
        });
    }
    if md.co_simulation.is_none() && md.model_exchange.is_none() {
        problems.push(ValidationError::NoInterface);
    }
    if let Some(cs) = &md.co_simulation
        && cs.model_identifier.trim().is_empty()
    {
        problems.push(ValidationError::Missing {
            field: "CoSimulation.modelIdentifier",
        });
    }
    if let Some(me) = &md.model_exchange
        && me.model_identifier.trim().is_empty()
    {
        problems.push(ValidationError::Missing {
            field: "ModelExchange.modelIdentifier",
        });
    }

    validate_variables(md, &mut problems);

    if let Some(exp) = &md.default_experiment {
        validate_experiment(exp, &mut problems);
    }

    problems
}

fn validate_variables(md: &ModelDescription, problems: &mut Vec<ValidationError>) {
    let mut names = HashSet::new();
    let mut slots = HashSet::new();
    let n_vars = md.variables.len() as u32;

    for var in &md.variables {
        if !names.insert(var.name.as_str()) {
            problems.push(ValidationError::DuplicateName {
                name: var.name.clone(),
            });
        }
        if !slots.insert(var.slot()) {
            problems.push(ValidationError::DuplicateReference {
                name: var.name.clone(),
                reference: var.value_reference.get(),
                var_type: var.var_type.storage().to_string(),
            });
        }

        let invalid = |reason: &str| ValidationError::InvalidVariable {
            name: var.name.clone(),
            reason: reason.to_string(),
        };

        if let Some(start) = &var.start
            && !start.fits(var.var_type)
        {
            problems.push(invalid("start value does not match variable type"));
        }
        if var.variability == Variability::Constant && var.start.is_none() {
            problems.push(invalid("constant without start value"));
        }
        match var.initial {
            Some(Initial::Exact) if var.start.is_none() => {
                problems.push(invalid("initial=exact requires a start value"));
            }
            Some(Initial::Calculated) if var.start.is_some() => {
                problems.push(invalid("initial=calculated must not have a start value"));
            }
            _ => {}
        }
        if let Some(index) = var.derivative
            && (index == 0 || index > n_vars)
        {
            problems.push(invalid("derivative index out of range"));
        }
    }
}

fn validate_experiment(exp: &DefaultExperiment, problems: &mut Vec<ValidationError>) {
    if let (Some(start), Some(stop)) = (exp.start_time, exp.stop_time)
        && stop <= start
    {
        problems.push(ValidationError::InvalidValue {
            field: "DefaultExperiment.stopTime",
            value: stop,
            reason: "must be greater than startTime",
        });
    }
    if let Some(tol) = exp.tolerance
        && !(tol > 0.0)
    {
        problems.push(ValidationError::InvalidValue {
            field: "DefaultExperiment.tolerance",
            value: tol,
            reason: "must be positive",
        });
    }
    if let Some(step) = exp.step_size
        && !(step > 0.0)
    {
        problems.push(ValidationError::InvalidValue {
            field: "DefaultExperiment.stepSize",
            value: step,
            reason: "must be positive",
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{Causality, CoSimulationCapabilities, ModelVariable};
    use crate::value::{Value, VariableType};

    fn minimal() -> ModelDescription {
        ModelDescription {
            fmi_version: "2.0".to_string(),
            model_name: "M".to_string(),
            guid: "{m}".to_string(),
            description: None,
            number_of_event_indicators: 0,
            variables: vec![
                ModelVariable::new(
                    "k",
                    1,
                    VariableType::Real,
                    Causality::Parameter,
                    Variability::Fixed,
                )
                .with_initial(Initial::Exact)
                .with_start(Value::Real(1.0)),
            ],
            co_simulation: Some(CoSimulationCapabilities {
                model_identifier: "M".to_string(),
                ..Default::default()
            }),
            model_exchange: None,
            default_experiment: None,
        }
    }

    #[test]
    fn well_formed_description_has_no_problems() {
        assert!(validate_description(&minimal()).is_empty());
    }

    #[test]
    fn collects_every_problem() {
        let mut md = minimal();
        md.guid.clear();
        md.fmi_version = "3.0".to_string();
        md.variables.push(md.variables[0].clone());
        let problems = validate_description(&md);
        assert!(problems.contains(&ValidationError::Missing { field: "guid" }));
        assert!(problems.contains(&ValidationError::UnsupportedVersion {
            version: "3.0".to_string()
        }));
        assert!(
            problems
                .iter()
                .any(|p| matches!(p, ValidationError::DuplicateName { .. }))
        );
        assert!(
            problems
                .iter()
                .any(|p| matches!(p, ValidationError::DuplicateReference { .. }))
        );
    }

    #[test]
    fn same_reference_different_type_is_fine() {
        let mut md = minimal();
        md.variables.push(ModelVariable::new(
            "flag",
            1,
            VariableType::Boolean,
            Causality::Output,
            Variability::Discrete,
        ));
        assert!(validate_description(&md).is_empty());
    }

    #[test]
    fn start_type_and_initial_rules() {
        let mut md = minimal();
        md.variables[0].start = Some(Value::Boolean(true));
        md.variables.push(
            ModelVariable::new(
                "y",
                2,
                VariableType::Real,
                Causality::Output,
                Variability::Continuous,
            )
            .with_initial(Initial::Calculated)
            .with_start(Value::Real(0.0)),
        );
        let problems = validate_description(&md);
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn experiment_bounds() {
        let mut md = minimal();
        md.default_experiment = Some(DefaultExperiment {
            start_time: Some(1.0),
            stop_time: Some(0.5),
            tolerance: Some(0.0),
            step_size: Some(-1.0),
        });
        assert_eq!(validate_description(&md).len(), 3);
    }
}
