//! Parameter validation.
//!
//! Checks run in order (required fields, disjunctive groups, domain formats)
//! and every failure is collected, so one error tells the calling model
//! everything it needs to ask the user.

use crate::params::{Params, is_present};
use crate::schema::{FunctionSchema, SchemaRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Instruction attached to every validation failure.
pub const ASK_USER: &str = "ASK_USER";

/// A present value that failed its domain rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidField {
    pub field: String,
    pub received: Value,
    pub expected: String,
}

/// Structured, actionable validation failure.
///
/// This payload is a contract with the calling model: it must not re-invoke
/// the function before asking the user for the listed data.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub function_name: String,
    pub message: String,
    pub required: Vec<String>,
    pub missing_fields: Vec<String>,
    pub invalid_fields: Vec<InvalidField>,
    /// Acceptable call shapes when no disjunctive group was satisfied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Vec<String>>,
    pub example: Value,
    pub received: Params,
    pub action: String,
}

impl ValidationError {
    pub fn invalid_field_names(&self) -> Vec<String> {
        self.invalid_fields.iter().map(|f| f.field.clone()).collect()
    }
}

/// Outcome of [`Validator::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// Parameters unchanged
    Valid(Params),
    Invalid(Box<ValidationError>),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Validates `params` for `function_name`. Unregistered functions are
    /// valid by definition.
    pub fn validate(&self, function_name: &str, params: &Params) -> Validation {
        match SchemaRegistry::get(function_name) {
            Some(schema) => self.validate_with(schema, params),
            None => Validation::Valid(params.clone()),
        }
    }

    pub fn validate_with(&self, schema: &FunctionSchema, params: &Params) -> Validation {
        let missing_fields: Vec<String> = schema
            .required
            .iter()
            .filter(|field| !is_present(params.get(field.name())))
            .map(|field| field.name().to_string())
            .collect();

        let group_satisfied = schema.disjunctive_groups.is_empty()
            || schema
                .disjunctive_groups
                .iter()
                .any(|group| group.iter().all(|f| is_present(params.get(f.name()))));
        let alternatives: Vec<Vec<String>> = if group_satisfied {
            Vec::new()
        } else {
            schema
                .disjunctive_groups
                .iter()
                .map(|group| group.iter().map(|f| f.name().to_string()).collect())
                .collect()
        };

        let invalid_fields: Vec<InvalidField> = schema
            .declared_fields()
            .filter_map(|field| {
                let value = params.get(field.name()).filter(|v| is_present(Some(*v)))?;
                let rule = schema.rule_for(field)?;
                (!rule.check(value)).then(|| InvalidField {
                    field: field.name().to_string(),
                    received: value.clone(),
                    expected: rule.expected(),
                })
            })
            .collect();

        if missing_fields.is_empty() && alternatives.is_empty() && invalid_fields.is_empty() {
            return Validation::Valid(params.clone());
        }

        let message = compose_message(schema.name(), &missing_fields, &alternatives, &invalid_fields);
        tracing::debug!("[Validator] {}", message);

        Validation::Invalid(Box::new(ValidationError {
            function_name: schema.name().to_string(),
            message,
            required: schema.required.iter().map(|f| f.name().to_string()).collect(),
            missing_fields,
            invalid_fields,
            alternatives,
            example: schema.example_call(),
            received: params.clone(),
            action: ASK_USER.to_string(),
        }))
    }
}

fn compose_message(
    function_name: &str,
    missing: &[String],
    alternatives: &[Vec<String>],
    invalid: &[InvalidField],
) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!(
            "Missing required parameters for {}: {}.",
            function_name,
            missing.join(", ")
        ));
    }
    if !alternatives.is_empty() {
        let shapes: Vec<String> = alternatives.iter().map(|group| group.join(" + ")).collect();
        parts.push(format!(
            "{} needs one of these parameter sets: {}.",
            function_name,
            shapes.join("; or ")
        ));
    }
    if !invalid.is_empty() {
        let details: Vec<String> = invalid
            .iter()
            .map(|f| format!("{} must be {} (received {})", f.field, f.expected, f.received))
            .collect();
        parts.push(format!("Invalid values: {}.", details.join("; ")));
    }
    parts.push(format!(
        "Do not call {} again until you have asked the user for this information.",
        function_name
    ));
    parts.join(" ")
}
