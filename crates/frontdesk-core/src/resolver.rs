//! Parameter resolution.
//!
//! Merges caller-supplied parameters with what the session already knows:
//! authoritative identifiers replace caller values for critical fields,
//! session slots fill omitted fields, then schema defaults apply.

use crate::params::{Params, is_present, value_as_i64, value_as_text};
use crate::schema::{FunctionSchema, SchemaRegistry, SlotBinding, compose_date_time};
use crate::session::{
    ConversationState, IdentifierKey, OverrideEvent, OverrideOrigin, SlotKey,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Where an auto-filled value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", content = "key", rename_all = "snake_case")]
pub enum AutoFillSource {
    Slot(SlotKey),
    /// Date and time slots composed into one value
    DateTimeSlots,
    Identifier(IdentifierKey),
    Default,
}

/// Output of [`ParameterResolver::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub function_name: String,
    pub params: Params,
    /// Wire field name -> source, for fields the caller did not supply
    pub auto_filled: BTreeMap<String, AutoFillSource>,
    /// Caller values discarded in favour of authoritative identifiers
    pub overrides: Vec<OverrideEvent>,
    /// `None` for unregistered functions (passed through unvalidated)
    pub schema: Option<&'static FunctionSchema>,
}

impl Resolution {
    pub fn auto_filled_fields(&self) -> Vec<String> {
        self.auto_filled.keys().cloned().collect()
    }
}

/// Stateless resolver over the static schema table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterResolver;

impl ParameterResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves `caller` parameters for `function_name` against `state`.
    ///
    /// Pure: identical inputs produce identical `params`. Override events are
    /// returned, not recorded; the caller appends them to the session.
    pub fn resolve(
        &self,
        state: Option<&ConversationState>,
        function_name: &str,
        caller: &Params,
    ) -> Resolution {
        let mut resolution = Resolution {
            function_name: function_name.to_string(),
            params: caller.clone(),
            auto_filled: BTreeMap::new(),
            overrides: Vec::new(),
            schema: SchemaRegistry::get(function_name),
        };
        let Some(schema) = resolution.schema else {
            return resolution;
        };

        for field in schema.declared_fields() {
            let name = field.name();
            let supplied = caller.get(name).filter(|v| is_present(Some(*v)));

            if let Some(key) = schema.critical_identifier(field) {
                if let Some(authoritative) = state.and_then(|s| s.identifiers().get(key)) {
                    match supplied {
                        Some(value) if value_as_i64(value) == Some(authoritative.value) => {}
                        Some(value) => {
                            tracing::warn!(
                                "[ParameterResolver] {}.{}: caller value {} replaced by authoritative {} (from {})",
                                function_name,
                                name,
                                value,
                                authoritative.value,
                                authoritative.function_name
                            );
                            resolution.overrides.push(OverrideEvent::new(
                                name,
                                key,
                                Some(authoritative.value),
                                value_as_text(value).unwrap_or_else(|| value.to_string()),
                                OverrideOrigin::CallerParameter {
                                    function_name: function_name.to_string(),
                                },
                            ));
                        }
                        None => {
                            resolution
                                .auto_filled
                                .insert(name.to_string(), AutoFillSource::Identifier(key));
                        }
                    }
                    resolution
                        .params
                        .insert(name.to_string(), Value::from(authoritative.value));
                    continue;
                }
            }

            if supplied.is_some() {
                continue;
            }

            let filled = state.and_then(|state| {
                schema
                    .binding_for(field)
                    .and_then(|binding| fill_from_session(state, schema, field, binding))
            });
            if let Some((value, source)) = filled {
                resolution.params.insert(name.to_string(), value);
                resolution.auto_filled.insert(name.to_string(), source);
                continue;
            }

            if let Some(default) = schema.default_for(field) {
                resolution.params.insert(name.to_string(), default.to_value());
                resolution
                    .auto_filled
                    .insert(name.to_string(), AutoFillSource::Default);
            }
        }

        if !resolution.auto_filled.is_empty() {
            tracing::debug!(
                "[ParameterResolver] {} auto-filled {:?}",
                function_name,
                resolution.auto_filled.keys().collect::<Vec<_>>()
            );
        }

        resolution
    }
}

fn fill_from_session(
    state: &ConversationState,
    schema: &FunctionSchema,
    field: crate::schema::Field,
    binding: SlotBinding,
) -> Option<(Value, AutoFillSource)> {
    match binding {
        SlotBinding::Slot(key) => {
            let raw = state.slots().value(key)?;
            let value = schema
                .rule_for(field)
                .and_then(|rule| rule.normalize_text(raw))
                .unwrap_or_else(|| Value::String(raw.to_string()));
            Some((value, AutoFillSource::Slot(key)))
        }
        SlotBinding::Identifier(key) => {
            let id = state.identifiers().value(key)?;
            Some((Value::from(id), AutoFillSource::Identifier(key)))
        }
        SlotBinding::DateTime { date, time } => {
            let composed =
                compose_date_time(state.slots().value(date)?, state.slots().value(time)?)?;
            Some((Value::String(composed), AutoFillSource::DateTimeSlots))
        }
    }
}
