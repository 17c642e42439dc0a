//! Call ledger.
//!
//! Every function-call attempt is appended to the session's call log,
//! whatever its outcome. The ledger is also the only writer allowed to
//! promote identifiers: a successful handler result that carries a newly
//! assigned id (a new `PatNum`, a new `AptNum`) becomes authoritative here.

use crate::error::ErrorCategory;
use crate::extraction::ExtractionReport;
use crate::params::{Params, value_as_i64, value_as_text};
use crate::schema::{FunctionSchema, SlotBinding};
use crate::session::{AuthoritativeId, ConversationState, SlotPatch, SlotSource, apply_patch};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of one call attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallOutcome {
    Success {
        result: Value,
    },
    ValidationFailed {
        message: String,
        missing_fields: Vec<String>,
        invalid_fields: Vec<String>,
    },
    HandlerFailed {
        message: String,
    },
    SystemFailed {
        message: String,
    },
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success { .. })
    }

    /// Error category, `None` on success.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            CallOutcome::Success { .. } => None,
            CallOutcome::ValidationFailed { .. } => Some(ErrorCategory::Validation),
            CallOutcome::HandlerFailed { .. } => Some(ErrorCategory::Handler),
            CallOutcome::SystemFailed { .. } => Some(ErrorCategory::System),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            CallOutcome::Success { .. } => None,
            CallOutcome::ValidationFailed { message, .. }
            | CallOutcome::HandlerFailed { message }
            | CallOutcome::SystemFailed { message } => Some(message),
        }
    }
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    /// Unique record id (UUID v4), used to correlate exported lines
    pub id: String,
    pub timestamp: String,
    pub function_name: String,
    pub resolved_parameters: Params,
    pub auto_filled_fields: Vec<String>,
    pub outcome: CallOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionReport>,
}

impl CallRecord {
    pub fn new(
        function_name: impl Into<String>,
        resolved_parameters: Params,
        auto_filled_fields: Vec<String>,
        outcome: CallOutcome,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            function_name: function_name.into(),
            resolved_parameters,
            auto_filled_fields,
            outcome,
            extraction: None,
        }
    }

    pub fn with_extraction(mut self, report: Option<ExtractionReport>) -> Self {
        self.extraction = report;
        self
    }
}

/// Hands ledger records to durable storage outside the engine.
///
/// Must not block: implementations queue or log and return.
pub trait LedgerSink: Send + Sync {
    fn publish(&self, session_id: Option<&str>, record: &CallRecord);
}

/// Appends `record` to the session's call log and applies its effects.
///
/// On success this promotes identifiers found in the result, enriches
/// patient slots from a single-record result and fires the schema's stage
/// event. Returns the record's ledger index.
pub fn record(
    state: &mut ConversationState,
    record: CallRecord,
    schema: Option<&FunctionSchema>,
) -> usize {
    let index = state.call_log.len();
    let success = match (&record.outcome, schema) {
        (CallOutcome::Success { result }, Some(schema)) => Some((result.clone(), schema)),
        _ => None,
    };

    tracing::info!(
        target: "ledger",
        "[CallLedger] session={} #{} {} -> {}",
        state.session_id,
        index,
        record.function_name,
        record
            .outcome
            .category()
            .map(|c| format!("{:?}", c))
            .unwrap_or_else(|| "success".to_string())
    );
    state.call_log.push(record);

    if let Some((result, schema)) = success {
        if let Some(object) = single_record(&result) {
            promote_identifiers(state, schema, object, index);
            enrich_slots(state, schema, object, index);
        }
        state.refresh_stage();
        if let Some(event) = schema.on_success {
            state.apply_stage_event(event);
        }
    }

    state.touch();
    index
}

/// The result object a handler returned, unwrapping single-element arrays.
/// Multi-record results (an ambiguous search) yield `None`.
fn single_record(result: &Value) -> Option<&Map<String, Value>> {
    match result {
        Value::Object(object) => Some(object),
        Value::Array(items) if items.len() == 1 => items[0].as_object(),
        _ => None,
    }
}

fn promote_identifiers(
    state: &mut ConversationState,
    schema: &FunctionSchema,
    object: &Map<String, Value>,
    index: usize,
) {
    for target in schema.result_identifiers {
        let Some(value) = object
            .get(target.field.name())
            .and_then(value_as_i64)
            .filter(|id| *id > 0)
        else {
            continue;
        };
        let previous = state.identifiers.promote(
            target.key,
            AuthoritativeId {
                value,
                function_name: schema.name().to_string(),
                ledger_index: index,
                set_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        match previous {
            Some(previous) if previous.value != value => tracing::info!(
                "[CallLedger] session={} {} replaced {} -> {} by {}",
                state.session_id,
                target.key,
                previous.value,
                value,
                schema.name()
            ),
            Some(_) => {}
            None => tracing::info!(
                "[CallLedger] session={} {} = {} from {}",
                state.session_id,
                target.key,
                value,
                schema.name()
            ),
        }
    }
}

fn enrich_slots(
    state: &mut ConversationState,
    schema: &FunctionSchema,
    object: &Map<String, Value>,
    index: usize,
) {
    let mut patch = SlotPatch::new(SlotSource::Handler).as_correction();
    for (field, binding) in schema.bindings {
        let SlotBinding::Slot(key) = binding else {
            continue;
        };
        if let Some(text) = object.get(field.name()).and_then(value_as_text) {
            patch = patch.with_slot(*key, text);
        }
    }
    if !patch.is_empty() {
        let report = apply_patch(state, &patch);
        tracing::debug!(
            "[CallLedger] ledger #{} updated slots {:?}",
            index,
            report.applied
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use crate::session::{Channel, ConversationStage, IdentifierKey, SlotKey};
    use serde_json::json;

    fn success(function_name: &str, result: Value) -> CallRecord {
        CallRecord::new(
            function_name,
            Params::new(),
            Vec::new(),
            CallOutcome::Success { result },
        )
    }

    #[test]
    fn test_failed_attempts_are_recorded_without_promotion() {
        let mut state = ConversationState::new("ledger", Channel::Sms);
        let schema = SchemaRegistry::get("CreatePatient");
        let index = record(
            &mut state,
            CallRecord::new(
                "CreatePatient",
                Params::new(),
                Vec::new(),
                CallOutcome::ValidationFailed {
                    message: "missing".into(),
                    missing_fields: vec!["WirelessPhone".into()],
                    invalid_fields: Vec::new(),
                },
            ),
            schema,
        );

        assert_eq!(index, 0);
        assert_eq!(state.call_log().len(), 1);
        assert!(state.identifiers().get(IdentifierKey::PatientId).is_none());
    }

    #[test]
    fn test_create_patient_promotes_patient_id() {
        let mut state = ConversationState::new("ledger", Channel::Sms);
        record(
            &mut state,
            success("CreatePatient", json!({ "PatNum": 7, "FName": "Ana" })),
            SchemaRegistry::get("CreatePatient"),
        );

        let id = state.identifiers().get(IdentifierKey::PatientId).unwrap();
        assert_eq!(id.value, 7);
        assert_eq!(id.function_name, "CreatePatient");
        assert_eq!(id.ledger_index, 0);
        assert_eq!(state.stage(), ConversationStage::CollectingAppointment);
        assert_eq!(state.slots().value(SlotKey::FirstName), Some("Ana"));
    }

    #[test]
    fn test_ambiguous_search_does_not_promote() {
        let mut state = ConversationState::new("ledger", Channel::Sms);
        record(
            &mut state,
            success(
                "SearchPatients",
                json!([{ "PatNum": 7 }, { "PatNum": 8 }]),
            ),
            SchemaRegistry::get("SearchPatients"),
        );
        assert!(state.identifiers().get(IdentifierKey::PatientId).is_none());

        record(
            &mut state,
            success("SearchPatients", json!([{ "PatNum": 8, "LName": "Smith" }])),
            SchemaRegistry::get("SearchPatients"),
        );
        assert_eq!(state.identifiers().value(IdentifierKey::PatientId), Some(8));
        assert_eq!(
            state.identifiers().get(IdentifierKey::PatientId).unwrap().ledger_index,
            1
        );
    }

    #[test]
    fn test_booking_and_cancellation_drive_stage() {
        let mut state = ConversationState::new("ledger", Channel::Voice);
        record(
            &mut state,
            success("CreateAppointment", json!({ "AptNum": 42 })),
            SchemaRegistry::get("CreateAppointment"),
        );
        assert_eq!(state.stage(), ConversationStage::Booked);
        assert_eq!(state.identifiers().value(IdentifierKey::AppointmentId), Some(42));

        record(
            &mut state,
            success("CancelAppointment", json!({ "ok": true })),
            SchemaRegistry::get("CancelAppointment"),
        );
        assert_eq!(state.stage(), ConversationStage::Abandoned);
        assert_eq!(state.call_log().len(), 2);
    }
}
