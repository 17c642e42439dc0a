//! Conversation message ingestion.

use crate::Today;
use crate::session::SessionGate;
use frontdesk_core::error::{FrontdeskError, Result};
use frontdesk_core::extraction::DeterministicExtractor;
use frontdesk_core::session::{
    Channel, ConversationStage, ConversationState, Intent, MergeReport, MessageRole,
    SessionStore, SlotKey, SlotSource, apply_patch,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A message posted by a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub role: MessageRole,
    pub content: String,
    /// Applied only when the message opens the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
}

/// What one ingested message changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub session_id: String,
    pub turn: usize,
    /// Facts the deterministic extractor recognized in this turn
    pub extracted: BTreeMap<SlotKey, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    pub correction: bool,
    pub merge: MergeReport,
    pub stage: ConversationStage,
}

/// Appends messages to a session and runs deterministic extraction on
/// caller turns.
///
/// Assistant and system messages are stored for the transcript only.
pub struct MessageIngestionUseCase {
    store: Arc<dyn SessionStore>,
    gate: Arc<SessionGate>,
    extractor: DeterministicExtractor,
    today: Today,
}

impl MessageIngestionUseCase {
    pub fn new(store: Arc<dyn SessionStore>, gate: Arc<SessionGate>, today: Today) -> Self {
        Self {
            store,
            gate,
            extractor: DeterministicExtractor::new(),
            today,
        }
    }

    pub async fn ingest(&self, session_id: &str, message: InboundMessage) -> Result<IngestionReport> {
        if session_id.trim().is_empty() {
            return Err(FrontdeskError::invalid_input("session id must not be empty"));
        }
        if message.content.trim().is_empty() {
            return Err(FrontdeskError::invalid_input("message content must not be empty"));
        }

        let _guard = self.gate.acquire(session_id).await;
        let today = (self.today)();
        let extractor = self.extractor;

        let mut report = IngestionReport {
            session_id: session_id.to_string(),
            turn: 0,
            extracted: BTreeMap::new(),
            intent: None,
            correction: false,
            merge: MergeReport::default(),
            stage: ConversationStage::default(),
        };
        let report_ref = &mut report;

        let state = self
            .store
            .update(
                session_id,
                Box::new(move |state: &mut ConversationState| {
                    if let Some(channel) = message.channel {
                        if state.messages().is_empty() {
                            state.channel = channel;
                        }
                    }
                    let turn = state.push_message(message.role, message.content.as_str());
                    report_ref.turn = turn;

                    if message.role != MessageRole::User {
                        return;
                    }
                    let facts = extractor.extract(&message.content, today);
                    report_ref.merge = apply_patch(
                        state,
                        &facts.to_patch(SlotSource::Deterministic, Some(turn)),
                    );
                    if let Some(intent) = facts.intent {
                        state.intent = Some(intent);
                    }
                    state.refresh_stage();
                    report_ref.extracted = facts.slots;
                    report_ref.intent = facts.intent;
                    report_ref.correction = facts.is_correction;
                }),
            )
            .await?;

        report.stage = state.stage();
        tracing::debug!(
            "[MessageIngestion] session={} turn={} extracted={:?} applied={:?}",
            session_id,
            report.turn,
            report.extracted.keys().collect::<Vec<_>>(),
            report.merge.applied
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use frontdesk_infrastructure::MemorySessionStore;

    fn use_case(store: Arc<MemorySessionStore>) -> MessageIngestionUseCase {
        MessageIngestionUseCase::new(
            store,
            Arc::new(SessionGate::new()),
            Arc::new(|| NaiveDate::from_ymd_opt(2025, 12, 3).unwrap()),
        )
    }

    fn user(content: &str) -> InboundMessage {
        InboundMessage {
            role: MessageRole::User,
            content: content.to_string(),
            channel: None,
        }
    }

    #[tokio::test]
    async fn test_user_turns_fill_slots() {
        let store = Arc::new(MemorySessionStore::new());
        let ingestion = use_case(store.clone());

        let report = ingestion
            .ingest("s1", user("Hi, my name is Ana Perez and I'd like to book a cleaning"))
            .await
            .unwrap();
        assert_eq!(report.turn, 0);
        assert_eq!(report.intent, Some(Intent::BookAppointment));
        assert_eq!(report.extracted.get(&SlotKey::FirstName).map(String::as_str), Some("Ana"));

        let state = store.get("s1").await.unwrap();
        assert_eq!(state.slots().value(SlotKey::LastName), Some("Perez"));
        assert_eq!(state.slots().value(SlotKey::AppointmentType), Some("cleaning"));
        assert_eq!(state.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_assistant_turns_are_not_extracted() {
        let store = Arc::new(MemorySessionStore::new());
        let ingestion = use_case(store.clone());

        let report = ingestion
            .ingest(
                "s2",
                InboundMessage {
                    role: MessageRole::Assistant,
                    content: "Is your number 619-555-1234?".into(),
                    channel: Some(Channel::Voice),
                },
            )
            .await
            .unwrap();
        assert!(report.extracted.is_empty());

        let state = store.get("s2").await.unwrap();
        assert!(state.slots().value(SlotKey::Phone).is_none());
        assert_eq!(state.channel, Channel::Voice);
    }

    #[tokio::test]
    async fn test_later_turn_does_not_overwrite_without_correction() {
        let store = Arc::new(MemorySessionStore::new());
        let ingestion = use_case(store.clone());

        ingestion.ingest("s3", user("my number is 619-555-1234")).await.unwrap();
        let report = ingestion.ingest("s3", user("or 858-555-9876")).await.unwrap();
        assert_eq!(report.merge.skipped.len(), 1);

        let report = ingestion
            .ingest("s3", user("actually, it's 858-555-9876"))
            .await
            .unwrap();
        assert!(report.correction);
        assert_eq!(report.merge.applied, vec![SlotKey::Phone]);
        assert_eq!(
            store.get("s3").await.unwrap().slots().value(SlotKey::Phone),
            Some("8585559876")
        );
    }

    #[tokio::test]
    async fn test_empty_content_is_rejected() {
        let ingestion = use_case(Arc::new(MemorySessionStore::new()));
        let error = ingestion.ingest("s4", user("   ")).await.unwrap_err();
        assert!(matches!(error, FrontdeskError::InvalidInput(_)));
    }
}
