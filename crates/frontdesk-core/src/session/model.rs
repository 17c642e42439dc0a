//! Conversation state domain model.

use super::merge::OverrideEvent;
use super::message::{Channel, ConversationMessage, MessageRole};
use super::slots::{IdentifierKey, Identifiers, SlotKey, Slots};
use super::stage::{ConversationStage, Intent, StageEvent};
use crate::ledger::CallRecord;
use serde::{Deserialize, Serialize};

/// Everything the engine knows about one conversation.
///
/// A state contains:
/// - The append-only message transcript
/// - Patient and appointment slots accumulated from the conversation
/// - Critical identifiers established by successful handler results
/// - The call ledger for every function-call attempt
/// - Override events for values discarded by the anti-hallucination guard
///
/// Fields guarded by invariants are private; mutation goes through
/// [`ConversationState::push_message`], the merge policy in
/// [`super::merge`] and [`crate::ledger::record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Opaque session key supplied by the channel adapter
    pub session_id: String,
    pub channel: Channel,
    messages: Vec<ConversationMessage>,
    pub(crate) slots: Slots,
    pub(crate) identifiers: Identifiers,
    /// Advisory conversation purpose
    pub intent: Option<Intent>,
    stage: ConversationStage,
    pub(crate) call_log: Vec<CallRecord>,
    pub(crate) override_events: Vec<OverrideEvent>,
    /// Timestamp when the state was created (ISO 8601 format)
    pub created_at: String,
    /// Timestamp when the state was last mutated (ISO 8601 format)
    pub updated_at: String,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>, channel: Channel) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            session_id: session_id.into(),
            channel,
            messages: Vec::new(),
            slots: Slots::default(),
            identifiers: Identifiers::default(),
            intent: None,
            stage: ConversationStage::default(),
            call_log: Vec::new(),
            override_events: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// The last `window` messages, oldest first.
    pub fn recent_messages(&self, window: usize) -> &[ConversationMessage] {
        let start = self.messages.len().saturating_sub(window);
        &self.messages[start..]
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    pub fn identifiers(&self) -> &Identifiers {
        &self.identifiers
    }

    pub fn stage(&self) -> ConversationStage {
        self.stage
    }

    pub fn call_log(&self) -> &[CallRecord] {
        &self.call_log
    }

    pub fn override_events(&self) -> &[OverrideEvent] {
        &self.override_events
    }

    /// Appends a message and returns its turn index.
    pub fn push_message(&mut self, role: MessageRole, content: impl Into<String>) -> usize {
        self.messages.push(ConversationMessage::new(role, content));
        self.messages.len() - 1
    }

    /// Appends override events produced outside the merge policy
    /// (the resolver's caller-parameter guard).
    pub fn record_overrides(&mut self, events: impl IntoIterator<Item = OverrideEvent>) {
        self.override_events.extend(events);
    }

    /// Marks the state as modified.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    /// Applies a stage event through the transition table.
    pub fn apply_stage_event(&mut self, event: StageEvent) {
        match self.stage.transition(event) {
            Some(next) if next != self.stage => {
                tracing::debug!(
                    "[ConversationState] session={} stage {} -> {} on {}",
                    self.session_id,
                    self.stage,
                    next,
                    event
                );
                self.stage = next;
            }
            _ => {}
        }
    }

    /// Re-derives stage events implied by the current slots and identifiers.
    pub fn refresh_stage(&mut self) {
        if self.identifiers.get(IdentifierKey::PatientId).is_some() {
            self.apply_stage_event(StageEvent::PatientIdentified);
        }
        if self.slots.get(SlotKey::Date).is_some() && self.slots.get(SlotKey::Time).is_some() {
            self.apply_stage_event(StageEvent::AppointmentDetailsComplete);
        }
    }
}
