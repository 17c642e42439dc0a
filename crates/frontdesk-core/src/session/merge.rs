//! Slot merge precedence policy.
//!
//! Every write to slots goes through [`apply_patch`]. Identifier proposals
//! are never applied here; only [`crate::ledger::record`] may promote an
//! identifier.

use super::model::ConversationState;
use super::slots::{IdentifierKey, SlotKey, SlotSource, SlotValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an incoming value treats an already-filled slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Only empty slots (or guesses from the same turn) are written
    #[default]
    FillEmpty,
    /// The caller explicitly corrected an earlier fact
    Correction,
}

/// A partial update to a conversation's slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPatch {
    pub slots: BTreeMap<SlotKey, String>,
    /// Proposed identifier values. Recorded as override events, never applied.
    pub identifiers: BTreeMap<IdentifierKey, String>,
    pub source: SlotSource,
    pub turn: Option<usize>,
    pub mode: MergeMode,
}

impl SlotPatch {
    pub fn new(source: SlotSource) -> Self {
        Self {
            slots: BTreeMap::new(),
            identifiers: BTreeMap::new(),
            source,
            turn: None,
            mode: MergeMode::FillEmpty,
        }
    }

    pub fn with_slot(mut self, key: SlotKey, value: impl Into<String>) -> Self {
        self.slots.insert(key, value.into());
        self
    }

    pub fn with_identifier(mut self, key: IdentifierKey, value: impl Into<String>) -> Self {
        self.identifiers.insert(key, value.into());
        self
    }

    pub fn at_turn(mut self, turn: usize) -> Self {
        self.turn = Some(turn);
        self
    }

    pub fn as_correction(mut self) -> Self {
        self.mode = MergeMode::Correction;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.identifiers.is_empty()
    }
}

/// Where a discarded identifier value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverrideOrigin {
    /// A caller-supplied function parameter
    CallerParameter { function_name: String },
    /// A slot patch (ingestion or extraction fallback)
    SlotMerge { source: SlotSource },
}

/// Audit record for a value that lost to an authoritative identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEvent {
    /// Wire field name (`PatNum`) or identifier name (`patient_id`)
    pub field: String,
    pub identifier: IdentifierKey,
    /// Authoritative value that was kept, if any
    pub kept: Option<i64>,
    pub discarded: String,
    pub origin: OverrideOrigin,
    pub at: String,
}

impl OverrideEvent {
    pub fn new(
        field: impl Into<String>,
        identifier: IdentifierKey,
        kept: Option<i64>,
        discarded: impl Into<String>,
        origin: OverrideOrigin,
    ) -> Self {
        Self {
            field: field.into(),
            identifier,
            kept,
            discarded: discarded.into(),
            origin,
            at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A non-critical value that was not written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSlot {
    pub key: SlotKey,
    pub existing: String,
    pub incoming: String,
}

/// Outcome of one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub applied: Vec<SlotKey>,
    pub skipped: Vec<SkippedSlot>,
    pub overrides: Vec<OverrideEvent>,
}

impl MergeReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.skipped.is_empty() && self.overrides.is_empty()
    }
}

/// Applies `patch` to `state` field by field.
///
/// Non-critical slots:
/// - empty slot: written
/// - same value: untouched
/// - correction patch: overwritten
/// - value from the same turn and source: superseded
/// - anything else: skipped and reported
pub fn apply_patch(state: &mut ConversationState, patch: &SlotPatch) -> MergeReport {
    let mut report = MergeReport::default();
    let now = chrono::Utc::now().to_rfc3339();

    for (&key, incoming) in &patch.slots {
        let incoming = incoming.trim();
        if incoming.is_empty() {
            continue;
        }

        let entry = state.slots.entry(key);
        let write = match entry.as_ref() {
            None => true,
            Some(existing) if existing.value == incoming => false,
            Some(_) if patch.mode == MergeMode::Correction => true,
            Some(existing) => {
                let same_utterance = patch.turn.is_some()
                    && existing.turn == patch.turn
                    && existing.source == patch.source;
                if !same_utterance {
                    report.skipped.push(SkippedSlot {
                        key,
                        existing: existing.value.clone(),
                        incoming: incoming.to_string(),
                    });
                }
                same_utterance
            }
        };

        if write {
            *entry = Some(SlotValue {
                value: incoming.to_string(),
                source: patch.source,
                turn: patch.turn,
                updated_at: now.clone(),
            });
            report.applied.push(key);
        }
    }

    for (&key, incoming) in &patch.identifiers {
        let kept = state.identifiers.value(key);
        if kept.map(|v| v.to_string()).as_deref() == Some(incoming.trim()) {
            continue;
        }
        tracing::warn!(
            "[SessionMerge] session={} discarded {} proposal '{}' from {:?} (kept {:?})",
            state.session_id,
            key,
            incoming,
            patch.source,
            kept
        );
        report.overrides.push(OverrideEvent::new(
            key.to_string(),
            key,
            kept,
            incoming.trim(),
            OverrideOrigin::SlotMerge {
                source: patch.source,
            },
        ));
    }

    if !report.overrides.is_empty() {
        state.record_overrides(report.overrides.iter().cloned());
    }
    if !report.applied.is_empty() || !report.overrides.is_empty() {
        state.refresh_stage();
        state.touch();
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::message::Channel;

    fn state() -> ConversationState {
        ConversationState::new("merge-test", Channel::Web)
    }

    #[test]
    fn test_fills_empty_slots() {
        let mut state = state();
        let patch = SlotPatch::new(SlotSource::Deterministic)
            .with_slot(SlotKey::FirstName, "Ana")
            .with_slot(SlotKey::Phone, "6195551234")
            .at_turn(0);

        let report = apply_patch(&mut state, &patch);

        assert_eq!(report.applied, vec![SlotKey::FirstName, SlotKey::Phone]);
        assert_eq!(state.slots().value(SlotKey::FirstName), Some("Ana"));
        assert_eq!(state.slots().get(SlotKey::Phone).unwrap().turn, Some(0));
    }

    #[test]
    fn test_later_turn_does_not_erase_earlier_fact() {
        let mut state = state();
        apply_patch(
            &mut state,
            &SlotPatch::new(SlotSource::Deterministic)
                .with_slot(SlotKey::Date, "2025-12-05")
                .at_turn(0),
        );

        let report = apply_patch(
            &mut state,
            &SlotPatch::new(SlotSource::Deterministic)
                .with_slot(SlotKey::Date, "2025-12-09")
                .at_turn(4),
        );

        assert!(report.applied.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].existing, "2025-12-05");
        assert_eq!(state.slots().value(SlotKey::Date), Some("2025-12-05"));
    }

    #[test]
    fn test_same_turn_supersedes_and_correction_overwrites() {
        let mut state = state();
        apply_patch(
            &mut state,
            &SlotPatch::new(SlotSource::Deterministic)
                .with_slot(SlotKey::LastName, "Smit")
                .at_turn(2),
        );
        apply_patch(
            &mut state,
            &SlotPatch::new(SlotSource::Deterministic)
                .with_slot(SlotKey::LastName, "Smith")
                .at_turn(2),
        );
        assert_eq!(state.slots().value(SlotKey::LastName), Some("Smith"));

        let report = apply_patch(
            &mut state,
            &SlotPatch::new(SlotSource::Deterministic)
                .with_slot(SlotKey::LastName, "Smythe")
                .at_turn(5)
                .as_correction(),
        );
        assert_eq!(report.applied, vec![SlotKey::LastName]);
        assert_eq!(state.slots().value(SlotKey::LastName), Some("Smythe"));
    }

    #[test]
    fn test_identifier_proposals_become_override_events() {
        let mut state = state();
        let report = apply_patch(
            &mut state,
            &SlotPatch::new(SlotSource::Llm).with_identifier(IdentifierKey::PatientId, "99"),
        );

        assert_eq!(report.overrides.len(), 1);
        assert_eq!(report.overrides[0].kept, None);
        assert_eq!(report.overrides[0].discarded, "99");
        assert!(state.identifiers().get(IdentifierKey::PatientId).is_none());
        assert_eq!(state.override_events().len(), 1);
    }
}
