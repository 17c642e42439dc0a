//! Session store trait.
//!
//! Defines the interface for conversation state storage.

use super::merge::{MergeReport, SlotPatch, apply_patch};
use super::model::ConversationState;
use crate::error::Result;
use async_trait::async_trait;

/// A mutation applied to one session's state inside its critical section.
pub type StateMutation<'a> = Box<dyn FnOnce(&mut ConversationState) + Send + 'a>;

/// An abstract store of conversation states keyed by session id.
///
/// # Implementation Notes
///
/// Implementations must:
/// - Create an empty state on first reference to a session id
/// - Serialize `update` calls for the same session id
/// - Not block updates to unrelated session ids
/// - Never delete sessions (expiry is an external policy)
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns a snapshot of the session's state, creating it if absent.
    async fn get(&self, session_id: &str) -> Result<ConversationState>;

    /// Runs `mutation` against the session's state under its per-session
    /// lock and returns the resulting snapshot.
    async fn update<'a>(
        &self,
        session_id: &str,
        mutation: StateMutation<'a>,
    ) -> Result<ConversationState>;

    /// Returns a snapshot of the session's state, or `None` if the session
    /// was never referenced. Never creates a session.
    async fn find(&self, session_id: &str) -> Result<Option<ConversationState>>;

    /// Lists the ids of every session the store holds.
    async fn session_ids(&self) -> Result<Vec<String>>;

    /// Merges a slot patch using the precedence policy.
    async fn merge(
        &self,
        session_id: &str,
        patch: &SlotPatch,
    ) -> Result<(ConversationState, MergeReport)> {
        let mut report = MergeReport::default();
        let report_ref = &mut report;
        let state = self
            .update(
                session_id,
                Box::new(move |state: &mut ConversationState| {
                    *report_ref = apply_patch(state, patch);
                }),
            )
            .await?;
        Ok((state, report))
    }
}
