//! In-memory session store.

use async_trait::async_trait;
use frontdesk_core::error::Result;
use frontdesk_core::session::{Channel, ConversationState, SessionStore, StateMutation};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Process-local [`SessionStore`].
///
/// Each session sits behind its own mutex. The outer map lock is held only
/// to look up or insert an entry, so a slow update to one session never
/// blocks another. Sessions are never evicted.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<ConversationState>>>>,
    /// Channel given to sessions first seen through a function call
    default_channel: Channel,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_default_channel(Channel::default())
    }

    pub fn with_default_channel(default_channel: Channel) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_channel,
        }
    }

    async fn entry(&self, session_id: &str) -> Arc<Mutex<ConversationState>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(state) = sessions.get(session_id) {
                return state.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!("[MemorySessionStore] creating session {}", session_id);
                Arc::new(Mutex::new(ConversationState::new(
                    session_id,
                    self.default_channel,
                )))
            })
            .clone()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<ConversationState> {
        let entry = self.entry(session_id).await;
        let state = entry.lock().await;
        Ok(state.clone())
    }

    async fn update<'a>(
        &self,
        session_id: &str,
        mutation: StateMutation<'a>,
    ) -> Result<ConversationState> {
        let entry = self.entry(session_id).await;
        let mut state = entry.lock().await;
        mutation(&mut *state);
        Ok(state.clone())
    }

    async fn find(&self, session_id: &str) -> Result<Option<ConversationState>> {
        let entry = self.sessions.read().await.get(session_id).cloned();
        match entry {
            Some(entry) => Ok(Some(entry.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn session_ids(&self) -> Result<Vec<String>> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontdesk_core::session::{MessageRole, SlotKey, SlotPatch, SlotSource};
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_reference_creates_empty_state() {
        let store = MemorySessionStore::with_default_channel(Channel::Sms);
        let state = store.get("new").await.unwrap();
        assert_eq!(state.session_id, "new");
        assert_eq!(state.channel, Channel::Sms);
        assert!(state.messages().is_empty());
        assert_eq!(store.session_ids().await.unwrap(), vec!["new"]);
    }

    #[tokio::test]
    async fn test_find_does_not_create_sessions() {
        let store = MemorySessionStore::new();
        assert!(store.find("ghost").await.unwrap().is_none());
        assert!(store.session_ids().await.unwrap().is_empty());

        store.get("known").await.unwrap();
        let found = store.find("known").await.unwrap().unwrap();
        assert_eq!(found.session_id, "known");
        assert_eq!(store.session_ids().await.unwrap(), vec!["known"]);
    }

    #[tokio::test]
    async fn test_update_and_merge_persist() {
        let store = MemorySessionStore::new();
        store
            .update(
                "s",
                Box::new(|state: &mut ConversationState| {
                    state.push_message(MessageRole::User, "hi");
                }),
            )
            .await
            .unwrap();
        let (state, report) = store
            .merge(
                "s",
                &SlotPatch::new(SlotSource::Deterministic).with_slot(SlotKey::FirstName, "Ana"),
            )
            .await
            .unwrap();

        assert_eq!(report.applied, vec![SlotKey::FirstName]);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(
            store.get("s").await.unwrap().slots().value(SlotKey::FirstName),
            Some("Ana")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let store = Arc::new(MemorySessionStore::new());
        let tasks = (0..32).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update(
                        "busy",
                        Box::new(move |state: &mut ConversationState| {
                            state.push_message(MessageRole::User, format!("message {}", i));
                        }),
                    )
                    .await
                    .unwrap();
            })
        });
        for joined in futures::future::join_all(tasks).await {
            joined.unwrap();
        }
        assert_eq!(store.get("busy").await.unwrap().messages().len(), 32);
    }

    #[tokio::test]
    async fn test_sessions_do_not_block_each_other() {
        let store = Arc::new(MemorySessionStore::new());
        let entry = store.entry("slow").await;
        let _held = entry.lock().await;

        let other = tokio::time::timeout(Duration::from_millis(200), store.get("fast")).await;
        assert!(other.is_ok());
    }
}
