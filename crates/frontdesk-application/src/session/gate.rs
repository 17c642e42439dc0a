use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Per-session request gate.
///
/// Holds one async mutex per session id so that a whole request pipeline
/// (resolve, extract, validate, dispatch, record) for a session runs to
/// completion before the next request for that session starts. Requests
/// for different sessions never wait on each other.
pub struct SessionGate {
    /// Session id -> gate
    gates: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SessionGate {
    /// Creates a new empty SessionGate.
    pub fn new() -> Self {
        Self {
            gates: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Waits for exclusive access to `session_id`.
    ///
    /// The map lock is only held for the lookup; waiting happens on the
    /// session's own mutex.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let existing = {
            let gates = self.gates.read().await;
            gates.get(session_id).cloned()
        };
        let gate = match existing {
            Some(gate) => gate,
            None => {
                let mut gates = self.gates.write().await;
                gates
                    .entry(session_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            }
        };
        tracing::trace!("[SessionGate] waiting for session {}", session_id);
        gate.lock_owned().await
    }

    /// Number of sessions that have been gated so far.
    pub async fn len(&self) -> usize {
        self.gates.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_is_exclusive() {
        let gate = Arc::new(SessionGate::new());
        let guard = gate.acquire("a").await;

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _guard = gate.acquire("a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_other_sessions_do_not_wait() {
        let gate = SessionGate::new();
        let _a = gate.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(200), gate.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(gate.len().await, 2);
    }
}
