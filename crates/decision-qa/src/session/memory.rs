//! In-process session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{SessionState, SessionStore, SessionUpdate};
use crate::error::QaResult;

/// DashMap of per-session async mutexes. Different sessions never contend;
/// updates to one session are serialised by its mutex.
pub struct InMemorySessionStore {
    sessions: DashMap<String, Arc<Mutex<SessionState>>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn slot(&self, id: &str) -> Arc<Mutex<SessionState>> {
        // Clone the Arc out so the shard lock is not held across an await.
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::new(id))))
            .clone()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> QaResult<Option<SessionState>> {
        let slot = match self.sessions.get(id) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        let state = slot.lock().await;
        if state.is_expired(Utc::now(), self.ttl) {
            return Ok(None);
        }
        Ok(Some(state.clone()))
    }

    async fn update(&self, id: &str, update: SessionUpdate) -> QaResult<SessionState> {
        let slot = self.slot(id);
        let mut state = slot.lock().await;
        if state.is_expired(Utc::now(), self.ttl) {
            tracing::debug!(session_id = %id, "Session expired, starting fresh");
            *state = SessionState::new(id);
        }
        update(&mut state);
        state.touch();
        Ok(state.clone())
    }

    async fn remove(&self, id: &str) -> QaResult<()> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn evict_expired(&self, now: DateTime<Utc>) -> QaResult<usize> {
        let before = self.sessions.len();
        self.sessions.retain(|_, slot| match slot.try_lock() {
            Ok(state) => !state.is_expired(now, self.ttl),
            // Someone is mid-update, so the session is live.
            Err(_) => true,
        });
        Ok(before.saturating_sub(self.sessions.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResultRef;

    fn result(n: &str) -> ResultRef {
        ResultRef {
            decision_number: Some(n.to_string()),
            government_number: Some(37),
            title: None,
        }
    }

    #[tokio::test]
    async fn test_update_creates_and_persists() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        assert!(store.get("s1").await.unwrap().is_none());

        store
            .update("s1", Box::new(|s| s.last_results = vec![result("1"), result("2")]))
            .await
            .unwrap();
        let state = store.get("s1").await.unwrap().unwrap();
        assert_eq!(state.last_results.len(), 2);
        assert!(store.get("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_atomic() {
        let store = Arc::new(InMemorySessionStore::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update("s", Box::new(move |s| s.last_results.push(result(&i.to_string()))))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let state = store.get("s").await.unwrap().unwrap();
        assert_eq!(state.last_results.len(), 50);
    }

    #[tokio::test]
    async fn test_evict_expired() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        store.update("old", Box::new(|_| {})).await.unwrap();
        store.update("new", Box::new(|_| {})).await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(store.evict_expired(later).await.unwrap(), 2);
        assert!(store.is_empty());

        store.update("kept", Box::new(|_| {})).await.unwrap();
        assert_eq!(store.evict_expired(Utc::now()).await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_restarts_empty() {
        let store = InMemorySessionStore::new(Duration::from_millis(10));
        store
            .update("s", Box::new(|s| s.last_results = vec![result("9")]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("s").await.unwrap().is_none());
        let state = store.update("s", Box::new(|_| {})).await.unwrap();
        assert!(state.last_results.is_empty());
    }
}
