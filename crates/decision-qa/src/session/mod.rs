//! Conversation session state.
//!
//! Session state is the only mutable structure shared across turns. It sits
//! behind [`SessionStore`], whose `update` is an atomic read-modify-write per
//! session id. Expiry is explicit: stores drop idle sessions in
//! `evict_expired`, which the background sweeper calls on an interval.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use crate::error::QaResult;
use crate::types::{ExtractedEntities, ResultRef, Turn};

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub turns: Vec<Turn>,
    /// Entities of the last turn that reached the store.
    pub last_entities: ExtractedEntities,
    /// Records shown by the last list or detail answer, in display order.
    pub last_results: Vec<ResultRef>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

impl SessionState {
    pub fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            turns: Vec::new(),
            last_entities: ExtractedEntities::default(),
            last_results: Vec::new(),
            created_at: now,
            last_access: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_access = Utc::now();
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match ChronoDuration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.last_access) > ttl,
            Err(_) => false,
        }
    }

    /// Append a finalized turn, dropping the oldest beyond `max_turns`.
    pub fn push_turn(&mut self, turn: Turn, max_turns: usize) {
        self.turns.push(turn);
        if self.turns.len() > max_turns {
            let excess = self.turns.len() - max_turns;
            self.turns.drain(..excess);
        }
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// Mutation applied under the store's per-session lock.
pub type SessionUpdate = Box<dyn FnOnce(&mut SessionState) + Send>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Snapshot of a live session. Expired sessions read as absent.
    async fn get(&self, id: &str) -> QaResult<Option<SessionState>>;

    /// Atomically apply `update`, creating the session when missing, and
    /// return the state as written.
    async fn update(&self, id: &str, update: SessionUpdate) -> QaResult<SessionState>;

    async fn remove(&self, id: &str) -> QaResult<()>;

    /// Drop sessions idle for longer than the store's TTL. Returns how many.
    async fn evict_expired(&self, now: DateTime<Utc>) -> QaResult<usize>;
}

// ---------------------------------------------------------------------------
// Turn ordering
// ---------------------------------------------------------------------------

/// Serialises turns of one session in arrival order within this process.
///
/// `tokio::sync::Mutex` is fair, so waiters acquire in FIFO order. Different
/// sessions never contend.
#[derive(Default)]
pub struct SessionGate {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Forget locks nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Something else that wants a periodic expiry pass alongside sessions.
pub trait Sweepable: Send + Sync {
    fn sweep(&self) -> usize;
}

impl Sweepable for SessionGate {
    fn sweep(&self) -> usize {
        self.prune()
    }
}

/// Evict idle sessions (and anything else registered) every `interval`.
pub fn spawn_session_sweeper(
    store: Arc<dyn SessionStore>,
    extras: Vec<Arc<dyn Sweepable>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.evict_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(evicted) => tracing::info!(evicted = evicted, "Evicted idle sessions"),
                Err(e) => tracing::warn!("Session sweep failed: {}", e),
            }
            for extra in &extras {
                let swept = extra.sweep();
                if swept > 0 {
                    tracing::debug!(swept = swept, "Swept expired entries");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Intent, Route};
    use uuid::Uuid;

    fn turn(text: &str) -> Turn {
        Turn {
            id: Uuid::new_v4(),
            raw_text: text.to_string(),
            normalized_text: text.to_string(),
            intent: Intent::DataQuery,
            confidence: 0.8,
            entities: ExtractedEntities::default(),
            resolved_entities: ExtractedEntities::default(),
            route: Route::Proceed,
            compiled_query: None,
            result_summary: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_push_turn_caps_history() {
        let mut state = SessionState::new("s");
        for i in 0..5 {
            state.push_turn(turn(&format!("t{}", i)), 3);
        }
        assert_eq!(state.turns.len(), 3);
        assert_eq!(state.turns[0].raw_text, "t2");
        assert_eq!(state.last_turn().map(|t| t.raw_text.as_str()), Some("t4"));
    }

    #[test]
    fn test_expiry() {
        let mut state = SessionState::new("s");
        state.last_access = Utc::now() - ChronoDuration::seconds(120);
        assert!(state.is_expired(Utc::now(), Duration::from_secs(60)));
        assert!(!state.is_expired(Utc::now(), Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn test_gate_serialises_in_arrival_order() {
        let gate = Arc::new(SessionGate::new());
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let first = gate.acquire("s").await;
        let mut handles = Vec::new();
        for i in 0..3 {
            let gate = gate.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _guard = gate.acquire("s").await;
                order.lock().push(i);
            }));
            // Let each task queue up before spawning the next.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        drop(first);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_gate_prune_keeps_held_locks() {
        let gate = SessionGate::new();
        let held = gate.acquire("a").await;
        drop(gate.acquire("b").await);
        assert_eq!(gate.prune(), 1);
        assert_eq!(gate.len(), 1);
        drop(held);
        assert_eq!(gate.prune(), 1);
        assert!(gate.is_empty());
    }
}
