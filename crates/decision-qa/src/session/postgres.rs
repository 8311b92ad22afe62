//! Postgres-backed session store for multi-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;

use super::{SessionState, SessionStore, SessionUpdate};
use crate::error::{QaError, QaResult};

pub struct PgSessionStore {
    pool: PgPool,
    ttl: Duration,
}

impl PgSessionStore {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    pub async fn ensure_schema(&self) -> QaResult<()> {
        sqlx::query(
            "create table if not exists qa_sessions (
                id text primary key,
                state jsonb not null,
                last_access timestamptz not null
             )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QaError::Store(e.to_string()))?;

        sqlx::query("create index if not exists qa_sessions_last_access_idx on qa_sessions (last_access)")
            .execute(&self.pool)
            .await
            .map_err(|e| QaError::Store(e.to_string()))?;

        Ok(())
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        ChronoDuration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn get(&self, id: &str) -> QaResult<Option<SessionState>> {
        let row = sqlx::query("select state from qa_sessions where id = $1 and last_access >= $2")
            .bind(id)
            .bind(self.cutoff(Utc::now()))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QaError::Store(e.to_string()))?;

        match row {
            Some(row) => {
                let Json(state): Json<SessionState> = row
                    .try_get("state")
                    .map_err(|e| QaError::Session(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, id: &str, update: SessionUpdate) -> QaResult<SessionState> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| QaError::Store(e.to_string()))?;

        sqlx::query(
            "insert into qa_sessions (id, state, last_access)
             values ($1, $2, $3)
             on conflict (id) do nothing",
        )
        .bind(id)
        .bind(Json(SessionState::new(id)))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| QaError::Store(e.to_string()))?;

        // Row lock holds until commit, serialising writers across processes.
        let row = sqlx::query("select state from qa_sessions where id = $1 for update")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| QaError::Store(e.to_string()))?;

        let Json(mut state): Json<SessionState> = row
            .try_get("state")
            .map_err(|e| QaError::Session(e.to_string()))?;

        if state.is_expired(Utc::now(), self.ttl) {
            state = SessionState::new(id);
        }
        update(&mut state);
        state.touch();

        sqlx::query("update qa_sessions set state = $1, last_access = $2 where id = $3")
            .bind(Json(&state))
            .bind(state.last_access)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| QaError::Store(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| QaError::Store(e.to_string()))?;

        Ok(state)
    }

    async fn remove(&self, id: &str) -> QaResult<()> {
        sqlx::query("delete from qa_sessions where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| QaError::Store(e.to_string()))?;
        Ok(())
    }

    async fn evict_expired(&self, now: DateTime<Utc>) -> QaResult<usize> {
        let result = sqlx::query("delete from qa_sessions where last_access < $1")
            .bind(self.cutoff(now))
            .execute(&self.pool)
            .await
            .map_err(|e| QaError::Store(e.to_string()))?;
        Ok(result.rows_affected() as usize)
    }
}
