//! Postgres adapter for the decisions table.

use async_trait::async_trait;
use sqlx::PgPool;

use super::DecisionStore;
use crate::error::{QaError, QaResult};
use crate::types::{Row, SqlParam};

pub struct PgDecisionStore {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PgDecisionStore {
    pub fn new(pool: PgPool, statement_timeout_ms: u64) -> Self {
        Self {
            pool,
            statement_timeout_ms,
        }
    }
}

/// Query failures are execution errors; losing the connection is a store
/// error.
fn map_sqlx(e: sqlx::Error) -> QaError {
    match e {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_) => QaError::Store(e.to_string()),
        other => QaError::Execution(other.to_string()),
    }
}

#[async_trait]
impl DecisionStore for PgDecisionStore {
    /// Each row comes back as one JSON object via `row_to_json`, so callers
    /// never deal with column types. The transaction is read-only and is
    /// always rolled back.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> QaResult<Vec<Row>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query("set transaction read only")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        sqlx::query(&format!("set local statement_timeout = {}", self.statement_timeout_ms))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        let wrapped = format!("SELECT row_to_json(q) FROM ({}) q", sql);
        let mut query = sqlx::query_scalar::<_, serde_json::Value>(&wrapped);
        for param in params {
            query = match param {
                SqlParam::Int(v) => query.bind(*v),
                SqlParam::Text(s) => query.bind(s.as_str()),
                SqlParam::Date(d) => query.bind(*d),
                SqlParam::Bool(b) => query.bind(*b),
            };
        }

        let values = query.fetch_all(&mut *tx).await.map_err(map_sqlx)?;
        tx.rollback().await.map_err(map_sqlx)?;

        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    async fn ping(&self) -> QaResult<()> {
        sqlx::query_scalar::<_, i32>("select 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QaError::Store(e.to_string()))?;
        Ok(())
    }
}
