//! Query Executor
//!
//! Runs a validated [`CompiledQuery`] against the store behind a hard
//! timeout. Store error detail goes to the logs; callers only ever show a
//! generic message.

pub mod postgres;

pub use postgres::PgDecisionStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{QaError, QaResult};
use crate::types::{CompiledQuery, ExecutionResult, ResultShape, Row, SqlParam};

/// Narrow read-only interface to the decisions store.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> QaResult<Vec<Row>>;

    async fn ping(&self) -> QaResult<()>;
}

pub struct QueryExecutor {
    store: Arc<dyn DecisionStore>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn DecisionStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &Arc<dyn DecisionStore> {
        &self.store
    }

    pub async fn execute(&self, query: &CompiledQuery) -> QaResult<ExecutionResult> {
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.store.execute(&query.sql, &query.params)).await;

        let rows = match outcome {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                tracing::warn!(
                    provenance = %query.provenance,
                    error = %e,
                    sql = %query.sql,
                    "Query execution failed"
                );
                return Err(e);
            }
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                tracing::warn!(provenance = %query.provenance, timeout_ms = timeout_ms, "Query timed out");
                return Err(QaError::timeout("executor", timeout_ms));
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let scalar = match query.shape {
            ResultShape::ScalarCount => rows.first().and_then(scalar_value),
            _ => None,
        };

        tracing::info!(
            provenance = %query.provenance,
            rows = rows.len(),
            duration_ms = duration_ms,
            "Query executed"
        );

        Ok(ExecutionResult {
            row_count: rows.len(),
            rows,
            scalar,
            duration_ms,
            success: true,
        })
    }

    pub async fn health(&self) -> QaResult<()> {
        tokio::time::timeout(self.timeout, self.store.ping())
            .await
            .map_err(|_| QaError::timeout("executor", self.timeout.as_millis() as u64))?
    }
}

/// The count column of a one-row aggregate, falling back to the first
/// integer in the row.
fn scalar_value(row: &Row) -> Option<i64> {
    ["decision_count", "count"]
        .iter()
        .find_map(|key| row.get(*key).and_then(|v| v.as_i64()))
        .or_else(|| row.values().find_map(|v| v.as_i64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provenance;
    use serde_json::json;

    struct FixedStore {
        rows: Vec<Row>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl DecisionStore for FixedStore {
        async fn execute(&self, _sql: &str, _params: &[SqlParam]) -> QaResult<Vec<Row>> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(QaError::Execution("relation \"x\" does not exist".into()));
            }
            Ok(self.rows.clone())
        }

        async fn ping(&self) -> QaResult<()> {
            Ok(())
        }
    }

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn query(shape: ResultShape) -> CompiledQuery {
        CompiledQuery {
            sql: "SELECT COUNT(*) AS decision_count FROM t".into(),
            params: vec![],
            shape,
            provenance: Provenance::Template("count".into()),
            confidence: 0.9,
            rankable: false,
        }
    }

    #[tokio::test]
    async fn test_scalar_count_is_extracted() {
        let store = FixedStore {
            rows: vec![row(json!({"decision_count": 42}))],
            delay: Duration::ZERO,
            fail: false,
        };
        let executor = QueryExecutor::new(Arc::new(store), Duration::from_secs(1));
        let result = executor.execute(&query(ResultShape::ScalarCount)).await.unwrap();
        assert_eq!(result.scalar, Some(42));
        assert_eq!(result.row_count, 1);
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_upstream_timeout() {
        let store = FixedStore {
            rows: vec![],
            delay: Duration::from_millis(200),
            fail: false,
        };
        let executor = QueryExecutor::new(Arc::new(store), Duration::from_millis(20));
        let err = executor.execute(&query(ResultShape::MultipleRows)).await.unwrap_err();
        assert_eq!(err.kind(), "upstream_timeout");
    }

    #[tokio::test]
    async fn test_store_rejection_is_execution_error() {
        let store = FixedStore {
            rows: vec![],
            delay: Duration::ZERO,
            fail: true,
        };
        let executor = QueryExecutor::new(Arc::new(store), Duration::from_secs(1));
        let err = executor.execute(&query(ResultShape::MultipleRows)).await.unwrap_err();
        assert_eq!(err.kind(), "execution");
    }
}
