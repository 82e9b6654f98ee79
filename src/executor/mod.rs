//! Executor
//!
//! Runs a materialized query against a [`QueryStore`] under the request's
//! timeout and cancel signal. This is the only suspension point of the
//! pipeline. No retries: a failure is classified and surfaced once.
//!
//! Stores:
//! - [`PgQueryStore`] - Postgres via sqlx (feature `database`)
//! - [`SnapshotQueryStore`] - staging mode over the shared dataset snapshot

mod evaluate;
#[cfg(feature = "database")]
pub mod postgres;
pub mod staging;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{ExecutionError, RouterError, StoreError};
use crate::materialize::MaterializedQuery;

#[cfg(feature = "database")]
pub use postgres::PgQueryStore;
pub use staging::{SnapshotQueryStore, TableMap};

/// One result row: column name → value, in store column order.
pub type RawRow = Map<String, Value>;

/// Backing store that runs parameterized queries.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Label for logs.
    fn name(&self) -> &str;

    /// Run `sql` with `$1..$n` bound to `params` in order.
    async fn run_query(&self, sql: &str, params: &[String]) -> Result<Vec<RawRow>, StoreError>;
}

// ============================================================================
// Request context
// ============================================================================

/// Default per-query time budget.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request execution context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub timeout: Duration,
    cancel: Option<watch::Receiver<bool>>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT)
    }
}

impl RequestContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timeout,
            cancel: None,
        }
    }

    /// Context plus the handle that cancels it.
    pub fn cancelable(timeout: Duration) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancel: Some(rx),
            ..Self::new(timeout)
        };
        (ctx, CancelHandle { tx })
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once cancel is signalled; never resolves otherwise.
    async fn canceled(&self) {
        let Some(mut rx) = self.cancel.clone() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without canceling.
                return std::future::pending().await;
            }
        }
    }
}

/// Cancels the request it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

// ============================================================================
// Executor
// ============================================================================

#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn QueryStore>,
}

impl Executor {
    pub fn new(store: Arc<dyn QueryStore>) -> Self {
        Self { store }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Run the query; `Canceled` wins over a concurrently finishing store call.
    pub async fn execute(
        &self,
        query: &MaterializedQuery,
        ctx: &RequestContext,
    ) -> Result<Vec<RawRow>, RouterError> {
        if ctx.is_canceled() {
            return Err(RouterError::Canceled);
        }

        let values = query.values();
        let started = Instant::now();
        let run = tokio::time::timeout(ctx.timeout, self.store.run_query(&query.sql, &values));

        let outcome = tokio::select! {
            biased;
            _ = ctx.canceled() => {
                debug!(request_id = %ctx.request_id, "Query for rule {} canceled", query.rule_id);
                return Err(RouterError::Canceled);
            }
            outcome = run => outcome,
        };

        let rows = match outcome {
            Err(_elapsed) => {
                warn!(
                    request_id = %ctx.request_id,
                    "Query for rule {} exceeded {}ms on {}",
                    query.rule_id,
                    ctx.timeout.as_millis(),
                    self.store.name()
                );
                return Err(ExecutionError::Timeout(ctx.timeout).into());
            }
            Ok(Err(store_error)) => {
                let err = ExecutionError::from(store_error);
                match &err {
                    ExecutionError::MalformedQuery(_) => {
                        error!(request_id = %ctx.request_id, "Rule {} query rejected: {}", query.rule_id, err)
                    }
                    _ => warn!(request_id = %ctx.request_id, "Rule {} query failed: {}", query.rule_id, err),
                }
                return Err(err.into());
            }
            Ok(Ok(rows)) => rows,
        };

        debug!(
            request_id = %ctx.request_id,
            "Rule {} returned {} rows from {} in {:?}",
            query.rule_id,
            rows.len(),
            self.store.name(),
            started.elapsed()
        );
        Ok(rows)
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("store", &self.store.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::{BoundParam, ValueSource};
    use serde_json::json;

    struct FixedStore(Vec<RawRow>);

    #[async_trait]
    impl QueryStore for FixedStore {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn run_query(&self, _sql: &str, params: &[String]) -> Result<Vec<RawRow>, StoreError> {
            assert_eq!(params, ["深圳工厂".to_string()]);
            Ok(self.0.clone())
        }
    }

    struct SlowStore;

    #[async_trait]
    impl QueryStore for SlowStore {
        fn name(&self) -> &str {
            "slow"
        }

        async fn run_query(&self, _sql: &str, _params: &[String]) -> Result<Vec<RawRow>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![])
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl QueryStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }

        async fn run_query(&self, _sql: &str, _params: &[String]) -> Result<Vec<RawRow>, StoreError> {
            Err(StoreError::Rejected("syntax error at or near \"FORM\"".into()))
        }
    }

    fn query() -> MaterializedQuery {
        MaterializedQuery {
            rule_id: 1,
            sql: "SELECT * FROM inventory WHERE factory = $1".into(),
            params: vec![BoundParam {
                name: "factory".into(),
                value: "深圳工厂".into(),
                source: ValueSource::Extracted,
            }],
        }
    }

    #[tokio::test]
    async fn test_execute_returns_rows() {
        let row = match json!({"factory": "深圳工厂"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let executor = Executor::new(Arc::new(FixedStore(vec![row])));
        let rows = executor.execute(&query(), &RequestContext::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_execution_error() {
        let executor = Executor::new(Arc::new(SlowStore));
        let ctx = RequestContext::new(Duration::from_millis(50));
        match executor.execute(&query(), &ctx).await {
            Err(RouterError::Execution(ExecutionError::Timeout(d))) => {
                assert_eq!(d, Duration::from_millis(50))
            }
            other => panic!("Expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_store_call() {
        let executor = Executor::new(Arc::new(SlowStore));
        let (ctx, handle) = RequestContext::cancelable(Duration::from_secs(120));
        let task = tokio::spawn(async move { executor.execute(&query(), &ctx).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert!(matches!(task.await.unwrap(), Err(RouterError::Canceled)));
    }

    #[tokio::test]
    async fn test_already_canceled_skips_store() {
        let executor = Executor::new(Arc::new(BrokenStore));
        let (ctx, handle) = RequestContext::cancelable(DEFAULT_QUERY_TIMEOUT);
        handle.cancel();
        assert!(matches!(
            executor.execute(&query(), &ctx).await,
            Err(RouterError::Canceled)
        ));
    }

    #[tokio::test]
    async fn test_store_rejection_is_malformed_query() {
        let executor = Executor::new(Arc::new(BrokenStore));
        let err = executor
            .execute(&query(), &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::Execution(ExecutionError::MalformedQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let row = match json!({"factory": "深圳工厂"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let executor = Executor::new(Arc::new(FixedStore(vec![row])));
        let (ctx, handle) = RequestContext::cancelable(DEFAULT_QUERY_TIMEOUT);
        drop(handle);
        assert!(executor.execute(&query(), &ctx).await.is_ok());
    }
}
