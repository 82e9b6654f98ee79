//! Query routing pipeline
//!
//! ```text
//! RouteRequest
//!     │
//!     ▼
//! Matcher ──no match──► fallback rule? ──none──► NoMatch
//!     │ rule + extracted parameters
//!     ▼
//! materialize ──► Executor ──► map_fields ──► compose ──► RouteResponse
//! ```
//!
//! The pipeline stops at the first stop-causing error and turns it into a
//! `{success: false, error, message}` response. Store error text is logged,
//! never returned.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use intent_router_types::{ErrorKind, RouteRequest, RouteResponse};
use tracing::{info, instrument, warn};

use crate::catalog::{IntentRule, RuleCatalog, RuleSource};
use crate::dataset::SharedDataset;
use crate::error::{Result, RouterError};
use crate::executor::{Executor, RequestContext, SnapshotQueryStore, TableMap, DEFAULT_QUERY_TIMEOUT};
use crate::extraction::extract;
use crate::field_mapping::map_fields;
use crate::materialize::materialize;
use crate::matcher::Matcher;
use crate::response::compose;
use crate::snapshot::SwapCell;

pub const NO_MATCH_MESSAGE: &str =
    "抱歉，我没有理解您的问题…请尝试包含库存、测试、生产或批次等关键词。";
pub const EXECUTION_FAILED_MESSAGE: &str = "查询执行失败，请稍后重试。";
pub const TIMEOUT_MESSAGE: &str = "查询超时，请缩小查询范围后重试。";
pub const CANCELED_MESSAGE: &str = "查询已取消。";

pub struct QueryRouter {
    catalog: SwapCell<RuleCatalog>,
    executor: Executor,
    matcher: Matcher,
    query_timeout: Duration,
}

impl QueryRouter {
    pub fn new(catalog: RuleCatalog, executor: Executor) -> Self {
        Self {
            catalog: SwapCell::new(catalog),
            executor,
            matcher: Matcher::default(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Router answering from the staging dataset.
    pub fn staging(catalog: RuleCatalog, dataset: Arc<SharedDataset>, tables: TableMap) -> Self {
        let store = SnapshotQueryStore::with_tables(dataset, tables);
        Self::new(catalog, Executor::new(Arc::new(store)))
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Current catalog snapshot.
    pub fn catalog(&self) -> Arc<RuleCatalog> {
        self.catalog.load()
    }

    /// Publish a new catalog; in-flight requests keep the one they loaded.
    pub fn replace_catalog(&self, catalog: RuleCatalog) {
        info!(
            "Publishing rule catalog {} ({} rules)",
            &catalog.fingerprint()[..12],
            catalog.len()
        );
        self.catalog.replace(catalog);
    }

    /// Re-read the source and swap the catalog. A failed load keeps the current one.
    pub async fn reload_catalog(&self, source: &dyn RuleSource) -> anyhow::Result<Arc<RuleCatalog>> {
        let catalog = source
            .load()
            .await
            .with_context(|| format!("Catalog reload from {} failed", source.describe()))?;
        self.replace_catalog(catalog);
        Ok(self.catalog())
    }

    /// Fresh context with the router's default timeout.
    pub fn context(&self) -> RequestContext {
        RequestContext::new(self.query_timeout)
    }

    /// Route a request; every outcome becomes a response.
    #[instrument(
        skip(self, request, ctx),
        fields(request_id = %ctx.request_id, query = %request.query_text)
    )]
    pub async fn route(&self, request: &RouteRequest, ctx: &RequestContext) -> RouteResponse {
        match self.try_route(request, ctx).await {
            Ok(response) => response,
            Err(error) => {
                warn!("Routing stopped: {}", error);
                failure_response(&error)
            }
        }
    }

    /// Route a request, surfacing the stop cause as an error.
    pub async fn try_route(&self, request: &RouteRequest, ctx: &RequestContext) -> Result<RouteResponse> {
        let catalog = self.catalog.load();
        let matched = self
            .matcher
            .match_catalog(&request.query_text, &catalog, request.scenario_hint.as_deref());

        let (rule, extracted) = match matched.rule {
            Some(rule) => {
                info!(
                    "Matched rule {} '{}' (score {})",
                    rule.id, rule.name, matched.score
                );
                (rule, matched.extracted_parameters)
            }
            None => {
                let fallback = fallback_rule(&catalog)?;
                info!("No rule matched; falling back to '{}'", fallback.name);
                (fallback, extract(&request.query_text, fallback))
            }
        };

        let query = materialize(rule, &extracted)?;
        let raw_rows = self.executor.execute(&query, ctx).await?;
        let rows = map_fields(&raw_rows, &rule.result_fields);
        Ok(compose(rule, rows, catalog.chart_for(rule.category)))
    }
}

fn fallback_rule(catalog: &RuleCatalog) -> Result<&IntentRule> {
    catalog.fallback().ok_or(RouterError::NoMatch)
}

/// User-facing failure for a stop cause. Internal detail stays in the logs.
pub fn failure_response(error: &RouterError) -> RouteResponse {
    match error {
        RouterError::NoMatch => RouteResponse::failure(ErrorKind::NoMatch, NO_MATCH_MESSAGE),
        RouterError::MissingParameter { parameter, .. } => RouteResponse::failure(
            ErrorKind::MissingParameter,
            format!("请补充查询条件：{}", parameter),
        ),
        RouterError::Execution(execution) => {
            let message = match execution.cause() {
                intent_router_types::ExecutionCause::Timeout => TIMEOUT_MESSAGE,
                _ => EXECUTION_FAILED_MESSAGE,
            };
            RouteResponse::failure(ErrorKind::ExecutionError, message).with_cause(execution.cause())
        }
        RouterError::Canceled => RouteResponse::failure(ErrorKind::Canceled, CANCELED_MESSAGE),
    }
}

impl std::fmt::Debug for QueryRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRouter")
            .field("catalog", &self.catalog.load().fingerprint())
            .field("executor", &self.executor)
            .field("matcher", &self.matcher)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
