//! Intent Router - keyword intent matching and query materialization
//!
//! Turns a free-text question about inventory, test or production records
//! into a parameterized query, runs it, and returns display-ready rows,
//! summary cards or a chart payload.
//!
//! ## Pipeline
//!
//! query text -> Matcher -> Parameter Extractor -> Query Materializer
//! -> Executor -> Field Mapper -> Response Composer -> response
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use intent_router::catalog::YamlRuleSource;
//! use intent_router::dataset::SharedDataset;
//! use intent_router::executor::TableMap;
//! use intent_router::router::QueryRouter;
//! use intent_router_types::RouteRequest;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let catalog = YamlRuleSource::new("config/intent_rules").load_catalog()?;
//! let dataset = Arc::new(SharedDataset::new());
//! let router = QueryRouter::staging(catalog, dataset, TableMap::default());
//!
//! let ctx = router.context();
//! let response = router.route(&RouteRequest::new("查询深圳工厂库存"), &ctx).await;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Rule model, sources and validation
pub mod catalog;

// Matching and extraction (pure)
pub mod extraction;
pub mod matcher;
pub mod text;

// Query materialization and execution
pub mod database;
pub mod executor;
pub mod materialize;

// Result shaping
pub mod field_mapping;
pub mod response;

// Shared state
pub mod dataset;
pub mod snapshot;

pub mod config;
pub mod router;

pub use catalog::{IntentRule, RuleCatalog, RuleSource, YamlRuleSource};
pub use config::{RouterConfig, StoreMode};
pub use error::{CatalogError, ExecutionError, RouterError, StoreError};
pub use executor::{Executor, QueryStore, RawRow, RequestContext};
pub use matcher::{MatchResult, Matcher};
pub use router::QueryRouter;

pub use intent_router_types as types;
