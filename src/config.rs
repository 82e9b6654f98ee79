//! Router configuration
//!
//! Optional YAML file, then environment overrides:
//!
//! | Variable                   | Field              |
//! |----------------------------|--------------------|
//! | `ROUTER_RULES_PATH`        | `rules_path`       |
//! | `ROUTER_QUERY_TIMEOUT_MS`  | `query_timeout_ms` |
//! | `ROUTER_MIN_SCORE`         | `min_score`        |
//! | `ROUTER_STORE_MODE`        | `store_mode`       |
//! | `DATABASE_URL`             | `database_url`     |
//! | `DATABASE_POOL_SIZE`       | `database_pool_size` |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::database::DatabaseConfig;
use crate::dataset::Collection;
use crate::executor::TableMap;

/// Where materialized queries run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// In-memory staging dataset.
    #[default]
    Staging,
    /// Postgres via `DATABASE_URL`.
    Postgres,
}

impl std::str::FromStr for StoreMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "staging" | "memory" => Ok(StoreMode::Staging),
            "postgres" | "database" | "db" => Ok(StoreMode::Postgres),
            other => Err(anyhow!("Unknown store mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Rule file or directory.
    pub rules_path: PathBuf,
    pub query_timeout_ms: u64,
    pub min_score: u32,
    pub store_mode: StoreMode,
    /// Extra table → collection entries for staging mode.
    pub staging_tables: BTreeMap<String, String>,
    pub database_url: Option<String>,
    pub database_pool_size: Option<u32>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            rules_path: PathBuf::from("config/intent_rules"),
            query_timeout_ms: 10_000,
            min_score: crate::matcher::DEFAULT_MIN_SCORE,
            store_mode: StoreMode::default(),
            staging_tables: BTreeMap::new(),
            database_url: None,
            database_pool_size: None,
        }
    }
}

impl RouterConfig {
    /// Load from `path` (if given) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Loading router configuration from {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("ROUTER_RULES_PATH") {
            self.rules_path = PathBuf::from(path);
        }
        if let Some(ms) = lookup("ROUTER_QUERY_TIMEOUT_MS") {
            self.query_timeout_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("Invalid ROUTER_QUERY_TIMEOUT_MS '{}'", ms))?;
        }
        if let Some(score) = lookup("ROUTER_MIN_SCORE") {
            self.min_score = score
                .trim()
                .parse()
                .with_context(|| format!("Invalid ROUTER_MIN_SCORE '{}'", score))?;
        }
        if let Some(mode) = lookup("ROUTER_STORE_MODE") {
            self.store_mode = mode.parse()?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(size) = lookup("DATABASE_POOL_SIZE") {
            self.database_pool_size = Some(
                size.trim()
                    .parse()
                    .with_context(|| format!("Invalid DATABASE_POOL_SIZE '{}'", size))?,
            );
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn table_map(&self) -> Result<TableMap> {
        let extra = self
            .staging_tables
            .iter()
            .map(|(table, name)| {
                Collection::parse(name)
                    .map(|c| (table.clone(), c))
                    .ok_or_else(|| anyhow!("Table '{}' maps to unknown collection '{}'", table, name))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TableMap::with_overrides(extra))
    }

    pub fn database(&self) -> DatabaseConfig {
        let mut db = DatabaseConfig::default();
        if let Some(url) = &self.database_url {
            db.database_url = url.clone();
        }
        if let Some(size) = self.database_pool_size {
            db.max_connections = size;
        }
        db
    }
}
