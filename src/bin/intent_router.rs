//! Intent Router CLI
//!
//! Answers one question against the rule catalog, or validates the catalog.
//!
//! Usage:
//!   cargo run --bin intent_router -- \
//!     --rules config/intent_rules \
//!     --dataset config/staging_dataset.json \
//!     --query "查询深圳工厂库存"
//!
//! Examples:
//!   # Validate the catalog and print its fingerprint
//!   cargo run --bin intent_router -- --validate
//!
//!   # Show ranked candidates instead of executing
//!   cargo run --bin intent_router -- --query "电池盖测试结果" --explain
//!
//!   # Run against Postgres
//!   cargo run --bin intent_router -- --store postgres \
//!     --database-url postgresql://localhost/mes --query "BOE的物料上线情况"

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use intent_router::catalog::{RuleCatalog, YamlRuleSource};
use intent_router::config::{RouterConfig, StoreMode};
use intent_router::dataset::SharedDataset;
use intent_router::matcher::Matcher;
use intent_router::router::QueryRouter;
use intent_router::types::{DatasetUpdate, RouteRequest};

/// Route a free-text question to an intent rule and run its query
#[derive(Parser, Debug)]
#[command(name = "intent_router")]
#[command(about = "Intent rule matching and query materialization")]
struct Args {
    /// Question to answer
    #[arg(long, short = 'q')]
    query: Option<String>,

    /// Scenario hint (inventory, test, production, batch, 库存, ...)
    #[arg(long, short = 's')]
    scenario: Option<String>,

    /// Router configuration file (YAML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Rule file or directory (overrides configuration)
    #[arg(long, short = 'r')]
    rules: Option<PathBuf>,

    /// Staging dataset JSON ({inventory, inspection, production})
    #[arg(long, short = 'd')]
    dataset: Option<PathBuf>,

    /// Store mode: staging or postgres
    #[arg(long)]
    store: Option<StoreMode>,

    /// Database URL for postgres mode
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Query timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Minimum score a rule must exceed
    #[arg(long)]
    min_score: Option<u32>,

    /// Validate the catalog and exit
    #[arg(long)]
    validate: bool,

    /// Print ranked candidates without executing
    #[arg(long)]
    explain: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intent_router=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    let catalog = YamlRuleSource::new(&config.rules_path).load_catalog()?;

    if args.validate {
        print_catalog_summary(&catalog);
        return Ok(());
    }

    let Some(query) = args.query.as_deref() else {
        bail!("--query is required unless --validate is given");
    };
    let mut request = RouteRequest::new(query);
    if let Some(hint) = &args.scenario {
        request = request.with_scenario(hint.clone());
    }

    let matcher = Matcher::new(config.min_score);

    if args.explain {
        let result = matcher.match_catalog(query, &catalog, request.scenario_hint.as_deref());
        println!("{}", serde_json::to_string_pretty(&result.candidates)?);
        match result.rule {
            Some(rule) => println!(
                "-> {} '{}' score={} params={:?}",
                rule.id, rule.name, result.score, result.extracted_parameters
            ),
            None => println!("-> no match"),
        }
        return Ok(());
    }

    let router = build_router(&config, catalog, args.dataset.as_ref())
        .await?
        .with_matcher(matcher)
        .with_query_timeout(config.query_timeout());

    let ctx = router.context();
    let response = router.route(&request, &ctx).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn resolve_config(args: &Args) -> Result<RouterConfig> {
    let mut config = RouterConfig::load(args.config.as_deref())?;
    if let Some(rules) = &args.rules {
        config.rules_path = rules.clone();
    }
    if let Some(store) = args.store {
        config.store_mode = store;
    }
    if let Some(url) = &args.database_url {
        config.database_url = Some(url.clone());
    }
    if let Some(ms) = args.timeout_ms {
        config.query_timeout_ms = ms;
    }
    if let Some(score) = args.min_score {
        config.min_score = score;
    }
    Ok(config)
}

async fn build_router(
    config: &RouterConfig,
    catalog: RuleCatalog,
    dataset_path: Option<&PathBuf>,
) -> Result<QueryRouter> {
    match config.store_mode {
        StoreMode::Staging => {
            let dataset = Arc::new(SharedDataset::new());
            if let Some(path) = dataset_path {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let update: DatasetUpdate = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                dataset.replace(update);
            } else {
                info!("No staging dataset given; every query returns an empty result");
            }
            Ok(QueryRouter::staging(catalog, dataset, config.table_map()?))
        }
        StoreMode::Postgres => postgres_router(config, catalog).await,
    }
}

#[cfg(feature = "database")]
async fn postgres_router(config: &RouterConfig, catalog: RuleCatalog) -> Result<QueryRouter> {
    use intent_router::executor::{Executor, PgQueryStore};

    let pool = intent_router::database::connect(&config.database())
        .await
        .context("Failed to connect to database")?;
    Ok(QueryRouter::new(
        catalog,
        Executor::new(Arc::new(PgQueryStore::new(pool))),
    ))
}

#[cfg(not(feature = "database"))]
async fn postgres_router(_config: &RouterConfig, _catalog: RuleCatalog) -> Result<QueryRouter> {
    bail!("postgres store mode requires the `database` feature")
}

fn print_catalog_summary(catalog: &RuleCatalog) {
    println!(
        "Catalog OK: {} rules ({} active), fingerprint {}",
        catalog.len(),
        catalog.active_rules().count(),
        catalog.fingerprint()
    );
    if let Some(fallback) = catalog.fallback() {
        println!("  fallback: {}", fallback.name);
    }
    for rule in catalog.rules() {
        println!(
            "  [{:>3}] {:<16} {:<12} priority={} params={} {}",
            rule.id,
            rule.name,
            rule.category.as_str(),
            rule.priority,
            rule.parameter_specs.len(),
            if rule.is_active() { "" } else { "(inactive)" }
        );
    }
}
