//! Postgres-backed rule source.
//!
//! Rules are maintained by the administrative UI in `intent_rules`; list
//! columns are JSONB. All SQL is runtime-checked (`sqlx::query_as`, not the
//! macro form) so the crate builds without a database.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::info;

use super::{CatalogSettings, IntentRule, RuleCatalog, RuleSource};

#[derive(Debug, sqlx::FromRow)]
struct IntentRuleRow {
    id: i64,
    name: String,
    status: String,
    category: String,
    priority: i32,
    trigger_words: JsonValue,
    synonyms: JsonValue,
    parameters: JsonValue,
    query_template: String,
    result_fields: JsonValue,
    description: Option<String>,
    example_query: Option<String>,
}

impl TryFrom<IntentRuleRow> for IntentRule {
    type Error = anyhow::Error;

    fn try_from(row: IntentRuleRow) -> Result<Self> {
        let rule_name = row.name.clone();

        Ok(IntentRule {
            id: row.id,
            name: row.name,
            status: serde_json::from_value(JsonValue::String(row.status.to_lowercase()))
                .with_context(|| format!("rule '{}': invalid status", rule_name))?,
            category: serde_json::from_value(JsonValue::String(row.category.to_lowercase()))
                .with_context(|| format!("rule '{}': invalid category", rule_name))?,
            priority: row.priority,
            trigger_words: serde_json::from_value(or_empty_list(row.trigger_words))
                .with_context(|| format!("rule '{}': invalid trigger_words", rule_name))?,
            synonyms: serde_json::from_value(or_empty_map(row.synonyms))
                .with_context(|| format!("rule '{}': invalid synonyms", rule_name))?,
            parameter_specs: serde_json::from_value(or_empty_list(row.parameters))
                .with_context(|| format!("rule '{}': invalid parameters", rule_name))?,
            query_template: row.query_template,
            result_fields: serde_json::from_value(or_empty_list(row.result_fields))
                .with_context(|| format!("rule '{}': invalid result_fields", rule_name))?,
            description: row.description,
            example_query: row.example_query,
        })
    }
}

// NULL JSONB columns decode as JSON null; treat them as "not set".
fn or_empty_list(value: JsonValue) -> JsonValue {
    if value.is_null() {
        JsonValue::Array(vec![])
    } else {
        value
    }
}

fn or_empty_map(value: JsonValue) -> JsonValue {
    if value.is_null() {
        JsonValue::Object(Default::default())
    } else {
        value
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CatalogSettingsRow {
    fallback_rule: Option<String>,
    charts: Option<JsonValue>,
}

/// Rules from the `intent_rules` table.
pub struct PgRuleSource {
    pool: PgPool,
}

impl PgRuleSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_settings(&self) -> Result<CatalogSettings> {
        let row = sqlx::query_as::<_, CatalogSettingsRow>(
            r#"
            SELECT fallback_rule, charts
            FROM intent_catalog_settings
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))
        .context("Failed to load intent_catalog_settings")?;

        let Some(row) = row else {
            return Ok(CatalogSettings::default());
        };

        let charts = match row.charts {
            Some(value) if !value.is_null() => {
                serde_json::from_value(value).context("Invalid charts in catalog settings")?
            }
            _ => Vec::new(),
        };

        Ok(CatalogSettings {
            fallback_rule: row.fallback_rule,
            charts,
        })
    }
}

#[async_trait]
impl RuleSource for PgRuleSource {
    fn describe(&self) -> String {
        "postgres:intent_rules".to_string()
    }

    async fn load(&self) -> Result<RuleCatalog> {
        let rows = sqlx::query_as::<_, IntentRuleRow>(
            r#"
            SELECT id, name, status, category, priority,
                   trigger_words, synonyms, parameters,
                   query_template, result_fields,
                   description, example_query
            FROM intent_rules
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))
        .context("Failed to load intent_rules")?;

        let rules = rows
            .into_iter()
            .map(IntentRule::try_from)
            .collect::<Result<Vec<_>>>()?;
        let settings = self.load_settings().await?;

        let catalog = RuleCatalog::build(rules, settings).context("Invalid rule catalog in database")?;
        info!(
            "Loaded {} intent rules ({} active) from database",
            catalog.len(),
            catalog.active_rules().count()
        );
        Ok(catalog)
    }
}
