//! Rule Catalog
//!
//! Holds the set of Intent Rules plus catalog-level settings (fallback rule,
//! chart sub-catalog). A `RuleCatalog` is an immutable snapshot: it is built
//! once from a `RuleSource`, validated, and replaced wholesale on reload.
//!
//! ## Loading
//!
//! ```text
//! RuleSource (YAML dir / Postgres)
//!       │  rules + CatalogSettings
//!       ▼
//! RuleCatalog::build ── normalize ── validate ── fingerprint
//!       │
//!       ▼
//! SwapCell<RuleCatalog>  (published to the router)
//! ```

pub mod source;
pub mod validation;

#[cfg(feature = "database")]
pub mod postgres;

use std::collections::{BTreeMap, HashSet};

use intent_router_types::ChartType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::CatalogError;
use crate::text::normalize;

pub use source::{RuleSource, YamlRuleSource};
#[cfg(feature = "database")]
pub use postgres::PgRuleSource;

// ============================================================================
// Rule model
// ============================================================================

/// Whether a rule participates in matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    #[default]
    Active,
    Inactive,
}

/// Scenario tag of a rule. Picks the default display schema and card set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Inventory,
    Test,
    Production,
    Batch,
    Comparison,
    Exploratory,
    Trend,
    #[default]
    #[serde(other)]
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Inventory => "inventory",
            Category::Test => "test",
            Category::Production => "production",
            Category::Batch => "batch",
            Category::Comparison => "comparison",
            Category::Exploratory => "exploratory",
            Category::Trend => "trend",
            Category::General => "general",
        }
    }

    /// Categories whose output is a table with cards.
    pub fn is_tabular(&self) -> bool {
        matches!(
            self,
            Category::Inventory
                | Category::Test
                | Category::Production
                | Category::Batch
                | Category::Comparison
        )
    }

    /// Parse a scenario hint: English tag or the Chinese scenario name.
    pub fn from_hint(hint: &str) -> Option<Category> {
        let hint = hint.trim().to_lowercase();
        let category = match hint.as_str() {
            "inventory" | "库存" | "库存场景" => Category::Inventory,
            "test" | "inspection" | "测试" | "检验" | "测试场景" => Category::Test,
            "production" | "online" | "生产" | "上线" | "生产场景" => Category::Production,
            "batch" | "批次" | "批次管理" => Category::Batch,
            "comparison" | "compare" | "对比" | "对比分析" => Category::Comparison,
            "exploratory" | "explore" | "探索" | "综合查询" => Category::Exploratory,
            "trend" | "chart" | "趋势" | "图表" => Category::Trend,
            "general" | "通用" => Category::General,
            _ => return None,
        };
        Some(category)
    }

    /// Display schema used when a tabular rule declares no result fields.
    pub fn default_result_fields(&self) -> &'static [&'static str] {
        match self {
            Category::Inventory => &[
                "工厂", "仓库", "物料编码", "物料名称", "供应商", "数量", "状态", "入库时间",
            ],
            Category::Test => &[
                "测试编号",
                "日期",
                "项目",
                "基线",
                "物料编码",
                "数量",
                "物料名称",
                "供应商",
                "测试结果",
                "不合格描述",
                "备注",
            ],
            Category::Production => &[
                "工厂",
                "项目",
                "基线",
                "物料编码",
                "物料名称",
                "供应商",
                "批次",
                "不良率",
                "本周异常",
                "检验日期",
                "备注",
            ],
            Category::Batch => &[
                "批次号",
                "物料编码",
                "物料名称",
                "供应商",
                "数量",
                "入库日期",
                "产线异常",
                "测试异常",
                "备注",
            ],
            Category::Comparison => &["对比维度", "物料名称", "供应商", "数量", "状态"],
            Category::Exploratory | Category::Trend | Category::General => &[],
        }
    }
}

/// Parameter value type. Only strings are extracted today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    #[default]
    String,
}

/// One extractable input slot of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    #[serde(rename = "type", default)]
    pub param_type: ParamType,

    /// Surface keywords searched in declaration order; first hit wins.
    #[serde(default, alias = "extractFrom")]
    pub extract_from: Vec<String>,

    /// Matched keyword → canonical value.
    #[serde(default, alias = "valueMapping")]
    pub value_mapping: BTreeMap<String, String>,

    /// A required parameter with no extraction and no default stops the pipeline.
    #[serde(default)]
    pub required: bool,

    /// Canonical value bound when nothing is extracted.
    #[serde(default)]
    pub default: Option<String>,
}

impl ParameterSpec {
    /// Canonical value for a matched keyword.
    pub fn canonical(&self, keyword: &str) -> String {
        self.value_mapping
            .get(keyword)
            .cloned()
            .unwrap_or_else(|| keyword.to_string())
    }
}

/// A named, prioritized mapping from trigger vocabulary to a query and a display schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRule {
    pub id: i64,
    pub name: String,

    #[serde(default)]
    pub status: RuleStatus,

    #[serde(default)]
    pub category: Category,

    #[serde(default)]
    pub priority: i32,

    #[serde(default, alias = "triggerWords")]
    pub trigger_words: Vec<String>,

    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,

    #[serde(default, alias = "parameterSpecs", alias = "parameters")]
    pub parameter_specs: Vec<ParameterSpec>,

    #[serde(alias = "queryTemplate")]
    pub query_template: String,

    #[serde(default, alias = "resultFields")]
    pub result_fields: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, alias = "exampleQuery")]
    pub example_query: Option<String>,
}

impl IntentRule {
    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }

    /// Trigger words with their synonym expansions, in declaration order.
    ///
    /// Terms that normalize to the same text (case, full-width forms) are
    /// kept once, so a spelling variant never scores twice.
    pub fn expanded_triggers(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        for word in &self.trigger_words {
            let expansions = self.synonyms.get(word).into_iter().flatten();
            for term in std::iter::once(word).chain(expansions) {
                let normalized = normalize(term);
                if !normalized.is_empty() && seen.insert(normalized) {
                    terms.push(term.as_str());
                }
            }
        }
        terms
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Chart sub-catalog entry: rules of `category` render as a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub category: Category,
    pub chart_type: ChartType,
    /// Display field grouped into chart labels.
    pub label_field: String,
    /// Numeric display field summed per label; rows are counted when absent.
    #[serde(default)]
    pub value_field: Option<String>,
}

/// Catalog-level settings (from `_catalog.yaml` or the settings table).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Rule used when nothing scores above threshold ("show overview").
    #[serde(default)]
    pub fallback_rule: Option<String>,

    #[serde(default)]
    pub charts: Vec<ChartSpec>,
}

/// Immutable, validated set of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<IntentRule>,
    settings: CatalogSettings,
    fingerprint: String,
}

impl RuleCatalog {
    /// Normalize, validate and fingerprint a rule set.
    pub fn build(rules: Vec<IntentRule>, settings: CatalogSettings) -> Result<Self, CatalogError> {
        let mut rules: Vec<IntentRule> = rules.into_iter().map(normalize_rule).collect();
        rules.sort_by_key(|r| r.id);

        let errors = validation::validate_catalog(&rules, &settings);
        if let Some(first) = errors.first() {
            for error in &errors {
                warn!("Rule catalog rejected: {}", error);
            }
            return Err(first.clone());
        }

        let fingerprint = fingerprint(&rules, &settings);
        debug!(
            "Built rule catalog: {} rules ({} active), fingerprint {}",
            rules.len(),
            rules.iter().filter(|r| r.is_active()).count(),
            &fingerprint[..12]
        );

        Ok(Self {
            rules,
            settings,
            fingerprint,
        })
    }

    /// Empty catalog (every query is a no-match).
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            settings: CatalogSettings::default(),
            fingerprint: fingerprint(&[], &CatalogSettings::default()),
        }
    }

    /// All rules ordered by id.
    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    pub fn active_rules(&self) -> impl Iterator<Item = &IntentRule> {
        self.rules.iter().filter(|r| r.is_active())
    }

    pub fn get(&self, id: i64) -> Option<&IntentRule> {
        self.rules
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|idx| &self.rules[idx])
    }

    /// Active rule by name.
    pub fn find_by_name(&self, name: &str) -> Option<&IntentRule> {
        self.active_rules().find(|r| r.name == name)
    }

    /// The declared "show overview" rule, if any.
    pub fn fallback(&self) -> Option<&IntentRule> {
        self.settings
            .fallback_rule
            .as_deref()
            .and_then(|name| self.find_by_name(name))
    }

    pub fn chart_for(&self, category: Category) -> Option<&ChartSpec> {
        self.settings.charts.iter().find(|c| c.category == category)
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    /// SHA-256 of the normalized catalog, hex encoded.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Dedupe trigger words and fill an empty tabular schema from the category default.
fn normalize_rule(mut rule: IntentRule) -> IntentRule {
    let mut seen = HashSet::new();
    rule.trigger_words.retain(|w| {
        let normalized = normalize(w);
        !normalized.is_empty() && seen.insert(normalized)
    });

    if rule.result_fields.is_empty() && rule.category.is_tabular() {
        rule.result_fields = rule
            .category
            .default_result_fields()
            .iter()
            .map(|f| f.to_string())
            .collect();
    }
    rule
}

fn fingerprint(rules: &[IntentRule], settings: &CatalogSettings) -> String {
    let mut hasher = Sha256::new();
    for rule in rules {
        // Serialization of the rule model cannot fail (no non-string map keys).
        if let Ok(bytes) = serde_json::to_vec(rule) {
            hasher.update(&bytes);
        }
    }
    if let Ok(bytes) = serde_json::to_vec(settings) {
        hasher.update(&bytes);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn rule(id: i64, name: &str, category: Category, triggers: &[&str]) -> IntentRule {
        IntentRule {
            id,
            name: name.to_string(),
            status: RuleStatus::Active,
            category,
            priority: 0,
            trigger_words: triggers.iter().map(|t| t.to_string()).collect(),
            synonyms: BTreeMap::new(),
            parameter_specs: vec![],
            query_template: "SELECT * FROM inventory".to_string(),
            result_fields: vec!["物料名称".to_string()],
            description: None,
            example_query: None,
        }
    }

    #[test]
    fn test_expanded_triggers_include_synonyms_once() {
        let mut r = rule(1, "库存查询", Category::Inventory, &["库存", "物料"]);
        r.synonyms.insert(
            "库存".to_string(),
            vec!["存货".to_string(), "物料".to_string()],
        );
        assert_eq!(r.expanded_triggers(), vec!["库存", "存货", "物料"]);
    }

    #[test]
    fn test_spelling_variants_expand_once() {
        let mut r = rule(1, "来料检验", Category::Test, &["IQC", "iqc", "ＩＱＣ"]);
        r.synonyms.insert(
            "IQC".to_string(),
            vec!["Iqc".to_string(), "来料检验".to_string()],
        );
        assert_eq!(r.expanded_triggers(), vec!["IQC", "来料检验"]);

        let catalog = RuleCatalog::build(vec![r], CatalogSettings::default()).unwrap();
        assert_eq!(catalog.rules()[0].trigger_words, vec!["IQC"]);
    }

    #[test]
    fn test_build_fills_default_schema_for_tabular_rule() {
        let mut r = rule(1, "库存查询", Category::Inventory, &["库存"]);
        r.result_fields.clear();
        let catalog = RuleCatalog::build(vec![r], CatalogSettings::default()).unwrap();
        assert_eq!(catalog.rules()[0].result_fields[0], "工厂");
        assert_eq!(
            catalog.rules()[0].result_fields.len(),
            Category::Inventory.default_result_fields().len()
        );
    }

    #[test]
    fn test_build_sorts_by_id_and_dedupes_triggers() {
        let a = rule(7, "B", Category::General, &["x", "x", " "]);
        let b = rule(3, "A", Category::General, &["y"]);
        let catalog = RuleCatalog::build(vec![a, b], CatalogSettings::default()).unwrap();
        assert_eq!(catalog.rules()[0].id, 3);
        assert_eq!(catalog.get(7).unwrap().trigger_words, vec!["x"]);
        assert!(catalog.get(99).is_none());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let build = || {
            RuleCatalog::build(
                vec![rule(1, "A", Category::Inventory, &["库存"])],
                CatalogSettings::default(),
            )
            .unwrap()
        };
        assert_eq!(build().fingerprint(), build().fingerprint());
        assert_ne!(build().fingerprint(), RuleCatalog::empty().fingerprint());
    }

    #[test]
    fn test_fallback_lookup() {
        let settings = CatalogSettings {
            fallback_rule: Some("总览".to_string()),
            charts: vec![],
        };
        let catalog = RuleCatalog::build(
            vec![rule(1, "总览", Category::Exploratory, &["总览"])],
            settings,
        )
        .unwrap();
        assert_eq!(catalog.fallback().map(|r| r.id), Some(1));
    }

    #[test]
    fn test_category_hints() {
        assert_eq!(Category::from_hint("库存"), Some(Category::Inventory));
        assert_eq!(Category::from_hint(" Inspection "), Some(Category::Test));
        assert_eq!(Category::from_hint("unknown"), None);
    }

    #[test]
    fn test_unknown_category_deserializes_as_general() {
        let c: Category = serde_yaml::from_str("quality_report").unwrap();
        assert_eq!(c, Category::General);
    }
}
