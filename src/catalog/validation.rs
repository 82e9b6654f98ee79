//! Load-time catalog validation.
//!
//! Run once when a catalog is built. A catalog that fails any check is
//! rejected as a whole; the previously published catalog stays in place.
//!
//! Checks:
//! 1. Rule ids are unique (all rules)
//! 2. Active rule names are unique
//! 3. Active templates are non-empty and their placeholder count equals the
//!    number of parameter specs
//! 4. Parameter names are non-empty and unique within a rule
//! 5. Active tabular rules declare at least one result field
//! 6. The declared fallback rule exists and is active

use std::collections::HashSet;

use super::{CatalogSettings, IntentRule};
use crate::error::CatalogError;
use crate::materialize::placeholder_count;

/// Validate a normalized rule set. Returns every violation found.
pub fn validate_catalog(rules: &[IntentRule], settings: &CatalogSettings) -> Vec<CatalogError> {
    let mut errors = Vec::new();
    let mut ids = HashSet::new();
    let mut names = HashSet::new();

    for rule in rules {
        if !ids.insert(rule.id) {
            errors.push(CatalogError::DuplicateId { id: rule.id });
        }
        if !rule.is_active() {
            continue;
        }
        if !names.insert(rule.name.as_str()) {
            errors.push(CatalogError::DuplicateName {
                name: rule.name.clone(),
            });
        }
        errors.extend(validate_rule(rule));
    }

    if let Some(ref name) = settings.fallback_rule {
        if !rules.iter().any(|r| r.is_active() && &r.name == name) {
            errors.push(CatalogError::UnknownFallback { name: name.clone() });
        }
    }

    errors
}

/// Checks that apply to a single active rule.
pub fn validate_rule(rule: &IntentRule) -> Vec<CatalogError> {
    let mut errors = Vec::new();

    if rule.query_template.trim().is_empty() {
        errors.push(CatalogError::EmptyTemplate {
            rule: rule.name.clone(),
        });
    }

    let placeholders = placeholder_count(&rule.query_template);
    if placeholders != rule.parameter_specs.len() {
        errors.push(CatalogError::PlaceholderMismatch {
            rule: rule.name.clone(),
            placeholders,
            parameters: rule.parameter_specs.len(),
        });
    }

    let mut param_names = HashSet::new();
    for spec in &rule.parameter_specs {
        if spec.name.trim().is_empty() {
            errors.push(CatalogError::UnnamedParameter {
                rule: rule.name.clone(),
            });
        } else if !param_names.insert(spec.name.as_str()) {
            errors.push(CatalogError::DuplicateParameter {
                rule: rule.name.clone(),
                parameter: spec.name.clone(),
            });
        }
    }

    if rule.category.is_tabular() && rule.result_fields.is_empty() {
        errors.push(CatalogError::EmptyResultFields {
            rule: rule.name.clone(),
        });
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::rule;
    use crate::catalog::{Category, ParameterSpec, RuleStatus};

    fn spec(name: &str) -> ParameterSpec {
        ParameterSpec {
            name: name.to_string(),
            param_type: Default::default(),
            extract_from: vec![],
            value_mapping: Default::default(),
            required: false,
            default: None,
        }
    }

    #[test]
    fn test_placeholder_mismatch_rejected() {
        let mut r = rule(1, "库存查询", Category::Inventory, &["库存"]);
        r.query_template = "SELECT * FROM inventory WHERE factory = ? AND supplier = ?".into();
        r.parameter_specs = vec![spec("factory")];

        let errors = validate_catalog(&[r], &CatalogSettings::default());
        assert_eq!(
            errors,
            vec![CatalogError::PlaceholderMismatch {
                rule: "库存查询".into(),
                placeholders: 2,
                parameters: 1,
            }]
        );
    }

    #[test]
    fn test_inactive_rules_skip_rule_checks_but_not_id_uniqueness() {
        let mut broken = rule(1, "旧规则", Category::Inventory, &["库存"]);
        broken.status = RuleStatus::Inactive;
        broken.query_template = "SELECT ?".into();
        let dup = rule(1, "新规则", Category::Inventory, &["库存"]);

        let errors = validate_catalog(&[broken, dup], &CatalogSettings::default());
        assert_eq!(errors, vec![CatalogError::DuplicateId { id: 1 }]);
    }

    #[test]
    fn test_duplicate_active_names() {
        let a = rule(1, "库存查询", Category::Inventory, &["库存"]);
        let b = rule(2, "库存查询", Category::Inventory, &["库存"]);
        let errors = validate_catalog(&[a, b], &CatalogSettings::default());
        assert_eq!(
            errors,
            vec![CatalogError::DuplicateName {
                name: "库存查询".into()
            }]
        );
    }

    #[test]
    fn test_empty_result_fields_for_tabular_rule() {
        let mut r = rule(1, "测试查询", Category::Test, &["测试"]);
        r.result_fields.clear();
        assert!(validate_rule(&r).contains(&CatalogError::EmptyResultFields {
            rule: "测试查询".into()
        }));

        // Textual rules may omit the schema.
        let mut textual = rule(2, "探索", Category::Exploratory, &["探索"]);
        textual.result_fields.clear();
        assert!(validate_rule(&textual).is_empty());
    }

    #[test]
    fn test_parameter_names_checked() {
        let mut r = rule(1, "库存查询", Category::Inventory, &["库存"]);
        r.query_template = "SELECT * FROM t WHERE a = ? AND b = ? AND c = ?".into();
        r.parameter_specs = vec![spec("a"), spec("a"), spec(" ")];
        let errors = validate_rule(&r);
        assert!(errors.contains(&CatalogError::DuplicateParameter {
            rule: "库存查询".into(),
            parameter: "a".into()
        }));
        assert!(errors.contains(&CatalogError::UnnamedParameter {
            rule: "库存查询".into()
        }));
    }

    #[test]
    fn test_unknown_fallback() {
        let settings = CatalogSettings {
            fallback_rule: Some("总览".into()),
            charts: vec![],
        };
        let errors = validate_catalog(&[rule(1, "库存查询", Category::Inventory, &[])], &settings);
        assert_eq!(
            errors,
            vec![CatalogError::UnknownFallback {
                name: "总览".into()
            }]
        );
    }
}
