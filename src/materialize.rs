//! Query Materializer
//!
//! Turns a rule's `query_template` plus extracted parameters into an
//! executable `(sql, bound values)` pair. Templates are authored with
//! positional `?` placeholders; they are rewritten to the store's native
//! `$1..$n` markers and the values travel separately as bound parameters.
//! Parameter values never enter the SQL text.
//!
//! A `?` inside a single-quoted literal, a double-quoted identifier or a
//! comment is not a placeholder.

use std::collections::HashMap;

use serde::Serialize;

use crate::catalog::IntentRule;
use crate::error::RouterError;

/// Where a bound value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Extracted from the query text.
    Extracted,
    /// The parameter spec's declared default.
    SpecDefault,
    /// Neutral empty string; the template decides what "" means.
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundParam {
    pub name: String,
    pub value: String,
    pub source: ValueSource,
}

/// Executable query ready for the Executor. Performs no I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedQuery {
    pub rule_id: i64,
    /// SQL with `$1..$n` markers.
    pub sql: String,
    /// One bound value per marker, in marker order.
    pub params: Vec<BoundParam>,
}

impl MaterializedQuery {
    pub fn values(&self) -> Vec<String> {
        self.params.iter().map(|p| p.value.clone()).collect()
    }
}

/// Bind extracted parameters (or defaults) to the rule's template.
///
/// The i-th placeholder binds `extracted[spec_i.name]`, else the spec
/// default, else `""`. A required spec with neither fails with
/// `MissingParameter`.
pub fn materialize(
    rule: &IntentRule,
    extracted: &HashMap<String, String>,
) -> Result<MaterializedQuery, RouterError> {
    let mut params = Vec::with_capacity(rule.parameter_specs.len());

    for spec in &rule.parameter_specs {
        let (value, source) = match (extracted.get(&spec.name), &spec.default) {
            (Some(v), _) => (v.clone(), ValueSource::Extracted),
            (None, Some(default)) => (default.clone(), ValueSource::SpecDefault),
            (None, None) if spec.required => {
                return Err(RouterError::MissingParameter {
                    rule: rule.name.clone(),
                    parameter: spec.name.clone(),
                })
            }
            (None, None) => (String::new(), ValueSource::Neutral),
        };
        params.push(BoundParam {
            name: spec.name.clone(),
            value,
            source,
        });
    }

    Ok(MaterializedQuery {
        rule_id: rule.id,
        sql: number_placeholders(&rule.query_template),
        params,
    })
}

/// Number of `?` placeholders outside literals, identifiers and comments.
pub fn placeholder_count(template: &str) -> usize {
    let mut count = 0;
    scan(template, |token| {
        if let Token::Placeholder = token {
            count += 1;
        }
    });
    count
}

/// Rewrite each placeholder to `$1`, `$2`, ... in order.
pub fn number_placeholders(template: &str) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut next = 0usize;
    scan(template, |token| match token {
        Token::Placeholder => {
            next += 1;
            out.push('$');
            out.push_str(&next.to_string());
        }
        Token::Char(c) => out.push(c),
    });
    out
}

enum Token {
    Placeholder,
    Char(char),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

fn scan(template: &str, mut emit: impl FnMut(Token)) {
    let mut state = ScanState::Code;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        let next = chars.peek().copied();
        match state {
            ScanState::Code => match c {
                '?' => {
                    emit(Token::Placeholder);
                    continue;
                }
                '\'' => state = ScanState::SingleQuoted,
                '"' => state = ScanState::DoubleQuoted,
                '-' if next == Some('-') => state = ScanState::LineComment,
                '/' if next == Some('*') => {
                    emit(Token::Char(c));
                    emit(Token::Char('*'));
                    chars.next();
                    state = ScanState::BlockComment;
                    continue;
                }
                _ => {}
            },
            // '' inside a literal closes and immediately reopens it.
            ScanState::SingleQuoted if c == '\'' => state = ScanState::Code,
            ScanState::DoubleQuoted if c == '"' => state = ScanState::Code,
            ScanState::LineComment if c == '\n' => state = ScanState::Code,
            ScanState::BlockComment if c == '*' && next == Some('/') => {
                emit(Token::Char(c));
                emit(Token::Char('/'));
                chars.next();
                state = ScanState::Code;
                continue;
            }
            _ => {}
        }
        emit(Token::Char(c));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::rule;
    use crate::catalog::{Category, ParameterSpec};

    fn spec(name: &str, required: bool, default: Option<&str>) -> ParameterSpec {
        ParameterSpec {
            name: name.to_string(),
            param_type: Default::default(),
            extract_from: vec![],
            value_mapping: Default::default(),
            required,
            default: default.map(str::to_string),
        }
    }

    fn factory_rule() -> IntentRule {
        let mut r = rule(1, "库存查询", Category::Inventory, &["库存"]);
        r.query_template = "SELECT * FROM inventory WHERE storage_location LIKE '%' || ? || '%' AND supplier LIKE '%' || ? || '%' ORDER BY inbound_time DESC".into();
        r.parameter_specs = vec![spec("factory", false, None), spec("supplier", false, None)];
        r
    }

    #[test]
    fn test_placeholder_count_ignores_literals_and_comments() {
        assert_eq!(placeholder_count("SELECT 1"), 0);
        assert_eq!(placeholder_count("SELECT * FROM t WHERE a = ? AND b = ?"), 2);
        assert_eq!(placeholder_count("SELECT '?' , \"col?\" FROM t WHERE a = ?"), 1);
        assert_eq!(placeholder_count("SELECT 'it''s ?' FROM t WHERE a = ?"), 1);
        assert_eq!(placeholder_count("SELECT a -- what?\nFROM t WHERE a = ?"), 1);
        assert_eq!(placeholder_count("SELECT /* ? */ a FROM t WHERE a = ?"), 1);
    }

    #[test]
    fn test_number_placeholders_preserves_text() {
        assert_eq!(
            number_placeholders("SELECT '?' FROM t WHERE a = ? AND b LIKE '%' || ? || '%'"),
            "SELECT '?' FROM t WHERE a = $1 AND b LIKE '%' || $2 || '%'"
        );
        assert_eq!(
            number_placeholders("SELECT /* ? */ 名称 FROM t -- ?\nWHERE a = ?"),
            "SELECT /* ? */ 名称 FROM t -- ?\nWHERE a = $1"
        );
    }

    #[test]
    fn test_materialize_binds_extracted_and_neutral_values() {
        let mut extracted = HashMap::new();
        extracted.insert("factory".to_string(), "深圳工厂".to_string());

        let q = materialize(&factory_rule(), &extracted).unwrap();
        assert!(q.sql.contains("LIKE '%' || $1 || '%'"));
        assert!(q.sql.contains("LIKE '%' || $2 || '%'"));
        assert_eq!(q.values(), vec!["深圳工厂".to_string(), String::new()]);
        assert_eq!(q.params[0].source, ValueSource::Extracted);
        assert_eq!(q.params[1].source, ValueSource::Neutral);
    }

    #[test]
    fn test_values_never_enter_sql_text() {
        let mut extracted = HashMap::new();
        extracted.insert("factory".to_string(), "x' OR '1'='1".to_string());
        let q = materialize(&factory_rule(), &extracted).unwrap();
        assert!(!q.sql.contains("OR '1'='1"));
        assert_eq!(q.params[0].value, "x' OR '1'='1");
    }

    #[test]
    fn test_spec_default_and_required() {
        let mut r = factory_rule();
        r.parameter_specs[0] = spec("factory", true, Some("深圳工厂"));
        let q = materialize(&r, &HashMap::new()).unwrap();
        assert_eq!(q.params[0].value, "深圳工厂");
        assert_eq!(q.params[0].source, ValueSource::SpecDefault);

        r.parameter_specs[1] = spec("supplier", true, None);
        match materialize(&r, &HashMap::new()) {
            Err(RouterError::MissingParameter { parameter, .. }) => assert_eq!(parameter, "supplier"),
            other => panic!("Expected MissingParameter, got {:?}", other),
        }
    }
}
