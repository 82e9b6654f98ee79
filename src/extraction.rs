//! Parameter Extractor
//!
//! Pulls parameter values out of the query text using each spec's
//! `extract_from` vocabulary and `value_mapping` table.
//!
//! Precedence is declaration order, not text position and not keyword
//! length: for `extract_from = ["A", "B"]` a query containing both yields
//! the value for "A". Existing rule definitions rely on this, e.g.
//! `["深圳工厂", "深圳"]` lists the longer surface form first on purpose.
//!
//! A spec with no keyword in the text is omitted from the result; the
//! materializer decides the fallback.

use std::collections::HashMap;

use crate::catalog::{IntentRule, ParameterSpec};
use crate::text::normalize;

/// Extract every parameter of `rule` found in `query_text`.
pub fn extract(query_text: &str, rule: &IntentRule) -> HashMap<String, String> {
    let normalized = normalize(query_text);
    rule.parameter_specs
        .iter()
        .filter_map(|spec| {
            extract_one(&normalized, spec).map(|value| (spec.name.clone(), value))
        })
        .collect()
}

/// First keyword of `spec` contained in the (normalized) query, mapped to its canonical value.
pub fn extract_one(normalized_query: &str, spec: &ParameterSpec) -> Option<String> {
    spec.extract_from
        .iter()
        .filter(|keyword| !keyword.trim().is_empty())
        .find(|keyword| normalized_query.contains(&normalize(keyword)))
        .map(|keyword| spec.canonical(keyword))
}
