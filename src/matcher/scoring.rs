//! Keyword scoring and deterministic ranking
//!
//! Every active rule gets an integer score from its trigger vocabulary:
//!
//! - **Exact** query == term → `len(term) * EXACT_MATCH_WEIGHT`
//! - **Contains** query ⊇ term → `len(term) * CONTAINS_WEIGHT`
//! - **Name** rule name appears verbatim in the query → `+ NAME_BONUS`
//!
//! Lengths count characters, so a two-character CJK term weighs 2.
//! Integer scores make ties exact; ranking is score desc, priority desc,
//! id asc.

use std::cmp::Ordering;

use serde::Serialize;

use crate::catalog::IntentRule;
use crate::text::{char_len, normalize};

// ---------------------------------------------------------------------------
// Scoring Constants
// ---------------------------------------------------------------------------

/// Weight per character when the whole query equals a trigger term.
pub const EXACT_MATCH_WEIGHT: u32 = 2;

/// Weight per character when the query contains a trigger term.
pub const CONTAINS_WEIGHT: u32 = 1;

/// Bonus when the rule's own name appears verbatim in the query.
pub const NAME_BONUS: u32 = 100;

/// Default decision threshold - the best score must be strictly above it.
pub const DEFAULT_MIN_SCORE: u32 = 0;

/// Number of runner-up candidates kept for diagnostics.
pub const MAX_CANDIDATES: usize = 5;

// ---------------------------------------------------------------------------
// Scoring Functions
// ---------------------------------------------------------------------------

/// A rule's score for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleScore {
    pub rule_id: i64,
    pub name: String,
    pub priority: i32,
    pub score: u32,
}

impl RuleScore {
    pub fn of(rule: &IntentRule, score: u32) -> Self {
        Self {
            rule_id: rule.id,
            name: rule.name.clone(),
            priority: rule.priority,
            score,
        }
    }
}

/// Score one rule against an already normalized query.
pub fn score_rule(normalized_query: &str, rule: &IntentRule) -> u32 {
    if normalized_query.is_empty() {
        return 0;
    }

    let mut score = 0u32;
    for term in rule.expanded_triggers() {
        let term = normalize(term);
        if term.is_empty() {
            continue;
        }
        let weight = if normalized_query == term {
            EXACT_MATCH_WEIGHT
        } else if normalized_query.contains(&term) {
            CONTAINS_WEIGHT
        } else {
            continue;
        };
        score = score.saturating_add(char_len(&term) as u32 * weight);
    }

    let name = normalize(&rule.name);
    if !name.is_empty() && normalized_query.contains(&name) {
        score = score.saturating_add(NAME_BONUS);
    }

    score
}

/// Ranking order: higher score first, then higher priority, then smaller id.
pub fn rank(a: &RuleScore, b: &RuleScore) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.rule_id.cmp(&b.rule_id))
}

// ---------------------------------------------------------------------------
// Threshold Policy
// ---------------------------------------------------------------------------

/// Outcome of applying the decision threshold to ranked candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Nothing scored above threshold.
    NoMatch,
    /// Top candidate wins.
    Matched { rule_id: i64, score: u32 },
}

/// Apply the threshold to candidates already sorted with [`rank`].
pub fn decide(ranked: &[RuleScore], min_score: u32) -> MatchOutcome {
    match ranked.first() {
        Some(top) if top.score > min_score => MatchOutcome::Matched {
            rule_id: top.rule_id,
            score: top.score,
        },
        _ => MatchOutcome::NoMatch,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::rule;
    use crate::catalog::Category;

    fn candidate(id: i64, priority: i32, score: u32) -> RuleScore {
        RuleScore {
            rule_id: id,
            name: format!("rule-{}", id),
            priority,
            score,
        }
    }

    #[test]
    fn test_contains_scores_by_character_length() {
        let r = rule(1, "R1", Category::Inventory, &["库存", "深圳"]);
        assert_eq!(score_rule(&normalize("查询深圳工厂库存"), &r), 4);
    }

    #[test]
    fn test_exact_match_doubles_weight() {
        let r = rule(1, "R1", Category::Inventory, &["库存"]);
        assert_eq!(score_rule("库存", &r), 2 * EXACT_MATCH_WEIGHT);
    }

    #[test]
    fn test_name_bonus() {
        let r = rule(1, "物料上线情况", Category::Production, &["上线"]);
        assert_eq!(score_rule("查看物料上线情况", &r), 2 + NAME_BONUS);
    }

    #[test]
    fn test_synonyms_widen_matching() {
        let mut r = rule(1, "R1", Category::Inventory, &["库存"]);
        r.synonyms.insert("库存".into(), vec!["存货".into()]);
        assert_eq!(score_rule("查询存货", &r), 2);
    }

    #[test]
    fn test_case_insensitive_terms() {
        let r = rule(1, "R1", Category::Test, &["IQC"]);
        assert_eq!(score_rule(&normalize("查看iqc结果"), &r), 3);
    }

    #[test]
    fn test_spelling_variants_score_once() {
        let mut r = rule(1, "R1", Category::Test, &["IQC", "iqc", "ＩＱＣ"]);
        r.synonyms.insert("IQC".to_string(), vec!["Iqc".to_string()]);
        assert_eq!(score_rule(&normalize("查看iqc结果"), &r), 3);
    }

    #[test]
    fn test_empty_query_scores_zero() {
        let r = rule(1, "R1", Category::Inventory, &["库存"]);
        assert_eq!(score_rule("", &r), 0);
    }

    #[test]
    fn test_rank_tie_break_priority_then_id() {
        let mut scores = vec![
            candidate(3, 1, 10),
            candidate(2, 5, 10),
            candidate(1, 5, 10),
            candidate(9, 0, 12),
        ];
        scores.sort_by(rank);
        let ids: Vec<i64> = scores.iter().map(|s| s.rule_id).collect();
        assert_eq!(ids, vec![9, 1, 2, 3]);
    }

    #[test]
    fn test_decide_threshold() {
        assert_eq!(decide(&[], 0), MatchOutcome::NoMatch);
        assert_eq!(decide(&[candidate(1, 0, 0)], 0), MatchOutcome::NoMatch);
        assert_eq!(decide(&[candidate(1, 0, 3)], 3), MatchOutcome::NoMatch);
        assert_eq!(
            decide(&[candidate(1, 0, 4)], 3),
            MatchOutcome::Matched {
                rule_id: 1,
                score: 4
            }
        );
    }
}
