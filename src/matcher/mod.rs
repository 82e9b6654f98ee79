//! Matcher
//!
//! Scores every active rule against the query and picks the best one.
//! Pure: no side effects, a function of (query text, rule snapshot).
//!
//! ```text
//! query ──normalize──► score_rule (per active rule)
//!                           │
//!                           ▼
//!                  sort by rank() ── decide(min_score)
//!                           │
//!              ┌────────────┴────────────┐
//!              ▼                         ▼
//!          NoMatch              Matched ──► extract parameters
//! ```

pub mod scoring;

use std::collections::HashMap;

use tracing::debug;

use crate::catalog::{Category, IntentRule, RuleCatalog};
use crate::extraction::extract;
use crate::text::normalize;

pub use scoring::{MatchOutcome, RuleScore, DEFAULT_MIN_SCORE, MAX_CANDIDATES};
use scoring::{decide, rank, score_rule};

/// Per-query match result. Discarded once the response is composed.
#[derive(Debug, Clone)]
pub struct MatchResult<'a> {
    /// Winning rule, or `None` for "no match".
    pub rule: Option<&'a IntentRule>,
    /// Score of the winning rule (best score seen when nothing matched).
    pub score: u32,
    /// Canonical parameter values extracted for the winning rule.
    pub extracted_parameters: HashMap<String, String>,
    /// Top-ranked candidates with a non-zero score, best first.
    pub candidates: Vec<RuleScore>,
}

impl<'a> MatchResult<'a> {
    fn no_match(score: u32, candidates: Vec<RuleScore>) -> Self {
        Self {
            rule: None,
            score,
            extracted_parameters: HashMap::new(),
            candidates,
        }
    }

    pub fn is_match(&self) -> bool {
        self.rule.is_some()
    }
}

/// Keyword matcher with a configurable decision threshold.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    min_score: u32,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SCORE)
    }
}

impl Matcher {
    pub fn new(min_score: u32) -> Self {
        Self { min_score }
    }

    pub fn min_score(&self) -> u32 {
        self.min_score
    }

    /// Match against any rule collection; inactive rules are skipped.
    pub fn match_query<'a, I>(&self, query_text: &str, rules: I) -> MatchResult<'a>
    where
        I: IntoIterator<Item = &'a IntentRule>,
    {
        let normalized = normalize(query_text);
        let active: Vec<&'a IntentRule> = rules.into_iter().filter(|r| r.is_active()).collect();

        let mut ranked: Vec<RuleScore> = active
            .iter()
            .map(|rule| RuleScore::of(rule, score_rule(&normalized, rule)))
            .collect();
        ranked.sort_by(rank);

        let best = ranked.first().map(|s| s.score).unwrap_or(0);
        let outcome = decide(&ranked, self.min_score);

        ranked.retain(|s| s.score > 0);
        ranked.truncate(MAX_CANDIDATES);

        match outcome {
            MatchOutcome::NoMatch => {
                debug!(
                    "No rule scored above {} (best {}) for query {:?}",
                    self.min_score, best, query_text
                );
                MatchResult::no_match(best, ranked)
            }
            MatchOutcome::Matched { rule_id, score } => {
                let rule = active.iter().copied().find(|r| r.id == rule_id);
                let extracted_parameters = rule.map(|r| extract(query_text, r)).unwrap_or_default();
                if let Some(r) = rule {
                    debug!(
                        "Matched rule {} '{}' with score {} ({} parameters extracted)",
                        r.id,
                        r.name,
                        score,
                        extracted_parameters.len()
                    );
                }
                MatchResult {
                    rule,
                    score,
                    extracted_parameters,
                    candidates: ranked,
                }
            }
        }
    }

    /// Match against a catalog, optionally pre-filtered by a scenario hint.
    ///
    /// A hint that names no category, or a category without active rules,
    /// leaves the full active set in play.
    pub fn match_catalog<'a>(
        &self,
        query_text: &str,
        catalog: &'a RuleCatalog,
        scenario_hint: Option<&str>,
    ) -> MatchResult<'a> {
        if let Some(category) = scenario_hint.and_then(Category::from_hint) {
            if catalog.active_rules().any(|r| r.category == category) {
                return self.match_query(
                    query_text,
                    catalog.active_rules().filter(|r| r.category == category),
                );
            }
            debug!(
                "Scenario hint '{}' has no active rules; scoring the full catalog",
                category.as_str()
            );
        }
        self.match_query(query_text, catalog.rules())
    }
}

/// Match with the default threshold.
pub fn match_query<'a>(query_text: &str, rules: &'a [IntentRule]) -> MatchResult<'a> {
    Matcher::default().match_query(query_text, rules)
}
