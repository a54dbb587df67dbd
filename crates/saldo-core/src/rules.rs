//! User-rule evaluation
//!
//! Rules come from the caller's store as an ordered snapshot; the engine
//! never writes the store. Evaluation sorts by ascending priority (lower
//! number wins) and the first matching enabled rule decides. Regex patterns
//! are user input: they are validated against length and structural caps,
//! compiled with size limits, and matched under a deadline budget. Any
//! failure just means "no match", never an error for the batch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{ActionType, MatchField, MatchType, Rule};

/// Longest accepted regex pattern
pub const MAX_PATTERN_LEN: usize = 256;
const MAX_GROUPS: usize = 12;
const MAX_QUANTIFIERS: usize = 24;
const REGEX_SIZE_LIMIT: usize = 1 << 16;
/// Only this many characters of a field are offered to a regex
const MATCH_INPUT_CAP: usize = 512;
const DEFAULT_MATCH_BUDGET: Duration = Duration::from_millis(25);

/// Transaction view a rule evaluates against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleInput {
    pub description: String,
    #[serde(default)]
    pub merchant: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The winning rule's proposed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_id: i64,
    pub action_type: ActionType,
    pub action_value: String,
}

/// Counters for one batch application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBatchReport {
    pub processed: u64,
    pub matched: u64,
    pub updated: u64,
}

/// Result of applying a rule snapshot to a batch of transactions
#[derive(Debug, Clone, Serialize)]
pub struct RuleBatchOutcome {
    /// Per-input winning action, index-aligned with the input slice
    pub matches: Vec<Option<RuleMatch>>,
    pub report: RuleBatchReport,
}

/// Reject patterns whose shape could explode on repetition
///
/// Group and quantifier counts are capped and a quantified group that itself
/// contains a quantifier is refused outright.
fn validate_pattern(pattern: &str) -> bool {
    if pattern.len() > MAX_PATTERN_LEN {
        return false;
    }
    let chars: Vec<char> = pattern.chars().collect();
    let mut groups = 0usize;
    let mut quantifiers = 0usize;
    let mut open_groups: Vec<bool> = Vec::new(); // group contains a quantifier
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '(' => {
                groups += 1;
                open_groups.push(false);
            }
            ')' => {
                let had_quantifier = open_groups.pop().unwrap_or(false);
                if had_quantifier {
                    if let Some(next) = chars.get(i + 1) {
                        if matches!(next, '+' | '*' | '{') {
                            return false;
                        }
                    }
                }
                if let Some(parent) = open_groups.last_mut() {
                    *parent |= had_quantifier;
                }
            }
            '+' | '*' | '?' | '{' => {
                quantifiers += 1;
                if let Some(current) = open_groups.last_mut() {
                    *current = true;
                }
            }
            _ => {}
        }
        i += 1;
    }
    groups <= MAX_GROUPS && quantifiers <= MAX_QUANTIFIERS
}

fn compile_pattern(pattern: &str) -> Option<Regex> {
    if !validate_pattern(pattern) {
        warn!(pattern, "rejecting rule pattern failing validation");
        return None;
    }
    match RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .dfa_size_limit(REGEX_SIZE_LIMIT)
        .build()
    {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(pattern, error = %e, "rule pattern failed to compile");
            None
        }
    }
}

fn cap_input(text: &str) -> &str {
    match text.char_indices().nth(MATCH_INPUT_CAP) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Rule engine with a per-match deadline budget
pub struct RuleEngine {
    match_budget: Duration,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            match_budget: DEFAULT_MATCH_BUDGET,
        }
    }

    pub fn with_budget(match_budget: Duration) -> Self {
        Self { match_budget }
    }

    /// Evaluate a rule snapshot against one transaction; the lowest priority
    /// number among matching enabled rules wins regardless of snapshot order
    pub fn evaluate(&self, rules: &[Rule], input: &RuleInput) -> Option<RuleMatch> {
        let mut cache = HashMap::new();
        self.evaluate_cached(rules, input, &mut cache)
    }

    fn evaluate_cached(
        &self,
        rules: &[Rule],
        input: &RuleInput,
        regex_cache: &mut HashMap<i64, Option<Regex>>,
    ) -> Option<RuleMatch> {
        let mut order: Vec<&Rule> = rules.iter().filter(|r| r.enabled).collect();
        order.sort_by_key(|r| (r.priority, r.id));

        for rule in order {
            if self.rule_matches(rule, input, regex_cache) {
                debug!(rule_id = rule.id, rule = %rule.name, "rule matched");
                return Some(RuleMatch {
                    rule_id: rule.id,
                    action_type: rule.action_type,
                    action_value: rule.action_value.clone(),
                });
            }
        }
        None
    }

    fn rule_matches(
        &self,
        rule: &Rule,
        input: &RuleInput,
        regex_cache: &mut HashMap<i64, Option<Regex>>,
    ) -> bool {
        if rule.match_field == MatchField::Amount {
            return self.amount_matches(rule, input.amount);
        }
        let text = match rule.match_field {
            MatchField::Description => input.description.as_str(),
            MatchField::Merchant => match input.merchant.as_deref() {
                Some(m) => m,
                None => return false,
            },
            MatchField::Amount => unreachable!(),
        };
        let text_upper = text.to_uppercase();
        let value_upper = rule.match_value.to_uppercase();
        match rule.match_type {
            MatchType::Contains => text_upper.contains(&value_upper),
            MatchType::Equals => text_upper == value_upper,
            MatchType::StartsWith => text_upper.starts_with(&value_upper),
            MatchType::EndsWith => text_upper.ends_with(&value_upper),
            MatchType::Regex => {
                let regex = regex_cache
                    .entry(rule.id)
                    .or_insert_with(|| compile_pattern(&rule.match_value));
                match regex {
                    Some(regex) => self.regex_matches(regex, text),
                    None => false,
                }
            }
            // an amount comparison against a text field never matches
            MatchType::AmountBetween => false,
        }
    }

    fn amount_matches(&self, rule: &Rule, amount: f64) -> bool {
        match rule.match_type {
            MatchType::Equals => rule
                .match_value
                .trim()
                .parse::<f64>()
                .is_ok_and(|v| (v - amount).abs() < 0.005),
            MatchType::AmountBetween => {
                let low = rule.match_value.trim().parse::<f64>();
                let high = rule
                    .match_value_secondary
                    .as_deref()
                    .unwrap_or("")
                    .trim()
                    .parse::<f64>();
                match (low, high) {
                    (Ok(low), Ok(high)) => amount >= low && amount <= high,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Run one regex attempt under the deadline budget; overruns degrade to
    /// "no match" instead of failing the batch
    fn regex_matches(&self, regex: &Regex, text: &str) -> bool {
        let start = Instant::now();
        let matched = regex.is_match(cap_input(text));
        if start.elapsed() > self.match_budget {
            warn!(pattern = regex.as_str(), "regex exceeded match budget");
            return false;
        }
        matched
    }

    /// Apply a rule snapshot to a batch, reporting processed/matched/updated
    ///
    /// "updated" counts inputs whose winning action would actually change
    /// them: a category different from the current one, or a tag not yet
    /// present.
    pub fn apply_batch(&self, rules: &[Rule], inputs: &[RuleInput]) -> RuleBatchOutcome {
        let mut regex_cache = HashMap::new();
        let mut matches = Vec::with_capacity(inputs.len());
        let mut report = RuleBatchReport {
            processed: inputs.len() as u64,
            ..Default::default()
        };

        for input in inputs {
            let result = self.evaluate_cached(rules, input, &mut regex_cache);
            if let Some(m) = &result {
                report.matched += 1;
                let changes = match m.action_type {
                    ActionType::SetCategory => {
                        input.category_id.as_deref() != Some(m.action_value.as_str())
                    }
                    ActionType::AddTag => !input.tags.contains(&m.action_value),
                };
                if changes {
                    report.updated += 1;
                }
            }
            matches.push(result);
        }
        RuleBatchOutcome { matches, report }
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}
