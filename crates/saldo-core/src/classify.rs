//! Statistical reclassification of the "other" bucket
//!
//! A multinomial Naive Bayes classifier is trained from scratch on every
//! invocation from the caller's already-categorized transactions, then
//! proposes category corrections for transactions nothing else classified.
//! Proposals are gated twice: by probability/margin thresholds (or collapsed
//! to top-level ancestors in force mode) and by hard guardrails that require
//! corroborating tokens for sensitive categories. The caller persists
//! accepted candidates; this module never writes anything.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::categories;
use crate::error::Result;
use crate::models::ReclassifyCandidate;

const TOKEN_MIN_LEN: usize = 3;
const TOKEN_MAX_LEN: usize = 32;

/// Tokens too common across categories to carry signal
const STOP_WORDS: &[&str] = &[
    "til",
    "fra",
    "med",
    "den",
    "det",
    "som",
    "for",
    "betaling",
    "betalt",
    "overføring",
    "nettgiro",
    "avtalegiro",
    "efaktura",
    "visa",
    "varekjøp",
    "kortkjøp",
    "korttransaksjon",
    "faktura",
    "giro",
    "konto",
    "kurs",
    "nok",
    "dato",
    "mottaker",
    "melding",
];

/// Brand tokens that must corroborate a grocery prediction
const GROCERY_MARKERS: &[&str] = &[
    "kiwi",
    "rema",
    "coop",
    "extra",
    "joker",
    "meny",
    "spar",
    "bunnpris",
    "obs",
    "matkroken",
    "oda",
];

/// Transfer-app tokens that must corroborate a peer-to-peer prediction
const P2P_MARKERS: &[&str] = &["vipps", "mobilepay", "straksbetaling"];

/// Tax-authority tokens that must corroborate a tax prediction
const TAX_MARKERS: &[&str] = &["skatteetaten", "skatt", "kemner"];

/// One already-categorized transaction used for training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub category_id: String,
    pub text: String,
}

/// One "other"-bucket transaction offered for reclassification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtherTransaction {
    pub id: i64,
    pub text: String,
    pub amount: f64,
}

/// Source of "other"-bucket pages, owned by the caller
///
/// Pages are ordered by ascending id; the cursor is the last id already
/// scanned, so re-invoking with the same cursor is safe.
pub trait OtherBucket {
    fn page_after(&self, cursor: Option<i64>, limit: usize) -> Result<Vec<OtherTransaction>>;
    fn remaining_after(&self, cursor: Option<i64>) -> Result<u64>;
}

/// In-memory bucket over a vector (tests and file-based callers)
pub struct VecBucket {
    items: Vec<OtherTransaction>,
}

impl VecBucket {
    pub fn new(mut items: Vec<OtherTransaction>) -> Self {
        items.sort_by_key(|t| t.id);
        Self { items }
    }
}

impl OtherBucket for VecBucket {
    fn page_after(&self, cursor: Option<i64>, limit: usize) -> Result<Vec<OtherTransaction>> {
        Ok(self
            .items
            .iter()
            .filter(|t| cursor.is_none_or(|c| t.id > c))
            .take(limit)
            .cloned()
            .collect())
    }

    fn remaining_after(&self, cursor: Option<i64>) -> Result<u64> {
        Ok(self
            .items
            .iter()
            .filter(|t| cursor.is_none_or(|c| t.id > c))
            .count() as u64)
    }
}

/// Product-tuned thresholds, overridable per call
#[derive(Debug, Clone)]
pub struct ReclassifyConfig {
    /// Two-candidate softmax probability required to commit
    pub min_probability: f64,
    /// Log-likelihood gap to the runner-up required to commit
    pub min_margin: f64,
    /// Categories with fewer training documents are dropped as too sparse
    pub min_category_docs: usize,
    /// Laplace smoothing strength
    pub smoothing: f64,
    /// Transactions per page
    pub page_size: usize,
    /// Upper bound on pages per run
    pub max_rounds: usize,
    /// Residual "other" volume above which the two-phase strategy runs a
    /// force pass
    pub force_residual_threshold: u64,
}

impl Default for ReclassifyConfig {
    fn default() -> Self {
        Self {
            min_probability: 0.75,
            min_margin: 1.2,
            min_category_docs: 10,
            smoothing: 1.0,
            page_size: 200,
            max_rounds: 25,
            force_residual_threshold: 50,
        }
    }
}

/// Lowercase Unicode-aware word split; Norwegian letters are ordinary word
/// characters
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| {
            let len = t.chars().count();
            (TOKEN_MIN_LEN..=TOKEN_MAX_LEN).contains(&len)
        })
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default)]
struct CategoryStats {
    docs: usize,
    token_total: usize,
    token_counts: HashMap<String, usize>,
}

/// Top prediction with its confidence signals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub category_id: String,
    /// Two-candidate softmax over the top two log-posteriors
    pub probability: f64,
    /// Log-posterior gap between first and second place
    pub margin: f64,
}

/// Multinomial Naive Bayes model, rebuilt per invocation and never persisted
#[derive(Debug)]
pub struct ClassifierModel {
    classes: HashMap<String, CategoryStats>,
    vocabulary: HashSet<String>,
    total_docs: usize,
    smoothing: f64,
}

impl ClassifierModel {
    /// Train on the caller's categorized transactions, dropping categories
    /// below the document threshold
    pub fn train(corpus: &[TrainingExample], min_category_docs: usize, smoothing: f64) -> Self {
        let mut classes: HashMap<String, CategoryStats> = HashMap::new();
        for example in corpus {
            let tokens = tokenize(&example.text);
            if tokens.is_empty() {
                continue;
            }
            let stats = classes.entry(example.category_id.clone()).or_default();
            stats.docs += 1;
            for token in tokens {
                stats.token_total += 1;
                *stats.token_counts.entry(token).or_insert(0) += 1;
            }
        }
        classes.retain(|category, stats| {
            let keep = stats.docs >= min_category_docs;
            if !keep {
                debug!(category = %category, docs = stats.docs, "dropping sparse category");
            }
            keep
        });

        let mut vocabulary = HashSet::new();
        let mut total_docs = 0;
        for stats in classes.values() {
            total_docs += stats.docs;
            vocabulary.extend(stats.token_counts.keys().cloned());
        }
        info!(
            categories = classes.len(),
            documents = total_docs,
            vocabulary = vocabulary.len(),
            "trained classifier"
        );
        Self {
            classes,
            vocabulary,
            total_docs,
            smoothing,
        }
    }

    pub fn category_count(&self) -> usize {
        self.classes.len()
    }

    /// Score a text against every surviving category
    ///
    /// Returns None when fewer than two categories survived training or when
    /// no token of the text is in the vocabulary; insufficient data yields
    /// no prediction, never an error.
    pub fn predict(&self, text: &str) -> Option<Prediction> {
        if self.classes.len() < 2 {
            return None;
        }
        let tokens: Vec<String> = tokenize(text)
            .into_iter()
            .filter(|t| self.vocabulary.contains(t))
            .collect();
        if tokens.is_empty() {
            return None;
        }

        let vocab_size = self.vocabulary.len() as f64;
        let mut scored: Vec<(&str, f64)> = self
            .classes
            .iter()
            .map(|(category, stats)| {
                let prior = (stats.docs as f64 / self.total_docs as f64).ln();
                let likelihood: f64 = tokens
                    .iter()
                    .map(|token| {
                        let count = stats.token_counts.get(token).copied().unwrap_or(0) as f64;
                        ((count + self.smoothing)
                            / (stats.token_total as f64 + self.smoothing * vocab_size))
                            .ln()
                    })
                    .sum();
                (category.as_str(), prior + likelihood)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(b.0))
        });

        let (top_category, top_score) = scored[0];
        let (_, second_score) = scored[1];
        // two-class softmax over only the top two keeps the exponentials
        // bounded
        let probability = 1.0 / (1.0 + (second_score - top_score).exp());
        Some(Prediction {
            category_id: top_category.to_string(),
            probability,
            margin: top_score - second_score,
        })
    }
}

/// Post-threshold safety checks; any failure discards the prediction
fn passes_guardrails(category_id: &str, text: &str, amount: f64) -> bool {
    let lower = text.to_lowercase();
    if categories::is_income(category_id) && amount < 0.0 {
        return false;
    }
    if category_id == categories::GROCERIES || category_id.starts_with("groceries.") {
        return GROCERY_MARKERS.iter().any(|m| lower.contains(m));
    }
    if category_id == categories::TRANSFERS_P2P {
        return P2P_MARKERS.iter().any(|m| lower.contains(m));
    }
    if category_id == categories::TAXES || category_id.starts_with("taxes.") {
        return TAX_MARKERS.iter().any(|m| lower.contains(m));
    }
    true
}

/// Result of one reclassification run
#[derive(Debug, Clone, Serialize)]
pub struct ReclassifyReport {
    pub scanned: u64,
    pub proposed: u64,
    pub remaining: u64,
    /// Continuation cursor; feed it back to resume the scan
    pub cursor: Option<i64>,
    pub candidates: Vec<ReclassifyCandidate>,
}

/// Scans the "other" bucket and proposes category corrections
pub struct Reclassifier<'a> {
    model: ClassifierModel,
    config: ReclassifyConfig,
    /// Caller's read-only child→parent category map, consulted in force mode
    parents: &'a HashMap<String, String>,
}

impl<'a> Reclassifier<'a> {
    pub fn new(
        corpus: &[TrainingExample],
        config: ReclassifyConfig,
        parents: &'a HashMap<String, String>,
    ) -> Self {
        let model = ClassifierModel::train(corpus, config.min_category_docs, config.smoothing);
        Self {
            model,
            config,
            parents,
        }
    }

    pub fn model(&self) -> &ClassifierModel {
        &self.model
    }

    fn top_level_ancestor(&self, category_id: &str) -> String {
        let mut current = category_id.to_string();
        let mut hops = 0;
        while let Some(parent) = self.parents.get(&current) {
            current = parent.clone();
            hops += 1;
            if hops > 16 {
                break;
            }
        }
        current
    }

    /// Classify one transaction; None when thresholds or guardrails reject
    fn candidate(&self, tx: &OtherTransaction, force: bool) -> Option<ReclassifyCandidate> {
        let prediction = self.model.predict(&tx.text)?;
        let mut category = prediction.category_id.clone();
        if force {
            // forced commits lose specificity unless the leaf is on the
            // allow-list
            if !categories::SAFE_FORCE_LEAVES.contains(&category.as_str()) {
                category = self.top_level_ancestor(&category);
            }
        } else if prediction.probability < self.config.min_probability
            || prediction.margin < self.config.min_margin
        {
            return None;
        }
        if !passes_guardrails(&category, &tx.text, tx.amount) {
            debug!(
                transaction_id = tx.id,
                category = %category,
                "guardrail discarded prediction"
            );
            return None;
        }
        Some(ReclassifyCandidate {
            transaction_id: tx.id,
            predicted_category: category,
            probability: prediction.probability,
            margin: prediction.margin,
        })
    }

    /// One cursor-driven scan with bounded rounds
    pub fn run<B: OtherBucket>(
        &self,
        bucket: &B,
        cursor: Option<i64>,
        force: bool,
    ) -> Result<ReclassifyReport> {
        let mut cursor = cursor;
        let mut scanned = 0u64;
        let mut candidates = Vec::new();

        for _ in 0..self.config.max_rounds {
            let page = bucket.page_after(cursor, self.config.page_size)?;
            if page.is_empty() {
                break;
            }
            for tx in &page {
                scanned += 1;
                if let Some(candidate) = self.candidate(tx, force) {
                    candidates.push(candidate);
                }
            }
            cursor = page.last().map(|t| t.id);
        }

        let remaining = bucket.remaining_after(cursor)?;
        Ok(ReclassifyReport {
            scanned,
            proposed: candidates.len() as u64,
            remaining,
            cursor,
            candidates,
        })
    }

    /// Two-phase strategy: safe thresholds first, force mode only while the
    /// residual "other" volume stays large
    pub fn run_two_phase<B: OtherBucket>(&self, bucket: &B) -> Result<ReclassifyReport> {
        let safe = self.run(bucket, None, false)?;
        let residual = safe.remaining + safe.scanned.saturating_sub(safe.proposed);
        if residual <= self.config.force_residual_threshold {
            return Ok(safe);
        }
        info!(residual, "running force pass over residual other-bucket");

        let forced = self.run(bucket, None, true)?;
        let safe_ids: HashSet<i64> = safe.candidates.iter().map(|c| c.transaction_id).collect();
        let mut candidates = safe.candidates;
        candidates.extend(
            forced
                .candidates
                .into_iter()
                .filter(|c| !safe_ids.contains(&c.transaction_id)),
        );
        Ok(ReclassifyReport {
            scanned: safe.scanned.max(forced.scanned),
            proposed: candidates.len() as u64,
            remaining: forced.remaining,
            cursor: forced.cursor,
            candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(entries: &[(&str, &str, usize)]) -> Vec<TrainingExample> {
        let mut out = Vec::new();
        for (category, text, count) in entries {
            for i in 0..*count {
                out.push(TrainingExample {
                    category_id: category.to_string(),
                    text: format!("{} {}", text, i),
                });
            }
        }
        out
    }

    fn grocery_vs_streaming() -> Vec<TrainingExample> {
        corpus(&[
            ("groceries", "kiwi dagligvarer handel", 6),
            ("groceries", "rema dagligvarer handel", 6),
            ("subscriptions.streaming", "netflix månedsabonnement", 6),
            ("subscriptions.streaming", "spotify månedsabonnement", 6),
        ])
    }

    #[test]
    fn test_tokenize_keeps_norwegian_letters() {
        let tokens = tokenize("VISA VAREKJØP BELØP Grünerløkka på 123,45");
        assert!(tokens.contains(&"beløp".to_string()));
        assert!(tokens.contains(&"grünerløkka".to_string()));
        // stop word and short tokens removed
        assert!(!tokens.contains(&"varekjøp".to_string()));
        assert!(!tokens.contains(&"på".to_string()));
    }

    #[test]
    fn test_tokenize_length_window() {
        let long = "x".repeat(40);
        let tokens = tokenize(&format!("ab abc {}", long));
        assert_eq!(tokens, vec!["abc".to_string()]);
    }

    #[test]
    fn test_held_out_grocery_string_predicts_grocery() {
        let model = ClassifierModel::train(&grocery_vs_streaming(), 10, 1.0);
        assert_eq!(model.category_count(), 2);
        let prediction = model.predict("KIWI 334 GRÜNERLØKKA dagligvarer").unwrap();
        assert_eq!(prediction.category_id, "groceries");
        assert!(prediction.probability > 0.5);
        assert!(prediction.margin > 0.0);
    }

    #[test]
    fn test_sparse_categories_are_dropped() {
        let mut examples = grocery_vs_streaming();
        examples.extend(corpus(&[("travel", "flybillett oslo bergen", 3)]));
        let model = ClassifierModel::train(&examples, 10, 1.0);
        assert_eq!(model.category_count(), 2);
        // a travel-only text now has no vocabulary overlap
        assert!(model.predict("flybillett oslo bergen").is_none());
    }

    #[test]
    fn test_single_surviving_category_yields_no_prediction() {
        let examples = corpus(&[("groceries", "kiwi dagligvarer", 12)]);
        let model = ClassifierModel::train(&examples, 10, 1.0);
        assert!(model.predict("kiwi dagligvarer").is_none());
    }

    #[test]
    fn test_unknown_tokens_yield_no_prediction() {
        let model = ClassifierModel::train(&grocery_vs_streaming(), 10, 1.0);
        assert!(model.predict("zzz qqq").is_none());
    }

    fn no_parents() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_grocery_guardrail_requires_brand_token() {
        // "dagligvarer" dominates the grocery class, so a text with only that
        // token predicts groceries but carries no brand marker
        let parents = no_parents();
        let reclassifier = Reclassifier::new(
            &grocery_vs_streaming(),
            ReclassifyConfig {
                min_probability: 0.0,
                min_margin: 0.0,
                ..Default::default()
            },
            &parents,
        );
        let without_brand = OtherTransaction {
            id: 1,
            text: "dagligvarer handel".to_string(),
            amount: -100.0,
        };
        assert!(reclassifier.candidate(&without_brand, false).is_none());

        let with_brand = OtherTransaction {
            id: 2,
            text: "kiwi dagligvarer handel".to_string(),
            amount: -100.0,
        };
        let candidate = reclassifier.candidate(&with_brand, false).unwrap();
        assert_eq!(candidate.predicted_category, "groceries");
    }

    #[test]
    fn test_income_is_never_applied_to_expenses() {
        let parents = no_parents();
        let examples = corpus(&[
            ("income.salary", "lønn utbetaling arbeidsgiver", 12),
            ("groceries", "kiwi dagligvarer", 12),
        ]);
        let reclassifier = Reclassifier::new(
            &examples,
            ReclassifyConfig {
                min_probability: 0.0,
                min_margin: 0.0,
                ..Default::default()
            },
            &parents,
        );
        let expense = OtherTransaction {
            id: 1,
            text: "lønn utbetaling arbeidsgiver".to_string(),
            amount: -500.0,
        };
        assert!(reclassifier.candidate(&expense, false).is_none());

        let income = OtherTransaction {
            id: 2,
            text: "lønn utbetaling arbeidsgiver".to_string(),
            amount: 500.0,
        };
        assert!(reclassifier.candidate(&income, false).is_some());
    }

    #[test]
    fn test_thresholds_gate_commits() {
        let parents = no_parents();
        let reclassifier = Reclassifier::new(
            &grocery_vs_streaming(),
            ReclassifyConfig {
                min_probability: 1.1, // impossible
                ..Default::default()
            },
            &parents,
        );
        let tx = OtherTransaction {
            id: 1,
            text: "kiwi dagligvarer handel".to_string(),
            amount: -100.0,
        };
        assert!(reclassifier.candidate(&tx, false).is_none());
        // force mode bypasses thresholds
        assert!(reclassifier.candidate(&tx, true).is_some());
    }

    #[test]
    fn test_force_mode_collapses_to_top_level() {
        let parents: HashMap<String, String> = [
            ("shopping.clothing".to_string(), "shopping".to_string()),
            ("subscriptions.streaming".to_string(), "subscriptions".to_string()),
        ]
        .into();
        let examples = corpus(&[
            ("shopping.clothing", "zalando klær bestilling", 12),
            ("groceries", "kiwi dagligvarer", 12),
        ]);
        let reclassifier = Reclassifier::new(
            &examples,
            ReclassifyConfig {
                min_probability: 1.1,
                ..Default::default()
            },
            &parents,
        );
        let tx = OtherTransaction {
            id: 1,
            text: "zalando klær bestilling".to_string(),
            amount: -400.0,
        };
        let candidate = reclassifier.candidate(&tx, true).unwrap();
        assert_eq!(candidate.predicted_category, "shopping");

        // an allow-listed leaf keeps full specificity
        let examples = corpus(&[
            ("subscriptions.streaming", "netflix månedsabonnement", 12),
            ("groceries", "kiwi dagligvarer", 12),
        ]);
        let reclassifier = Reclassifier::new(
            &examples,
            ReclassifyConfig {
                min_probability: 1.1,
                ..Default::default()
            },
            &parents,
        );
        let tx = OtherTransaction {
            id: 2,
            text: "netflix månedsabonnement".to_string(),
            amount: -149.0,
        };
        let candidate = reclassifier.candidate(&tx, true).unwrap();
        assert_eq!(candidate.predicted_category, "subscriptions.streaming");
    }

    fn other_items(n: i64) -> Vec<OtherTransaction> {
        (1..=n)
            .map(|id| OtherTransaction {
                id,
                text: "kiwi dagligvarer handel".to_string(),
                amount: -10.0,
            })
            .collect()
    }

    #[test]
    fn test_paging_scans_everything_and_reports_cursor() {
        let parents = no_parents();
        let reclassifier = Reclassifier::new(
            &grocery_vs_streaming(),
            ReclassifyConfig {
                min_probability: 0.0,
                min_margin: 0.0,
                page_size: 2,
                ..Default::default()
            },
            &parents,
        );
        let bucket = VecBucket::new(other_items(5));
        let report = reclassifier.run(&bucket, None, false).unwrap();
        assert_eq!(report.scanned, 5);
        assert_eq!(report.proposed, 5);
        assert_eq!(report.remaining, 0);
        assert_eq!(report.cursor, Some(5));
    }

    #[test]
    fn test_bounded_rounds_leave_a_resumable_cursor() {
        let parents = no_parents();
        let reclassifier = Reclassifier::new(
            &grocery_vs_streaming(),
            ReclassifyConfig {
                min_probability: 0.0,
                min_margin: 0.0,
                page_size: 2,
                max_rounds: 1,
                ..Default::default()
            },
            &parents,
        );
        let bucket = VecBucket::new(other_items(5));
        let first = reclassifier.run(&bucket, None, false).unwrap();
        assert_eq!(first.scanned, 2);
        assert_eq!(first.cursor, Some(2));
        assert_eq!(first.remaining, 3);

        // resuming from the cursor is idempotent over the remainder
        let second = reclassifier.run(&bucket, first.cursor, false).unwrap();
        assert_eq!(second.scanned, 2);
        assert_eq!(second.cursor, Some(4));
        let repeat = reclassifier.run(&bucket, first.cursor, false).unwrap();
        assert_eq!(repeat.scanned, 2);
        assert_eq!(repeat.cursor, Some(4));
    }

    #[test]
    fn test_two_phase_runs_force_only_on_large_residual() {
        let parents = no_parents();
        // thresholds impossible: the safe pass proposes nothing
        let config = ReclassifyConfig {
            min_probability: 1.1,
            page_size: 10,
            force_residual_threshold: 2,
            ..Default::default()
        };
        let reclassifier = Reclassifier::new(&grocery_vs_streaming(), config, &parents);

        let bucket = VecBucket::new(other_items(5));
        let report = reclassifier.run_two_phase(&bucket).unwrap();
        // residual 5 > 2, so the force pass proposed everything
        assert_eq!(report.proposed, 5);

        let small_bucket = VecBucket::new(other_items(2));
        let report = reclassifier.run_two_phase(&small_bucket).unwrap();
        // residual 2 <= 2, force pass skipped
        assert_eq!(report.proposed, 0);
    }
}
