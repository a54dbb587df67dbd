//! Ingest pipeline
//!
//! Composes parsing, merchant normalization and ingest-time category
//! assignment into one call. Hints run first as the zero-training baseline;
//! the rule snapshot is consulted for whatever hints leave unclassified.
//! Batch rule application over an existing ledger is the rule engine's own
//! surface and is unaffected by this ordering.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::hints::CategoryHints;
use crate::ingest::parse_document;
use crate::merchant::MerchantNormalizer;
use crate::models::{
    ActionType, CategorySource, DocumentKind, NormalizedMerchant, ParsedTransaction, Rule,
    SkipSummary,
};
use crate::rules::{RuleEngine, RuleInput};

/// A parsed transaction with its canonical merchant and ingest-time category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizedTransaction {
    #[serde(flatten)]
    pub transaction: ParsedTransaction,
    pub merchant: NormalizedMerchant,
    pub category_id: Option<String>,
    pub category_source: CategorySource,
}

/// Result of running the full pipeline over one document
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub transactions: Vec<CategorizedTransaction>,
    pub skipped: SkipSummary,
    pub detected_format: Option<String>,
}

/// Parse → normalize merchants → assign categories
pub struct IngestPipeline {
    normalizer: MerchantNormalizer,
    hints: CategoryHints,
    rules: RuleEngine,
}

impl IngestPipeline {
    pub fn new() -> Self {
        Self {
            normalizer: MerchantNormalizer::new(),
            hints: CategoryHints::new(),
            rules: RuleEngine::new(),
        }
    }

    pub fn ingest(
        &self,
        bytes: &[u8],
        kind: DocumentKind,
        rules: &[Rule],
    ) -> Result<IngestOutcome> {
        let outcome = parse_document(bytes, kind)?;
        let transactions = outcome
            .transactions
            .into_iter()
            .map(|tx| self.categorize(tx, rules))
            .collect();
        Ok(IngestOutcome {
            transactions,
            skipped: outcome.skipped,
            detected_format: outcome.detected_format,
        })
    }

    fn categorize(&self, tx: ParsedTransaction, rules: &[Rule]) -> CategorizedTransaction {
        let merchant = self
            .normalizer
            .normalize(tx.merchant_raw.as_deref(), Some(&tx.description));

        let hint_text = format!("{} {}", tx.description, merchant.merchant);
        if let Some(category) = self.hints.hint(&hint_text, tx.amount) {
            debug!(category, description = %tx.description, "hint assigned category");
            return CategorizedTransaction {
                transaction: tx,
                merchant,
                category_id: Some(category.to_string()),
                category_source: CategorySource::Hint,
            };
        }

        let input = RuleInput {
            description: tx.description.clone(),
            merchant: Some(merchant.merchant.clone()),
            amount: tx.amount,
            category_id: None,
            tags: Vec::new(),
        };
        if let Some(winner) = self.rules.evaluate(rules, &input) {
            if winner.action_type == ActionType::SetCategory {
                debug!(
                    rule_id = winner.rule_id,
                    category = %winner.action_value,
                    "rule assigned category"
                );
                return CategorizedTransaction {
                    transaction: tx,
                    merchant,
                    category_id: Some(winner.action_value),
                    category_source: CategorySource::Rule,
                };
            }
        }

        CategorizedTransaction {
            transaction: tx,
            merchant,
            category_id: None,
            category_source: CategorySource::Uncategorized,
        }
    }
}

impl Default for IngestPipeline {
    fn default() -> Self {
        Self::new()
    }
}
