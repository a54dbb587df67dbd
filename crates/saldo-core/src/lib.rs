//! Saldo Core Library
//!
//! Shared functionality for turning heterogeneous bank export documents into
//! a normalized transaction ledger:
//! - Format sniffing and table extraction for spreadsheets and delimited text
//! - Statement-text (PDF) line and block extraction
//! - Locale-aware date and amount parsing
//! - Merchant canonicalization and chain grouping
//! - Keyword category hints and a user-rule engine
//! - Naive Bayes reclassification of the "other" bucket with guardrails
//!
//! Persistence, HTTP, authentication and UI are the caller's concern; every
//! engine here reads snapshots supplied by the caller and returns proposals
//! for the caller to persist.

pub mod categories;
pub mod classify;
pub mod error;
pub mod export;
pub mod hints;
pub mod ingest;
pub mod merchant;
pub mod models;
pub mod pipeline;
pub mod rules;

pub use classify::{
    ClassifierModel, OtherBucket, OtherTransaction, Prediction, ReclassifyConfig,
    ReclassifyReport, Reclassifier, TrainingExample, VecBucket,
};
pub use error::{Error, Result};
pub use export::{export_transactions, ExportFormat};
pub use hints::CategoryHints;
pub use ingest::parse_document;
pub use merchant::MerchantNormalizer;
pub use models::{
    ActionType, CategorySource, DocumentKind, MatchField, MatchType, MerchantKind,
    NormalizedMerchant, ParseOutcome, ParsedTransaction, ReclassifyCandidate, Rule, SkipReason,
    SkipSummary,
};
pub use pipeline::{CategorizedTransaction, IngestOutcome, IngestPipeline};
pub use rules::{RuleBatchOutcome, RuleBatchReport, RuleEngine, RuleInput, RuleMatch};
