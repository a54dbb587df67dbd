//! Domain models for saldo

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Supported document kinds for ingestion
///
/// `PdfText` carries statement text that has already been extracted from the
/// PDF in reading order; glyph-to-line reconstruction happens upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Spreadsheet,
    Csv,
    PdfText,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spreadsheet => "spreadsheet",
            Self::Csv => "csv",
            Self::PdfText => "pdf_text",
        }
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spreadsheet" | "xlsx" | "xls" | "ods" => Ok(Self::Spreadsheet),
            "csv" | "txt" => Ok(Self::Csv),
            "pdf_text" | "pdf-text" | "pdf" => Ok(Self::PdfText),
            _ => Err(format!("Unknown document kind: {}", s)),
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A transaction recovered from a bank export document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTransaction {
    /// Transaction date
    pub tx_date: NaiveDate,
    /// Booking date, when the source distinguishes it from the purchase date
    pub booked_date: Option<NaiveDate>,
    /// Cleaned description text
    pub description: String,
    /// Signed amount, negative = expense, rounded to 2 decimals
    pub amount: f64,
    /// ISO 4217 currency code
    pub currency: String,
    /// Raw merchant field when the source carries one
    pub merchant_raw: Option<String>,
    /// Serialized original row, kept for audit/debug
    pub raw_payload: Option<String>,
    /// sha256(date|description|amount) dedup fingerprint
    pub import_hash: String,
}

/// Why a source row or line did not become a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Header,
    SectionMarker,
    PageNumber,
    NoDate,
    NoAmount,
    ParseFailed,
    ExcludedPattern,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::SectionMarker => "section_marker",
            Self::PageNumber => "page_number",
            Self::NoDate => "no_date",
            Self::NoAmount => "no_amount",
            Self::ParseFailed => "parse_failed",
            Self::ExcludedPattern => "excluded_pattern",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-reason counts of rejected rows
///
/// The counts sum to the number of source rows/lines that did not become a
/// transaction; every rejected row is attributed to exactly one reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipSummary(HashMap<SkipReason, u64>);

impl SkipSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reason: SkipReason) {
        *self.0.entry(reason).or_insert(0) += 1;
    }

    pub fn count(&self, reason: SkipReason) -> u64 {
        self.0.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn merge(&mut self, other: &SkipSummary) {
        for (reason, count) in &other.0 {
            *self.0.entry(*reason).or_insert(0) += count;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SkipReason, &u64)> {
        self.0.iter()
    }
}

/// Result of parsing one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub transactions: Vec<ParsedTransaction>,
    /// Skip-reason counts for caller-side reporting
    pub skipped: SkipSummary,
    /// Human-readable label for the detected layout, e.g. "semicolon_headered"
    pub detected_format: Option<String>,
}

/// What kind of merchant identity a raw field resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MerchantKind {
    /// A recognizable merchant name
    Name,
    /// An internal bank code with no usable name
    Code,
    Unknown,
}

impl MerchantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Code => "code",
            Self::Unknown => "unknown",
        }
    }
}

/// Canonical merchant identity, computed once per transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMerchant {
    /// Canonical display name
    pub merchant: String,
    /// Original text the name was derived from
    pub merchant_raw: String,
    pub merchant_kind: MerchantKind,
}

/// Field of a transaction a rule matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Description,
    Merchant,
    Amount,
}

/// How a rule's match value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
    Regex,
    /// Inclusive amount range; bounds come from match_value and
    /// match_value_secondary
    AmountBetween,
}

/// What a matching rule does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SetCategory,
    AddTag,
}

/// A user-authored classification rule
///
/// Owned by the caller's rule store; the engine only reads an ordered
/// snapshot per evaluation call. Lower priority number = higher precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub name: String,
    pub priority: i32,
    pub enabled: bool,
    pub match_field: MatchField,
    pub match_type: MatchType,
    pub match_value: String,
    #[serde(default)]
    pub match_value_secondary: Option<String>,
    pub action_type: ActionType,
    pub action_value: String,
}

/// Where an ingest-time category assignment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    Hint,
    Rule,
    Uncategorized,
}

impl CategorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hint => "hint",
            Self::Rule => "rule",
            Self::Uncategorized => "uncategorized",
        }
    }
}

/// A proposed category correction for one "other"-bucket transaction
///
/// Exists only transiently inside a reclassification pass; the caller decides
/// whether to persist it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReclassifyCandidate {
    pub transaction_id: i64,
    pub predicted_category: String,
    pub probability: f64,
    pub margin: f64,
}

/// Round to the 2-decimal semantics all amounts carry
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
