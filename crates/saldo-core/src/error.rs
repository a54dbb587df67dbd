//! Error types for saldo
//!
//! Structural document failures (oversize payload, no recognizable table,
//! ambiguous column layout, empty input) abort a parse with one descriptive
//! error and zero transactions. Everything row-level degrades to a
//! [`crate::models::SkipReason`] instead of an error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("empty document")]
    EmptyDocument,

    #[error("no transaction table found")]
    NoTableFound,

    #[error("amount column looks like a date column")]
    AmbiguousColumns,

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, Error>;
