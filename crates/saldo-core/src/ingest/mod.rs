//! Document ingestion
//!
//! The entrypoint sniffs nothing across kinds (the caller declares what it
//! believes the payload is) but each strategy sniffs its own layout:
//! spreadsheets and delimited text share the section scanner in [`table`],
//! statement text runs the line/block extractor in [`pdf`]. Each strategy is
//! a pure function of the input bytes, so independent documents can be
//! parsed in parallel by the caller.

pub(crate) mod delimited;
pub(crate) mod pdf;
pub(crate) mod spreadsheet;
pub(crate) mod table;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{DocumentKind, ParseOutcome};

/// Payload ceiling, checked before any parsing
pub const MAX_PAYLOAD_BYTES: usize = 12 * 1024 * 1024;

/// Parse one bank export document into transactions plus skip diagnostics
///
/// Partial success is the default: rejected rows are attributed to a
/// [`crate::models::SkipReason`] and counted. Structural failures (oversize
/// payload, empty input, no recognizable table shape, amount/date column
/// collision) abort with an error and zero transactions.
pub fn parse_document(bytes: &[u8], kind: DocumentKind) -> Result<ParseOutcome> {
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(Error::PayloadTooLarge {
            size: bytes.len(),
            limit: MAX_PAYLOAD_BYTES,
        });
    }
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(Error::EmptyDocument);
    }

    let outcome = match kind {
        DocumentKind::Spreadsheet => spreadsheet::parse(bytes)?,
        DocumentKind::Csv => delimited::parse(bytes)?,
        DocumentKind::PdfText => pdf::parse(bytes)?,
    };

    info!(
        kind = %kind,
        transactions = outcome.transactions.len(),
        skipped = outcome.skipped.total(),
        format = outcome.detected_format.as_deref().unwrap_or("unknown"),
        "parsed document"
    );
    Ok(outcome)
}

/// Dedup fingerprint over the stable transaction identity
pub(crate) fn import_hash(date: &NaiveDate, description: &str, amount: f64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(date.to_string().as_bytes());
    hasher.update(description.as_bytes());
    hasher.update(amount.to_be_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversize_payload_rejected_before_parsing() {
        let bytes = vec![b'x'; 13 * 1024 * 1024];
        match parse_document(&bytes, DocumentKind::Spreadsheet) {
            Err(Error::PayloadTooLarge { size, limit }) => {
                assert_eq!(size, 13 * 1024 * 1024);
                assert_eq!(limit, MAX_PAYLOAD_BYTES);
            }
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_document_rejected() {
        for kind in [DocumentKind::Spreadsheet, DocumentKind::Csv, DocumentKind::PdfText] {
            assert!(matches!(
                parse_document(b"", kind),
                Err(Error::EmptyDocument)
            ));
            assert!(matches!(
                parse_document(b"  \n\t ", kind),
                Err(Error::EmptyDocument)
            ));
        }
    }

    #[test]
    fn test_import_hash_is_stable_and_distinct() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let a = import_hash(&date, "REMA 1000", -123.45);
        let b = import_hash(&date, "REMA 1000", -123.45);
        let c = import_hash(&date, "REMA 1000", -123.46);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
