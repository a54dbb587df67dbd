//! Delimited-text extraction
//!
//! Legacy bank CSV exports come in unknown encodings and with unknown
//! delimiters, so both are sniffed before tokenization: the byte buffer is
//! decoded under UTF-8 and Windows-1252 and the cleaner result wins, then
//! candidate delimiters are scored by how consistent their quote-aware field
//! counts are across sampled lines. Tokenized rows run through the same
//! section scanner as spreadsheets, so CSV inherits identical parsing
//! semantics.

use std::collections::HashMap;

use encoding_rs::WINDOWS_1252;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ingest::table::{self, Cell};
use crate::models::ParseOutcome;

const DELIMITERS: &[(char, &str)] = &[
    (';', "semicolon"),
    (',', "comma"),
    ('\t', "tab"),
    ('|', "pipe"),
];

/// How many non-blank lines the delimiter sniffer samples
const DELIMITER_SAMPLE_LINES: usize = 50;

/// UTF-8 sequences that appear when UTF-8 Norwegian text is mis-decoded
const MOJIBAKE_DIGRAPHS: &[&str] = &["Ã¦", "Ã¸", "Ã¥", "Ã†", "Ã˜", "Ã…", "â€", "Ã©"];

pub(crate) fn parse(bytes: &[u8]) -> Result<ParseOutcome> {
    let decoded = decode(bytes);
    let text = decoded.strip_prefix('\u{feff}').unwrap_or(&decoded);

    let (delimiter, delimiter_name) = detect_delimiter(text).ok_or(Error::NoTableFound)?;
    debug!(delimiter = delimiter_name, "detected delimiter");

    let rows: Vec<Vec<Cell>> = tokenize(text, delimiter)
        .into_iter()
        .map(|record| {
            record
                .into_iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(field)
                    }
                })
                .collect()
        })
        .collect();

    let extraction = table::extract_tables(&rows)?;
    Ok(ParseOutcome {
        transactions: extraction.transactions,
        skipped: extraction.skipped,
        detected_format: Some(format!("{}_{}", delimiter_name, extraction.format)),
    })
}

/// Score a candidate decoding; lower is better
///
/// Replacement characters mean the encoding was definitely wrong, mojibake
/// digraphs mean UTF-8 bytes were decoded as a single-byte set, and real
/// Norwegian letters mean the decoding is plausible.
fn decoding_score(text: &str) -> i64 {
    let replacements = text.matches('\u{fffd}').count() as i64;
    let mojibake: i64 = MOJIBAKE_DIGRAPHS
        .iter()
        .map(|m| text.matches(m).count() as i64)
        .sum();
    let norwegian = text.chars().filter(|c| "æøåÆØÅ".contains(*c)).count() as i64;
    replacements * 100 + mojibake * 10 - norwegian
}

fn decode(bytes: &[u8]) -> String {
    let utf8 = String::from_utf8_lossy(bytes).into_owned();
    let (cp1252, _, _) = WINDOWS_1252.decode(bytes);
    let cp1252 = cp1252.into_owned();

    let utf8_score = decoding_score(&utf8);
    let cp1252_score = decoding_score(&cp1252);
    if cp1252_score < utf8_score {
        debug!(utf8_score, cp1252_score, "decoded as windows-1252");
        cp1252
    } else {
        utf8
    }
}

/// Count fields on one line for a candidate delimiter, ignoring delimiters
/// inside double quotes
fn quote_aware_field_count(line: &str, delimiter: char) -> usize {
    let mut fields = 1;
    let mut in_quotes = false;
    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == delimiter && !in_quotes {
            fields += 1;
        }
    }
    fields
}

/// Choose the delimiter whose modal field count is >1 and most consistent
/// across the sampled lines
fn detect_delimiter(text: &str) -> Option<(char, &'static str)> {
    let sample: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(DELIMITER_SAMPLE_LINES)
        .collect();
    if sample.is_empty() {
        return None;
    }

    let mut best: Option<(char, &'static str, usize)> = None;
    for &(delimiter, name) in DELIMITERS {
        let mut frequency: HashMap<usize, usize> = HashMap::new();
        for line in &sample {
            *frequency
                .entry(quote_aware_field_count(line, delimiter))
                .or_insert(0) += 1;
        }
        let (modal_fields, consistency) = frequency
            .iter()
            .map(|(fields, freq)| (*fields, *freq))
            .max_by_key(|(fields, freq)| (*freq, *fields))?;
        if modal_fields <= 1 {
            continue;
        }
        if best.is_none_or(|(_, _, best_consistency)| consistency > best_consistency) {
            best = Some((delimiter, name, consistency));
        }
    }
    best.map(|(delimiter, name, _)| (delimiter, name))
}

/// RFC4180-style tokenizer
///
/// Quote-state tracking with doubled-quote escaping, CRLF normalized, blank
/// lines preserved as empty rows (the section scanner and skip accounting
/// need them), trailing blank fragment after the final newline dropped.
fn tokenize(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            c if c == delimiter => row.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
