//! Statement-text extraction
//!
//! Operates on text lines that have already been extracted from a PDF
//! statement in reading order; glyph-to-line reconstruction happens
//! upstream. Two shapes are recognized:
//!
//! - tabular lines carrying one or two date tokens plus description and
//!   amount tokens
//! - labeled vertical blocks (`Dato:`/`Beløp:`/`Transaksjonstekst:`/
//!   `Butikk:` fields on consecutive lines), collected until the next block
//!   boundary
//!
//! Date-like tokens must pass calendar validation before acceptance and a
//! bare integer that reads as a calendar year is never taken as the amount.

use std::ops::Range;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::ingest::import_hash;
use crate::ingest::table::{parse_locale_amount, parse_locale_date};
use crate::merchant::MerchantNormalizer;
use crate::models::{round2, ParseOutcome, ParsedTransaction, SkipReason, SkipSummary};

/// Statement headings that mark a new section
const SECTION_HEADINGS: &[&str] = &[
    "kontoutskrift",
    "bokførte transaksjoner",
    "reserverte transaksjoner",
    "forbrukskonto",
    "brukskonto",
    "sparekonto",
    "periode",
];

/// Boilerplate markers that never carry transaction data
const BOILERPLATE_MARKERS: &[&str] = &[
    "iban",
    "bic",
    "swift",
    "kontonummer",
    "organisasjonsnummer",
    "kundeservice",
    "med forbehold",
    "renteberegning",
    "utskriftsdato",
];

/// Words a column-header line is composed of
const TABLE_HEADER_WORDS: &[&str] = &[
    "dato",
    "rentedato",
    "bokført",
    "beskrivelse",
    "tekst",
    "beløp",
    "inn",
    "ut",
    "saldo",
    "valuta",
];

fn date_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{2})\.(\d{2})\.(\d{4})\b").expect("date token regex"))
}

fn decimal_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new("[+-]?\\d{1,3}(?:[ \u{a0}.]\\d{3})+,\\d{2}-?|[+-]?\\d+,\\d{2}-?")
            .expect("decimal amount regex")
    })
}

fn currency_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bkr\.?\s*[+-]?\d+(?:,\d{2})?|[+-]?\d+(?:,\d{2})?\s*kr\b")
            .expect("currency amount regex")
    })
}

fn page_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:side\s+\d+(?:\s+av\s+\d+)?|\d+)\s*$").expect("page number regex")
    })
}

fn block_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(dato|bokført|beløp|transaksjonstekst|butikk)\s*:\s*(.*)$")
            .expect("block label regex")
    })
}

/// A labeled vertical block under assembly
#[derive(Default)]
struct Block {
    date_raw: Option<String>,
    booked_raw: Option<String>,
    amount_raw: Option<String>,
    text: Option<String>,
    store: Option<String>,
    lines: u64,
}

enum LineOutcome {
    Transaction(ParsedTransaction),
    Skip(SkipReason),
}

pub(crate) fn parse(bytes: &[u8]) -> Result<ParseOutcome> {
    let text = String::from_utf8_lossy(bytes);
    let normalizer = MerchantNormalizer::new();

    let mut transactions = Vec::new();
    let mut skipped = SkipSummary::new();
    let mut block: Option<Block> = None;

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some(caps) = block_label_re().captures(trimmed) {
            let label = caps[1].to_lowercase();
            let value = caps[2].trim().to_string();
            if label == "dato" && block.as_ref().is_some_and(|b| b.date_raw.is_some()) {
                flush_block(block.take(), &normalizer, &mut transactions, &mut skipped);
            }
            let current = block.get_or_insert_with(Block::default);
            current.lines += 1;
            match label.as_str() {
                "dato" => current.date_raw = Some(value),
                "bokført" => current.booked_raw = Some(value),
                "beløp" => current.amount_raw = Some(value),
                "transaksjonstekst" => current.text = Some(value),
                "butikk" => current.store = Some(value),
                _ => {}
            }
            continue;
        }
        // any non-label line ends an open block
        if block.is_some() {
            flush_block(block.take(), &normalizer, &mut transactions, &mut skipped);
        }

        if trimmed.is_empty() {
            skipped.record(SkipReason::SectionMarker);
            continue;
        }
        if page_number_re().is_match(trimmed) {
            skipped.record(SkipReason::PageNumber);
            continue;
        }
        let lower = trimmed.to_lowercase();
        if SECTION_HEADINGS.iter().any(|h| lower.starts_with(h)) {
            skipped.record(SkipReason::SectionMarker);
            continue;
        }
        if is_table_header(&lower) {
            skipped.record(SkipReason::Header);
            continue;
        }
        if BOILERPLATE_MARKERS.iter().any(|m| lower.contains(m)) {
            skipped.record(SkipReason::ExcludedPattern);
            continue;
        }
        match parse_tabular_line(trimmed, &normalizer) {
            LineOutcome::Transaction(tx) => transactions.push(tx),
            LineOutcome::Skip(reason) => skipped.record(reason),
        }
    }
    if block.is_some() {
        flush_block(block.take(), &normalizer, &mut transactions, &mut skipped);
    }

    debug!(
        transactions = transactions.len(),
        skipped = skipped.total(),
        "extracted statement text"
    );
    Ok(ParseOutcome {
        transactions,
        skipped,
        detected_format: Some("pdf_text".to_string()),
    })
}

/// True for lines made up purely of column-header words
fn is_table_header(lower: &str) -> bool {
    let words: Vec<&str> = lower.split_whitespace().collect();
    words.len() >= 2
        && words
            .iter()
            .all(|w| TABLE_HEADER_WORDS.contains(&w.trim_end_matches(':')))
}

fn overlaps(ranges: &[Range<usize>], candidate: &Range<usize>) -> bool {
    ranges
        .iter()
        .any(|r| candidate.start < r.end && r.start < candidate.end)
}

fn tokens_with_ranges(line: &str) -> Vec<(&str, Range<usize>)> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in line.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                out.push((&line[s..i], s..i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push((&line[s..], s..line.len()));
    }
    out
}

/// Find the money token for a line
///
/// Decimal and currency-marked values always win. A bare integer only
/// qualifies when it carries a sign or cannot be read as a calendar year, so
/// a trailing "2026" is never mistaken for the amount.
fn find_amount(line: &str, date_ranges: &[Range<usize>]) -> Option<(Range<usize>, f64)> {
    let decimal: Vec<(Range<usize>, f64)> = decimal_amount_re()
        .find_iter(line)
        .filter(|m| !overlaps(date_ranges, &m.range()))
        .filter_map(|m| parse_locale_amount(m.as_str()).map(|v| (m.range(), v)))
        .collect();
    if let Some(found) = prefer_signed(&decimal) {
        return Some(found);
    }

    let currency: Vec<(Range<usize>, f64)> = currency_amount_re()
        .find_iter(line)
        .filter(|m| !overlaps(date_ranges, &m.range()))
        .filter_map(|m| parse_locale_amount(m.as_str()).map(|v| (m.range(), v)))
        .collect();
    if let Some(found) = prefer_signed(&currency) {
        return Some(found);
    }

    let mut unsigned_fallback = None;
    for (token, range) in tokens_with_ranges(line) {
        if overlaps(date_ranges, &range) {
            continue;
        }
        let Ok(value) = token.parse::<i64>() else {
            continue;
        };
        if value.abs() > 99_999_999 {
            continue;
        }
        let signed = token.starts_with('-') || token.starts_with('+');
        if signed {
            return Some((range, value as f64));
        }
        let year_plausible = (1900..=2100).contains(&value);
        if !year_plausible && unsigned_fallback.is_none() {
            unsigned_fallback = Some((range, value as f64));
        }
    }
    unsigned_fallback
}

fn prefer_signed(candidates: &[(Range<usize>, f64)]) -> Option<(Range<usize>, f64)> {
    candidates
        .iter()
        .find(|(_, v)| *v < 0.0)
        .or_else(|| candidates.first())
        .cloned()
}

fn remove_ranges(line: &str, ranges: &[Range<usize>]) -> String {
    let mut keep = vec![true; line.len()];
    for range in ranges {
        for flag in &mut keep[range.clone()] {
            *flag = false;
        }
    }
    let mut out = String::new();
    for (i, c) in line.char_indices() {
        if keep[i] {
            out.push(c);
        } else if !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_tabular_line(line: &str, normalizer: &MerchantNormalizer) -> LineOutcome {
    let mut dates: Vec<(Range<usize>, NaiveDate)> = Vec::new();
    for caps in date_token_re().captures_iter(line).take(2) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let year: i32 = caps[3].parse().unwrap_or(0);
        // invalid tokens are discarded, never coerced into a nearby date
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            dates.push((caps.get(0).unwrap().range(), date));
        }
    }
    if dates.is_empty() {
        return LineOutcome::Skip(SkipReason::NoDate);
    }

    let date_ranges: Vec<Range<usize>> = dates.iter().map(|(r, _)| r.clone()).collect();
    let Some((amount_range, amount)) = find_amount(line, &date_ranges) else {
        // a period line like "01.01.2026 - 31.01.2026" is a section marker,
        // not a failed transaction
        let remainder = remove_ranges(line, &date_ranges);
        if dates.len() == 2 && !remainder.chars().any(|c| c.is_alphanumeric()) {
            return LineOutcome::Skip(SkipReason::SectionMarker);
        }
        return LineOutcome::Skip(SkipReason::NoAmount);
    };

    let mut removed = date_ranges.clone();
    removed.push(amount_range);
    let description = remove_ranges(line, &removed);
    let merchant_raw = normalizer.merchant_from_text(&description);

    let tx_date = dates[0].1;
    let booked_date = dates.get(1).map(|(_, d)| *d);
    let amount = round2(amount);
    LineOutcome::Transaction(ParsedTransaction {
        tx_date,
        booked_date,
        description: description.clone(),
        amount,
        currency: "NOK".to_string(),
        merchant_raw,
        raw_payload: Some(json!(line).to_string()),
        import_hash: import_hash(&tx_date, &description, amount),
    })
}

fn flush_block(
    block: Option<Block>,
    normalizer: &MerchantNormalizer,
    transactions: &mut Vec<ParsedTransaction>,
    skipped: &mut SkipSummary,
) {
    let Some(block) = block else {
        return;
    };
    let date = block.date_raw.as_deref().and_then(parse_locale_date);
    let amount = block.amount_raw.as_deref().and_then(parse_locale_amount);

    let failure = match (date, amount) {
        (Some(tx_date), Some(amount)) => {
            let description = block
                .text
                .clone()
                .or_else(|| block.store.clone())
                .unwrap_or_default();
            let merchant_raw = block
                .store
                .clone()
                .or_else(|| normalizer.merchant_from_text(&description));
            let booked_date = block.booked_raw.as_deref().and_then(parse_locale_date);
            let amount = round2(amount);
            transactions.push(ParsedTransaction {
                tx_date,
                booked_date,
                description: description.clone(),
                amount,
                currency: "NOK".to_string(),
                merchant_raw,
                raw_payload: Some(
                    json!({
                        "dato": block.date_raw,
                        "bokført": block.booked_raw,
                        "beløp": block.amount_raw,
                        "transaksjonstekst": block.text,
                        "butikk": block.store,
                    })
                    .to_string(),
                ),
                import_hash: import_hash(&tx_date, &description, amount),
            });
            None
        }
        (None, _) => Some(SkipReason::NoDate),
        (_, None) => Some(SkipReason::NoAmount),
    };

    if let Some(reason) = failure {
        skipped.record(reason);
        for _ in 1..block.lines {
            skipped.record(SkipReason::ExcludedPattern);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_text(text: &str) -> ParseOutcome {
        parse(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_year_token_is_never_the_amount() {
        let outcome = parse_text("02.02.2026 KIWI -123,45 2026");
        assert_eq!(outcome.transactions.len(), 1);
        let tx = &outcome.transactions[0];
        assert_eq!(tx.amount, -123.45);
        assert!(tx.merchant_raw.as_deref().unwrap().contains("KIWI"));
    }

    #[test]
    fn test_line_without_money_token_yields_nothing() {
        let outcome = parse_text("02.02.2026 OVERFØRING 2026");
        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.skipped.count(SkipReason::NoAmount), 1);
    }

    #[test]
    fn test_signed_bare_integer_qualifies() {
        let outcome = parse_text("02.02.2026 GEBYR -35");
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].amount, -35.0);
    }

    #[test]
    fn test_two_dates_prefer_first_valid() {
        let outcome = parse_text("01.02.2026 02.02.2026 REMA 1000 -45,00");
        let tx = &outcome.transactions[0];
        assert_eq!(tx.tx_date, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert_eq!(tx.booked_date, Some(NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()));

        // first token fails calendar validation, second is used
        let outcome = parse_text("31.02.2026 02.03.2026 REMA 1000 -45,00");
        let tx = &outcome.transactions[0];
        assert_eq!(tx.tx_date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(tx.booked_date, None);
    }

    #[test]
    fn test_invalid_date_is_discarded_not_coerced() {
        let outcome = parse_text("31.13.2026 KIWI -45,00");
        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.skipped.count(SkipReason::NoDate), 1);
    }

    #[test]
    fn test_noise_lines_are_classified() {
        let text = "Kontoutskrift januar 2026\n\
                    Dato Beskrivelse Beløp\n\
                    02.01.2026 KIWI 334 -50,00\n\
                    Side 1 av 2\n\
                    IBAN NO12 3456 7890 123\n\
                    \n\
                    3";
        let outcome = parse_text(text);
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.skipped.count(SkipReason::SectionMarker), 2); // heading + blank
        assert_eq!(outcome.skipped.count(SkipReason::Header), 1);
        assert_eq!(outcome.skipped.count(SkipReason::PageNumber), 2); // "Side 1 av 2" + "3"
        assert_eq!(outcome.skipped.count(SkipReason::ExcludedPattern), 1); // IBAN
    }

    #[test]
    fn test_period_line_is_a_section_marker() {
        let outcome = parse_text("01.01.2026 - 31.01.2026");
        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.skipped.count(SkipReason::SectionMarker), 1);
    }

    #[test]
    fn test_labeled_block() {
        let text = "Dato: 02.01.2026\n\
                    Beløp: -123,45\n\
                    Transaksjonstekst: Varekjøp dagligvarer\n\
                    Butikk: KIWI 334 Grünerløkka";
        let outcome = parse_text(text);
        assert_eq!(outcome.transactions.len(), 1);
        let tx = &outcome.transactions[0];
        assert_eq!(tx.tx_date, NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
        assert_eq!(tx.amount, -123.45);
        assert_eq!(tx.merchant_raw.as_deref(), Some("KIWI 334 Grünerløkka"));
        assert_eq!(tx.description, "Varekjøp dagligvarer");
    }

    #[test]
    fn test_consecutive_blocks_split_on_dato() {
        let text = "Dato: 02.01.2026\n\
                    Beløp: -10,00\n\
                    Butikk: KIWI\n\
                    Dato: 03.01.2026\n\
                    Beløp: -20,00\n\
                    Butikk: MENY";
        let outcome = parse_text(text);
        assert_eq!(outcome.transactions.len(), 2);
        assert_eq!(outcome.transactions[0].amount, -10.0);
        assert_eq!(outcome.transactions[1].amount, -20.0);
    }

    #[test]
    fn test_block_without_amount_is_skipped() {
        let text = "Dato: 02.01.2026\nTransaksjonstekst: Ukjent";
        let outcome = parse_text(text);
        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.skipped.count(SkipReason::NoAmount), 1);
        assert_eq!(outcome.skipped.count(SkipReason::ExcludedPattern), 1);
    }

    #[test]
    fn test_amount_with_thousands_separator() {
        let outcome = parse_text("15.01.2026 LØNN 30 000,00");
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].amount, 30000.0);
    }

    #[test]
    fn test_explicit_zero_decimal_is_kept() {
        let outcome = parse_text("02.01.2026 KORREKSJON 0,00");
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].amount, 0.0);
    }
}
