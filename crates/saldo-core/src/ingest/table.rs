//! Shared table extraction for spreadsheet and delimited-text documents
//!
//! Both formats reduce to a grid of [`Cell`] values and run through the same
//! section scanner: find a header row by column-name synonyms, parse data
//! rows until a blank row or balance marker ends the section, then resume
//! scanning forward for the next header. Documents with no header at all
//! fall back to fixed-shape detection.

use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ingest::import_hash;
use crate::models::{round2, ParsedTransaction, SkipReason, SkipSummary};

/// One resolved cell value
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) if !s.trim().is_empty() => Some(s.trim()),
            _ => None,
        }
    }
}

/// Outcome of running the extractor over one cell grid
#[derive(Debug)]
pub(crate) struct TableExtraction {
    pub transactions: Vec<ParsedTransaction>,
    pub skipped: SkipSummary,
    pub format: String,
}

/// How many leading rows may precede the first header row
const HEADER_SCAN_ROWS: usize = 20;

/// Excel serial window accepted as a date (roughly 1916..2119); values
/// outside it are ordinary numbers
const EXCEL_SERIAL_MIN: f64 = 6_000.0;
const EXCEL_SERIAL_MAX: f64 = 80_000.0;

const DATE_HEADERS: &[&str] = &["dato", "transaksjonsdato", "kjøpsdato", "utført dato", "date"];
const BOOKED_HEADERS: &[&str] = &["bokføringsdato", "bokført dato", "bokført", "rentedato"];
const DESCRIPTION_HEADERS: &[&str] = &[
    "beskrivelse",
    "tekst",
    "transaksjonstekst",
    "forklaring",
    "melding",
    "spesifikasjon",
    "description",
];
const AMOUNT_HEADERS: &[&str] = &["beløp", "belop", "amount", "sum"];
const AMOUNT_SECONDARY_HEADERS: &[&str] =
    &["valutabeløp", "beløp i valuta", "opprinnelig beløp"];
const AMOUNT_OUT_HEADERS: &[&str] = &["ut fra konto", "ut av konto", "ut", "debet"];
const AMOUNT_IN_HEADERS: &[&str] = &["inn på konto", "inn", "kredit"];
const CURRENCY_HEADERS: &[&str] = &["valuta", "currency"];
const MERCHANT_HEADERS: &[&str] = &["butikk", "brukersted", "forretning", "merchant"];

/// First tokens that mark a balance/summary row terminating a section
const SUMMARY_MARKERS: &[&str] = &[
    "saldo",
    "sum",
    "totalt",
    "total",
    "inngående",
    "utgående",
    "balanse",
    "disponibelt",
];

/// Column roles resolved from a header row
#[derive(Debug, Clone)]
struct ColumnMap {
    date: usize,
    booked: Option<usize>,
    description: Option<usize>,
    amount: Option<usize>,
    amount_secondary: Option<usize>,
    amount_out: Option<usize>,
    amount_in: Option<usize>,
    currency: Option<usize>,
    merchant: Option<usize>,
    /// Header titles, kept as keys for the raw-row audit payload
    titles: Vec<String>,
}

fn row_is_blank(row: &[Cell]) -> bool {
    row.iter().all(Cell::is_empty)
}

/// Row length ignoring trailing empty cells
fn trimmed_len(row: &[Cell]) -> usize {
    row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1)
}

fn normalize_header(text: &str) -> String {
    text.trim().trim_end_matches(':').trim().to_lowercase()
}

fn header_role(lists: &[&str], norm: &str) -> bool {
    lists.iter().any(|h| *h == norm)
}

/// Resolve a header row into a column map, or None if the row does not carry
/// both a recognized date column and a recognized amount column
fn detect_header(row: &[Cell]) -> Option<ColumnMap> {
    let mut date = None;
    let mut booked = None;
    let mut description = None;
    let mut amount = None;
    let mut amount_secondary = None;
    let mut amount_out = None;
    let mut amount_in = None;
    let mut currency = None;
    let mut merchant = None;
    let mut titles = Vec::with_capacity(row.len());

    for (i, cell) in row.iter().enumerate() {
        let raw = match cell.text() {
            Some(t) => t,
            None => {
                titles.push(format!("col_{}", i));
                continue;
            }
        };
        titles.push(raw.to_string());
        let norm = normalize_header(raw);
        if date.is_none() && header_role(DATE_HEADERS, &norm) {
            date = Some(i);
        } else if booked.is_none() && header_role(BOOKED_HEADERS, &norm) {
            booked = Some(i);
        } else if description.is_none() && header_role(DESCRIPTION_HEADERS, &norm) {
            description = Some(i);
        } else if amount.is_none() && header_role(AMOUNT_HEADERS, &norm) {
            amount = Some(i);
        } else if amount_secondary.is_none() && header_role(AMOUNT_SECONDARY_HEADERS, &norm) {
            amount_secondary = Some(i);
        } else if amount_out.is_none() && header_role(AMOUNT_OUT_HEADERS, &norm) {
            amount_out = Some(i);
        } else if amount_in.is_none() && header_role(AMOUNT_IN_HEADERS, &norm) {
            amount_in = Some(i);
        } else if currency.is_none() && header_role(CURRENCY_HEADERS, &norm) {
            currency = Some(i);
        } else if merchant.is_none() && header_role(MERCHANT_HEADERS, &norm) {
            merchant = Some(i);
        }
    }

    let has_amount = amount.is_some() || amount_out.is_some() || amount_in.is_some();
    match (date, has_amount) {
        (Some(date), true) => Some(ColumnMap {
            date,
            booked,
            description,
            amount,
            amount_secondary,
            amount_out,
            amount_in,
            currency,
            merchant,
            titles,
        }),
        _ => None,
    }
}

/// Parse DD.MM.YYYY (primary) or ISO dates
pub(crate) fn parse_locale_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in ["%d.%m.%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    None
}

/// Convert an Excel serial day number (1899-12-30 epoch) to a date
pub(crate) fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(EXCEL_SERIAL_MIN..=EXCEL_SERIAL_MAX).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::days(serial as i64))
}

/// Parse an amount with comma decimal separator and optional space/NBSP
/// thousands separators, tolerating `kr`/`NOK` markers and trailing signs
pub(crate) fn parse_locale_amount(s: &str) -> Option<f64> {
    let t = s.trim().replace('\u{a0}', " ");
    if t.is_empty() {
        return None;
    }
    let letters: String = t
        .chars()
        .filter(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase();
    if !letters.is_empty() && letters != "kr" && letters != "nok" {
        return None;
    }
    let mut num: String = t
        .chars()
        .filter(|c| !c.is_alphabetic() && *c != ' ')
        .collect();
    if num.contains(',') {
        num = num.replace('.', "").replace(',', ".");
    }
    if let Some(stripped) = num.strip_suffix('-') {
        num = format!("-{}", stripped);
    }
    num.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Resolve a cell to a date, returning the serial when the source value was
/// numeric (needed for the amount/date collision guard)
fn cell_date(cell: &Cell) -> Option<(NaiveDate, Option<f64>)> {
    match cell {
        Cell::Number(n) => excel_serial_to_date(*n).map(|d| (d, Some(*n))),
        Cell::Text(s) => parse_locale_date(s).map(|d| (d, None)),
        Cell::Empty => None,
    }
}

fn cell_amount(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) => Some(*n),
        Cell::Text(s) => parse_locale_amount(s),
        Cell::Empty => None,
    }
}

fn col_amount(row: &[Cell], col: Option<usize>) -> Option<f64> {
    col.and_then(|i| row.get(i)).and_then(cell_amount)
}

/// True when any text cell's first token is a balance/summary marker
fn is_summary_row(row: &[Cell]) -> bool {
    row.iter().filter_map(Cell::text).any(|t| {
        t.split_whitespace()
            .next()
            .map(|first| SUMMARY_MARKERS.contains(&first.to_lowercase().as_str()))
            .unwrap_or(false)
    })
}

/// Serialize a row as the audit payload, keyed by header titles when known
fn row_payload(row: &[Cell], titles: Option<&[String]>) -> String {
    let value_of = |c: &Cell| match c {
        Cell::Empty => Value::Null,
        Cell::Number(n) => json!(n),
        Cell::Text(s) => json!(s),
    };
    match titles {
        Some(titles) => {
            let mut map = serde_json::Map::new();
            for (i, cell) in row.iter().enumerate() {
                let key = titles
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("col_{}", i));
                map.insert(key, value_of(cell));
            }
            Value::Object(map).to_string()
        }
        None => Value::Array(row.iter().map(value_of).collect()).to_string(),
    }
}

enum RowOutcome {
    Transaction(ParsedTransaction),
    Skip(SkipReason),
}

/// Amount resolution order: primary column unless exactly zero, then the
/// secondary/foreign-currency column, then paired out/in columns
fn resolve_amount(row: &[Cell], map: &ColumnMap) -> Option<f64> {
    if let Some(a) = col_amount(row, map.amount) {
        if a != 0.0 {
            return Some(a);
        }
    }
    if let Some(s) = col_amount(row, map.amount_secondary) {
        if s != 0.0 {
            return Some(s);
        }
    }
    if let Some(o) = col_amount(row, map.amount_out) {
        if o != 0.0 {
            return Some(-o.abs());
        }
    }
    if let Some(i) = col_amount(row, map.amount_in) {
        if i != 0.0 {
            return Some(i);
        }
    }
    None
}

fn parse_headered_row(row: &[Cell], map: &ColumnMap) -> Result<RowOutcome> {
    let (tx_date, serial) = match row.get(map.date).and_then(cell_date) {
        Some(resolved) => resolved,
        None => return Ok(RowOutcome::Skip(SkipReason::NoDate)),
    };
    let amount = match resolve_amount(row, map) {
        Some(a) => a,
        None => return Ok(RowOutcome::Skip(SkipReason::NoAmount)),
    };
    // A value equal to the date serial means the amount column resolved onto
    // date data; continuing would fabricate a ledger from a misdetected
    // layout, so the whole document fails.
    if let Some(serial) = serial {
        if amount == serial {
            return Err(Error::AmbiguousColumns);
        }
    }

    let booked_date = map
        .booked
        .and_then(|i| row.get(i))
        .and_then(cell_date)
        .map(|(d, _)| d);
    let description = map
        .description
        .and_then(|i| row.get(i))
        .and_then(Cell::text)
        .unwrap_or_default()
        .to_string();
    let merchant_raw = map
        .merchant
        .and_then(|i| row.get(i))
        .and_then(Cell::text)
        .map(str::to_string);
    let currency = map
        .currency
        .and_then(|i| row.get(i))
        .and_then(Cell::text)
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| "NOK".to_string());

    let amount = round2(amount);
    Ok(RowOutcome::Transaction(ParsedTransaction {
        tx_date,
        booked_date,
        description: description.clone(),
        amount,
        currency,
        merchant_raw,
        raw_payload: Some(row_payload(row, Some(&map.titles))),
        import_hash: import_hash(&tx_date, &description, amount),
    }))
}

/// Extract every transaction table from a cell grid
pub(crate) fn extract_tables(rows: &[Vec<Cell>]) -> Result<TableExtraction> {
    let mut first_header = None;
    for (i, row) in rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        if let Some(map) = detect_header(row) {
            first_header = Some((i, map));
            break;
        }
    }
    match first_header {
        Some((idx, map)) => extract_headered(rows, idx, map),
        None => extract_simple_5col(rows),
    }
}

fn extract_headered(
    rows: &[Vec<Cell>],
    first_header: usize,
    first_map: ColumnMap,
) -> Result<TableExtraction> {
    let mut transactions = Vec::new();
    let mut skipped = SkipSummary::new();

    for row in &rows[..first_header] {
        skipped.record(if row_is_blank(row) {
            SkipReason::SectionMarker
        } else {
            SkipReason::ExcludedPattern
        });
    }
    skipped.record(SkipReason::Header);

    let mut map = first_map;
    let mut in_section = true;
    for row in &rows[first_header + 1..] {
        if row_is_blank(row) {
            skipped.record(SkipReason::SectionMarker);
            in_section = false;
            continue;
        }
        if let Some(next_map) = detect_header(row) {
            map = next_map;
            in_section = true;
            skipped.record(SkipReason::Header);
            continue;
        }
        if is_summary_row(row) {
            skipped.record(SkipReason::SectionMarker);
            in_section = false;
            continue;
        }
        if !in_section {
            skipped.record(SkipReason::ExcludedPattern);
            continue;
        }
        match parse_headered_row(row, &map)? {
            RowOutcome::Transaction(tx) => transactions.push(tx),
            RowOutcome::Skip(reason) => skipped.record(reason),
        }
    }

    debug!(
        transactions = transactions.len(),
        skipped = skipped.total(),
        "extracted headered table"
    );
    Ok(TableExtraction {
        transactions,
        skipped,
        format: "headered".to_string(),
    })
}

/// Headerless fallback: a fixed 5-column layout where column 0 is a date and
/// one of the remaining columns is a signed amount
fn extract_simple_5col(rows: &[Vec<Cell>]) -> Result<TableExtraction> {
    let candidates: Vec<&Vec<Cell>> = rows
        .iter()
        .filter(|row| trimmed_len(row) == 5 && row.first().and_then(cell_date).is_some())
        .collect();
    if candidates.is_empty() {
        return Err(Error::NoTableFound);
    }

    // Pick the amount column: prefer the one exhibiting negative values (a
    // running balance stays positive in typical exports), then parse count.
    let mut amount_col = None;
    let mut best = (0usize, 0usize); // (negatives, hits)
    for col in 1..5 {
        let mut hits = 0;
        let mut negatives = 0;
        for row in &candidates {
            if let Some(a) = cell_amount(&row[col]) {
                hits += 1;
                if a < 0.0 {
                    negatives += 1;
                }
            }
        }
        if hits > 0 && (negatives, hits) > best {
            best = (negatives, hits);
            amount_col = Some(col);
        }
    }
    let amount_col = amount_col.ok_or(Error::NoTableFound)?;

    // Description column: the one with the most textual cells.
    let mut desc_col = None;
    let mut best_text = 0;
    for col in 1..5 {
        if col == amount_col {
            continue;
        }
        let texts = candidates
            .iter()
            .filter(|row| row[col].text().is_some_and(|t| parse_locale_amount(t).is_none()))
            .count();
        if texts > best_text {
            best_text = texts;
            desc_col = Some(col);
        }
    }

    let mut transactions = Vec::new();
    let mut skipped = SkipSummary::new();
    for row in rows {
        if row_is_blank(row) {
            skipped.record(SkipReason::SectionMarker);
            continue;
        }
        if is_summary_row(row) {
            skipped.record(SkipReason::SectionMarker);
            continue;
        }
        if trimmed_len(row) != 5 {
            skipped.record(SkipReason::ParseFailed);
            continue;
        }
        let (tx_date, serial) = match row.first().and_then(cell_date) {
            Some(resolved) => resolved,
            None => {
                skipped.record(SkipReason::NoDate);
                continue;
            }
        };
        let amount = match cell_amount(&row[amount_col]) {
            Some(a) if a != 0.0 => a,
            _ => {
                skipped.record(SkipReason::NoAmount);
                continue;
            }
        };
        if let Some(serial) = serial {
            if amount == serial {
                return Err(Error::AmbiguousColumns);
            }
        }
        let description = desc_col
            .and_then(|i| row[i].text())
            .unwrap_or_default()
            .to_string();
        let amount = round2(amount);
        transactions.push(ParsedTransaction {
            tx_date,
            booked_date: None,
            description: description.clone(),
            amount,
            currency: "NOK".to_string(),
            merchant_raw: None,
            raw_payload: Some(row_payload(row, None)),
            import_hash: import_hash(&tx_date, &description, amount),
        });
    }

    debug!(
        transactions = transactions.len(),
        skipped = skipped.total(),
        "extracted simple_5col table"
    );
    Ok(TableExtraction {
        transactions,
        skipped,
        format: "simple_5col".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn num(n: f64) -> Cell {
        Cell::Number(n)
    }

    fn header_row() -> Vec<Cell> {
        vec![text("Dato"), text("Beskrivelse"), text("Beløp"), text("Valuta")]
    }

    #[test]
    fn test_parse_locale_date_round_trips() {
        let date = parse_locale_date("02.01.2026").unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2026-01-02");
        assert_eq!(parse_locale_date("2026-01-02"), Some(date));
        assert_eq!(parse_locale_date("31.02.2026"), None);
        assert_eq!(parse_locale_date("not a date"), None);
    }

    #[test]
    fn test_parse_locale_amount() {
        assert_eq!(parse_locale_amount("-123,45"), Some(-123.45));
        assert_eq!(parse_locale_amount("1 234,56"), Some(1234.56));
        assert_eq!(parse_locale_amount("1\u{a0}234,56"), Some(1234.56));
        assert_eq!(parse_locale_amount("kr 99,00"), Some(99.0));
        assert_eq!(parse_locale_amount("123,45-"), Some(-123.45));
        assert_eq!(parse_locale_amount("-123.45"), Some(-123.45));
        assert_eq!(parse_locale_amount("REMA 1000"), None);
        assert_eq!(parse_locale_amount(""), None);
    }

    #[test]
    fn test_excel_serial_to_date() {
        // 2024-01-15 is serial 45306
        assert_eq!(
            excel_serial_to_date(45306.0),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(excel_serial_to_date(12.0), None);
        assert_eq!(excel_serial_to_date(1_000_000.0), None);
    }

    #[test]
    fn test_headered_extraction() {
        let rows = vec![
            header_row(),
            vec![text("02.01.2026"), text("REMA 1000"), text("-123,45"), text("NOK")],
            vec![text("03.01.2026"), text("Lønn"), text("30 000,00"), text("NOK")],
        ];
        let result = extract_tables(&rows).unwrap();
        assert_eq!(result.format, "headered");
        assert_eq!(result.transactions.len(), 2);
        assert_eq!(result.transactions[0].amount, -123.45);
        assert_eq!(result.transactions[0].description, "REMA 1000");
        assert_eq!(
            result.transactions[0].tx_date,
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()
        );
        assert_eq!(result.transactions[1].amount, 30000.0);
        assert_eq!(result.skipped.count(SkipReason::Header), 1);
    }

    #[test]
    fn test_multi_section_recovery() {
        let rows = vec![
            text_row(&["Kontoutskrift januar"]),
            header_row(),
            vec![text("02.01.2026"), text("KIWI"), text("-50,00"), text("NOK")],
            vec![],
            text_row(&["Kontoutskrift februar"]),
            header_row(),
            vec![text("02.02.2026"), text("MENY"), text("-75,00"), text("NOK")],
        ];
        let result = extract_tables(&rows).unwrap();
        assert_eq!(result.transactions.len(), 2);
        assert_eq!(result.skipped.count(SkipReason::Header), 2);
        // every non-transaction row is accounted for
        assert_eq!(
            result.transactions.len() as u64 + result.skipped.total(),
            rows_len(&rows)
        );
    }

    fn text_row(cells: &[&str]) -> Vec<Cell> {
        cells.iter().map(|s| text(s)).collect()
    }

    fn rows_len(rows: &[Vec<Cell>]) -> u64 {
        rows.len() as u64
    }

    #[test]
    fn test_summary_row_never_becomes_zero_transaction() {
        let rows = vec![
            header_row(),
            vec![text("02.01.2026"), text("KIWI"), text("-50,00"), text("NOK")],
            vec![text(""), text("Saldo per 31.01"), text("0,00"), text("")],
        ];
        let result = extract_tables(&rows).unwrap();
        assert_eq!(result.transactions.len(), 1);
        assert!(result.transactions.iter().all(|t| t.amount != 0.0));
        assert_eq!(result.skipped.count(SkipReason::SectionMarker), 1);
    }

    #[test]
    fn test_secondary_amount_preferred_when_primary_zero() {
        let rows = vec![
            vec![
                text("Dato"),
                text("Beskrivelse"),
                text("Beløp"),
                text("Valutabeløp"),
            ],
            vec![text("02.01.2026"), text("AMAZON"), text("0,00"), text("-19,99")],
        ];
        let result = extract_tables(&rows).unwrap();
        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.transactions[0].amount, -19.99);
    }

    #[test]
    fn test_out_in_columns() {
        let rows = vec![
            vec![
                text("Dato"),
                text("Forklaring"),
                text("Ut fra konto"),
                text("Inn på konto"),
            ],
            vec![text("02.01.2026"), text("Husleie"), text("12 000,00"), Cell::Empty],
            vec![text("03.01.2026"), text("Lønn"), Cell::Empty, text("30 000,00")],
        ];
        let result = extract_tables(&rows).unwrap();
        assert_eq!(result.transactions.len(), 2);
        assert_eq!(result.transactions[0].amount, -12000.0);
        assert_eq!(result.transactions[1].amount, 30000.0);
    }

    #[test]
    fn test_row_rejection_reasons() {
        let rows = vec![
            header_row(),
            vec![text(""), text("mangler dato"), text("-10,00"), text("NOK")],
            vec![text("02.01.2026"), text("mangler beløp"), text(""), text("NOK")],
        ];
        let result = extract_tables(&rows).unwrap();
        assert!(result.transactions.is_empty());
        assert_eq!(result.skipped.count(SkipReason::NoDate), 1);
        assert_eq!(result.skipped.count(SkipReason::NoAmount), 1);
    }

    #[test]
    fn test_simple_5col_detection() {
        let rows = vec![
            vec![num(45306.0), text("KIWI 334"), text(""), num(-123.45), num(4000.0)],
            vec![num(45307.0), text("MENY OSLO"), text(""), num(-99.0), num(3901.0)],
        ];
        let result = extract_tables(&rows).unwrap();
        assert_eq!(result.format, "simple_5col");
        assert_eq!(result.transactions.len(), 2);
        assert_eq!(result.transactions[0].amount, -123.45);
        assert_eq!(result.transactions[0].description, "KIWI 334");
        assert_eq!(
            result.transactions[0].tx_date,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn test_amount_date_collision_aborts_document() {
        // the "amount" column carries the same serial as the date column
        let rows = vec![
            vec![num(45306.0), text("A"), text(""), num(45306.0), num(1.0)],
            vec![num(45307.0), text("B"), text(""), num(45307.0), num(2.0)],
        ];
        match extract_tables(&rows) {
            Err(Error::AmbiguousColumns) => {}
            other => panic!("expected AmbiguousColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_no_table_found() {
        let rows = vec![
            text_row(&["bare", "noise"]),
            text_row(&["no", "table", "here"]),
        ];
        match extract_tables(&rows) {
            Err(Error::NoTableFound) => {}
            other => panic!("expected NoTableFound, got {:?}", other),
        }
    }
}
