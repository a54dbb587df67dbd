//! Spreadsheet workbook extraction
//!
//! Workbook bytes are opened with calamine and every sheet's cells are fed
//! through the shared table engine. A workbook may spread transaction tables
//! across several sheets; sheets without a table contribute their rows to
//! the skip summary instead.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ingest::table::{self, Cell};
use crate::models::{ParseOutcome, SkipReason, SkipSummary};

pub(crate) fn parse(bytes: &[u8]) -> Result<ParseOutcome> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let sheet_names = workbook.sheet_names().to_vec();

    let mut transactions = Vec::new();
    let mut skipped = SkipSummary::new();
    let mut tableless = SkipSummary::new();
    let mut detected_format: Option<String> = None;

    for name in &sheet_names {
        let range = match workbook.worksheet_range(name) {
            Ok(range) => range,
            Err(e) => {
                debug!(sheet = %name, error = %e, "skipping unreadable sheet");
                continue;
            }
        };
        let rows: Vec<Vec<Cell>> = range
            .rows()
            .map(|row| row.iter().map(cell_from_data).collect())
            .collect();
        if rows.is_empty() {
            continue;
        }
        match table::extract_tables(&rows) {
            Ok(extraction) => {
                transactions.extend(extraction.transactions);
                skipped.merge(&extraction.skipped);
                detected_format.get_or_insert(extraction.format);
            }
            Err(Error::NoTableFound) => {
                // An info/summary sheet; its rows still count as rejected if
                // another sheet carries the table.
                for row in &rows {
                    tableless.record(if row.iter().all(|c| matches!(c, Cell::Empty)) {
                        SkipReason::SectionMarker
                    } else {
                        SkipReason::ExcludedPattern
                    });
                }
            }
            Err(e) => return Err(e),
        }
    }

    if detected_format.is_none() {
        return Err(Error::NoTableFound);
    }
    skipped.merge(&tableless);

    Ok(ParseOutcome {
        transactions,
        skipped,
        detected_format,
    })
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::Error(_) => Cell::Empty,
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) => Cell::Text(s.clone()),
        Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_are_a_workbook_error() {
        let result = parse(b"this is not a workbook at all");
        assert!(matches!(result, Err(Error::Workbook(_))));
    }

    #[test]
    fn test_cell_mapping() {
        assert_eq!(cell_from_data(&Data::Empty), Cell::Empty);
        assert_eq!(
            cell_from_data(&Data::String("Dato".into())),
            Cell::Text("Dato".into())
        );
        assert_eq!(cell_from_data(&Data::Float(45306.0)), Cell::Number(45306.0));
        assert_eq!(cell_from_data(&Data::Int(-5)), Cell::Number(-5.0));
    }
}
