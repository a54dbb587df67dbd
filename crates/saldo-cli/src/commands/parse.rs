//! `saldo parse` - run the full ingestion pipeline over one document

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use saldo_core::{
    export_transactions, DocumentKind, ExportFormat, IngestOutcome, IngestPipeline,
};

use super::load_rules;

pub fn cmd_parse(
    file: &Path,
    kind: Option<&str>,
    rules_path: Option<&Path>,
    format: &str,
) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let kind = resolve_kind(file, kind)?;
    let rules = load_rules(rules_path)?;

    let pipeline = IngestPipeline::new();
    let outcome = pipeline
        .ingest(&bytes, kind, &rules)
        .with_context(|| format!("parsing {}", file.display()))?;

    match format {
        "table" => {
            print_table(&outcome);
            print_summary(&outcome);
        }
        "json" => {
            println!(
                "{}",
                export_transactions(&outcome.transactions, ExportFormat::Json)?
            );
            eprint_summary(&outcome);
        }
        "csv" => {
            println!(
                "{}",
                export_transactions(&outcome.transactions, ExportFormat::Csv)?
            );
            eprint_summary(&outcome);
        }
        other => bail!("unknown output format: {}", other),
    }
    Ok(())
}

pub(crate) fn resolve_kind(file: &Path, kind: Option<&str>) -> Result<DocumentKind> {
    if let Some(kind) = kind {
        return kind.parse::<DocumentKind>().map_err(|e| anyhow!(e));
    }
    let extension = file.extension().and_then(|e| e.to_str()).unwrap_or("");
    extension.parse::<DocumentKind>().map_err(|_| {
        anyhow!(
            "cannot detect document kind of '{}', pass --kind",
            file.display()
        )
    })
}

fn print_table(outcome: &IngestOutcome) {
    println!(
        "{:<12} {:>12}  {:<24} {:<20} {}",
        "DATE", "AMOUNT", "CATEGORY", "MERCHANT", "DESCRIPTION"
    );
    for tx in &outcome.transactions {
        println!(
            "{:<12} {:>12.2}  {:<24} {:<20} {}",
            tx.transaction.tx_date,
            tx.transaction.amount,
            tx.category_id.as_deref().unwrap_or("-"),
            tx.merchant.merchant,
            tx.transaction.description,
        );
    }
}

fn summary_lines(outcome: &IngestOutcome) -> Vec<String> {
    let mut lines = vec![format!(
        "{} transactions, {} rows skipped (format: {})",
        outcome.transactions.len(),
        outcome.skipped.total(),
        outcome.detected_format.as_deref().unwrap_or("unknown"),
    )];
    let mut reasons: Vec<_> = outcome.skipped.iter().collect();
    reasons.sort_by_key(|(reason, _)| reason.as_str());
    for (reason, count) in reasons {
        lines.push(format!("  {}: {}", reason, count));
    }
    lines
}

fn print_summary(outcome: &IngestOutcome) {
    for line in summary_lines(outcome) {
        println!("{}", line);
    }
}

fn eprint_summary(outcome: &IngestOutcome) {
    for line in summary_lines(outcome) {
        eprintln!("{}", line);
    }
}
