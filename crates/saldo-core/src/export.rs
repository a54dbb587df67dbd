//! Transaction export
//!
//! Serializes categorized transactions for the caller: JSON for machine
//! consumers, CSV for spreadsheets.

use crate::error::{Error, Result};
use crate::pipeline::CategorizedTransaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(format!("Unknown export format: {}", s)),
        }
    }
}

pub fn export_transactions(
    transactions: &[CategorizedTransaction],
    format: ExportFormat,
) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(transactions)?),
        ExportFormat::Csv => export_csv(transactions),
    }
}

fn export_csv(transactions: &[CategorizedTransaction]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "date",
        "booked_date",
        "description",
        "amount",
        "currency",
        "merchant",
        "merchant_kind",
        "category",
        "category_source",
    ])?;
    for tx in transactions {
        writer.write_record([
            tx.transaction.tx_date.to_string(),
            tx.transaction
                .booked_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            tx.transaction.description.clone(),
            format!("{:.2}", tx.transaction.amount),
            tx.transaction.currency.clone(),
            tx.merchant.merchant.clone(),
            tx.merchant.merchant_kind.as_str().to_string(),
            tx.category_id.clone().unwrap_or_default(),
            tx.category_source.as_str().to_string(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::InvalidData(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidData(e.to_string()))
}
