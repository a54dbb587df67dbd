//! CLI argument definitions using clap
//!
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Saldo - turn messy bank exports into a categorized ledger
#[derive(Parser)]
#[command(name = "saldo")]
#[command(about = "Bank export ingestion and classification", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a bank export document into transactions
    Parse {
        /// Document to parse
        #[arg(short, long)]
        file: PathBuf,

        /// Document kind: spreadsheet, csv or pdf-text
        /// (detected from the file extension if omitted)
        #[arg(short, long)]
        kind: Option<String>,

        /// Rule snapshot (JSON array) applied at ingest time
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Output format: table, json or csv
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Work with classification rules
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },

    /// Propose categories for "other"-bucket transactions
    Reclassify {
        /// Training corpus: JSON array of {category_id, text}
        #[arg(long)]
        corpus: PathBuf,

        /// Other-bucket transactions: JSON array of {id, text, amount}
        #[arg(long)]
        other: PathBuf,

        /// Category parent map: JSON object of child id -> parent id
        #[arg(long)]
        parents: Option<PathBuf>,

        /// Bypass thresholds, collapsing predictions to top-level categories
        #[arg(long)]
        force: bool,

        /// Safe thresholds first, force pass only over a large residual
        #[arg(long)]
        two_phase: bool,
    },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Show which rule would match a description
    Test {
        /// Rule snapshot (JSON array)
        #[arg(long)]
        rules: PathBuf,

        /// Description text to test
        #[arg(long)]
        text: String,

        /// Signed amount for amount-matching rules
        #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
        amount: f64,
    },

    /// Apply rules to a batch of transactions and report
    Apply {
        /// Rule snapshot (JSON array)
        #[arg(long)]
        rules: PathBuf,

        /// Transactions (JSON array of rule inputs)
        #[arg(long)]
        transactions: PathBuf,
    },
}
