//! Saldo CLI - bank export ingestion and classification
//!
//! Usage:
//!   saldo parse --file export.csv          Parse a bank export document
//!   saldo rules test --rules r.json ...    Try rules against a description
//!   saldo rules apply --rules r.json ...   Apply rules to a batch
//!   saldo reclassify --corpus c.json ...   Propose categories for "other"

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (warn)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Parse {
            file,
            kind,
            rules,
            format,
        } => commands::cmd_parse(&file, kind.as_deref(), rules.as_deref(), &format),
        Commands::Rules { command } => match command {
            RulesCommands::Test {
                rules,
                text,
                amount,
            } => commands::cmd_rules_test(&rules, &text, amount),
            RulesCommands::Apply {
                rules,
                transactions,
            } => commands::cmd_rules_apply(&rules, &transactions),
        },
        Commands::Reclassify {
            corpus,
            other,
            parents,
            force,
            two_phase,
        } => commands::cmd_reclassify(&corpus, &other, parents.as_deref(), force, two_phase),
    }
}
