//! `saldo rules` - test and batch-apply classification rules

use std::path::Path;

use anyhow::Result;
use saldo_core::{RuleEngine, RuleInput};

use super::{load_rules, read_json};

pub fn cmd_rules_test(rules_path: &Path, text: &str, amount: f64) -> Result<()> {
    let rules = load_rules(Some(rules_path))?;
    let engine = RuleEngine::new();
    let input = RuleInput {
        description: text.to_string(),
        merchant: None,
        amount,
        category_id: None,
        tags: Vec::new(),
    };
    match engine.evaluate(&rules, &input) {
        Some(winner) => println!(
            "rule {} matches: {:?} \"{}\"",
            winner.rule_id, winner.action_type, winner.action_value
        ),
        None => println!("no rule matches"),
    }
    Ok(())
}

pub fn cmd_rules_apply(rules_path: &Path, transactions_path: &Path) -> Result<()> {
    let rules = load_rules(Some(rules_path))?;
    let inputs: Vec<RuleInput> = read_json(transactions_path, "transactions")?;

    let engine = RuleEngine::new();
    let outcome = engine.apply_batch(&rules, &inputs);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
