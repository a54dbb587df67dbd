//! Command implementations

mod parse;
mod reclassify;
mod rules;

pub use parse::cmd_parse;
#[cfg(test)]
pub(crate) use parse::resolve_kind;
pub use reclassify::cmd_reclassify;
pub use rules::{cmd_rules_apply, cmd_rules_test};

use std::path::Path;

use anyhow::{Context, Result};
use saldo_core::Rule;

/// Read a rule snapshot from a JSON file; no file means no rules
pub(crate) fn load_rules(path: Option<&Path>) -> Result<Vec<Rule>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading rules from {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing rules in {}", path.display()))
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading {} from {}", what, path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {} in {}", what, path.display()))
}
