//! `saldo reclassify` - propose categories for the "other" bucket

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use saldo_core::{OtherTransaction, ReclassifyConfig, Reclassifier, TrainingExample, VecBucket};

use super::read_json;

pub fn cmd_reclassify(
    corpus_path: &Path,
    other_path: &Path,
    parents_path: Option<&Path>,
    force: bool,
    two_phase: bool,
) -> Result<()> {
    let corpus: Vec<TrainingExample> = read_json(corpus_path, "training corpus")?;
    let items: Vec<OtherTransaction> = read_json(other_path, "other-bucket transactions")?;
    let parents: HashMap<String, String> = match parents_path {
        Some(path) => read_json(path, "category parents")?,
        None => HashMap::new(),
    };

    let reclassifier = Reclassifier::new(&corpus, ReclassifyConfig::default(), &parents);
    let bucket = VecBucket::new(items);
    let report = if two_phase {
        reclassifier.run_two_phase(&bucket)?
    } else {
        reclassifier.run(&bucket, None, force)?
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
