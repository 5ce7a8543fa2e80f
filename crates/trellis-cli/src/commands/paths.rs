use super::{load_intent, print_json};
use anyhow::Result;
use serde_json::{json, Value};
use std::path::Path;
use trellis_query::{extract_paths, Intent};

pub fn execute(intent_path: &Path) -> Result<()> {
    let intent = load_intent(intent_path)?;
    print_json(&describe(&intent))
}

/// Candidate prefixes and the source paths they came from.
pub fn describe(intent: &Intent) -> Value {
    let paths = extract_paths(intent);
    json!({
        "root": intent.root,
        "candidates": paths.candidates(),
        "sources": paths.sources(),
    })
}
