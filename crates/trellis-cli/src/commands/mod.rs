//! Subcommand implementations and the file loading they share.

pub mod compile;
pub mod paths;
pub mod run;

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use trellis_config::TrellisConfig;
use trellis_query::{InMemorySchemaGraph, Intent, SchemaSeed};

/// Read and deserialize an intent file.
pub fn load_intent(path: &Path) -> Result<Intent> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read intent {}", path.display()))?;
    serde_json::from_str(&input).with_context(|| format!("invalid intent {}", path.display()))
}

/// Build the relationship graph from `--schema` or the configured seed.
pub fn load_graph(config: &TrellisConfig, flag: Option<PathBuf>) -> Result<InMemorySchemaGraph> {
    let path = flag
        .or_else(|| config.schema.seed_path.clone())
        .context("no schema seed given (use --schema or set [schema].seed_path)")?;
    let input = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read schema seed {}", path.display()))?;

    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let seed = if is_json {
        SchemaSeed::from_json_str(&input)
    } else {
        SchemaSeed::from_toml_str(&input)
    }
    .with_context(|| format!("invalid schema seed {}", path.display()))?;

    Ok(InMemorySchemaGraph::from_seed(&seed))
}

/// Pretty JSON on stdout; logs go to stderr.
pub fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
