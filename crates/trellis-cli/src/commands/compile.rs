use super::{load_graph, load_intent, print_json};
use anyhow::Result;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use trellis_config::TrellisConfig;
use trellis_query::{Intent, QueryCompiler, RelationshipGraph};

pub async fn execute(
    config: &TrellisConfig,
    intent_path: &Path,
    schema: Option<PathBuf>,
    explain: bool,
) -> Result<()> {
    let intent = load_intent(intent_path)?;
    let compiler = QueryCompiler::new(load_graph(config, schema)?);
    let output = compile(&compiler, &intent, explain).await?;
    print_json(&output)
}

/// The stage list, or with `explain` the whole compilation record.
pub async fn compile<G: RelationshipGraph>(
    compiler: &QueryCompiler<G>,
    intent: &Intent,
    explain: bool,
) -> Result<Value> {
    let compiled = compiler.compile(intent).await?;
    if explain {
        Ok(json!({
            "root": compiled.root,
            "paths": compiled.paths,
            "recipes": compiled.recipes,
            "pipeline": compiled.pipeline,
        }))
    } else {
        Ok(Value::Array(compiled.pipeline.to_documents()))
    }
}
