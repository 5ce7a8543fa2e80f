use super::{load_graph, load_intent, print_json};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use trellis_config::TrellisConfig;
use trellis_query::QueryCompiler;
use trellis_store::{ExecutionContext, InMemoryDocumentStore, PipelineExecutor};

pub async fn execute(
    config: &TrellisConfig,
    intent_path: &Path,
    schema: Option<PathBuf>,
    data: Option<PathBuf>,
    timeout: Option<u64>,
) -> Result<()> {
    let intent = load_intent(intent_path)?;
    let compiler = QueryCompiler::new(load_graph(config, schema)?);
    let store = load_store(config, data)?;

    let compiled = compiler.compile(&intent).await?;
    debug!(stages = compiled.pipeline.len(), "running pipeline");

    let deadline = match timeout {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.execution.deadline(),
    };
    let cancel = CancellationToken::new();
    let mut ctx = ExecutionContext::new().with_cancel(cancel.clone());
    if let Some(deadline) = deadline {
        ctx = ctx.with_deadline(deadline);
    }

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling pipeline");
            cancel.cancel();
        }
    });

    let executor = PipelineExecutor::new(store);
    let result = executor.run_compiled(&compiled, &ctx).await;
    interrupt.abort();

    let rows = result?;
    print_json(&Value::Array(rows))
}

fn load_store(config: &TrellisConfig, flag: Option<PathBuf>) -> Result<InMemoryDocumentStore> {
    let path = flag
        .or_else(|| config.store.fixtures_path.clone())
        .context("no fixtures given (use --data or set [store].fixtures_path)")?;
    let input = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixtures {}", path.display()))?;
    InMemoryDocumentStore::from_json_str(&input)
        .with_context(|| format!("invalid fixtures {}", path.display()))
}
