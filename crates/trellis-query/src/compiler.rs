//! Compiler facade: extract → resolve → assemble.

use crate::assemble::assemble;
use crate::error::QueryResult;
use crate::graph::RelationshipGraph;
use crate::intent::Intent;
use crate::paths::{extract_paths, PathSet};
use crate::pipeline::Pipeline;
use crate::recipe::JoinRecipe;
use crate::resolve::GraphJoinResolver;
use serde::Serialize;
use tracing::info;

/// Everything produced while compiling one intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    /// Collection the pipeline runs against
    pub root: String,
    pub paths: PathSet,
    pub recipes: Vec<JoinRecipe>,
    pub pipeline: Pipeline,
}

/// Compiles intents against one relationship graph.
///
/// Holds no state besides the graph handle, so one compiler can serve
/// concurrent requests when `G` is shared (`Arc<InMemorySchemaGraph>`).
pub struct QueryCompiler<G> {
    resolver: GraphJoinResolver<G>,
}

impl<G: RelationshipGraph> QueryCompiler<G> {
    pub fn new(graph: G) -> Self {
        Self {
            resolver: GraphJoinResolver::new(graph),
        }
    }

    pub fn resolver(&self) -> &GraphJoinResolver<G> {
        &self.resolver
    }

    /// Compile `intent` into a pipeline. Fails without a partial result.
    #[tracing::instrument(skip(self, intent), fields(root = %intent.root))]
    pub async fn compile(&self, intent: &Intent) -> QueryResult<CompiledQuery> {
        let paths = extract_paths(intent);
        let recipes = self.resolver.resolve(&intent.root, &paths).await?;
        let pipeline = assemble(intent, &recipes)?;

        info!(
            joins = recipes.len(),
            stages = pipeline.len(),
            "compiled pipeline"
        );

        Ok(CompiledQuery {
            root: intent.root.clone(),
            paths,
            recipes,
            pipeline,
        })
    }
}
