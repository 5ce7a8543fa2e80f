//! Shared fixtures for compiler integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use trellis_query::{
    EmbeddedJoin, Hop, InMemorySchemaGraph, RelationshipGraph, ResolveError, SchemaSeed,
};

/// The bakery catalog shipped under `demos/bakery`.
pub const BAKERY_SEED: &str = include_str!("../../../../demos/bakery/schema.toml");

pub fn bakery_graph() -> InMemorySchemaGraph {
    let seed = SchemaSeed::from_toml_str(BAKERY_SEED).expect("bakery seed parses");
    InMemorySchemaGraph::from_seed(&seed)
}

/// Relationship graph wrapper that counts queries and can be told to fail.
pub struct ScriptedGraph {
    inner: InMemorySchemaGraph,
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl ScriptedGraph {
    pub fn new(inner: InMemorySchemaGraph) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_on_call: None,
        }
    }

    /// Fail the `n`th query (1-based) with a connection error.
    pub fn failing_on(inner: InMemorySchemaGraph, n: usize) -> Self {
        Self {
            fail_on_call: Some(n),
            ..Self::new(inner)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) -> Result<(), ResolveError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.fail_on_call {
            Some(n) if n == call => Err(ResolveError::connection("graph store went away")),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RelationshipGraph for ScriptedGraph {
    async fn find_chain(
        &self,
        root: &str,
        segments: &[String],
    ) -> Result<Option<Vec<Hop>>, ResolveError> {
        self.tick()?;
        self.inner.find_chain(root, segments).await
    }

    async fn discover_embedded(
        &self,
        collection: &str,
        candidates: &BTreeSet<String>,
    ) -> Result<Vec<EmbeddedJoin>, ResolveError> {
        self.tick()?;
        self.inner.discover_embedded(collection, candidates).await
    }
}
