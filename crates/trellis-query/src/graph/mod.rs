//! Relationship graph interface.
//!
//! The compiler only needs two query shapes from the schema catalog:
//!
//! - **chain lookup**: follow refers-to edges from a collection whose aliases
//!   match a list of segments exactly
//! - **embedded discovery**: find embedded arrays on a collection that refer to
//!   another collection, filtered by `embeddedPath.alias` candidates
//!
//! Any graph-capable store satisfies this; [`InMemorySchemaGraph`] is the
//! bundled implementation.

mod memory;
mod seed;

pub use memory::InMemorySchemaGraph;
pub use seed::{EmbeddedDecl, EmbeddedReferenceDecl, ReferenceDecl, SchemaSeed};

use crate::error::ResolveError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One refers-to edge traversed by a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub src_collection: String,
    pub dst_collection: String,
    pub alias: String,
    pub local_field: String,
    pub foreign_field: String,
}

/// An embedded array declaration with a refers-to edge out of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedJoin {
    pub owner: String,
    /// Path of the array inside the owner document
    pub array_path: String,
    pub alias: String,
    pub dst_collection: String,
    pub local_field: String,
    pub foreign_field: String,
}

impl EmbeddedJoin {
    /// `array_path.alias`, the form candidates are matched against.
    pub fn logical_path(&self) -> String {
        format!("{}.{}", self.array_path, self.alias)
    }
}

/// Read-only access to the schema catalog.
///
/// Implementations must be Send + Sync so a single graph can back concurrent
/// compilations.
#[async_trait]
pub trait RelationshipGraph: Send + Sync {
    /// Follow refers-to edges from `root` matching `segments` one alias per
    /// hop. `Ok(None)` when no such chain exists.
    async fn find_chain(
        &self,
        root: &str,
        segments: &[String],
    ) -> Result<Option<Vec<Hop>>, ResolveError>;

    /// Embedded joins declared on `collection` whose `array_path.alias` is in
    /// `candidates`.
    async fn discover_embedded(
        &self,
        collection: &str,
        candidates: &BTreeSet<String>,
    ) -> Result<Vec<EmbeddedJoin>, ResolveError>;
}

#[async_trait]
impl<G: RelationshipGraph + ?Sized> RelationshipGraph for Arc<G> {
    async fn find_chain(
        &self,
        root: &str,
        segments: &[String],
    ) -> Result<Option<Vec<Hop>>, ResolveError> {
        (**self).find_chain(root, segments).await
    }

    async fn discover_embedded(
        &self,
        collection: &str,
        candidates: &BTreeSet<String>,
    ) -> Result<Vec<EmbeddedJoin>, ResolveError> {
        (**self).discover_embedded(collection, candidates).await
    }
}
