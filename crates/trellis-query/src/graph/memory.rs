//! In-memory relationship graph backed by petgraph.

use super::{EmbeddedJoin, Hop, RelationshipGraph, SchemaSeed};
use crate::error::ResolveError;
use async_trait::async_trait;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
enum SchemaNode {
    Collection(String),
    Embedded { owner: String, path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SchemaEdge {
    RefersTo {
        alias: String,
        local_field: String,
        foreign_field: String,
    },
    Embeds,
}

/// Schema catalog held in memory.
///
/// Nodes are collections and embedded-array declarations; edges are
/// `refers-to` (alias, local field, foreign field) and `embeds`. Adding an edge
/// that already exists updates it in place, so (node, alias) stays unique and
/// chain lookup never has to choose between two edges.
#[derive(Debug, Clone, Default)]
pub struct InMemorySchemaGraph {
    graph: DiGraph<SchemaNode, SchemaEdge>,
    collections: HashMap<String, NodeIndex>,
    embedded: HashMap<(String, String), NodeIndex>,
}

impl InMemorySchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a seed description.
    pub fn from_seed(seed: &SchemaSeed) -> Self {
        let mut graph = Self::new();
        for name in &seed.collections {
            graph.add_collection(name);
        }
        for decl in &seed.embedded {
            graph.add_embedded(&decl.owner, &decl.path);
        }
        for r in &seed.references {
            graph.add_reference(&r.src, &r.dst, &r.alias, &r.local_field, &r.foreign_field);
        }
        for r in &seed.embedded_references {
            graph.add_embedded_reference(
                &r.owner,
                &r.path,
                &r.dst,
                &r.alias,
                &r.local_field,
                &r.foreign_field,
            );
        }
        tracing::debug!(
            collections = graph.collections.len(),
            embedded = graph.embedded.len(),
            edges = graph.graph.edge_count(),
            "schema graph loaded"
        );
        graph
    }

    /// Declare a collection (idempotent).
    pub fn add_collection(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.collections.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(SchemaNode::Collection(name.to_string()));
        self.collections.insert(name.to_string(), idx);
        idx
    }

    /// Declare an embedded array `path` inside `owner` (idempotent).
    pub fn add_embedded(&mut self, owner: &str, path: &str) -> NodeIndex {
        let key = (owner.to_string(), path.to_string());
        if let Some(idx) = self.embedded.get(&key) {
            return *idx;
        }
        let owner_idx = self.add_collection(owner);
        let idx = self.graph.add_node(SchemaNode::Embedded {
            owner: owner.to_string(),
            path: path.to_string(),
        });
        self.graph.add_edge(owner_idx, idx, SchemaEdge::Embeds);
        self.embedded.insert(key, idx);
        idx
    }

    /// `src.local_field` refers to `dst.foreign_field`, exposed as `alias`.
    pub fn add_reference(
        &mut self,
        src: &str,
        dst: &str,
        alias: &str,
        local_field: &str,
        foreign_field: &str,
    ) -> &mut Self {
        let src_idx = self.add_collection(src);
        let dst_idx = self.add_collection(dst);
        self.merge_refers_to(src_idx, dst_idx, alias, local_field, foreign_field);
        self
    }

    /// Each element of `owner.path` refers to `dst` through `local_field`.
    pub fn add_embedded_reference(
        &mut self,
        owner: &str,
        path: &str,
        dst: &str,
        alias: &str,
        local_field: &str,
        foreign_field: &str,
    ) -> &mut Self {
        let embedded_idx = self.add_embedded(owner, path);
        let dst_idx = self.add_collection(dst);
        self.merge_refers_to(embedded_idx, dst_idx, alias, local_field, foreign_field);
        self
    }

    pub fn contains_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Collection names, sorted.
    pub fn collections(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn merge_refers_to(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        alias: &str,
        local_field: &str,
        foreign_field: &str,
    ) {
        let edge = SchemaEdge::RefersTo {
            alias: alias.to_string(),
            local_field: local_field.to_string(),
            foreign_field: foreign_field.to_string(),
        };
        let existing = self
            .graph
            .edges_directed(from, Direction::Outgoing)
            .find(|e| matches!(e.weight(), SchemaEdge::RefersTo { alias: a, .. } if a == alias))
            .map(|e| (e.id(), e.target()));
        match existing {
            Some((id, target)) if target == to => {
                if let Some(weight) = self.graph.edge_weight_mut(id) {
                    *weight = edge;
                }
            }
            Some((id, _)) => {
                self.graph.remove_edge(id);
                self.graph.add_edge(from, to, edge);
            }
            None => {
                self.graph.add_edge(from, to, edge);
            }
        }
    }

    /// Outgoing edges in insertion order; petgraph yields them newest first.
    fn outgoing(&self, node: NodeIndex) -> Vec<(EdgeIndex, NodeIndex, &SchemaEdge)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (e.id(), e.target(), e.weight()))
            .collect();
        edges.sort_by_key(|(id, _, _)| *id);
        edges
    }

    fn collection_index(&self, name: &str) -> Result<NodeIndex, ResolveError> {
        self.collections
            .get(name)
            .copied()
            .ok_or_else(|| ResolveError::UnknownCollection(name.to_string()))
    }

    fn collection_name(&self, idx: NodeIndex) -> Option<&str> {
        match &self.graph[idx] {
            SchemaNode::Collection(name) => Some(name),
            SchemaNode::Embedded { .. } => None,
        }
    }
}

#[async_trait]
impl RelationshipGraph for InMemorySchemaGraph {
    async fn find_chain(
        &self,
        root: &str,
        segments: &[String],
    ) -> Result<Option<Vec<Hop>>, ResolveError> {
        let mut current = self.collection_index(root)?;
        if segments.is_empty() {
            return Ok(None);
        }

        let mut hops = Vec::with_capacity(segments.len());
        for segment in segments {
            let next = self.outgoing(current).into_iter().find_map(|(_, target, edge)| {
                match edge {
                    SchemaEdge::RefersTo {
                        alias,
                        local_field,
                        foreign_field,
                    } if alias == segment => Some((target, local_field, foreign_field)),
                    _ => None,
                }
            });

            let Some((target, local_field, foreign_field)) = next else {
                return Ok(None);
            };
            let (Some(src), Some(dst)) = (self.collection_name(current), self.collection_name(target))
            else {
                return Ok(None);
            };

            hops.push(Hop {
                src_collection: src.to_string(),
                dst_collection: dst.to_string(),
                alias: segment.clone(),
                local_field: local_field.clone(),
                foreign_field: foreign_field.clone(),
            });
            current = target;
        }
        Ok(Some(hops))
    }

    async fn discover_embedded(
        &self,
        collection: &str,
        candidates: &BTreeSet<String>,
    ) -> Result<Vec<EmbeddedJoin>, ResolveError> {
        let owner_idx = self.collection_index(collection)?;
        let mut found = Vec::new();

        for (_, embedded_idx, edge) in self.outgoing(owner_idx) {
            if *edge != SchemaEdge::Embeds {
                continue;
            }
            let SchemaNode::Embedded { owner, path } = &self.graph[embedded_idx] else {
                continue;
            };
            for (_, dst_idx, edge) in self.outgoing(embedded_idx) {
                let SchemaEdge::RefersTo {
                    alias,
                    local_field,
                    foreign_field,
                } = edge
                else {
                    continue;
                };
                let Some(dst) = self.collection_name(dst_idx) else {
                    continue;
                };
                let join = EmbeddedJoin {
                    owner: owner.clone(),
                    array_path: path.clone(),
                    alias: alias.clone(),
                    dst_collection: dst.to_string(),
                    local_field: local_field.clone(),
                    foreign_field: foreign_field.clone(),
                };
                if candidates.contains(&join.logical_path()) {
                    found.push(join);
                }
            }
        }
        Ok(found)
    }
}
