//! Join recipes produced by the resolver and consumed by the assembler.

use crate::paths::depth;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Sibling collection joined by foreign key
    Collection,
    /// Join executed per element of an embedded array
    Embedded,
}

/// A resolved instruction for joining one collection onto the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRecipe {
    pub kind: JoinKind,
    pub src_collection: String,
    /// Relationship name; also the field the joined document lands in
    pub alias: String,
    pub dst_collection: String,
    pub local_field: String,
    pub foreign_field: String,
    /// Array flattened before the join (embedded only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_path: Option<String>,
    /// Document-rooted path the joined data is materialized at
    pub target_path: String,
    /// Fully-qualified local field when chained from a joined or flattened path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_local_field: Option<String>,
    /// Alias chain the intent uses to reach this join
    pub logical_path: String,
}

impl JoinRecipe {
    /// A root-level collection join (`orders.customerId -> customers._id as customer`).
    pub fn collection(
        src_collection: impl Into<String>,
        alias: impl Into<String>,
        dst_collection: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        let alias = alias.into();
        Self {
            kind: JoinKind::Collection,
            src_collection: src_collection.into(),
            dst_collection: dst_collection.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            array_path: None,
            target_path: alias.clone(),
            lookup_local_field: None,
            logical_path: alias.clone(),
            alias,
        }
    }

    /// A join from each element of a root-level embedded array.
    pub fn embedded(
        src_collection: impl Into<String>,
        array_path: impl Into<String>,
        alias: impl Into<String>,
        dst_collection: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        let alias = alias.into();
        let array_path = array_path.into();
        let local_field = local_field.into();
        Self {
            kind: JoinKind::Embedded,
            src_collection: src_collection.into(),
            dst_collection: dst_collection.into(),
            lookup_local_field: Some(format!("{array_path}.{local_field}")),
            logical_path: format!("{array_path}.{alias}"),
            local_field,
            foreign_field: foreign_field.into(),
            target_path: alias.clone(),
            array_path: Some(array_path),
            alias,
        }
    }

    /// Field used as `localField` in the join stage.
    pub fn effective_local_field(&self) -> &str {
        self.lookup_local_field.as_deref().unwrap_or(&self.local_field)
    }

    /// Hop count from the root along the logical path; drives compile order.
    pub fn depth(&self) -> usize {
        depth(&self.logical_path)
    }

    /// Whether filters must be rewritten to reach this join's output.
    pub fn is_rewritten(&self) -> bool {
        self.logical_path != self.target_path
    }
}
