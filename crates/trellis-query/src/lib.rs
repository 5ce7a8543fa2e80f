//! # Trellis query compiler
//!
//! Compiles a structured query [`Intent`] into a document-store aggregation
//! [`Pipeline`], discovering joins from a graph-shaped schema catalog.
//!
//! ```text
//! Intent ──► extract_paths ──► GraphJoinResolver ──► assemble ──► Pipeline
//!                               (RelationshipGraph)   (MatchCompiler)
//! ```
//!
//! - Multi-hop joins are found by walking refers-to edges alias by alias
//! - Joins through embedded arrays flatten the array once, then join per element
//! - Filter paths written through relationship aliases are rewritten to the
//!   fields the pipeline actually produces
//! - Filters on root fields run before any join
//!
//! ## Example
//!
//! ```rust,no_run
//! use trellis_query::{Filter, InMemorySchemaGraph, Intent, QueryCompiler};
//!
//! # async fn demo() -> Result<(), trellis_query::QueryError> {
//! let mut graph = InMemorySchemaGraph::new();
//! graph.add_reference("orders", "customers", "customer", "customerId", "_id");
//!
//! let compiler = QueryCompiler::new(graph);
//! let intent = Intent::new("orders")
//!     .with_select(["orderNo", "customer.name"])
//!     .with_filter(Filter::eq("status", "READY"));
//!
//! let compiled = compiler.compile(&intent).await?;
//! println!("{}", serde_json::to_string_pretty(&compiled.pipeline).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod assemble;
pub mod compiler;
pub mod error;
pub mod graph;
pub mod intent;
pub mod matcher;
pub mod paths;
pub mod pipeline;
pub mod recipe;
pub mod resolve;

pub use assemble::assemble;
pub use compiler::{CompiledQuery, QueryCompiler};
pub use error::{CompileError, IntentError, QueryError, QueryResult, ResolveError};
pub use graph::{EmbeddedJoin, Hop, InMemorySchemaGraph, RelationshipGraph, SchemaSeed};
pub use intent::{
    AccumulatorOp, Aggregation, Filter, FilterOp, GroupAccumulator, Intent, Sort, SortDirection,
};
pub use matcher::{compile_match, MatchCompiler, MatchExpr, PathRewriter};
pub use paths::{extract_paths, PathSet};
pub use pipeline::{Accumulator, GroupKey, Pipeline, SortKey, Stage};
pub use recipe::{JoinKind, JoinRecipe};
pub use resolve::GraphJoinResolver;
