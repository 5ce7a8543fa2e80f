//! # Trellis store
//!
//! Runs compiled pipelines against a document store.
//!
//! - [`DocumentStore`]: the aggregation interface a backend implements
//! - [`PipelineExecutor`]: submits a pipeline, racing it against the caller's
//!   cancellation token and deadline
//! - [`InMemoryDocumentStore`]: a fixture-backed store that evaluates the
//!   stage vocabulary in process

pub mod error;
pub mod executor;
pub mod memory;
pub mod store;

pub use error::{ExecutionError, StoreError, StoreResult};
pub use executor::{ExecutionContext, PipelineExecutor};
pub use memory::InMemoryDocumentStore;
pub use store::DocumentStore;
