//! Error types for pipeline execution.

use std::time::Duration;
use thiserror::Error;

/// Failures reported by a document store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Connection(String),

    #[error("stage {stage} rejected: {reason}")]
    InvalidStage { stage: &'static str, reason: String },

    #[error("invalid fixtures: {0}")]
    Fixtures(String),

    /// The store noticed the caller's cancellation token mid-pipeline
    #[error("aggregation interrupted")]
    Interrupted,
}

impl StoreError {
    pub fn invalid_stage(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidStage {
            stage,
            reason: reason.into(),
        }
    }
}

/// Failures while running a pipeline through [`crate::PipelineExecutor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("pipeline on '{collection}' failed")]
    Store {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("pipeline execution cancelled")]
    Cancelled,

    #[error("pipeline execution exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}

/// Result type for document store operations
pub type StoreResult<T> = Result<T, StoreError>;
