//! Pipeline execution with cancellation and deadlines.

use crate::error::{ExecutionError, StoreError};
use crate::store::DocumentStore;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use trellis_query::{CompiledQuery, Pipeline};

/// Per-request execution controls.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub cancel: CancellationToken,
    /// Upper bound on the store call; `None` waits forever
    pub deadline: Option<Duration>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Submits pipelines to a [`DocumentStore`].
///
/// Read-only and retry-free: a store failure is wrapped and returned as is.
pub struct PipelineExecutor<S> {
    store: S,
}

impl<S: DocumentStore> PipelineExecutor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run `pipeline` over `collection`.
    #[tracing::instrument(skip(self, pipeline, ctx), fields(collection = %collection, stages = pipeline.len()))]
    pub async fn run(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        ctx: &ExecutionContext,
    ) -> Result<Vec<Value>, ExecutionError> {
        if ctx.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        let call = self.store.aggregate(collection, pipeline, &ctx.cancel);
        let outcome = match ctx.deadline {
            Some(deadline) => {
                debug!(?deadline, "running with deadline");
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return Err(ExecutionError::Cancelled),
                    timed = tokio::time::timeout(deadline, call) => {
                        timed.map_err(|_| ExecutionError::DeadlineExceeded(deadline))?
                    }
                }
            }
            None => tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(ExecutionError::Cancelled),
                rows = call => rows,
            },
        };

        let rows = outcome.map_err(|source| match source {
            StoreError::Interrupted => ExecutionError::Cancelled,
            source => ExecutionError::Store {
                collection: collection.to_string(),
                source,
            },
        })?;

        info!(rows = rows.len(), "pipeline executed");
        Ok(rows)
    }

    /// Run a compiled query against its root collection.
    pub async fn run_compiled(
        &self,
        compiled: &CompiledQuery,
        ctx: &ExecutionContext,
    ) -> Result<Vec<Value>, ExecutionError> {
        self.run(&compiled.root, &compiled.pipeline, ctx).await
    }
}
