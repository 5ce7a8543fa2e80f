//! Document store interface.

use crate::error::StoreResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trellis_query::Pipeline;

/// A store that can run an aggregation pipeline against one collection.
///
/// Implementations should watch `cancel` if they can stop early; the
/// executor races the call against the token regardless.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run `pipeline` over `collection` and materialize every result row.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<Value>>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<Value>> {
        (**self).aggregate(collection, pipeline, cancel).await
    }
}
