//! In-memory document store.
//!
//! Evaluates the pipeline stage vocabulary over JSON documents held in
//! process. Semantics follow the aggregation framework closely enough for
//! fixtures and tests: `$lookup` is a left-outer join, `$unwind` with
//! `preserveNullAndEmptyArrays` keeps documents without elements, `$count`
//! over nothing yields no row.

mod eval;
mod path;

use crate::error::{StoreError, StoreResult};
use crate::store::DocumentStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use trellis_query::Pipeline;

/// Collections of JSON documents behind a read-write lock.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load fixtures shaped `{"collection": [doc, ...], ...}`.
    pub fn from_fixtures(fixtures: Value) -> StoreResult<Self> {
        let Value::Object(map) = fixtures else {
            return Err(StoreError::Fixtures(
                "expected an object of collection name to documents".to_string(),
            ));
        };
        let store = Self::new();
        for (collection, docs) in map {
            let Value::Array(docs) = docs else {
                return Err(StoreError::Fixtures(format!(
                    "collection '{collection}' must be an array of documents"
                )));
            };
            store.insert_many(&collection, docs);
        }
        Ok(store)
    }

    pub fn from_json_str(input: &str) -> StoreResult<Self> {
        let fixtures: Value =
            serde_json::from_str(input).map_err(|e| StoreError::Fixtures(e.to_string()))?;
        Self::from_fixtures(fixtures)
    }

    pub fn insert_many(&self, collection: &str, docs: impl IntoIterator<Item = Value>) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
    }

    /// Document count of `collection`, zero when it does not exist.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.collections.read().values().all(Vec::is_empty)
    }

    fn evaluate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read();
        // Unknown collections read as empty, like the real store.
        let mut docs = collections.get(collection).cloned().unwrap_or_default();

        for stage in pipeline {
            if cancel.is_cancelled() {
                return Err(StoreError::Interrupted);
            }
            let before = docs.len();
            docs = eval::apply(stage, docs, &collections)?;
            debug!(stage = stage.name(), before, after = docs.len(), "stage evaluated");
        }
        Ok(docs)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<Value>> {
        self.evaluate(collection, pipeline, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fixtures_must_be_collection_arrays() {
        assert!(InMemoryDocumentStore::from_fixtures(json!([1, 2])).is_err());
        assert!(InMemoryDocumentStore::from_fixtures(json!({"orders": {"_id": 1}})).is_err());

        let store = InMemoryDocumentStore::from_fixtures(json!({"orders": [{"_id": 1}]})).unwrap();
        assert_eq!(store.len("orders"), 1);
        assert_eq!(store.len("payments"), 0);
    }

    #[tokio::test]
    async fn test_unknown_collection_reads_empty() {
        let store = InMemoryDocumentStore::new();
        let rows = store
            .aggregate("ghosts", &Pipeline::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_token_interrupts() {
        let store = InMemoryDocumentStore::from_fixtures(json!({"orders": [{"_id": 1}]})).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let pipeline = Pipeline::from(vec![trellis_query::Stage::Limit(1)]);
        let result = store.aggregate("orders", &pipeline, &cancel).await;

        assert_eq!(result, Err(StoreError::Interrupted));
    }
}
