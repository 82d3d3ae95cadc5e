//! In-process document store
//!
//! Collections live in a [`DashMap`]; each write holds its collection's shard
//! lock for the whole check-then-write, which gives per-collection write
//! atomicity (unique indexes included).

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::document::{get_path, id_of, Document, ID_FIELD};
use super::error::{StoreError, StoreOperation};
use super::filter::Filter;
use super::options::{FindOptions, IndexSpec};
use super::pipeline::{self, sort_documents, Stage};
use super::{DocumentStore, StoreResult};

#[derive(Debug, Default)]
struct Collection {
    docs: BTreeMap<String, Document>,
    indexes: Vec<IndexSpec>,
}

impl Collection {
    /// Reject `doc` if a unique index already holds its key under another `_id`
    fn check_unique(&self, name: &str, id: &str, doc: &Document) -> StoreResult<()> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let key: Vec<Option<&Value>> = index.fields.iter().map(|f| get_path(doc, f)).collect();
            if key.iter().all(Option::is_none) {
                continue;
            }
            let clash = self.docs.iter().any(|(other_id, other)| {
                other_id != id
                    && index
                        .fields
                        .iter()
                        .zip(&key)
                        .all(|(f, v)| get_path(other, f) == *v)
            });
            if clash {
                let rendered = key
                    .iter()
                    .map(|v| v.map(Value::to_string).unwrap_or_else(|| "null".to_string()))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(StoreError::duplicate_key(name, &index.fields, rendered));
            }
        }
        Ok(())
    }
}

/// Document store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Collection>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|c| c.docs.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_collection(&self, name: &str, indexes: &[IndexSpec]) -> StoreResult<()> {
        let mut collection = self.collections.entry(name.to_string()).or_default();
        for index in indexes {
            if !collection.indexes.contains(index) {
                collection.indexes.push(index.clone());
            }
        }
        tracing::debug!(collection = name, indexes = indexes.len(), "Collection ready");
        Ok(())
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<Document> {
        let id = id_of(&doc)
            .ok_or_else(|| {
                StoreError::invalid_document(StoreOperation::Insert, "document has no _id")
                    .with_collection(collection)
            })?
            .to_string();

        let mut entry = self.collections.entry(collection.to_string()).or_default();
        if entry.docs.contains_key(&id) {
            return Err(StoreError::duplicate_key(
                collection,
                &[ID_FIELD.to_string()],
                Value::String(id).to_string(),
            ));
        }
        entry.check_unique(collection, &id, &doc)?;
        entry.docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .snapshot(collection)
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect();
        sort_documents(&mut docs, &options.sort);
        Ok(docs
            .into_iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|d| options.projection.apply(d))
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<usize> {
        Ok(self
            .collections
            .get(collection)
            .map(|c| c.docs.values().filter(|d| filter.matches(d)).count())
            .unwrap_or(0))
    }

    async fn replace_one(&self, collection: &str, doc: Document) -> StoreResult<Option<Document>> {
        let id = id_of(&doc)
            .ok_or_else(|| {
                StoreError::invalid_document(StoreOperation::Replace, "document has no _id")
                    .with_collection(collection)
            })?
            .to_string();

        let Some(mut entry) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        if !entry.docs.contains_key(&id) {
            return Ok(None);
        }
        entry.check_unique(collection, &id, &doc).map_err(|mut e| {
            e.operation = StoreOperation::Replace;
            e
        })?;
        entry.docs.insert(id, doc.clone());
        Ok(Some(doc))
    }

    async fn delete_one(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        Ok(self
            .collections
            .get_mut(collection)
            .and_then(|mut c| c.docs.remove(id)))
    }

    async fn aggregate(&self, collection: &str, stages: &[Stage]) -> StoreResult<Vec<Document>> {
        pipeline::run(self.snapshot(collection), stages)
    }
}
