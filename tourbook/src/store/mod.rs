//! Document store abstraction
//!
//! The model layer talks to persistence only through [`DocumentStore`]:
//! find/insert/replace/delete plus aggregation pipelines over schemaless
//! JSON documents. [`MemoryStore`] is the in-process implementation.
//!
//! # Example
//!
//! ```rust
//! use tourbook::store::{DocumentStore, Filter, FindOptions, MemoryStore, Op};
//! use serde_json::json;
//!
//! # tokio_test_block(async {
//! let store = MemoryStore::new();
//! let doc = json!({"_id": tourbook::store::new_id(), "price": 497})
//!     .as_object()
//!     .cloned()
//!     .unwrap();
//! store.insert_one("tours", doc).await.unwrap();
//!
//! let filter = Filter::new().and("price", Op::Gte(json!(400)));
//! let found = store.find("tours", &filter, &FindOptions::default()).await.unwrap();
//! assert_eq!(found.len(), 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod document;
mod error;
mod filter;
mod memory;
mod options;
mod pipeline;

use async_trait::async_trait;

pub use document::{
    format_timestamp, get_path, id_of, is_id, new_id, now_timestamp, number, parse_timestamp,
    remove_path, set_path, Document, ID_FIELD, VERSION_FIELD,
};
pub use error::{StoreError, StoreErrorKind, StoreOperation};
pub use filter::{total_cmp, Condition, Filter, GeoPoint, Op, EARTH_RADIUS_METERS};
pub use memory::MemoryStore;
pub use options::{FindOptions, IndexSpec, Projection, SortDirection, SortKey};
pub use pipeline::{sort_documents, Accumulator, GeoNear, Group, GroupKey, Stage};

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence client used by the model layer
///
/// Implementations must make each single-document write atomic with respect
/// to the collection's unique indexes.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Create a collection (idempotent) and declare its indexes
    async fn create_collection(&self, name: &str, indexes: &[IndexSpec]) -> StoreResult<()>;

    /// Insert a document carrying an `_id`; returns the stored document
    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<Document>;

    /// Find matching documents, sorted, paged and projected
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Count matching documents
    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<usize>;

    /// Replace the document with the same `_id`; `None` if it does not exist
    async fn replace_one(&self, collection: &str, doc: Document) -> StoreResult<Option<Document>>;

    /// Delete by `_id`, returning the removed document
    async fn delete_one(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Run an aggregation pipeline over a collection
    async fn aggregate(&self, collection: &str, stages: &[Stage]) -> StoreResult<Vec<Document>>;

    /// Check that the store is reachable
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
