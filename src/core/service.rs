//! Storage service traits
//!
//! A [`DocumentService`] owns one collection. A [`StorageBackend`] hands out
//! services for named collections and makes sure their indexes exist. The
//! rest of the crate is agnostic to the storage engine behind them.

use crate::core::document::Document;
use crate::core::error::StorageError;
use crate::core::query::{Predicate, QueryDescriptor};
use async_trait::async_trait;
use std::sync::Arc;

/// Operations on a single collection
///
/// Predicates reaching a service are already cast to the schema's types.
/// Each call is atomic for the single document it touches.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Name of the underlying collection
    fn collection_name(&self) -> &str;

    /// Insert a fully prepared document
    async fn insert(&self, doc: Document) -> Result<Document, StorageError>;

    /// Run a query: filter, sort, skip/limit, then project
    async fn find(&self, query: &QueryDescriptor) -> Result<Vec<Document>, StorageError>;

    /// First document matching the predicate, unprojected
    async fn find_one(&self, predicate: &Predicate) -> Result<Option<Document>, StorageError>;

    /// Set the patch fields on the first matching document and bump `__v`.
    /// Returns the document after the update, or `None` when nothing matched.
    async fn update_one(
        &self,
        predicate: &Predicate,
        patch: Document,
    ) -> Result<Option<Document>, StorageError>;

    /// Remove the first matching document and return it
    async fn delete_one(&self, predicate: &Predicate) -> Result<Option<Document>, StorageError>;

    /// Number of documents matching the predicate
    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError>;
}

/// Collection name plus the indexes that must stay unique
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub unique_indexes: Vec<Vec<String>>,
}

/// Factory for collection services
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Human-readable backend name, used in logs
    fn name(&self) -> &'static str;

    /// Open (or create) a collection and ensure its unique indexes
    async fn collection(
        &self,
        spec: CollectionSpec,
    ) -> Result<Arc<dyn DocumentService>, StorageError>;
}
