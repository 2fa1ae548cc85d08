//! In-memory implementation of DocumentService for testing and development

use crate::core::document::{
    Document, ID_FIELD, VERSION_FIELD, compare_values, display_value, get_path,
};
use crate::core::error::StorageError;
use crate::core::query::{Predicate, QueryDescriptor, SortDirection, SortSpec};
use crate::core::service::{CollectionSpec, DocumentService, StorageBackend};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory collection
///
/// Documents are kept in insertion order behind an `RwLock`, which is the
/// order ties fall back to when sorting.
#[derive(Clone)]
pub struct InMemoryDocumentService {
    name: String,
    unique_indexes: Vec<Vec<String>>,
    documents: Arc<RwLock<IndexMap<String, Document>>>,
}

impl InMemoryDocumentService {
    /// Create an empty collection
    pub fn new(spec: CollectionSpec) -> Self {
        Self {
            name: spec.name,
            unique_indexes: spec.unique_indexes,
            documents: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    fn poisoned(&self, e: impl std::fmt::Display) -> StorageError {
        StorageError::Poisoned(format!("{}: {}", self.name, e))
    }

    /// Reject `candidate` if another document shares all values of a unique index
    fn check_unique(
        &self,
        documents: &IndexMap<String, Document>,
        candidate: &Document,
    ) -> Result<(), StorageError> {
        let own_id = candidate.get(ID_FIELD).and_then(Value::as_str);
        for index in &self.unique_indexes {
            let values: Option<Vec<&Value>> =
                index.iter().map(|field| get_path(candidate, field)).collect();
            let Some(values) = values else { continue };
            let clash = documents.iter().any(|(id, other)| {
                Some(id.as_str()) != own_id
                    && index
                        .iter()
                        .zip(&values)
                        .all(|(field, value)| get_path(other, field) == Some(*value))
            });
            if clash {
                return Err(StorageError::DuplicateKey {
                    collection: self.name.clone(),
                    field: index.join(", "),
                    value: display_value(values[0]),
                });
            }
        }
        Ok(())
    }

    fn first_match<'a>(
        documents: &'a IndexMap<String, Document>,
        predicate: &Predicate,
    ) -> Option<&'a String> {
        documents
            .iter()
            .find(|(_, doc)| predicate.matches(doc))
            .map(|(id, _)| id)
    }
}

fn compare_by(sort: &SortSpec, a: &Document, b: &Document) -> Ordering {
    for key in sort.fields() {
        let ord = compare_values(get_path(a, &key.field), get_path(b, &key.field));
        let ord = match key.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl DocumentService for InMemoryDocumentService {
    fn collection_name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, doc: Document) -> Result<Document, StorageError> {
        let id = doc
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StorageError::Query {
                backend: "in-memory".into(),
                message: "document has no _id".into(),
            })?;

        let mut documents = self.documents.write().map_err(|e| self.poisoned(e))?;
        self.check_unique(&documents, &doc)?;
        documents.insert(id, doc.clone());

        Ok(doc)
    }

    async fn find(&self, query: &QueryDescriptor) -> Result<Vec<Document>, StorageError> {
        let documents = self.documents.read().map_err(|e| self.poisoned(e))?;

        let mut matched: Vec<&Document> = documents
            .values()
            .filter(|doc| query.predicate.matches(doc))
            .collect();
        if !query.sort.is_empty() {
            // stable: ties keep insertion order
            matched.sort_by(|a, b| compare_by(&query.sort, a, b));
        }

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| query.projection.apply(doc.clone()))
            .collect())
    }

    async fn find_one(&self, predicate: &Predicate) -> Result<Option<Document>, StorageError> {
        let documents = self.documents.read().map_err(|e| self.poisoned(e))?;

        Ok(documents.values().find(|doc| predicate.matches(doc)).cloned())
    }

    async fn update_one(
        &self,
        predicate: &Predicate,
        patch: Document,
    ) -> Result<Option<Document>, StorageError> {
        let mut documents = self.documents.write().map_err(|e| self.poisoned(e))?;

        let Some(id) = Self::first_match(&documents, predicate).cloned() else {
            return Ok(None);
        };
        let Some(mut updated) = documents.get(&id).cloned() else {
            return Ok(None);
        };
        for (key, value) in patch {
            if key != ID_FIELD {
                updated.insert(key, value);
            }
        }
        let version = updated.get(VERSION_FIELD).and_then(Value::as_i64).unwrap_or(0);
        updated.insert(VERSION_FIELD.to_string(), Value::from(version + 1));

        self.check_unique(&documents, &updated)?;
        documents.insert(id, updated.clone());

        Ok(Some(updated))
    }

    async fn delete_one(&self, predicate: &Predicate) -> Result<Option<Document>, StorageError> {
        let mut documents = self.documents.write().map_err(|e| self.poisoned(e))?;

        let Some(id) = Self::first_match(&documents, predicate).cloned() else {
            return Ok(None);
        };

        Ok(documents.shift_remove(&id))
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError> {
        let documents = self.documents.read().map_err(|e| self.poisoned(e))?;

        Ok(documents.values().filter(|doc| predicate.matches(doc)).count() as u64)
    }
}

/// Backend handing out in-memory collections.
///
/// Asking twice for the same collection name returns the same data.
#[derive(Default)]
pub struct InMemoryBackend {
    collections: RwLock<HashMap<String, Arc<InMemoryDocumentService>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn collection(
        &self,
        spec: CollectionSpec,
    ) -> Result<Arc<dyn DocumentService>, StorageError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?;

        let service = collections
            .entry(spec.name.clone())
            .or_insert_with(|| Arc::new(InMemoryDocumentService::new(spec)))
            .clone();

        Ok(service)
    }
}
