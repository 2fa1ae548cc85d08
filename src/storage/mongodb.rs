//! MongoDB storage backend using the official MongoDB async driver.
//!
//! # Feature flag
//!
//! This module is gated behind the `mongodb_backend` feature flag:
//! ```toml
//! [dependencies]
//! tourbook = { version = "0.1", features = ["mongodb_backend"] }
//! ```
//!
//! # Storage model
//!
//! Each model gets its own collection. Documents keep their string `_id`
//! (a UUID) and are converted through `serde_json::Value` so that what
//! comes back out is exactly what the in-memory backend would return.

use crate::core::document::{Document, ID_FIELD};
use crate::core::error::StorageError;
use crate::core::query::{
    Condition, Predicate, Projection, QueryDescriptor, SortDirection, SortSpec,
};
use crate::core::service::{CollectionSpec, DocumentService, StorageBackend};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document as BsonDocument, doc};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Database, IndexModel};
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

const BACKEND: &str = "mongodb";

/// The server stores skips as signed 64-bit integers
const MAX_SKIP: u64 = i64::MAX as u64;

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn query_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Query {
        backend: BACKEND.into(),
        message: e.to_string(),
    }
}

fn to_bson(value: &Value) -> Result<Bson, StorageError> {
    mongodb::bson::to_bson(value).map_err(|e| StorageError::Conversion(e.to_string()))
}

fn document_to_bson(doc: &Document) -> Result<BsonDocument, StorageError> {
    match to_bson(&Value::Object(doc.clone()))? {
        Bson::Document(d) => Ok(d),
        other => Err(StorageError::Conversion(format!(
            "expected a BSON document, got {:?}",
            other.element_type()
        ))),
    }
}

fn bson_to_document(doc: BsonDocument) -> Result<Document, StorageError> {
    match Bson::Document(doc).into_relaxed_extjson() {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::Conversion(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Translate a predicate into a MongoDB filter.
///
/// Several constraints are joined with `$and` so the same field may appear
/// more than once (e.g. a range, or a default scope on a filtered field).
fn filter_document(predicate: &Predicate) -> Result<BsonDocument, StorageError> {
    let mut clauses = Vec::with_capacity(predicate.constraints().len());
    for constraint in predicate.constraints() {
        let condition = match &constraint.condition {
            Condition::Eq(value) => to_bson(value)?,
            Condition::Ne(value) => Bson::Document(doc! { "$ne": to_bson(value)? }),
            Condition::In(values) => {
                let values = values.iter().map(to_bson).collect::<Result<Vec<_>, _>>()?;
                Bson::Document(doc! { "$in": values })
            }
            Condition::Compare(op, value) => {
                let operator = op.operator();
                Bson::Document(doc! { operator: to_bson(value)? })
            }
        };
        let field = constraint.field.as_str();
        clauses.push(doc! { field: condition });
    }

    Ok(match clauses.len() {
        0 => BsonDocument::new(),
        1 => clauses.remove(0),
        _ => doc! { "$and": clauses },
    })
}

fn sort_document(sort: &SortSpec) -> BsonDocument {
    let mut spec = BsonDocument::new();
    for key in sort.fields() {
        let direction = match key.direction {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        };
        spec.insert(key.field.clone(), direction);
    }
    spec
}

fn projection_document(projection: &Projection) -> BsonDocument {
    let (fields, flag) = match projection {
        Projection::Include(fields) => (fields, 1),
        Projection::Exclude(fields) => (fields, 0),
    };
    let mut spec = BsonDocument::new();
    for field in fields.iter().filter(|f| flag == 1 || f.as_str() != ID_FIELD) {
        spec.insert(field.clone(), flag);
    }
    spec
}

/// Map E11000 errors to [`StorageError::DuplicateKey`]
fn write_error(collection: &str, err: mongodb::error::Error) -> StorageError {
    static DUP_KEY: OnceLock<Regex> = OnceLock::new();

    let message = err.to_string();
    if !message.contains("E11000") {
        return query_error(message);
    }
    let pattern = DUP_KEY.get_or_init(|| {
        Regex::new(r#"dup key: \{ ?"?([\w.]+)"?: "?([^",}]*)"?"#).expect("static regex is valid")
    });
    let (field, value) = pattern
        .captures(&message)
        .map(|c| (c[1].to_string(), c[2].trim().to_string()))
        .unwrap_or_else(|| ("unknown".into(), "unknown".into()));

    StorageError::DuplicateKey {
        collection: collection.to_string(),
        field,
        value,
    }
}

// ---------------------------------------------------------------------------
// MongoDocumentService
// ---------------------------------------------------------------------------

/// One MongoDB collection
#[derive(Clone, Debug)]
pub struct MongoDocumentService {
    name: String,
    collection: Collection<BsonDocument>,
}

impl MongoDocumentService {
    pub fn new(database: &Database, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            collection: database.collection(&name),
            name,
        }
    }

    /// Create the unique indexes of the collection.
    ///
    /// Idempotent, safe to call on every startup.
    pub async fn ensure_indexes(&self, unique_indexes: &[Vec<String>]) -> Result<(), StorageError> {
        if unique_indexes.is_empty() {
            return Ok(());
        }
        let models: Vec<IndexModel> = unique_indexes
            .iter()
            .map(|fields| {
                let mut keys = BsonDocument::new();
                for field in fields {
                    keys.insert(field.clone(), 1);
                }
                IndexModel::builder()
                    .keys(keys)
                    .options(IndexOptions::builder().unique(true).build())
                    .build()
            })
            .collect();

        self.collection
            .create_indexes(models)
            .await
            .map_err(|e| query_error(format!("failed to create indexes on {}: {e}", self.name)))?;

        Ok(())
    }
}

#[async_trait]
impl DocumentService for MongoDocumentService {
    fn collection_name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, doc: Document) -> Result<Document, StorageError> {
        self.collection
            .insert_one(document_to_bson(&doc)?)
            .await
            .map_err(|e| write_error(&self.name, e))?;

        Ok(doc)
    }

    async fn find(&self, query: &QueryDescriptor) -> Result<Vec<Document>, StorageError> {
        let mut action = self
            .collection
            .find(filter_document(&query.predicate)?)
            .skip(query.skip.min(MAX_SKIP))
            .projection(projection_document(&query.projection));
        if !query.sort.is_empty() {
            action = action.sort(sort_document(&query.sort));
        }
        if let Some(limit) = query.limit {
            action = action.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let docs: Vec<BsonDocument> = action
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        docs.into_iter().map(bson_to_document).collect()
    }

    async fn find_one(&self, predicate: &Predicate) -> Result<Option<Document>, StorageError> {
        self.collection
            .find_one(filter_document(predicate)?)
            .await
            .map_err(query_error)?
            .map(bson_to_document)
            .transpose()
    }

    async fn update_one(
        &self,
        predicate: &Predicate,
        mut patch: Document,
    ) -> Result<Option<Document>, StorageError> {
        patch.remove("_id");
        let mut update = doc! { "$inc": { "__v": 1 } };
        if !patch.is_empty() {
            update.insert("$set", document_to_bson(&patch)?);
        }

        self.collection
            .find_one_and_update(filter_document(predicate)?, update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| write_error(&self.name, e))?
            .map(bson_to_document)
            .transpose()
    }

    async fn delete_one(&self, predicate: &Predicate) -> Result<Option<Document>, StorageError> {
        self.collection
            .find_one_and_delete(filter_document(predicate)?)
            .await
            .map_err(query_error)?
            .map(bson_to_document)
            .transpose()
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError> {
        self.collection
            .count_documents(filter_document(predicate)?)
            .await
            .map_err(query_error)
    }
}

// ---------------------------------------------------------------------------
// MongoBackend
// ---------------------------------------------------------------------------

/// Backend handing out collections of one MongoDB database
///
/// ```rust,ignore
/// let backend = MongoBackend::connect("mongodb://localhost:27017", "natours").await?;
/// let app = entities::register_all(ServerBuilder::new().with_backend(backend))
///     .build()
///     .await?;
/// ```
#[derive(Clone, Debug)]
pub struct MongoBackend {
    database: Database,
}

impl MongoBackend {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Connect and ping the server so a bad URI fails at startup
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StorageError> {
        let connection_error = |e: mongodb::error::Error| StorageError::Connection {
            backend: BACKEND.into(),
            message: e.to_string(),
        };
        let client = Client::with_uri_str(uri).await.map_err(connection_error)?;
        let database = client.database(database);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connection_error)?;

        tracing::info!(database = database.name(), "connected to MongoDB");
        Ok(Self::new(database))
    }

    pub fn database(&self) -> &Database {
        &self.database
    }
}

#[async_trait]
impl StorageBackend for MongoBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn collection(
        &self,
        spec: CollectionSpec,
    ) -> Result<Arc<dyn DocumentService>, StorageError> {
        let service = MongoDocumentService::new(&self.database, spec.name);
        service.ensure_indexes(&spec.unique_indexes).await?;
        Ok(Arc::new(service))
    }
}
