//! Models: a schema bound to a storage collection
//!
//! [`Model`] is the only way handlers touch storage. It casts filters to the
//! schema's types, applies the model's default scope, validates writes, hides
//! hidden fields and computes virtual fields on the way out.
//!
//! Reads are lazy: [`Model::find`] returns a [`Query`] that can be refined
//! with `.sort()`, `.select()`, `.skip()`, `.limit()` and `.populate()` and
//! only touches storage on `.exec().await`.
//!
//! ```rust,ignore
//! let cheapest = tours
//!     .find(Predicate::compare("price", ComparisonOp::Lt, 500))
//!     .sort(SortSpec::parse("price"))
//!     .limit(3)
//!     .exec()
//!     .await?;
//! ```

use crate::core::document::{Document, ID_FIELD, id_of};
use crate::core::error::{AppError, AppResult, StorageError};
use crate::core::query::{Predicate, Projection, QueryDescriptor, SortSpec};
use crate::core::schema::Schema;
use crate::core::service::{CollectionSpec, DocumentService, StorageBackend};
use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Field computed from a stored document when it is returned
pub type VirtualField = Arc<dyn Fn(&Document) -> Option<Value> + Send + Sync>;

/// Options for [`Model::find_by_id_and_update`]
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Run field validators on the updated fields
    pub run_validators: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            run_validators: true,
        }
    }
}

pub struct Model {
    name: String,
    schema: Schema,
    default_scope: Predicate,
    virtuals: Vec<(String, VirtualField)>,
    service: Arc<dyn DocumentService>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("collection", &self.service.collection_name())
            .field("default_scope", &self.default_scope)
            .finish_non_exhaustive()
    }
}

impl Model {
    pub fn new(name: impl Into<String>, schema: Schema, service: Arc<dyn DocumentService>) -> Self {
        Self {
            name: name.into(),
            schema,
            default_scope: Predicate::all(),
            virtuals: Vec::new(),
            service,
        }
    }

    /// Open the model's collection on `backend`, creating its unique indexes
    pub async fn register(
        backend: &dyn StorageBackend,
        name: impl Into<String>,
        collection: impl Into<String>,
        schema: Schema,
    ) -> Result<Self, StorageError> {
        let spec = CollectionSpec {
            name: collection.into(),
            unique_indexes: schema.unique_indexes(),
        };
        let service = backend.collection(spec).await?;
        Ok(Self::new(name, schema, service))
    }

    /// Predicate conjoined with every read, update and delete
    pub fn with_default_scope(mut self, scope: Predicate) -> Self {
        self.default_scope = scope;
        self
    }

    pub fn with_virtual<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Document) -> Option<Value> + Send + Sync + 'static,
    {
        self.virtuals.push((name.into(), Arc::new(compute)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn scoped(&self, predicate: Predicate) -> AppResult<Predicate> {
        let cast = self.schema.cast_predicate(predicate)?;
        Ok(self.default_scope.clone().and(cast))
    }

    fn by_id(&self, id: &str) -> AppResult<Predicate> {
        self.scoped(Predicate::eq(ID_FIELD, id))
    }

    /// Shape a stored document for callers
    fn present(&self, doc: Document) -> Document {
        let mut doc = self.schema.strip_hidden(doc);
        for (name, compute) in &self.virtuals {
            if let Some(value) = compute(&doc) {
                doc.insert(name.clone(), value);
            }
        }
        doc
    }

    /// Lazy query over documents matching `predicate`
    pub fn find(&self, predicate: Predicate) -> Query<'_> {
        self.query(QueryDescriptor::new(predicate))
    }

    /// Lazy query from a fully built descriptor
    pub fn query(&self, descriptor: QueryDescriptor) -> Query<'_> {
        Query {
            model: self,
            descriptor,
            populate: None,
        }
    }

    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<Document>> {
        let predicate = self.by_id(id)?;
        let found = self.service.find_one(&predicate).await?;
        Ok(found.map(|doc| self.present(doc)))
    }

    /// Validate and insert a new document
    pub async fn create(&self, payload: Value) -> AppResult<Document> {
        let doc = self.schema.prepare_insert(payload)?;
        let created = self.service.insert(doc).await?;
        tracing::debug!(model = %self.name, id = ?id_of(&created), "document created");
        Ok(self.present(created))
    }

    /// Apply a partial update. `None` when the id does not resolve.
    pub async fn find_by_id_and_update(
        &self,
        id: &str,
        payload: Value,
        options: UpdateOptions,
    ) -> AppResult<Option<Document>> {
        let predicate = self.by_id(id)?;
        let patch = self.schema.prepare_update(payload, options.run_validators)?;
        let updated = self.service.update_one(&predicate, patch).await?;
        tracing::debug!(model = %self.name, id, found = updated.is_some(), "document updated");
        Ok(updated.map(|doc| self.present(doc)))
    }

    /// Remove a document. `None` when the id does not resolve.
    pub async fn find_by_id_and_delete(&self, id: &str) -> AppResult<Option<Document>> {
        let predicate = self.by_id(id)?;
        let deleted = self.service.delete_one(&predicate).await?;
        tracing::debug!(model = %self.name, id, found = deleted.is_some(), "document deleted");
        Ok(deleted.map(|doc| self.present(doc)))
    }

    pub async fn count(&self, predicate: Predicate) -> AppResult<u64> {
        let predicate = self.scoped(predicate)?;
        Ok(self.service.count(&predicate).await?)
    }
}

/// A pending read, executed by [`Query::exec`]
#[must_use = "queries do nothing until exec() is awaited"]
pub struct Query<'a> {
    model: &'a Model,
    descriptor: QueryDescriptor,
    populate: Option<(&'a ModelRegistry, &'a [Relation])>,
}

impl<'a> Query<'a> {
    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.descriptor.sort = sort;
        self
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.descriptor.projection = projection;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.descriptor.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.descriptor.limit = Some(limit);
        self
    }

    /// Expand relations of the results through `registry`
    pub fn populate(mut self, registry: &'a ModelRegistry, relations: &'a [Relation]) -> Self {
        self.populate = Some((registry, relations));
        self
    }

    pub async fn exec(self) -> AppResult<Vec<Document>> {
        let Query {
            model,
            mut descriptor,
            populate,
        } = self;
        model.schema.check_sort(&descriptor.sort)?;
        descriptor.predicate = model.scoped(descriptor.predicate)?;

        let found = model.service.find(&descriptor).await?;
        tracing::debug!(model = %model.name, count = found.len(), "query executed");
        let docs: Vec<Document> = found.into_iter().map(|doc| model.present(doc)).collect();

        match populate {
            Some((registry, relations)) if !relations.is_empty() => {
                registry.expand(docs, relations).await
            }
            _ => Ok(docs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationKind {
    /// The document stores the target id (or a list of ids) at `path`
    Reference,
    /// Target documents store this document's id in `foreign_field`
    Virtual { foreign_field: String },
}

/// How to replace a path of a document with related documents
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub path: String,
    pub model: String,
    pub kind: RelationKind,
    pub select: Option<Projection>,
    pub nested: Vec<Relation>,
}

impl Relation {
    pub fn reference(path: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            model: model.into(),
            kind: RelationKind::Reference,
            select: None,
            nested: Vec::new(),
        }
    }

    pub fn virtual_field(
        path: impl Into<String>,
        model: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            model: model.into(),
            kind: RelationKind::Virtual {
                foreign_field: foreign_field.into(),
            },
            select: None,
            nested: Vec::new(),
        }
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.select = Some(projection);
        self
    }

    /// Expand a relation of the related documents too
    pub fn nested(mut self, relation: Relation) -> Self {
        self.nested.push(relation);
        self
    }
}

/// Read-only map of model name to model, built once at startup
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<Model>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: Model) -> Arc<Model> {
        let model = Arc::new(model);
        self.models.insert(model.name.clone(), model.clone());
        model
    }

    pub fn get(&self, name: &str) -> AppResult<&Arc<Model>> {
        self.models
            .get(name)
            .ok_or_else(|| AppError::internal(format!("model '{}' is not registered", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    /// Replace relation paths with related documents, preserving order.
    ///
    /// Documents are expanded concurrently; relations are applied in turn.
    pub fn expand<'a>(
        &'a self,
        docs: Vec<Document>,
        relations: &'a [Relation],
    ) -> BoxFuture<'a, AppResult<Vec<Document>>> {
        async move {
            let mut docs = docs;
            for relation in relations {
                let target = self.get(&relation.model)?;
                docs = try_join_all(
                    docs.into_iter()
                        .map(|doc| self.expand_one(doc, relation, target)),
                )
                .await?;
            }
            Ok(docs)
        }
        .boxed()
    }

    async fn related(&self, doc: Document, relation: &Relation) -> AppResult<Document> {
        let doc = match &relation.select {
            Some(projection) => projection.apply(doc),
            None => doc,
        };
        if relation.nested.is_empty() {
            return Ok(doc);
        }
        let mut expanded = self.expand(vec![doc], &relation.nested).await?;
        expanded
            .pop()
            .ok_or_else(|| AppError::internal("relation expansion lost a document"))
    }

    async fn resolve_id(
        &self,
        target: &Model,
        id: &str,
        relation: &Relation,
    ) -> AppResult<Option<Document>> {
        match target.find_by_id(id).await? {
            Some(found) => Ok(Some(self.related(found, relation).await?)),
            None => Ok(None),
        }
    }

    async fn expand_one(
        &self,
        mut doc: Document,
        relation: &Relation,
        target: &Model,
    ) -> AppResult<Document> {
        let expanded = match &relation.kind {
            RelationKind::Reference => match doc.get(&relation.path) {
                Some(Value::String(id)) => {
                    let id = id.clone();
                    self.resolve_id(target, &id, relation)
                        .await?
                        .map(Value::Object)
                        .unwrap_or(Value::Null)
                }
                Some(Value::Array(items)) => {
                    let ids: Vec<String> = items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                    let found = try_join_all(
                        ids.iter().map(|id| self.resolve_id(target, id, relation)),
                    )
                    .await?;
                    Value::Array(found.into_iter().flatten().map(Value::Object).collect())
                }
                _ => return Ok(doc),
            },
            RelationKind::Virtual { foreign_field } => {
                let Some(id) = id_of(&doc).map(str::to_string) else {
                    return Ok(doc);
                };
                let found = target
                    .find(Predicate::eq(foreign_field.as_str(), id))
                    .exec()
                    .await?;
                let related =
                    try_join_all(found.into_iter().map(|d| self.related(d, relation))).await?;
                Value::Array(related.into_iter().map(Value::Object).collect())
            }
        };
        doc.insert(relation.path.clone(), expanded);
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{FieldDef, FieldKind};
    use crate::storage::in_memory::InMemoryBackend;
    use serde_json::json;

    async fn registry() -> ModelRegistry {
        let backend = InMemoryBackend::new();
        let users = Model::register(
            &backend,
            "User",
            "users",
            Schema::new()
                .field(FieldDef::new("name", FieldKind::String).required("name required"))
                .field(FieldDef::new("photo", FieldKind::String).default_value("default.jpg"))
                .field(FieldDef::new("active", FieldKind::Boolean).default_value(true).hidden()),
        )
        .await
        .unwrap()
        .with_default_scope(Predicate::ne("active", false));

        let posts = Model::register(
            &backend,
            "Post",
            "posts",
            Schema::new()
                .field(FieldDef::new("title", FieldKind::String))
                .field(FieldDef::new("author", FieldKind::ObjectId))
                .field(FieldDef::new("words", FieldKind::Number))
                .with_created_at(),
        )
        .await
        .unwrap()
        .with_virtual("minutes", |doc| {
            doc.get("words").and_then(Value::as_f64).map(|w| json!(w / 200.0))
        });

        let mut registry = ModelRegistry::new();
        registry.insert(users);
        registry.insert(posts);
        registry
    }

    #[tokio::test]
    async fn test_create_then_find_by_id_hides_hidden_fields() {
        let registry = registry().await;
        let users = registry.get("User").unwrap();
        let created = users.create(json!({"name": "Lourdes"})).await.unwrap();
        assert!(!created.contains_key("active"));

        let id = created["_id"].as_str().unwrap();
        let found = users.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(found["photo"], json!("default.jpg"));
    }

    #[tokio::test]
    async fn test_default_scope_hides_documents() {
        let registry = registry().await;
        let users = registry.get("User").unwrap();
        let created = users.create(json!({"name": "Max"})).await.unwrap();
        let id = created["_id"].as_str().unwrap();

        users
            .find_by_id_and_update(id, json!({"active": false}), UpdateOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert!(users.find_by_id(id).await.unwrap().is_none());
        assert!(users.find(Predicate::all()).exec().await.unwrap().is_empty());
        assert_eq!(users.count(Predicate::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_by_id_rejects_malformed_ids() {
        let registry = registry().await;
        let err = registry.get("User").unwrap().find_by_id("nope").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid _id: nope.");
    }

    #[tokio::test]
    async fn test_query_chain_and_virtuals() {
        let registry = registry().await;
        let posts = registry.get("Post").unwrap();
        for (title, words) in [("a", 400), ("b", 1000), ("c", 200)] {
            posts.create(json!({"title": title, "words": words})).await.unwrap();
        }

        let docs = posts
            .find(Predicate::all())
            .sort(SortSpec::parse("-words"))
            .skip(1)
            .limit(1)
            .exec()
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["title"], json!("a"));
        assert_eq!(docs[0]["minutes"], json!(2.0));
        assert!(!docs[0].contains_key("__v"));

        let titles_only = posts
            .find(Predicate::all())
            .select(Projection::include(&["title"]))
            .exec()
            .await
            .unwrap();
        assert!(titles_only.iter().all(|d| !d.contains_key("minutes")));
    }

    #[tokio::test]
    async fn test_populate_reference_and_virtual() {
        let registry = registry().await;
        let users = registry.get("User").unwrap();
        let posts = registry.get("Post").unwrap();

        let author = users.create(json!({"name": "Kate"})).await.unwrap();
        let author_id = author["_id"].as_str().unwrap().to_string();
        posts
            .create(json!({"title": "first", "author": author_id}))
            .await
            .unwrap();

        let relations =
            [Relation::reference("author", "User").select(Projection::include(&["name"]))];
        let docs = posts
            .find(Predicate::all())
            .populate(&registry, &relations)
            .exec()
            .await
            .unwrap();
        assert_eq!(docs[0]["author"], json!({"_id": author_id, "name": "Kate"}));

        let relations = [Relation::virtual_field("posts", "Post", "author")];
        let expanded = registry.expand(vec![author], &relations).await.unwrap();
        let written = expanded[0]["posts"].as_array().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["title"], json!("first"));
    }
}
