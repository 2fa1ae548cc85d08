//! Generic resource handler factory
//!
//! [`HandlerFactory::for_resource`] turns a [`ResourceDescriptor`] into a set
//! of [`ResourceHandlers`]: list, get-one, create, update and delete, wired
//! to the resource's model. Everything that differs between resources is
//! data on the descriptor (relations to expand, update whitelist, nested
//! scope, owner field, route policies, post-write hooks), so the handlers
//! themselves are written once.
//!
//! ```rust,ignore
//! let descriptor = ResourceDescriptor::new("review", "reviews", "Review")
//!     .populate(Relation::reference("user", "User"))
//!     .nested_under("tours", "tour")
//!     .after_write(RecalculateTourRatings);
//! let handlers = factory.for_resource(descriptor)?;
//! let router = handlers.routes().merge(handlers.nested_routes().unwrap_or_default());
//! ```

use super::extract::JsonPayload;
use crate::core::auth::{AuthContext, AuthPolicy, AuthProvider};
use crate::core::document::Document;
use crate::core::error::{AppResult, RequestError, ResourceError};
use crate::core::model::{Model, ModelRegistry, Relation, UpdateOptions};
use crate::core::query::{ApiFeatures, Predicate, QueryDefaults, QueryParams};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Response envelope
// =============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnvelopeData {
    pub data: Value,
}

/// `{status: "success", results?, data: {data}}`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Envelope {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    pub data: EnvelopeData,
}

impl Envelope {
    pub fn one(doc: Document) -> Self {
        Self {
            status: "success",
            results: None,
            data: EnvelopeData {
                data: Value::Object(doc),
            },
        }
    }

    pub fn many(docs: Vec<Document>) -> Self {
        Self {
            status: "success",
            results: Some(docs.len()),
            data: EnvelopeData {
                data: Value::Array(docs.into_iter().map(Value::Object).collect()),
            },
        }
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// The five generic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

/// Policy guarding each generic operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutePolicies {
    pub list: AuthPolicy,
    pub get: AuthPolicy,
    pub create: AuthPolicy,
    pub update: AuthPolicy,
    pub delete: AuthPolicy,
}

impl RoutePolicies {
    /// Same policy for every operation
    pub fn all(policy: AuthPolicy) -> Self {
        Self {
            list: policy.clone(),
            get: policy.clone(),
            create: policy.clone(),
            update: policy.clone(),
            delete: policy,
        }
    }

    pub fn for_operation(&self, operation: Operation) -> &AuthPolicy {
        match operation {
            Operation::List => &self.list,
            Operation::Get => &self.get,
            Operation::Create => &self.create,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        }
    }
}

/// Child resource mounted under a parent, e.g. `/tours/{id}/reviews`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedScope {
    /// URL plural of the parent resource
    pub parent: String,
    /// Field of the child holding the parent id
    pub field: String,
}

/// What kind of write triggered a hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Created,
    Updated,
    Deleted,
}

/// A successful write, as seen by post-write hooks
#[derive(Debug, Clone, Copy)]
pub struct WriteEvent<'a> {
    pub kind: WriteKind,
    /// The document as stored (or as removed, for deletes)
    pub document: &'a Document,
    /// The document before an update
    pub previous: Option<&'a Document>,
}

impl<'a> WriteEvent<'a> {
    pub fn new(kind: WriteKind, document: &'a Document) -> Self {
        Self {
            kind,
            document,
            previous: None,
        }
    }

    pub fn replacing(mut self, previous: &'a Document) -> Self {
        self.previous = Some(previous);
        self
    }
}

/// Callback run by the factory after a successful write
#[async_trait]
pub trait PostWriteHook: Send + Sync {
    async fn after_write(&self, event: WriteEvent<'_>, models: &ModelRegistry) -> AppResult<()>;
}

/// Everything the factory needs to know about a resource type
#[derive(Clone)]
pub struct ResourceDescriptor {
    /// Singular name, used in messages ("No tour found with that ID")
    pub name: String,
    /// URL segment
    pub plural: String,
    /// Registered model name
    pub model: String,
    /// Relations expanded on list, get and update
    pub populate: Vec<Relation>,
    /// Extra relations expanded on get only
    pub detail_populate: Vec<Relation>,
    /// When set, updates only keep these fields
    pub update_whitelist: Option<Vec<String>>,
    pub nested: Option<NestedScope>,
    /// Field filled with the caller's id on create when absent
    pub owner_field: Option<String>,
    pub policies: RoutePolicies,
    /// Operations answered with a 500 and this message instead of running
    pub disabled: Vec<(Operation, String)>,
    pub post_write: Vec<Arc<dyn PostWriteHook>>,
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("name", &self.name)
            .field("plural", &self.plural)
            .field("model", &self.model)
            .field("nested", &self.nested)
            .field("post_write", &self.post_write.len())
            .finish_non_exhaustive()
    }
}

impl ResourceDescriptor {
    pub fn new(
        name: impl Into<String>,
        plural: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            plural: plural.into(),
            model: model.into(),
            populate: Vec::new(),
            detail_populate: Vec::new(),
            update_whitelist: None,
            nested: None,
            owner_field: None,
            policies: RoutePolicies::default(),
            disabled: Vec::new(),
            post_write: Vec::new(),
        }
    }

    pub fn populate(mut self, relation: Relation) -> Self {
        self.populate.push(relation);
        self
    }

    pub fn populate_detail(mut self, relation: Relation) -> Self {
        self.detail_populate.push(relation);
        self
    }

    pub fn nested_under(mut self, parent: impl Into<String>, field: impl Into<String>) -> Self {
        self.nested = Some(NestedScope {
            parent: parent.into(),
            field: field.into(),
        });
        self
    }

    pub fn owned_by(mut self, field: impl Into<String>) -> Self {
        self.owner_field = Some(field.into());
        self
    }

    pub fn policies(mut self, policies: RoutePolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn disable(mut self, operation: Operation, message: impl Into<String>) -> Self {
        self.disabled.push((operation, message.into()));
        self
    }

    pub fn after_write(mut self, hook: impl PostWriteHook + 'static) -> Self {
        self.post_write.push(Arc::new(hook));
        self
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Shared collaborators of every resource's handlers
#[derive(Clone)]
pub struct HandlerFactory {
    models: Arc<ModelRegistry>,
    auth: Arc<dyn AuthProvider>,
    defaults: QueryDefaults,
}

impl HandlerFactory {
    pub fn new(
        models: Arc<ModelRegistry>,
        auth: Arc<dyn AuthProvider>,
        defaults: QueryDefaults,
    ) -> Self {
        Self {
            models,
            auth,
            defaults,
        }
    }

    /// Bind a descriptor to its model. Fails when the model is not registered.
    pub fn for_resource(&self, descriptor: ResourceDescriptor) -> AppResult<ResourceHandlers> {
        let model = self.models.get(&descriptor.model)?.clone();
        Ok(ResourceHandlers {
            inner: Arc::new(HandlerState {
                descriptor,
                model,
                models: self.models.clone(),
                auth: self.auth.clone(),
                defaults: self.defaults.clone(),
            }),
        })
    }
}

struct HandlerState {
    descriptor: ResourceDescriptor,
    model: Arc<Model>,
    models: Arc<ModelRegistry>,
    auth: Arc<dyn AuthProvider>,
    defaults: QueryDefaults,
}

/// The generic operations of one resource. Cheap to clone.
#[derive(Clone)]
pub struct ResourceHandlers {
    inner: Arc<HandlerState>,
}

impl ResourceHandlers {
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.inner.descriptor
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.inner.model
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.inner.models
    }

    pub fn defaults(&self) -> &QueryDefaults {
        &self.inner.defaults
    }

    /// Same handlers, but updates keep only `fields`
    pub fn restricted_to<S: AsRef<str>>(&self, fields: &[S]) -> Self {
        let mut descriptor = self.inner.descriptor.clone();
        descriptor.update_whitelist = Some(fields.iter().map(|f| f.as_ref().to_string()).collect());
        Self {
            inner: Arc::new(HandlerState {
                descriptor,
                model: self.inner.model.clone(),
                models: self.inner.models.clone(),
                auth: self.inner.auth.clone(),
                defaults: self.inner.defaults.clone(),
            }),
        }
    }

    /// Resolve the caller and check `policy`
    pub async fn authorize(
        &self,
        policy: &AuthPolicy,
        headers: &HeaderMap,
    ) -> AppResult<AuthContext> {
        let context = self.inner.auth.extract_context(headers).await?;
        policy.authorize(&context)?;
        Ok(context)
    }

    async fn guard(&self, operation: Operation, headers: &HeaderMap) -> AppResult<AuthContext> {
        if let Some((_, message)) = self
            .descriptor()
            .disabled
            .iter()
            .find(|(op, _)| *op == operation)
        {
            return Err(RequestError::NotImplemented {
                message: message.clone(),
            }
            .into());
        }
        let policy = self.descriptor().policies.for_operation(operation);
        self.authorize(policy, headers).await
    }

    fn not_found(&self, id: &str) -> ResourceError {
        ResourceError::not_found(&self.descriptor().name, id)
    }

    async fn run_hooks(&self, event: WriteEvent<'_>) -> AppResult<()> {
        for hook in &self.descriptor().post_write {
            hook.after_write(event, &self.inner.models).await?;
        }
        Ok(())
    }

    /// Filtered, sorted, projected, paginated list
    pub async fn list(
        &self,
        params: &QueryParams,
        pre_filter: Option<Predicate>,
    ) -> AppResult<Envelope> {
        let descriptor = ApiFeatures::new(params)
            .with_defaults(self.inner.defaults.clone())
            .build(pre_filter.unwrap_or_default());
        let docs = self
            .model()
            .query(descriptor)
            .populate(&self.inner.models, &self.descriptor().populate)
            .exec()
            .await?;
        tracing::debug!(resource = %self.descriptor().name, results = docs.len(), "listed");
        Ok(Envelope::many(docs))
    }

    pub async fn get_one(&self, id: &str) -> AppResult<Envelope> {
        let doc = self
            .model()
            .find_by_id(id)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        let relations: Vec<Relation> = self
            .descriptor()
            .populate
            .iter()
            .chain(&self.descriptor().detail_populate)
            .cloned()
            .collect();
        let mut expanded = self.inner.models.expand(vec![doc], &relations).await?;
        let doc = expanded.pop().ok_or_else(|| self.not_found(id))?;
        Ok(Envelope::one(doc))
    }

    pub async fn create(&self, payload: Value) -> AppResult<Envelope> {
        let doc = self.model().create(payload).await?;
        self.run_hooks(WriteEvent::new(WriteKind::Created, &doc)).await?;
        Ok(Envelope::one(doc))
    }

    pub async fn update(&self, id: &str, payload: Value) -> AppResult<Envelope> {
        let payload = match (&self.descriptor().update_whitelist, payload) {
            (Some(allowed), Value::Object(mut map)) => {
                map.retain(|key, _| allowed.iter().any(|a| a == key));
                Value::Object(map)
            }
            (_, payload) => payload,
        };
        let previous = if self.descriptor().post_write.is_empty() {
            None
        } else {
            self.model().find_by_id(id).await?
        };
        let doc = self
            .model()
            .find_by_id_and_update(id, payload, UpdateOptions::default())
            .await?
            .ok_or_else(|| self.not_found(id))?;
        let event = WriteEvent::new(WriteKind::Updated, &doc);
        self.run_hooks(match &previous {
            Some(previous) => event.replacing(previous),
            None => event,
        })
        .await?;

        let mut expanded = self
            .inner
            .models
            .expand(vec![doc], &self.descriptor().populate)
            .await?;
        let doc = expanded.pop().ok_or_else(|| self.not_found(id))?;
        Ok(Envelope::one(doc))
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let doc = self
            .model()
            .find_by_id_and_delete(id)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        self.run_hooks(WriteEvent::new(WriteKind::Deleted, &doc)).await
    }

    /// Fill the owner field from the caller when the payload lacks it
    fn with_owner(&self, payload: Value, context: &AuthContext) -> Value {
        match (&self.descriptor().owner_field, context.user_id(), payload) {
            (Some(field), Some(user_id), Value::Object(mut map)) => {
                if map.get(field).is_none_or(Value::is_null) {
                    map.insert(field.clone(), Value::String(user_id.to_string()));
                }
                Value::Object(map)
            }
            (_, _, payload) => payload,
        }
    }

    /// `GET/POST /{plural}` and `GET/PATCH/DELETE /{plural}/{id}`
    pub fn routes(&self) -> Router {
        let plural = &self.descriptor().plural;
        Router::new()
            .route(
                &format!("/{}", plural),
                get(list_handler).post(create_handler),
            )
            .route(
                &format!("/{}/{{id}}", plural),
                get(get_handler).patch(update_handler).delete(delete_handler),
            )
            .with_state(self.clone())
    }

    /// `GET/POST /{parent}/{id}/{plural}` for nested resources
    pub fn nested_routes(&self) -> Option<Router> {
        let nested = self.descriptor().nested.as_ref()?;
        Some(
            Router::new()
                .route(
                    &format!("/{}/{{id}}/{}", nested.parent, self.descriptor().plural),
                    get(nested_list_handler).post(nested_create_handler),
                )
                .with_state(self.clone()),
        )
    }
}

// =============================================================================
// Axum handlers
// =============================================================================

async fn list_handler(
    State(handlers): State<ResourceHandlers>,
    headers: HeaderMap,
    params: QueryParams,
) -> AppResult<Json<Envelope>> {
    handlers.guard(Operation::List, &headers).await?;
    Ok(Json(handlers.list(&params, None).await?))
}

async fn get_handler(
    State(handlers): State<ResourceHandlers>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Envelope>> {
    handlers.guard(Operation::Get, &headers).await?;
    Ok(Json(handlers.get_one(&id).await?))
}

async fn create_handler(
    State(handlers): State<ResourceHandlers>,
    headers: HeaderMap,
    JsonPayload(payload): JsonPayload,
) -> AppResult<(StatusCode, Json<Envelope>)> {
    let context = handlers.guard(Operation::Create, &headers).await?;
    let payload = handlers.with_owner(payload, &context);
    Ok((StatusCode::CREATED, Json(handlers.create(payload).await?)))
}

async fn update_handler(
    State(handlers): State<ResourceHandlers>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonPayload(payload): JsonPayload,
) -> AppResult<Json<Envelope>> {
    handlers.guard(Operation::Update, &headers).await?;
    Ok(Json(handlers.update(&id, payload).await?))
}

async fn delete_handler(
    State(handlers): State<ResourceHandlers>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    handlers.guard(Operation::Delete, &headers).await?;
    handlers.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn nested_list_handler(
    State(handlers): State<ResourceHandlers>,
    headers: HeaderMap,
    Path(parent_id): Path<String>,
    params: QueryParams,
) -> AppResult<Json<Envelope>> {
    handlers.guard(Operation::List, &headers).await?;
    let pre_filter = handlers
        .descriptor()
        .nested
        .as_ref()
        .map(|scope| Predicate::eq(scope.field.as_str(), parent_id));
    Ok(Json(handlers.list(&params, pre_filter).await?))
}

async fn nested_create_handler(
    State(handlers): State<ResourceHandlers>,
    headers: HeaderMap,
    Path(parent_id): Path<String>,
    JsonPayload(payload): JsonPayload,
) -> AppResult<(StatusCode, Json<Envelope>)> {
    let context = handlers.guard(Operation::Create, &headers).await?;
    let payload = match (&handlers.descriptor().nested, payload) {
        (Some(scope), Value::Object(mut map)) => {
            if map.get(&scope.field).is_none_or(Value::is_null) {
                map.insert(scope.field.clone(), Value::String(parent_id));
            }
            Value::Object(map)
        }
        (_, payload) => payload,
    };
    let payload = handlers.with_owner(payload, &context);
    Ok((StatusCode::CREATED, Json(handlers.create(payload).await?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::NoAuthProvider;
    use crate::core::error::AppError;
    use crate::core::schema::{FieldDef, FieldKind, Schema};
    use crate::storage::in_memory::InMemoryBackend;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountWrites(Arc<AtomicUsize>);

    #[async_trait]
    impl PostWriteHook for CountWrites {
        async fn after_write(&self, event: WriteEvent<'_>, _: &ModelRegistry) -> AppResult<()> {
            if event.kind == WriteKind::Updated {
                let previous = event.previous.expect("updates carry the previous document");
                assert_eq!(previous["title"], event.document["title"]);
            }
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn handlers(descriptor: ResourceDescriptor) -> ResourceHandlers {
        let backend = InMemoryBackend::new();
        let model = Model::register(
            &backend,
            "Note",
            "notes",
            Schema::new()
                .field(
                    FieldDef::new("title", FieldKind::String).required("A note must have a title"),
                )
                .field(FieldDef::new("stars", FieldKind::Number))
                .with_created_at(),
        )
        .await
        .unwrap();
        let mut models = ModelRegistry::new();
        models.insert(model);
        HandlerFactory::new(Arc::new(models), Arc::new(NoAuthProvider), QueryDefaults::default())
            .for_resource(descriptor)
            .unwrap()
    }

    fn id_of(envelope: &Envelope) -> String {
        envelope.data.data["_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_crud_cycle_runs_hooks() {
        let writes = Arc::new(AtomicUsize::new(0));
        let h = handlers(
            ResourceDescriptor::new("note", "notes", "Note")
                .after_write(CountWrites(writes.clone())),
        )
        .await;

        let created = h.create(json!({"title": "first", "stars": 3})).await.unwrap();
        let id = id_of(&created);
        assert_eq!(created.data.data["__v"], json!(0));

        let updated = h.update(&id, json!({"stars": 5})).await.unwrap();
        assert_eq!(updated.data.data["stars"], json!(5));

        let fetched = h.get_one(&id).await.unwrap();
        assert_eq!(fetched.data.data["title"], json!("first"));

        h.delete(&id).await.unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 3);

        let err = h.delete(&id).await.unwrap_err();
        assert_eq!(err.to_string(), "No note found with that ID");
        let err = h.get_one(&id).await.unwrap_err();
        assert!(matches!(err, AppError::Resource(_)));
    }

    #[tokio::test]
    async fn test_list_envelope_and_pre_filter() {
        let h = handlers(ResourceDescriptor::new("note", "notes", "Note")).await;
        for (title, stars) in [("a", 1), ("b", 4), ("c", 5)] {
            h.create(json!({"title": title, "stars": stars})).await.unwrap();
        }

        let params = QueryParams::from_pairs(vec![("stars[gte]", "4"), ("sort", "stars")]);
        let listed = h.list(&params, None).await.unwrap();
        assert_eq!(listed.results, Some(2));
        assert_eq!(listed.data.data[0]["title"], json!("b"));

        let listed = h
            .list(&QueryParams::new(), Some(Predicate::eq("title", "c")))
            .await
            .unwrap();
        assert_eq!(listed.results, Some(1));

        let empty = h
            .list(&QueryParams::from_pairs(vec![("stars", "99")]), None)
            .await
            .unwrap();
        assert_eq!(empty.results, Some(0));
        assert_eq!(empty.status, "success");
    }

    #[tokio::test]
    async fn test_update_whitelist() {
        let h = handlers(ResourceDescriptor::new("note", "notes", "Note")).await;
        let id = id_of(&h.create(json!({"title": "keep", "stars": 1})).await.unwrap());

        let restricted = h.restricted_to(&["stars"]);
        let updated = restricted
            .update(&id, json!({"title": "changed", "stars": 2}))
            .await
            .unwrap();
        assert_eq!(updated.data.data["title"], json!("keep"));
        assert_eq!(updated.data.data["stars"], json!(2));
    }

    #[tokio::test]
    async fn test_failed_create_persists_nothing() {
        let h = handlers(ResourceDescriptor::new("note", "notes", "Note")).await;
        let err = h.create(json!({"stars": 2})).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid input data. A note must have a title");

        let listed = h.list(&QueryParams::new(), None).await.unwrap();
        assert_eq!(listed.results, Some(0));
    }

    #[test]
    fn test_envelope_serialization() {
        let many = serde_json::to_value(Envelope::many(vec![])).unwrap();
        assert_eq!(many, json!({"status": "success", "results": 0, "data": {"data": []}}));

        let one = serde_json::to_value(Envelope::one(Document::new())).unwrap();
        assert_eq!(one, json!({"status": "success", "data": {"data": {}}}));
    }
}
