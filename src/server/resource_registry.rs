//! Resource registry: collects resource types and builds their routes

use super::factory::{HandlerFactory, ResourceDescriptor, ResourceHandlers};
use crate::core::error::{AppResult, StorageError};
use crate::core::model::{Model, ModelRegistry};
use crate::core::service::StorageBackend;
use async_trait::async_trait;
use axum::Router;
use indexmap::IndexMap;

/// A resource type exposed by the API
///
/// Each resource (tour, review, user) implements this trait to provide its
/// model and its handler descriptor. Routes default to the factory's generic
/// ones; resources with extra endpoints override [`Resource::build_routes`].
#[async_trait]
pub trait Resource: Send + Sync {
    /// Singular name (e.g., "tour")
    fn name(&self) -> &str;

    /// Open the resource's model on `backend`
    async fn model(&self, backend: &dyn StorageBackend) -> Result<Model, StorageError>;

    /// How the generic handlers behave for this resource
    fn descriptor(&self) -> ResourceDescriptor;

    /// Routes of this resource, relative to the API prefix
    fn build_routes(&self, handlers: &ResourceHandlers) -> Router {
        let router = handlers.routes();
        match handlers.nested_routes() {
            Some(nested) => router.merge(nested),
            None => router,
        }
    }
}

/// Registry for all resources of the application, in registration order
#[derive(Default)]
pub struct ResourceRegistry {
    resources: IndexMap<String, Box<dyn Resource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource. A later registration with the same name replaces
    /// the earlier one.
    pub fn register(&mut self, resource: Box<dyn Resource>) {
        let name = resource.name().to_string();
        self.resources.insert(name, resource);
    }

    /// Open every resource's model on `backend`
    pub async fn open_models(
        &self,
        backend: &dyn StorageBackend,
    ) -> Result<ModelRegistry, StorageError> {
        let mut models = ModelRegistry::new();
        for resource in self.resources.values() {
            let model = resource.model(backend).await?;
            tracing::debug!(resource = resource.name(), model = model.name(), "model opened");
            models.insert(model);
        }
        Ok(models)
    }

    /// Bind every resource to the factory and merge their routes
    pub fn build_routes(&self, factory: &HandlerFactory) -> AppResult<Router> {
        let mut router = Router::new();
        for resource in self.resources.values() {
            let handlers = factory.for_resource(resource.descriptor())?;
            router = router.merge(resource.build_routes(&handlers));
        }
        Ok(router)
    }

    pub fn names(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
