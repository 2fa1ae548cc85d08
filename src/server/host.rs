//! Server host for transport-agnostic API exposure
//!
//! A `ServerHost` holds everything an exposure needs to serve the API: the
//! configuration, the opened models, the auth provider and the registered
//! resources. It is built once by [`ServerBuilder`](super::ServerBuilder)
//! and shared read-only afterwards.

use super::factory::HandlerFactory;
use super::resource_registry::ResourceRegistry;
use crate::config::AppConfig;
use crate::core::auth::AuthProvider;
use crate::core::error::AppResult;
use crate::core::model::ModelRegistry;
use axum::Router;
use std::sync::Arc;

pub struct ServerHost {
    pub config: Arc<AppConfig>,

    /// Models opened on the configured backend
    pub models: Arc<ModelRegistry>,

    pub auth: Arc<dyn AuthProvider>,

    pub resources: ResourceRegistry,

    /// Routes registered next to the resources (relative to the API prefix)
    pub custom_routes: Vec<Router>,
}

impl ServerHost {
    pub fn new(
        config: AppConfig,
        models: ModelRegistry,
        auth: Arc<dyn AuthProvider>,
        resources: ResourceRegistry,
    ) -> Self {
        Self {
            config: Arc::new(config),
            models: Arc::new(models),
            auth,
            resources,
            custom_routes: Vec::new(),
        }
    }

    pub fn with_custom_routes(mut self, routes: Vec<Router>) -> Self {
        self.custom_routes = routes;
        self
    }

    /// Factory bound to this host's models, auth provider and query defaults
    pub fn handler_factory(&self) -> HandlerFactory {
        HandlerFactory::new(
            self.models.clone(),
            self.auth.clone(),
            self.config.query.clone(),
        )
    }

    /// Every resource route plus the custom routes
    pub fn api_routes(&self) -> AppResult<Router> {
        let mut router = self.resources.build_routes(&self.handler_factory())?;
        for custom in &self.custom_routes {
            router = router.merge(custom.clone());
        }
        Ok(router)
    }
}
