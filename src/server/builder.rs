//! ServerBuilder for fluent API to build HTTP servers

use super::exposure::RestExposure;
use super::host::ServerHost;
use super::resource_registry::{Resource, ResourceRegistry};
use crate::config::AppConfig;
use crate::core::auth::{AuthProvider, HeaderAuthProvider, NoAuthProvider};
use crate::core::service::StorageBackend;
use crate::storage::in_memory::InMemoryBackend;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Where request identities come from
enum AuthSetup {
    Anonymous,
    Provider(Arc<dyn AuthProvider>),
    /// `X-User-Id` resolved against the named model
    HeaderUsers(String),
}

/// Builder for creating HTTP servers with auto-registered routes
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_config(config)
///     .with_backend(InMemoryBackend::new())
///     .register(TourResource)
///     .build()
///     .await?;
/// ```
pub struct ServerBuilder {
    config: AppConfig,
    backend: Option<Arc<dyn StorageBackend>>,
    auth: AuthSetup,
    resources: ResourceRegistry,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            backend: None,
            auth: AuthSetup::Anonymous,
            resources: ResourceRegistry::new(),
            custom_routes: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Storage backend for every model. Defaults to a fresh in-memory backend.
    pub fn with_backend(mut self, backend: impl StorageBackend + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    pub fn with_shared_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_auth_provider(mut self, provider: impl AuthProvider + 'static) -> Self {
        self.auth = AuthSetup::Provider(Arc::new(provider));
        self
    }

    /// Identify callers by the `X-User-Id` header, looked up in `user_model`
    pub fn with_header_auth(mut self, user_model: impl Into<String>) -> Self {
        self.auth = AuthSetup::HeaderUsers(user_model.into());
        self
    }

    /// Add routes that don't fit the resource pattern. They are mounted
    /// under the API prefix like resource routes.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    pub fn register(mut self, resource: impl Resource + 'static) -> Self {
        self.resources.register(Box::new(resource));
        self
    }

    /// Open every model on the backend and assemble the transport-agnostic host
    pub async fn build_host(self) -> Result<ServerHost> {
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(InMemoryBackend::new()));
        tracing::info!(
            backend = backend.name(),
            resources = ?self.resources.names(),
            "opening models"
        );

        let models = self.resources.open_models(backend.as_ref()).await?;

        let auth: Arc<dyn AuthProvider> = match self.auth {
            AuthSetup::Anonymous => Arc::new(NoAuthProvider),
            AuthSetup::Provider(provider) => provider,
            AuthSetup::HeaderUsers(model) => {
                Arc::new(HeaderAuthProvider::new(models.get(&model)?.clone()))
            }
        };

        Ok(ServerHost::new(self.config, models, auth, self.resources)
            .with_custom_routes(self.custom_routes))
    }

    /// Build the final REST router
    pub async fn build(self) -> Result<Router> {
        let host = Arc::new(self.build_host().await?);
        RestExposure::build_router(host)
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build().await?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for a shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StorageError;
    use crate::core::model::Model;
    use crate::core::schema::{FieldDef, FieldKind, Schema};
    use crate::server::factory::ResourceDescriptor;
    use async_trait::async_trait;

    struct People;

    #[async_trait]
    impl Resource for People {
        fn name(&self) -> &str {
            "person"
        }

        async fn model(&self, backend: &dyn StorageBackend) -> Result<Model, StorageError> {
            Model::register(
                backend,
                "Person",
                "people",
                Schema::new().field(FieldDef::new("role", FieldKind::String)),
            )
            .await
        }

        fn descriptor(&self) -> ResourceDescriptor {
            ResourceDescriptor::new("person", "people", "Person")
        }
    }

    #[test]
    fn test_builder_new_is_empty() {
        let builder = ServerBuilder::new();
        assert!(builder.resources.is_empty());
        assert!(builder.backend.is_none());
        assert!(builder.custom_routes.is_empty());
    }

    #[tokio::test]
    async fn test_build_host_opens_models() {
        let host = ServerBuilder::new()
            .register(People)
            .with_header_auth("Person")
            .build_host()
            .await
            .unwrap();
        assert!(host.models.get("Person").is_ok());
        assert_eq!(host.resources.names(), vec!["person"]);
    }

    #[tokio::test]
    async fn test_header_auth_requires_known_model() {
        let result = ServerBuilder::new()
            .register(People)
            .with_header_auth("Nobody")
            .build_host()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_build_with_custom_routes() {
        let custom = Router::new().route("/ping", axum::routing::get(|| async { "pong" }));
        let router = ServerBuilder::new()
            .register(People)
            .with_custom_routes(custom)
            .build()
            .await;
        assert!(router.is_ok());
    }
}
