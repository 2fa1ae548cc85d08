//! REST API exposure
//!
//! Consumes a `ServerHost` and produces the Axum `Router` served by the
//! binary: health checks at the root, every resource under [`API_PREFIX`],
//! a JSON 404 for unknown URLs, and the error-posture middleware.

use super::super::host::ServerHost;
use crate::config::Environment;
use crate::core::error::{AppError, ErrorReport, RequestError};
use anyhow::Result;
use axum::{
    Json, Router,
    extract::{OriginalUri, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Mount point of every resource route
pub const API_PREFIX: &str = "/api/v1";

pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    pub fn build_router(host: Arc<ServerHost>) -> Result<Router> {
        let api = host.api_routes()?;
        let environment = host.config.environment;

        let app = Self::health_routes()
            .nest(API_PREFIX, api)
            .fallback(route_not_found)
            .layer(middleware::from_fn_with_state(environment, render_errors))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            );

        Ok(app)
    }

    fn health_routes() -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
    }

    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": env!("CARGO_PKG_NAME")
        }))
    }
}

async fn route_not_found(OriginalUri(uri): OriginalUri) -> AppError {
    let path = uri
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| uri.path().to_string());
    RequestError::RouteNotFound { path }.into()
}

/// Re-render error responses for the configured environment.
///
/// Handlers answer errors with the production body and an [`ErrorReport`]
/// extension; this layer logs the report and, in development, swaps the body
/// for the detailed one.
async fn render_errors(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;

    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };

    if report.operational {
        tracing::warn!(
            %method,
            %uri,
            status = %report.status_code,
            code = report.code,
            "{}",
            report.message
        );
    } else {
        tracing::error!(
            %method,
            %uri,
            code = report.code,
            detail = %report.detail,
            "{}",
            report.message
        );
    }

    let (status, body) = match environment {
        Environment::Production => report.production(),
        Environment::Development => report.development(),
    };
    (status, Json(body)).into_response()
}
