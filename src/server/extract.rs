//! Axum extractors turning requests into the types handlers work with
//!
//! Both extractors reject with [`AppError`], so malformed input gets the
//! same error envelope as every other failure.

use crate::core::error::{AppError, ValidationError};
use crate::core::query::QueryParams;
use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use serde_json::Value;

/// JSON object body.
///
/// ```rust,ignore
/// async fn create(JsonPayload(payload): JsonPayload) -> AppResult<...> {
///     // payload is a Value::Object
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPayload(pub Value);

impl<S> FromRequest<S> for JsonPayload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(payload): Json<Value> =
            Json::from_request(req, state)
                .await
                .map_err(|rejection| ValidationError::InvalidJson {
                    message: rejection.body_text(),
                })?;

        if !payload.is_object() {
            return Err(ValidationError::InvalidJson {
                message: "request body must be a JSON object".to_string(),
            }
            .into());
        }
        Ok(JsonPayload(payload))
    }
}

impl<S> FromRequestParts<S> for QueryParams
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs): Query<Vec<(String, String)>> = Query::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ValidationError::param("query", rejection.body_text()))?;
        Ok(QueryParams::from_pairs(pairs))
    }
}
