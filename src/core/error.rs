//! Typed error handling for tourbook
//!
//! Every failure a handler can produce is an [`AppError`]. Each variant knows
//! its HTTP status, a stable error code for clients, and whether it is
//! *operational* (a predictable failure caused by the request, safe to show
//! to the caller) or a programming/infrastructure fault.
//!
//! # Error Categories
//!
//! - [`ResourceError`]: a requested document does not exist
//! - [`ValidationError`]: the request payload or parameters are invalid
//! - [`RequestError`]: authentication, authorization and routing failures
//! - [`StorageError`]: storage backend failures
//! - [`ConfigError`]: configuration loading failures
//!
//! `AppError` implements [`IntoResponse`]. The response carries an
//! [`ErrorReport`] extension that the error middleware uses to pick the
//! development or production rendering.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// Message shown for non-operational errors in production.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went very wrong!";

/// The main error type of the crate
#[derive(Debug)]
pub enum AppError {
    /// A document lookup failed
    Resource(ResourceError),

    /// Payload, parameter or schema validation failed
    Validation(ValidationError),

    /// Authentication, authorization and routing failures
    Request(RequestError),

    /// Storage backend errors
    Storage(StorageError),

    /// Configuration errors
    Config(ConfigError),

    /// Internal errors (should not happen in normal operation)
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Resource(e) => write!(f, "{}", e),
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Request(e) => write!(f, "{}", e),
            AppError::Storage(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Resource(e) => Some(e),
            AppError::Validation(e) => Some(e),
            AppError::Request(e) => Some(e),
            AppError::Storage(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Internal(_) => None,
        }
    }
}

impl AppError {
    /// Build an internal error from anything displayable
    pub fn internal(message: impl fmt::Display) -> Self {
        AppError::Internal(message.to_string())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Resource(e) => e.status_code(),
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Request(e) => e.status_code(),
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Resource(e) => e.error_code(),
            AppError::Validation(e) => e.error_code(),
            AppError::Request(e) => e.error_code(),
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error is an expected, client-caused failure whose message
    /// may be shown to the caller.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            AppError::Resource(_) | AppError::Validation(_) | AppError::Request(_)
        )
    }

    /// `"fail"` for 4xx, `"error"` for everything else
    pub fn status_label(&self) -> &'static str {
        status_label(self.status_code())
    }

    /// Snapshot of the error used by the response layer
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            status_code: self.status_code(),
            code: self.error_code(),
            operational: self.is_operational(),
            message: self.to_string(),
            detail: format!("{:?}", self),
        }
    }
}

fn status_label(status: StatusCode) -> &'static str {
    if status.is_client_error() {
        "fail"
    } else {
        "error"
    }
}

/// Rendering-independent description of an error, attached to error
/// responses as an extension.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status_code: StatusCode,
    pub code: &'static str,
    pub operational: bool,
    pub message: String,
    pub detail: String,
}

/// Body of an error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorReport {
    /// Production rendering: operational messages pass through, anything else
    /// collapses into a generic 500.
    pub fn production(&self) -> (StatusCode, ErrorBody) {
        if self.operational {
            (
                self.status_code,
                ErrorBody {
                    status: status_label(self.status_code),
                    message: self.message.clone(),
                    code: None,
                    detail: None,
                },
            )
        } else {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    status: "error",
                    message: GENERIC_ERROR_MESSAGE.to_string(),
                    code: None,
                    detail: None,
                },
            )
        }
    }

    /// Development rendering: full message, code and debug detail.
    pub fn development(&self) -> (StatusCode, ErrorBody) {
        (
            self.status_code,
            ErrorBody {
                status: status_label(self.status_code),
                message: self.message.clone(),
                code: Some(self.code),
                detail: Some(self.detail.clone()),
            },
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = self.report();
        let (status, body) = report.production();
        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

// =============================================================================
// Resource Errors
// =============================================================================

/// Errors related to document lookups
#[derive(Debug)]
pub enum ResourceError {
    /// No document matches the identifier
    NotFound { resource: String, id: String },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NotFound { resource, .. } => {
                write!(f, "No {} found with that ID", resource)
            }
        }
    }
}

impl std::error::Error for ResourceError {}

impl ResourceError {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        ResourceError::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ResourceError::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ResourceError::NotFound { .. } => "RESOURCE_NOT_FOUND",
        }
    }
}

impl From<ResourceError> for AppError {
    fn from(err: ResourceError) -> Self {
        AppError::Resource(err)
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Error for a single field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

impl FieldValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors related to input validation
#[derive(Debug)]
pub enum ValidationError {
    /// One or more schema rules failed
    FieldErrors(Vec<FieldValidationError>),

    /// A value could not be converted to the field's type
    Cast { path: String, value: String },

    /// A unique index was violated
    Duplicate { field: String, value: String },

    /// The request body is not valid JSON
    InvalidJson { message: String },

    /// A path or query parameter is malformed
    InvalidParam { name: String, message: String },

    /// The request is well-formed but not accepted by this route
    Rejected { message: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::FieldErrors(errors) => {
                let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
                write!(f, "Invalid input data. {}", messages.join(". "))
            }
            ValidationError::Cast { path, value } => {
                write!(f, "Invalid {}: {}.", path, value)
            }
            ValidationError::Duplicate { value, .. } => {
                write!(
                    f,
                    "Duplicate field value: '{}'. Please use another value!",
                    value
                )
            }
            ValidationError::InvalidJson { message } => {
                write!(f, "Invalid JSON body: {}", message)
            }
            ValidationError::InvalidParam { message, .. } => write!(f, "{}", message),
            ValidationError::Rejected { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn cast(path: impl Into<String>, value: impl fmt::Display) -> Self {
        ValidationError::Cast {
            path: path.into(),
            value: value.to_string(),
        }
    }

    pub fn param(name: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidParam {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        ValidationError::Rejected {
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::FieldErrors(_) => "VALIDATION_FAILED",
            ValidationError::Cast { .. } => "CAST_ERROR",
            ValidationError::Duplicate { .. } => "DUPLICATE_VALUE",
            ValidationError::InvalidJson { .. } => "INVALID_JSON",
            ValidationError::InvalidParam { .. } => "INVALID_PARAMETER",
            ValidationError::Rejected { .. } => "REQUEST_REJECTED",
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to authentication, authorization and routing
#[derive(Debug)]
pub enum RequestError {
    /// No (valid) caller identity
    Unauthorized { message: String },

    /// Caller is known but lacks the required role
    Forbidden { message: String },

    /// No route matches the URL
    RouteNotFound { path: String },

    /// Route exists but is intentionally not served
    NotImplemented { message: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Unauthorized { message } => write!(f, "{}", message),
            RequestError::Forbidden { message } => write!(f, "{}", message),
            RequestError::RouteNotFound { path } => write!(
                f,
                "The requested URL {} could not be found on the server",
                path
            ),
            RequestError::NotImplemented { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            RequestError::Forbidden { .. } => StatusCode::FORBIDDEN,
            RequestError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            RequestError::NotImplemented { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::Unauthorized { .. } => "UNAUTHORIZED",
            RequestError::Forbidden { .. } => "FORBIDDEN",
            RequestError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            RequestError::NotImplemented { .. } => "ROUTE_NOT_DEFINED",
        }
    }
}

impl From<RequestError> for AppError {
    fn from(err: RequestError) -> Self {
        AppError::Request(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors raised by storage backends
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("duplicate key in {collection}: {field} = {value}")]
    DuplicateKey {
        collection: String,
        field: String,
        value: String,
    },

    #[error("failed to connect to {backend}: {message}")]
    Connection { backend: String, message: String },

    #[error("{backend} query failed: {message}")]
    Query { backend: String, message: String },

    #[error("storage lock poisoned: {0}")]
    Poisoned(String),

    #[error("failed to convert document: {0}")]
    Conversion(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateKey { field, value, .. } => {
                AppError::Validation(ValidationError::Duplicate { field, value })
            }
            other => AppError::Storage(other),
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("failed to read configuration: {message}")]
    Io { message: String },

    #[error("failed to parse configuration: {message}")]
    Parse { message: String },

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse {
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(ValidationError::InvalidJson {
            message: err.to_string(),
        })
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for tourbook operations
pub type AppResult<T> = Result<T, AppError>;

// =============================================================================
// Tests
// =============================================================================
