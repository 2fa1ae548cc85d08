//! Core module: documents, schemas, queries, models and the storage seam

pub mod auth;
pub mod document;
pub mod error;
pub mod geo;
pub mod model;
pub mod query;
pub mod schema;
pub mod service;
pub mod validation;

pub use auth::{AuthContext, AuthPolicy, AuthProvider, HeaderAuthProvider, NoAuthProvider};
pub use document::Document;
pub use error::{AppError, AppResult};
pub use model::{Model, ModelRegistry, Query, Relation, UpdateOptions};
pub use query::{ApiFeatures, Predicate, QueryDescriptor, QueryParams};
pub use schema::{FieldDef, FieldKind, Schema};
pub use service::{CollectionSpec, DocumentService, StorageBackend};
