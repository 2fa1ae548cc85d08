//! # Tourbook
//!
//! A tour-booking REST API built from two generic pieces:
//!
//! - **Query Feature Builder** ([`core::query`]): turns a raw query string
//!   into a filter with `gte`/`gt`/`lte`/`lt` operators, a sort chain, a
//!   field projection and a page window.
//! - **Handler Factory** ([`server::factory`]): produces list, get, create,
//!   update and delete handlers for any model, wrapped in a uniform
//!   `{status, results, data}` envelope.
//!
//! Tours, reviews and users ([`entities`]) are declared once as schemas and
//! resource descriptors; everything else is derived.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tourbook::prelude::*;
//!
//! let config = AppConfig::load()?;
//! entities::register_all(ServerBuilder::new().with_config(config))
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod entities;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{AuthContext, AuthPolicy, AuthProvider, HeaderAuthProvider, NoAuthProvider},
        document::Document,
        error::{AppError, AppResult, StorageError, ValidationError},
        geo::{DistanceUnit, LatLng},
        model::{Model, ModelRegistry, Query, Relation, UpdateOptions},
        query::{ApiFeatures, Predicate, Projection, QueryDescriptor, QueryParams},
        schema::{FieldDef, FieldKind, Schema},
        service::{CollectionSpec, DocumentService, StorageBackend},
    };

    // === Resources ===
    pub use crate::entities::{self, ReviewResource, TourResource, UserResource};

    // === Storage ===
    pub use crate::storage::InMemoryBackend;
    #[cfg(feature = "mongodb_backend")]
    pub use crate::storage::MongoBackend;

    // === Config ===
    pub use crate::config::{AppConfig, Environment, StorageConfig};

    // === Server ===
    pub use crate::server::{
        Envelope, HandlerFactory, PostWriteHook, Resource, ResourceDescriptor, ResourceHandlers,
        RoutePolicies, ServerBuilder,
    };

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};

    // === Axum ===
    pub use axum::{
        Router,
        extract::{Path, State},
        http::HeaderMap,
        routing::{delete, get, patch, post},
    };
}
