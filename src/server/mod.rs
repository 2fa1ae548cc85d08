//! Server module for building HTTP servers with auto-registered routes
//!
//! This module provides a `ServerBuilder` that opens every registered
//! resource's model, binds it to the generic handler factory and mounts the
//! resulting routes next to health checks and error handling.

pub mod builder;
pub mod exposure;
pub mod extract;
pub mod factory;
pub mod host;
pub mod resource_registry;

pub use builder::ServerBuilder;
pub use exposure::{API_PREFIX, RestExposure};
pub use extract::JsonPayload;
pub use factory::{
    Envelope, HandlerFactory, NestedScope, Operation, PostWriteHook, ResourceDescriptor,
    ResourceHandlers, RoutePolicies, WriteEvent, WriteKind,
};
pub use host::ServerHost;
pub use resource_registry::{Resource, ResourceRegistry};
