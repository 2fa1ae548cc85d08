//! Query Feature Builder
//!
//! Turns a raw query-string parameter bag into a structured
//! [`QueryDescriptor`]: a filter predicate with comparison operators, a sort
//! chain, a field projection and a page window.

pub mod features;
pub mod params;
pub mod predicate;

pub use features::{
    ApiFeatures, Pagination, Projection, QueryDefaults, QueryDescriptor, RESERVED_KEYS,
    SortDirection, SortField, SortSpec,
};
pub use params::{ParamValue, QueryParams};
pub use predicate::{ComparisonOp, Condition, Constraint, Predicate};
