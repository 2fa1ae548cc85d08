//! Field validators and filters used by schemas
//!
//! Validators check a value and return a message; filters transform a value
//! before it is validated and stored.

pub mod filters;
pub mod validators;

use serde_json::Value;
use std::sync::Arc;

/// Boxed validator stored on a schema field
pub type FieldValidator = Arc<dyn Fn(&str, &Value) -> Result<(), String> + Send + Sync>;

/// Boxed filter stored on a schema field
pub type FieldFilter = Arc<dyn Fn(&str, Value) -> anyhow::Result<Value> + Send + Sync>;
