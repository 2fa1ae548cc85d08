//! Query feature stages: filter, sort, field projection and pagination
//!
//! Each stage takes a [`QueryDescriptor`] by value and returns a new one, so
//! stages can be applied individually or chained through
//! [`ApiFeatures::build`], which runs them in the fixed order
//! filter → sort → limit_fields → paginate.
//!
//! ```rust,ignore
//! let params = QueryParams::from_pairs(vec![("price[gte]", "500"), ("sort", "-price")]);
//! let descriptor = ApiFeatures::new(&params).build(Predicate::all());
//! assert_eq!(descriptor.sort.fields()[0].field, "price");
//! ```

use super::params::{ParamValue, QueryParams};
use super::predicate::{ComparisonOp, Condition, Predicate};
use crate::core::document::{Document, ID_FIELD, VERSION_FIELD};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// Keys that drive stages instead of filtering
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

/// Ordered list of sort keys, earlier keys take precedence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    fields: Vec<SortField>,
}

impl SortSpec {
    /// Parse `a,-b`: a leading `-` means descending
    pub fn parse(spec: &str) -> Self {
        let fields = spec
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty() && *f != "-")
            .map(|f| match f.strip_prefix('-') {
                Some(name) => SortField {
                    field: name.to_string(),
                    direction: SortDirection::Descending,
                },
                None => SortField {
                    field: f.to_string(),
                    direction: SortDirection::Ascending,
                },
            })
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Which fields a query returns. `_id` is always kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Only these fields
    Include(Vec<String>),
    /// Everything except these fields
    Exclude(Vec<String>),
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Exclude(vec![VERSION_FIELD.to_string()])
    }
}

impl Projection {
    /// Parse `a,b` (inclusion) or `-a,-b` (exclusion)
    pub fn parse(spec: &str) -> Option<Self> {
        let fields: Vec<&str> = spec
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect();
        if fields.is_empty() {
            return None;
        }
        if fields.iter().all(|f| f.starts_with('-')) {
            Some(Projection::Exclude(
                fields.iter().map(|f| f[1..].to_string()).collect(),
            ))
        } else {
            Some(Projection::Include(
                fields
                    .iter()
                    .filter(|f| !f.starts_with('-'))
                    .map(|f| f.to_string())
                    .collect(),
            ))
        }
    }

    pub fn include<S: AsRef<str>>(fields: &[S]) -> Self {
        Projection::Include(fields.iter().map(|f| f.as_ref().to_string()).collect())
    }

    pub fn exclude<S: AsRef<str>>(fields: &[S]) -> Self {
        Projection::Exclude(fields.iter().map(|f| f.as_ref().to_string()).collect())
    }

    /// Apply the projection to a document
    pub fn apply(&self, mut doc: Document) -> Document {
        let root = |path: &str| path.split('.').next().unwrap_or(path).to_string();
        match self {
            Projection::Include(fields) => {
                let keep: Vec<String> = fields.iter().map(|f| root(f)).collect();
                doc.retain(|key, _| key == ID_FIELD || keep.iter().any(|k| k == key));
                doc
            }
            Projection::Exclude(fields) => {
                for field in fields {
                    if field != ID_FIELD {
                        doc.remove(field.as_str());
                    }
                }
                doc
            }
        }
    }
}

/// Page number and page size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    /// Number of documents to skip
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// Fully structured query, ready for a storage backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDescriptor {
    pub predicate: Predicate,
    pub sort: SortSpec,
    pub projection: Projection,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl QueryDescriptor {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            ..Default::default()
        }
    }
}

/// Fallback values for the sort and paginate stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryDefaults {
    pub page: u64,
    pub limit: u64,
    pub sort: String,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 100,
            sort: "-createdAt".to_string(),
        }
    }
}

/// Translates a [`QueryParams`] bag into a [`QueryDescriptor`]
#[derive(Debug, Clone)]
pub struct ApiFeatures<'a> {
    params: &'a QueryParams,
    defaults: QueryDefaults,
}

impl<'a> ApiFeatures<'a> {
    pub fn new(params: &'a QueryParams) -> Self {
        Self {
            params,
            defaults: QueryDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: QueryDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Run all stages in order, starting from `base`
    pub fn build(&self, base: Predicate) -> QueryDescriptor {
        let descriptor = QueryDescriptor::new(base);
        let descriptor = self.filter(descriptor);
        let descriptor = self.sort(descriptor);
        let descriptor = self.limit_fields(descriptor);
        self.paginate(descriptor)
    }

    /// Conjoin one constraint per non-reserved key with the existing predicate
    pub fn filter(&self, mut descriptor: QueryDescriptor) -> QueryDescriptor {
        let mut predicate = Predicate::all();
        for (key, value) in self.params.iter() {
            if RESERVED_KEYS.contains(&key) {
                continue;
            }
            let (field, op) = split_operator(key);
            let condition = match (op, value) {
                (Some(op), value) => {
                    Condition::Compare(op, Value::String(value.first().to_string()))
                }
                (None, ParamValue::Single(v)) => Condition::Eq(Value::String(v.clone())),
                (None, ParamValue::Many(values)) => Condition::In(
                    values.iter().map(|v| Value::String(v.clone())).collect(),
                ),
            };
            predicate = predicate.with(field, condition);
        }
        descriptor.predicate = descriptor.predicate.and(predicate);
        descriptor
    }

    /// Apply `sort`, or the default sort when absent
    pub fn sort(&self, mut descriptor: QueryDescriptor) -> QueryDescriptor {
        let requested = self
            .params
            .first("sort")
            .map(SortSpec::parse)
            .filter(|spec| !spec.is_empty());
        descriptor.sort = requested.unwrap_or_else(|| SortSpec::parse(&self.defaults.sort));
        descriptor
    }

    /// Apply `fields`, or exclude the version field when absent
    pub fn limit_fields(&self, mut descriptor: QueryDescriptor) -> QueryDescriptor {
        descriptor.projection = self
            .params
            .first("fields")
            .and_then(Projection::parse)
            .unwrap_or_default();
        descriptor
    }

    /// Apply `page`/`limit`. Malformed or non-positive values use the defaults.
    pub fn paginate(&self, mut descriptor: QueryDescriptor) -> QueryDescriptor {
        let pagination = self.pagination();
        descriptor.skip = pagination.offset();
        descriptor.limit = Some(pagination.limit);
        descriptor
    }

    /// Resolved page and page size
    pub fn pagination(&self) -> Pagination {
        let positive = |key: &str, default: u64| {
            self.params
                .first(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };
        Pagination {
            page: positive("page", self.defaults.page.max(1)),
            limit: positive("limit", self.defaults.limit.max(1)),
        }
    }
}

static OPERATOR_KEY: OnceLock<Regex> = OnceLock::new();

/// Split `price[gte]` into (`price`, Gte). Unknown operators keep the literal key.
fn split_operator(key: &str) -> (&str, Option<ComparisonOp>) {
    let pattern = OPERATOR_KEY
        .get_or_init(|| Regex::new(r"^(.+)\[(gte|gt|lte|lt)\]$").expect("operator key pattern"));
    let Some(caps) = pattern.captures(key) else {
        return (key, None);
    };
    let op = caps.get(2).and_then(|op| ComparisonOp::parse(op.as_str()));
    match (caps.get(1), op) {
        (Some(field), Some(op)) => (field.as_str(), Some(op)),
        _ => (key, None),
    }
}
