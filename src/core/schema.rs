//! Document schemas
//!
//! A [`Schema`] declares the fields a collection accepts, how raw JSON input
//! is coerced into each field's type, which filters and validators run, and
//! which indexes must stay unique. Models run every write through
//! [`Schema::prepare_insert`] or [`Schema::prepare_update`] and every filter
//! through [`Schema::cast_predicate`].

use crate::core::document::{
    CREATED_AT_FIELD, Document, ID_FIELD, VERSION_FIELD, display_value, is_valid_id, new_id,
    now_timestamp,
};
use crate::core::error::{FieldValidationError, ValidationError};
use crate::core::query::{Predicate, SortSpec};
use crate::core::validation::{FieldFilter, FieldValidator, filters};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::Arc;

/// Storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    /// RFC 3339 timestamp, stored normalized to UTC
    Date,
    /// Reference to another document's `_id`
    ObjectId,
    /// GeoJSON point: `{type: "Point", coordinates: [lng, lat], ..}`
    GeoPoint,
    /// Free-form JSON object
    Object,
}

impl FieldKind {
    fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "Number",
            FieldKind::Boolean => "Boolean",
            FieldKind::Date => "date",
            FieldKind::ObjectId => "ObjectId",
            FieldKind::GeoPoint => "Point",
            FieldKind::Object => "Object",
        }
    }

    /// Convert a raw JSON value into this kind. `None` when impossible.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (FieldKind::String, Value::String(s)) => Some(Value::String(s)),
            (FieldKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (FieldKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (FieldKind::Number, Value::Number(n)) => Some(Value::Number(n)),
            (FieldKind::Number, Value::String(s)) => parse_number(&s),
            (FieldKind::Boolean, Value::Bool(b)) => Some(Value::Bool(b)),
            (FieldKind::Boolean, Value::String(s)) => match s.trim() {
                "true" | "1" | "yes" => Some(Value::Bool(true)),
                "false" | "0" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            (FieldKind::Boolean, Value::Number(n)) => match n.as_f64() {
                Some(v) if v == 1.0 => Some(Value::Bool(true)),
                Some(v) if v == 0.0 => Some(Value::Bool(false)),
                _ => None,
            },
            (FieldKind::Date, Value::String(s)) => parse_date(&s).map(Value::String),
            (FieldKind::Date, Value::Number(n)) => n
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))),
            (FieldKind::ObjectId, Value::String(s)) if is_valid_id(s.trim()) => {
                Some(Value::String(s.trim().to_lowercase()))
            }
            (FieldKind::ObjectId, Value::Object(map)) => match map.get(ID_FIELD) {
                Some(Value::String(id)) if is_valid_id(id) => Some(Value::String(id.clone())),
                _ => None,
            },
            (FieldKind::GeoPoint, Value::Object(map)) => coerce_point(map),
            (FieldKind::Object, Value::Object(map)) => Some(Value::Object(map)),
            _ => None,
        }
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::from(int));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn parse_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let utc = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        dt.with_timezone(&Utc)
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        dt.and_utc()
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        dt.and_utc()
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)?.and_utc()
    } else {
        return None;
    };
    Some(utc.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn coerce_point(mut map: Map<String, Value>) -> Option<Value> {
    let coordinates = match map.get("coordinates") {
        Some(Value::Array(items)) if items.len() == 2 => items
            .iter()
            .map(|c| match c {
                Value::Number(_) => Some(c.clone()),
                Value::String(s) => parse_number(s),
                _ => None,
            })
            .collect::<Option<Vec<Value>>>()?,
        _ => return None,
    };
    match map.get("type") {
        None => {
            map.insert("type".to_string(), Value::String("Point".to_string()));
        }
        Some(Value::String(t)) if t == "Point" => {}
        _ => return None,
    }
    map.insert("coordinates".to_string(), Value::Array(coordinates));
    Some(Value::Object(map))
}

/// Default applied when a field is absent on insert
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Value(Value),
    /// Current timestamp
    Now,
}

/// Declaration of one field
#[derive(Clone)]
pub struct FieldDef {
    name: String,
    kind: FieldKind,
    array: bool,
    required: Option<String>,
    default: Option<DefaultValue>,
    filters: Vec<FieldFilter>,
    validators: Vec<FieldValidator>,
    unique: bool,
    hidden: bool,
    transient: bool,
    must_equal: Option<(String, String)>,
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("array", &self.array)
            .field("required", &self.required)
            .field("unique", &self.unique)
            .field("hidden", &self.hidden)
            .field("transient", &self.transient)
            .finish_non_exhaustive()
    }
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            array: false,
            required: None,
            default: None,
            filters: Vec::new(),
            validators: Vec::new(),
            unique: false,
            hidden: false,
            transient: false,
            must_equal: None,
        }
    }

    /// A field holding a list of `kind` values
    pub fn array(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            array: true,
            ..Self::new(name, kind)
        }
    }

    pub fn required(mut self, message: impl Into<String>) -> Self {
        self.required = Some(message.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_now(mut self) -> Self {
        self.default = Some(DefaultValue::Now);
        self
    }

    pub fn set<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str, Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn trim(self) -> Self {
        self.set(filters::trim())
    }

    pub fn lowercase(self) -> Self {
        self.set(filters::lowercase())
    }

    pub fn validate<V>(mut self, validator: V) -> Self
    where
        V: Fn(&str, &Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Backed by a unique index
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Stored but never returned
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Validated on input, never stored
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Must equal another field of the same payload
    pub fn must_equal(mut self, other: impl Into<String>, message: impl Into<String>) -> Self {
        self.must_equal = Some((other.into(), message.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn cast_failure(&self, value: &Value) -> FieldValidationError {
        let kind = if self.array {
            format!("[{}]", self.kind.name())
        } else {
            self.kind.name().to_string()
        };
        FieldValidationError::new(
            &self.name,
            format!(
                "Cast to {} failed for value \"{}\" at path \"{}\"",
                kind,
                display_value(value),
                self.name
            ),
        )
    }

    /// Coerce then filter a raw input value
    fn cast(&self, value: Value) -> Result<Value, FieldValidationError> {
        let coerced = if self.array {
            let items = match value {
                Value::Array(items) => items,
                Value::Null => return Ok(Value::Null),
                single => vec![single],
            };
            items
                .into_iter()
                .map(|item| self.kind.coerce(item.clone()).ok_or(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
                .map_err(|item| self.cast_failure(&item))?
        } else {
            self.kind
                .coerce(value.clone())
                .ok_or_else(|| self.cast_failure(&value))?
        };
        self.filters.iter().try_fold(coerced, |value, filter| {
            filter(&self.name, value)
                .map_err(|e| FieldValidationError::new(&self.name, e.to_string()))
        })
    }

    fn is_missing(value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            _ => false,
        }
    }

    fn check(&self, value: Option<&Value>, errors: &mut Vec<FieldValidationError>) {
        if Self::is_missing(value) {
            if let Some(message) = &self.required {
                errors.push(FieldValidationError::new(&self.name, message.clone()));
            }
            return;
        }
        let Some(value) = value else { return };
        let targets: Vec<&Value> = match (self.array, value) {
            (true, Value::Array(items)) => items.iter().collect(),
            _ => vec![value],
        };
        for validator in &self.validators {
            if let Some(message) = targets.iter().find_map(|v| validator(&self.name, v).err()) {
                errors.push(FieldValidationError::new(&self.name, message));
            }
        }
    }
}

/// Whole-document rule run on insert
pub type DocumentCheck = Arc<dyn Fn(&Document) -> Result<(), FieldValidationError> + Send + Sync>;

/// Field declarations and indexes of a collection
#[derive(Clone, Default)]
pub struct Schema {
    fields: IndexMap<String, FieldDef>,
    timestamps: bool,
    unique_together: Vec<Vec<String>>,
    checks: Vec<DocumentCheck>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("fields", &self.fields.values().collect::<Vec<_>>())
            .field("timestamps", &self.timestamps)
            .field("unique_together", &self.unique_together)
            .finish_non_exhaustive()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, def: FieldDef) -> Self {
        self.fields.insert(def.name.clone(), def);
        self
    }

    /// Stamp `createdAt` on insert
    pub fn with_created_at(mut self) -> Self {
        self.timestamps = true;
        self
    }

    /// Compound unique index
    pub fn unique_together<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.unique_together
            .push(fields.iter().map(|f| f.as_ref().to_string()).collect());
        self
    }

    pub fn check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Document) -> Result<(), FieldValidationError> + Send + Sync + 'static,
    {
        self.checks.push(Arc::new(check));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// Every index that must hold unique values, single fields first
    pub fn unique_indexes(&self) -> Vec<Vec<String>> {
        self.fields
            .values()
            .filter(|f| f.unique)
            .map(|f| vec![f.name.clone()])
            .chain(self.unique_together.iter().cloned())
            .collect()
    }

    /// Remove fields that are never returned to callers
    pub fn strip_hidden(&self, mut doc: Document) -> Document {
        for def in self.fields.values().filter(|f| f.hidden) {
            doc.remove(&def.name);
        }
        doc
    }

    fn payload_object(payload: Value) -> Result<Map<String, Value>, ValidationError> {
        match payload {
            Value::Object(map) => Ok(map),
            other => Err(ValidationError::InvalidJson {
                message: format!("expected a JSON object, got {}", other),
            }),
        }
    }

    /// Cast known fields of a payload; unknown and server-managed keys are dropped
    fn cast_payload(
        &self,
        payload: Map<String, Value>,
        errors: &mut Vec<FieldValidationError>,
    ) -> Document {
        let mut cast = Document::new();
        for (key, value) in payload {
            let Some(def) = self.fields.get(&key) else {
                continue;
            };
            match def.cast(value) {
                Ok(value) => {
                    cast.insert(key, value);
                }
                Err(e) => errors.push(e),
            }
        }
        cast
    }

    fn check_equalities(&self, doc: &Document, errors: &mut Vec<FieldValidationError>) {
        for def in self.fields.values() {
            if let Some((other, message)) = &def.must_equal
                && let Some(value) = doc.get(&def.name)
                && doc.get(other) != Some(value)
            {
                errors.push(FieldValidationError::new(&def.name, message.clone()));
            }
        }
    }

    fn drop_transient(&self, doc: &mut Document) {
        for def in self.fields.values().filter(|f| f.transient) {
            doc.remove(&def.name);
        }
    }

    /// Turn a create payload into a complete, valid document with `_id`,
    /// `createdAt` (when declared) and `__v = 0`.
    pub fn prepare_insert(&self, payload: Value) -> Result<Document, ValidationError> {
        let mut errors = Vec::new();
        let mut cast = self.cast_payload(Self::payload_object(payload)?, &mut errors);

        for def in self.fields.values() {
            if FieldDef::is_missing(cast.get(&def.name)) {
                match &def.default {
                    Some(DefaultValue::Value(v)) => {
                        cast.insert(def.name.clone(), v.clone());
                    }
                    Some(DefaultValue::Now) => {
                        cast.insert(def.name.clone(), Value::String(now_timestamp()));
                    }
                    None => {}
                }
            }
            def.check(cast.get(&def.name), &mut errors);
        }
        self.check_equalities(&cast, &mut errors);
        if errors.is_empty() {
            for check in &self.checks {
                if let Err(e) = check(&cast) {
                    errors.push(e);
                }
            }
        }
        if !errors.is_empty() {
            return Err(ValidationError::FieldErrors(errors));
        }
        self.drop_transient(&mut cast);

        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_string(), Value::String(new_id()));
        for def in self.fields.values() {
            if let Some(value) = cast.remove(&def.name) {
                doc.insert(def.name.clone(), value);
            }
        }
        if self.timestamps {
            doc.insert(CREATED_AT_FIELD.to_string(), Value::String(now_timestamp()));
        }
        doc.insert(VERSION_FIELD.to_string(), Value::from(0));
        Ok(doc)
    }

    /// Turn an update payload into a `$set`-style patch.
    ///
    /// Filters always run; validators only when `run_validators` is set, and
    /// only on the fields present in the payload.
    pub fn prepare_update(
        &self,
        payload: Value,
        run_validators: bool,
    ) -> Result<Document, ValidationError> {
        let mut errors = Vec::new();
        let mut patch = self.cast_payload(Self::payload_object(payload)?, &mut errors);
        if run_validators {
            for (name, value) in &patch {
                if let Some(def) = self.fields.get(name) {
                    def.check(Some(value), &mut errors);
                }
            }
            self.check_equalities(&patch, &mut errors);
        }
        if !errors.is_empty() {
            return Err(ValidationError::FieldErrors(errors));
        }
        self.drop_transient(&mut patch);
        Ok(patch)
    }

    fn filter_kind(&self, field: &str) -> Option<FieldKind> {
        match field {
            ID_FIELD => Some(FieldKind::ObjectId),
            CREATED_AT_FIELD if self.timestamps => Some(FieldKind::Date),
            VERSION_FIELD => Some(FieldKind::Number),
            _ => self.fields.get(field).map(|def| def.kind),
        }
    }

    /// Hidden fields never take part in a query
    fn queryable(&self, field: &str) -> Result<(), ValidationError> {
        match self.fields.get(field) {
            Some(def) if def.hidden => Err(ValidationError::param(
                field,
                format!("Invalid query field: {field}."),
            )),
            _ => Ok(()),
        }
    }

    /// Coerce filter values to the types of the fields they target.
    ///
    /// Unknown fields are left untouched; values that cannot be converted
    /// fail with a cast error naming the field. Constraints on hidden fields
    /// are rejected.
    pub fn cast_predicate(&self, predicate: Predicate) -> Result<Predicate, ValidationError> {
        predicate.try_map_values(|field, value| {
            self.queryable(field)?;
            match self.filter_kind(field) {
                None | Some(FieldKind::GeoPoint) | Some(FieldKind::Object) => Ok(value),
                Some(kind) => kind
                    .coerce(value.clone())
                    .ok_or_else(|| ValidationError::cast(field, display_value(&value))),
            }
        })
    }

    /// Reject sort keys on hidden fields
    pub fn check_sort(&self, sort: &SortSpec) -> Result<(), ValidationError> {
        sort.fields()
            .iter()
            .try_for_each(|key| self.queryable(&key.field))
    }
}
