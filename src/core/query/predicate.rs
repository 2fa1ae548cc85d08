//! Structured filter predicates

use crate::core::document::{Document, compare_values, get_path};
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison operators accepted in `field[op]=value` query keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Gte,
    Gt,
    Lte,
    Lt,
}

impl ComparisonOp {
    /// Parse the bracketed operator of a query key
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "gte" => Some(ComparisonOp::Gte),
            "gt" => Some(ComparisonOp::Gt),
            "lte" => Some(ComparisonOp::Lte),
            "lt" => Some(ComparisonOp::Lt),
            _ => None,
        }
    }

    /// Native operator name used by document stores
    pub fn operator(&self) -> &'static str {
        match self {
            ComparisonOp::Gte => "$gte",
            ComparisonOp::Gt => "$gt",
            ComparisonOp::Lte => "$lte",
            ComparisonOp::Lt => "$lt",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Gte => ordering != Ordering::Less,
            ComparisonOp::Gt => ordering == Ordering::Greater,
            ComparisonOp::Lte => ordering != Ordering::Greater,
            ComparisonOp::Lt => ordering == Ordering::Less,
        }
    }
}

/// What a single field must satisfy
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Exact match (an array field matches if any element matches)
    Eq(Value),
    /// Matches any of the listed values
    In(Vec<Value>),
    /// Does not match (missing fields satisfy it)
    Ne(Value),
    /// Ordered comparison against a value of the same kind
    Compare(ComparisonOp, Value),
}

/// A condition bound to a field path
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub field: String,
    pub condition: Condition,
}

/// Conjunction of field constraints. An empty predicate matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    constraints: Vec<Constraint>,
}

impl Predicate {
    /// Predicate matching every document
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().with(field, Condition::Eq(value.into()))
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().with(field, Condition::Ne(value.into()))
    }

    pub fn compare(field: impl Into<String>, op: ComparisonOp, value: impl Into<Value>) -> Self {
        Self::all().with(field, Condition::Compare(op, value.into()))
    }

    pub fn any_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::all().with(field, Condition::In(values))
    }

    /// Add one more constraint
    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.constraints.push(Constraint {
            field: field.into(),
            condition,
        });
        self
    }

    /// Conjoin two predicates
    pub fn and(mut self, other: Predicate) -> Self {
        self.constraints.extend(other.constraints);
        self
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn is_match_all(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Rewrite every constraint value, e.g. to coerce it to the field's type
    pub fn try_map_values<E>(
        self,
        mut f: impl FnMut(&str, Value) -> Result<Value, E>,
    ) -> Result<Self, E> {
        let mut constraints = Vec::with_capacity(self.constraints.len());
        for Constraint { field, condition } in self.constraints {
            let condition = match condition {
                Condition::Eq(v) => Condition::Eq(f(&field, v)?),
                Condition::Ne(v) => Condition::Ne(f(&field, v)?),
                Condition::Compare(op, v) => Condition::Compare(op, f(&field, v)?),
                Condition::In(values) => Condition::In(
                    values
                        .into_iter()
                        .map(|v| f(&field, v))
                        .collect::<Result<_, _>>()?,
                ),
            };
            constraints.push(Constraint { field, condition });
        }
        Ok(Self { constraints })
    }

    /// Evaluate the predicate against a document
    pub fn matches(&self, doc: &Document) -> bool {
        self.constraints.iter().all(|c| {
            let actual = get_path(doc, &c.field);
            match &c.condition {
                Condition::Eq(expected) => field_equals(actual, expected),
                Condition::Ne(expected) => !field_equals(actual, expected),
                Condition::In(values) => values.iter().any(|v| field_equals(actual, v)),
                Condition::Compare(op, bound) => field_compares(actual, *op, bound),
            }
        })
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn field_equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

fn comparable(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_))
    )
}

fn field_compares(actual: Option<&Value>, op: ComparisonOp, bound: &Value) -> bool {
    let check = |value: &Value| {
        comparable(value, bound) && op.holds(compare_values(Some(value), Some(bound)))
    };
    match actual {
        Some(Value::Array(items)) => items.iter().any(check),
        Some(value) => check(value),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_empty_predicate_matches_everything() {
        assert!(Predicate::all().matches(&doc(json!({"a": 1}))));
        assert!(Predicate::all().is_match_all());
    }

    #[test]
    fn test_comparison_bounds() {
        let cheap = Predicate::compare("price", ComparisonOp::Lt, 500);
        assert!(cheap.matches(&doc(json!({"price": 497}))));
        assert!(!cheap.matches(&doc(json!({"price": 500}))));

        let at_least = Predicate::compare("price", ComparisonOp::Gte, 500);
        assert!(at_least.matches(&doc(json!({"price": 500}))));
        assert!(!at_least.matches(&doc(json!({"name": "no price"}))));
    }

    #[test]
    fn test_comparison_ignores_other_kinds() {
        let p = Predicate::compare("price", ComparisonOp::Gte, 5);
        assert!(!p.matches(&doc(json!({"price": "997"}))));
    }

    #[test]
    fn test_eq_matches_array_elements() {
        let p = Predicate::eq("guides", "g1");
        assert!(p.matches(&doc(json!({"guides": ["g0", "g1"]}))));
        assert!(!p.matches(&doc(json!({"guides": []}))));
    }

    #[test]
    fn test_ne_matches_missing_field() {
        let p = Predicate::ne("active", false);
        assert!(p.matches(&doc(json!({"name": "x"}))));
        assert!(p.matches(&doc(json!({"active": true}))));
        assert!(!p.matches(&doc(json!({"active": false}))));
    }

    #[test]
    fn test_in_and_conjunction() {
        let p = Predicate::any_of("difficulty", vec![json!("easy"), json!("medium")])
            .and(Predicate::compare("duration", ComparisonOp::Gte, 5));
        assert!(p.matches(&doc(json!({"difficulty": "easy", "duration": 5}))));
        assert!(!p.matches(&doc(json!({"difficulty": "difficult", "duration": 9}))));
        assert!(!p.matches(&doc(json!({"difficulty": "medium", "duration": 4}))));
    }

    #[test]
    fn test_try_map_values_rewrites_every_condition() {
        let p = Predicate::eq("price", "397").and(Predicate::any_of("duration", vec![json!("5")]));
        let mapped = p
            .try_map_values::<()>(|_, v| Ok(json!(v.as_str().unwrap().parse::<i64>().unwrap())))
            .unwrap();
        assert!(mapped.matches(&doc(json!({"price": 397, "duration": 5}))));
    }
}
