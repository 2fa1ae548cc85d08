//! The raw query-string parameter bag

use indexmap::IndexMap;
use indexmap::map::Entry;

/// Value of one query-string key: repeated keys keep every value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    Many(Vec<String>),
}

impl ParamValue {
    /// First value, used where only one value makes sense (`page`, `sort`)
    pub fn first(&self) -> &str {
        match self {
            ParamValue::Single(v) => v,
            ParamValue::Many(values) => values.first().map(String::as_str).unwrap_or(""),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            ParamValue::Single(v) => vec![v.as_str()],
            ParamValue::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// Ordered, immutable mapping of query-string keys to values.
///
/// Keys such as `price[gte]` are stored verbatim; interpretation happens in
/// the query feature stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: IndexMap<String, ParamValue>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the bag from decoded `key=value` pairs, in order of appearance
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: IndexMap<String, ParamValue> = IndexMap::new();
        for (key, value) in pairs {
            let value = value.into();
            match entries.entry(key.into()) {
                Entry::Occupied(mut slot) => match slot.get_mut() {
                    ParamValue::Many(values) => values.push(value),
                    single @ ParamValue::Single(_) => {
                        let first = single.first().to_string();
                        *single = ParamValue::Many(vec![first, value]);
                    }
                },
                Entry::Vacant(slot) => {
                    slot.insert(ParamValue::Single(value));
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.get(key)
    }

    /// First value of `key`, if present
    pub fn first(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(ParamValue::first)
    }

    /// A new bag with `key` set to `value`, replacing any previous value
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(key.into(), ParamValue::Single(value.into()));
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
