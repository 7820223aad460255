use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::naming::Naming;

/// Record is one row of data: a JSON object keyed by column name.
/// A key that is absent reads as null.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create a new empty record
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Create from a JSON Value; only objects are records
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> serde_json::map::Iter<'_> {
        self.0.iter()
    }

    // --- getters ---
    pub fn get(&self, k: &str) -> Option<&Value> {
        self.0.get(k)
    }

    pub fn get_str(&self, k: &str) -> Option<&str> {
        self.0.get(k)?.as_str()
    }

    pub fn get_i64(&self, k: &str) -> Option<i64> {
        self.0.get(k)?.as_i64()
    }

    pub fn get_f64(&self, k: &str) -> Option<f64> {
        self.0.get(k)?.as_f64()
    }

    pub fn get_bool(&self, k: &str) -> Option<bool> {
        self.0.get(k)?.as_bool()
    }

    // --- setters ---
    pub fn set(&mut self, k: impl Into<String>, v: impl Into<Value>) {
        self.0.insert(k.into(), v.into());
    }

    #[must_use]
    pub fn with(mut self, k: impl Into<String>, v: impl Into<Value>) -> Self {
        self.set(k, v);
        self
    }

    pub fn set_null(&mut self, k: impl Into<String>) {
        self.0.insert(k.into(), Value::Null);
    }

    pub fn remove(&mut self, k: &str) -> Option<Value> {
        self.0.remove(k)
    }

    /// Renames every key through `naming`. When two keys collapse onto the
    /// same identifier the later one wins.
    #[must_use]
    pub fn normalize_keys(self, naming: &Naming) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|(k, v)| (naming.normalize_identifier(&k), v))
                .collect(),
        )
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
