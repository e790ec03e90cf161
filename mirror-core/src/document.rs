//! JSON document support: name-based field extraction, equality filters and
//! an in-memory collection that behaves like a remote document store.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, FetchError};
use crate::fetcher::Fetcher;
use crate::field::{FieldExtractor, FieldValue};

/// Field resolved by name on a JSON object.
///
/// Dotted names (`address.city`) descend into nested objects. Scalars are
/// stringified: strings verbatim, numbers and booleans by display, `null` as
/// the empty string. Arrays are multi-valued with each element stringified
/// the same way. Missing fields and object values are unresolvable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonField {
    name: String,
}

impl JsonField {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn lookup<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.name
            .split('.')
            .try_fold(document, |current, segment| current.as_object()?.get(segment))
    }
}

impl FieldExtractor<Value> for JsonField {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, document: &Value) -> Result<FieldValue, ConfigError> {
        let unresolvable = || ConfigError::UnresolvableField {
            field: self.name.clone(),
        };

        match self.lookup(document).ok_or_else(unresolvable)? {
            Value::Array(items) => items
                .iter()
                .map(stringify_scalar)
                .collect::<Option<Vec<_>>>()
                .map(FieldValue::Many)
                .ok_or_else(unresolvable),
            scalar => stringify_scalar(scalar)
                .map(FieldValue::One)
                .ok_or_else(unresolvable),
        }
    }
}

fn stringify_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Conjunction of field equality conditions, `{"region": "EU", ...}`.
///
/// An empty filter matches every document. Conditions use the same dotted
/// names as [`JsonField`]. A condition against an array field matches when
/// the array contains the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentFilter {
    conditions: BTreeMap<String, Value>,
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            match JsonField::new(field.as_str()).lookup(document) {
                Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
                Some(actual) => actual == expected,
                None => false,
            }
        })
    }
}

/// In-process document collection implementing [`Fetcher`].
///
/// Documents are returned in insertion order. The collection can be marked
/// unavailable to simulate an outage of the remote store.
#[derive(Debug)]
pub struct InMemoryCollection {
    name: String,
    documents: RwLock<Vec<Value>>,
    available: RwLock<bool>,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(Vec::new()),
            available: RwLock::new(true),
        }
    }

    /// Build a collection from a JSON array of documents.
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self, FetchError> {
        let documents: Vec<Value> =
            serde_json::from_str(json).map_err(|e| FetchError::decode(e.to_string()))?;
        let collection = Self::new(name);
        collection.replace_all(documents);
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&self, document: Value) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(document);
    }

    pub fn replace_all(&self, documents: Vec<Value>) {
        *self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner) = documents;
    }

    /// Remove every document matching `filter`, returning how many were removed.
    pub fn remove_where(&self, filter: &DocumentFilter) -> usize {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = documents.len();
        documents.retain(|doc| !filter.matches(doc));
        before - documents.len()
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_available(&self, available: bool) {
        *self
            .available
            .write()
            .unwrap_or_else(PoisonError::into_inner) = available;
    }
}

#[async_trait]
impl Fetcher for InMemoryCollection {
    type Record = Value;
    type Filter = DocumentFilter;

    async fn fetch(&self, filter: &DocumentFilter) -> Result<Vec<Value>, FetchError> {
        if !*self.available.read().unwrap_or_else(PoisonError::into_inner) {
            return Err(FetchError::unavailable(&self.name, "collection marked unavailable"));
        }

        let documents = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(documents
            .iter()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }
}
