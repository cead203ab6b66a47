use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub const FILENAME_KEY: &str = "filename";
pub const TYPE_KEY: &str = "type";

const UNKNOWN_FILENAME: &str = "Unknown";
const UNKNOWN_TYPE: &str = "unknown";

/// Scalar value attached to a document or chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Parses a loosely typed value as typed on a command line (`true`, `42`, `0.5`, `notes`).
    pub fn parse_loose(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(flag) = trimmed.parse::<bool>() {
            return MetadataValue::Bool(flag);
        }
        if let Ok(number) = trimmed.parse::<i64>() {
            return MetadataValue::Integer(number);
        }
        if let Ok(number) = trimmed.parse::<f64>() {
            return MetadataValue::Float(number);
        }
        MetadataValue::Text(trimmed.to_string())
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(value) => write!(f, "{value}"),
            MetadataValue::Integer(value) => write!(f, "{value}"),
            MetadataValue::Float(value) => write!(f, "{value}"),
            MetadataValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        MetadataValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Immutable metadata of a source document.
///
/// The map sits behind an `Arc`, so every chunk of a document shares one
/// allocation. There is no way to mutate it in place: `with` returns a new
/// value and leaves chunks that were already emitted untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentMetadata(Arc<BTreeMap<String, MetadataValue>>);

impl DocumentMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<MetadataValue>,
    {
        Self(Arc::new(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        ))
    }

    /// Returns a copy with `key` set to `value`.
    pub fn with(&self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        let mut map = self.0.as_ref().clone();
        map.insert(key.into(), value.into());
        Self(Arc::new(map))
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn filename(&self) -> &str {
        self.get(FILENAME_KEY)
            .and_then(MetadataValue::as_str)
            .unwrap_or(UNKNOWN_FILENAME)
    }

    pub fn doc_type(&self) -> &str {
        self.get(TYPE_KEY)
            .and_then(MetadataValue::as_str)
            .unwrap_or(UNKNOWN_TYPE)
    }
}

/// Exact-match predicate over chunk metadata fields. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(BTreeMap<String, MetadataValue>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_filename(filename: impl Into<String>) -> Self {
        let filename: String = filename.into();
        Self::new().with(FILENAME_KEY, filename)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

impl<K, V> FromIterator<(K, V)> for MetadataFilter
where
    K: Into<String>,
    V: Into<MetadataValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}
