use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A free-form metadata value. `UsageRecord.metadata` is a
/// `map<string, MetadataValue>` rather than raw `serde_json::Value` so
/// the set of shapes a producer can attach is explicit at the type
/// level, while still round-tripping through JSON transparently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<MetadataValue>),
    Object(BTreeMap<String, MetadataValue>),
}

pub type Metadata = BTreeMap<String, MetadataValue>;

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}
