// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structured log record model.
//!
//! A [`Record`] is an insertion-ordered mapping from field name to [`Value`].
//! Field order is kept through parsing, merging and serialization so combined
//! records read the same way the input lines did.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A single field value.
///
/// Scalars get their own variant so merge strategies can reason about them;
/// anything else (null, arrays, nested objects) is carried as-is in
/// [`Value::Other`] so no input is lost.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    /// Integers above `i64::MAX`, such as 64-bit span ids.
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
    Other(serde_json::Value),
}

impl Value {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used by the arithmetic merge strategies.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Some(*i as f64),
            #[allow(clippy::cast_precision_loss)]
            Value::UInt(u) => Some(*u as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Exact view of either integer variant.
    #[must_use]
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(i128::from(*i)),
            Value::UInt(u) => Some(i128::from(*u)),
            _ => None,
        }
    }

    /// Narrows an integer back into `Int` or `UInt`, saturating at the
    /// bounds of the two.
    #[must_use]
    pub fn from_i128(v: i128) -> Value {
        if let Ok(i) = i64::try_from(v) {
            Value::Int(i)
        } else if let Ok(u) = u64::try_from(v) {
            Value::UInt(u)
        } else if v < 0 {
            Value::Int(i64::MIN)
        } else {
            Value::UInt(u64::MAX)
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => f.write_str(s),
            Value::Other(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Value::UInt(v), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// One structured log event: ordered field name to value mapping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets `name` to `value`. An existing field keeps its position and its
    /// previous value is returned.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();
        match self.get_mut(&name) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((name, value));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(k, _)| k == name)?;
        Some(self.fields.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serializes the record as a single JSON object.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
        let mut record = Record::with_capacity(access.size_hint().unwrap_or(8));
        // Duplicate keys: last one wins, like most JSON decoders.
        while let Some((k, v)) = access.next_entry::<String, Value>()? {
            record.insert(k, v);
        }
        Ok(record)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_position_on_overwrite() {
        let mut record = Record::new();
        record.insert("traceId", "abc");
        record.insert("status", 200);
        record.insert("message", "hello");

        let previous = record.insert("status", 500);

        assert_eq!(previous, Some(Value::Int(200)));
        let names: Vec<&str> = record.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["traceId", "status", "message"]);
        assert_eq!(record.get("status"), Some(&Value::Int(500)));
    }

    #[test]
    fn test_remove() {
        let mut record: Record = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(record.remove("a"), Some(Value::Int(1)));
        assert_eq!(record.remove("a"), None);
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_deserialize_preserves_order_and_types() {
        let record: Record = serde_json::from_str(
            r#"{"traceId":"abc","status":200,"ratio":0.5,"ok":true,"extra":null,"tags":["a"]}"#,
        )
        .unwrap();

        let names: Vec<&str> = record.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["traceId", "status", "ratio", "ok", "extra", "tags"]);
        assert_eq!(record.get("traceId"), Some(&Value::Str("abc".into())));
        assert_eq!(record.get("status"), Some(&Value::Int(200)));
        assert_eq!(record.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(record.get("ok"), Some(&Value::Bool(true)));
        assert_eq!(record.get("extra"), Some(&Value::Other(serde_json::Value::Null)));
        assert_eq!(
            record.get("tags"),
            Some(&Value::Other(serde_json::json!(["a"])))
        );
    }

    #[test]
    fn test_serialize_is_lossless() {
        let input = r#"{"traceId":"abc","status":200,"latencyMs":52,"nested":{"k":"v"}}"#;
        let record: Record = serde_json::from_str(input).unwrap();
        assert_eq!(record.to_json().unwrap(), input);
    }

    #[test]
    fn test_large_unsigned_integers_are_exact() {
        let input = r#"{"traceId":"","spanId":18446744073709551615,"parentId":9223372036854775808,"offset":-3}"#;
        let record: Record = serde_json::from_str(input).unwrap();

        assert_eq!(record.get("spanId"), Some(&Value::UInt(u64::MAX)));
        assert_eq!(record.get("parentId"), Some(&Value::UInt(1 << 63)));
        assert_eq!(record.get("offset"), Some(&Value::Int(-3)));
        assert_eq!(record.to_json().unwrap(), input);
    }

    #[test]
    fn test_integer_narrowing() {
        assert_eq!(Value::from_i128(42), Value::Int(42));
        assert_eq!(Value::from_i128(i128::from(u64::MAX)), Value::UInt(u64::MAX));
        assert_eq!(Value::from_i128(i128::from(u64::MAX) + 1), Value::UInt(u64::MAX));
        assert_eq!(Value::from_i128(i128::from(i64::MIN) - 1), Value::Int(i64::MIN));
        assert_eq!(Value::from(7u64), Value::Int(7));
        assert_eq!(Value::UInt(u64::MAX).as_i128(), Some(i128::from(u64::MAX)));
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let record: Record = serde_json::from_str(r#"{"a":1,"b":2,"a":3}"#).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::from("x").to_string(), "x");
        assert_eq!(Value::Int(-4).to_string(), "-4");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Other(serde_json::json!({"a": 1})).to_string(), r#"{"a":1}"#);
    }
}
