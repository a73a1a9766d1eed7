// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::DEFAULT_KEY_FIELD;
use crate::record::Record;

/// Derives the correlation key of a record.
///
/// A record is keyed iff its key field holds a non-empty string. Missing,
/// empty or non-string values make it unkeyed, and it is passed through.
#[derive(Clone, Debug)]
pub struct KeyExtractor {
    field: String,
}

impl Default for KeyExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_FIELD)
    }
}

impl KeyExtractor {
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub fn extract<'a>(&self, record: &'a Record) -> Option<&'a str> {
        record.get_str(&self.field).filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    #[test]
    fn test_keyed_record() {
        let record: Record = [("traceId", "abc"), ("message", "hi")].into_iter().collect();
        assert_eq!(KeyExtractor::default().extract(&record), Some("abc"));
    }

    #[test]
    fn test_missing_or_empty_key_is_unkeyed() {
        let extractor = KeyExtractor::default();

        let missing: Record = [("message", "startup")].into_iter().collect();
        assert_eq!(extractor.extract(&missing), None);

        let empty: Record = [("traceId", ""), ("message", "startup")].into_iter().collect();
        assert_eq!(extractor.extract(&empty), None);
    }

    #[test]
    fn test_non_string_key_is_unkeyed() {
        let extractor = KeyExtractor::default();

        let mut record = Record::new();
        record.insert("traceId", 42);
        assert_eq!(extractor.extract(&record), None);

        record.insert("traceId", Value::Other(serde_json::Value::Null));
        assert_eq!(extractor.extract(&record), None);
    }

    #[test]
    fn test_custom_field() {
        let extractor = KeyExtractor::new("request_id");
        let record: Record = [("request_id", "r-1"), ("traceId", "t-1")].into_iter().collect();
        assert_eq!(extractor.extract(&record), Some("r-1"));
        assert_eq!(extractor.field(), "request_id");
    }
}
