// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tokio::time::Instant;

use crate::constants::MESSAGE_SEPARATOR;
use crate::record::Record;

/// Accumulating state for one correlation key.
///
/// Lives in the [`GroupStore`](crate::store::GroupStore) from its first record
/// until it is flushed or evicted; both paths remove it and turn it into a
/// combined record with [`Group::into_record`].
#[derive(Clone, Debug)]
pub struct Group {
    key: String,
    /// Messages in arrival order.
    pub messages: Vec<String>,
    /// Merged auxiliary fields, in first-seen order.
    pub fields: Record,
    pub created_at: Instant,
    pub last_updated_at: Instant,
    /// Number of records folded in so far.
    pub record_count: usize,
}

impl Group {
    #[must_use]
    pub fn new(key: impl Into<String>, now: Instant) -> Self {
        Self {
            key: key.into(),
            messages: Vec::new(),
            fields: Record::new(),
            created_at: now,
            last_updated_at: now,
            record_count: 0,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Builds the combined record: key first, then the joined message (when
    /// any record carried one), then the merged fields.
    #[must_use]
    pub fn into_record(self, key_field: &str, message_field: &str) -> Record {
        let mut record = Record::with_capacity(self.fields.len() + 2);
        record.insert(key_field, self.key);
        if !self.messages.is_empty() {
            record.insert(message_field, self.messages.join(MESSAGE_SEPARATOR));
        }
        for (name, value) in self.fields {
            record.insert(name, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    #[test]
    fn test_into_record_layout() {
        let mut group = Group::new("abc", Instant::now());
        group.messages.push("handler finished".to_string());
        group.messages.push("request completed".to_string());
        group.fields.insert("status", 200);
        group.fields.insert("latencyMs", 52);

        let record = group.into_record("traceId", "message");

        assert_eq!(
            record.to_json().unwrap(),
            r#"{"traceId":"abc","message":"handler finished\nrequest completed","status":200,"latencyMs":52}"#
        );
    }

    #[test]
    fn test_into_record_without_messages() {
        let mut group = Group::new("abc", Instant::now());
        group.fields.insert("status", 500);

        let record = group.into_record("traceId", "message");

        assert!(!record.contains_key("message"));
        assert_eq!(record.get("status"), Some(&Value::Int(500)));
        assert_eq!(record.get_str("traceId"), Some("abc"));
    }
}
