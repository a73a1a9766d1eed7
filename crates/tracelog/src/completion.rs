// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use regex::Regex;

use crate::constants::{DEFAULT_MESSAGE_FIELD, DEFAULT_TERMINAL_MARKER};
use crate::errors::ConfigError;
use crate::record::Record;

/// Decides whether a record closes its group.
///
/// Evaluated on the triggering record only, never on the accumulated group.
#[derive(Clone, Debug)]
pub enum CompletionDetector {
    /// Case-sensitive substring match on the message.
    Marker {
        message_field: String,
        marker: String,
    },
    /// Regular expression match on the message.
    Pattern {
        message_field: String,
        pattern: Regex,
    },
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::marker(DEFAULT_MESSAGE_FIELD, DEFAULT_TERMINAL_MARKER)
    }
}

impl CompletionDetector {
    #[must_use]
    pub fn marker(message_field: impl Into<String>, marker: impl Into<String>) -> Self {
        CompletionDetector::Marker {
            message_field: message_field.into(),
            marker: marker.into(),
        }
    }

    pub fn pattern(message_field: impl Into<String>, pattern: &str) -> Result<Self, ConfigError> {
        Ok(CompletionDetector::Pattern {
            message_field: message_field.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    /// A record without a string message is never terminal.
    #[must_use]
    pub fn is_complete(&self, record: &Record) -> bool {
        match self {
            CompletionDetector::Marker {
                message_field,
                marker,
            } => record
                .get_str(message_field)
                .is_some_and(|message| message.contains(marker.as_str())),
            CompletionDetector::Pattern {
                message_field,
                pattern,
            } => record
                .get_str(message_field)
                .is_some_and(|message| pattern.is_match(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> Record {
        [("message", text)].into_iter().collect()
    }

    #[test]
    fn test_default_marker() {
        let detector = CompletionDetector::default();
        assert!(detector.is_complete(&message("request completed")));
        assert!(detector.is_complete(&message("GET /hello request completed in 52ms")));
        assert!(!detector.is_complete(&message("handler finished")));
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        let detector = CompletionDetector::default();
        assert!(!detector.is_complete(&message("Request Completed")));
    }

    #[test]
    fn test_missing_or_non_string_message() {
        let detector = CompletionDetector::default();
        assert!(!detector.is_complete(&Record::new()));

        let mut record = Record::new();
        record.insert("message", 1);
        assert!(!detector.is_complete(&record));
    }

    #[test]
    fn test_custom_message_field() {
        let detector = CompletionDetector::marker("msg", "done");
        let record: Record = [("msg", "all done"), ("message", "nope")].into_iter().collect();
        assert!(detector.is_complete(&record));
    }

    #[test]
    fn test_pattern() {
        let detector = CompletionDetector::pattern("message", r"^request (completed|aborted)$")
            .unwrap();
        assert!(detector.is_complete(&message("request aborted")));
        assert!(!detector.is_complete(&message("request completed later")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            CompletionDetector::pattern("message", "(unclosed"),
            Err(ConfigError::InvalidPattern(_))
        ));
    }
}
