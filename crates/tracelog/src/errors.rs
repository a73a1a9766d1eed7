// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the combining pipeline.
//!
//! None of these are fatal to the pipeline: parse errors drop one line, sink
//! errors drop one delivery, capacity errors turn into a pass-through.

/// A raw line that could not be decoded into a record.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("line is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("unexpected trailing content after JSON object")]
    TrailingContent,
}

/// Invalid configuration supplied at construction time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown merge strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown capacity policy: {0}")]
    UnknownCapacityPolicy(String),

    #[error("malformed field strategy entry: {0}")]
    MalformedFieldStrategy(String),

    #[error("field {0} is reserved and cannot have a merge strategy")]
    ReservedField(String),

    #[error("key field and message field must differ, both are {0}")]
    KeyIsMessageField(String),

    #[error("invalid terminal pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// A sink failed to accept a record.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("sink closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("group store is full ({max} groups)")]
    CapacityExceeded { max: usize },

    #[error("emitter service is not running")]
    EmitterClosed,
}
