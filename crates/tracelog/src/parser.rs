// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Raw line decoding.
//!
//! Producers write one JSON object per line, sometimes behind the standard Go
//! logger prefix (`2024/05/01 12:00:00 {...}`) and sometimes followed by a
//! literal `\n` escape that made it into the file. Both are tolerated; anything
//! else that is not a single JSON object is rejected.

use regex::Regex;
use std::sync::OnceLock;

use crate::errors::ParseError;
use crate::record::Record;

const LOG_PREFIX_PATTERN: &str = r"^\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}(\.\d{1,9})? +";

#[allow(clippy::expect_used)]
fn log_prefix() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(LOG_PREFIX_PATTERN).expect("log prefix pattern is valid"))
}

fn strip_log_prefix(line: &str) -> &str {
    match log_prefix().find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

fn is_ignorable_tail(mut rest: &str) -> bool {
    rest = rest.trim();
    while let Some(stripped) = rest.strip_prefix("\\n") {
        rest = stripped.trim_start();
    }
    rest.is_empty()
}

/// Decodes one raw log line into a [`Record`].
///
/// No partial records are produced: either the whole line decodes or an error
/// is returned and the caller drops it.
pub fn parse(line: &str) -> Result<Record, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let body = strip_log_prefix(line);
    if !body.starts_with('{') {
        return Err(ParseError::NotAnObject);
    }

    let mut stream = serde_json::Deserializer::from_str(body).into_iter::<Record>();
    let record = match stream.next() {
        Some(result) => result?,
        None => return Err(ParseError::Empty),
    };

    if !is_ignorable_tail(&body[stream.byte_offset()..]) {
        return Err(ParseError::TrailingContent);
    }

    Ok(record)
}
