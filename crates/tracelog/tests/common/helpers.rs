// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

#![allow(dead_code)]

use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc::UnboundedReceiver;
use tracelog::{
    combiner::LogCombiner, config::Config, record::Record, sink::ChannelSink,
    stats::StatsSnapshot,
};

/// A running combiner whose only sink is an in-process channel.
pub struct Pipeline {
    pub combiner: LogCombiner,
    pub rx: UnboundedReceiver<Record>,
}

impl Pipeline {
    pub fn start(config: Config) -> Self {
        let (sink, rx) = ChannelSink::new();
        let combiner =
            LogCombiner::start(config, vec![Box::new(sink)]).expect("Failed to start combiner");
        Self { combiner, rx }
    }

    /// Shuts the combiner down and returns everything it emitted.
    pub async fn finish(mut self) -> (Vec<Record>, StatsSnapshot) {
        let stats = self.combiner.shutdown().await;
        let mut records = Vec::new();
        while let Ok(record) = self.rx.try_recv() {
            records.push(record);
        }
        (records, stats)
    }
}

/// A JSON log line with `traceId`, `message` and the given extra fields.
pub fn log_line(trace_id: &str, message: &str, extra: JsonValue) -> String {
    let mut line = json!({ "traceId": trace_id, "message": message });
    if let (Some(line), Some(extra)) = (line.as_object_mut(), extra.as_object()) {
        for (name, value) in extra {
            line.insert(name.clone(), value.clone());
        }
    }
    line.to_string()
}

/// Prefixes `line` the way Go's standard logger does.
pub fn with_go_log_prefix(line: &str) -> String {
    format!("2024/05/17 14:03:27 {line}")
}

pub fn messages(record: &Record) -> Vec<&str> {
    record
        .get_str("message")
        .map(|message| message.split('\n').collect())
        .unwrap_or_default()
}

pub fn trace_id(record: &Record) -> Option<&str> {
    record.get_str("traceId")
}
