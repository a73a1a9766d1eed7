// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lock-free diagnostic counters for the combining pipeline.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct AggregatorStats {
    lines: AtomicU64,
    parse_errors: AtomicU64,
    passthrough: AtomicU64,
    groups_created: AtomicU64,
    completed: AtomicU64,
    evicted_stale: AtomicU64,
    evicted_capacity: AtomicU64,
    drained: AtomicU64,
    rejected: AtomicU64,
    emitted: AtomicU64,
    sink_errors: AtomicU64,
}

/// Copy of the counters at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub lines: u64,
    pub parse_errors: u64,
    pub passthrough: u64,
    pub groups_created: u64,
    pub completed: u64,
    pub evicted_stale: u64,
    pub evicted_capacity: u64,
    pub drained: u64,
    pub rejected: u64,
    pub emitted: u64,
    pub sink_errors: u64,
}

impl StatsSnapshot {
    /// Groups that left the store, by any path.
    #[must_use]
    pub fn groups_closed(&self) -> u64 {
        self.completed + self.evicted_stale + self.evicted_capacity + self.drained
    }
}

macro_rules! counters {
    ($($name:ident => $incr:ident),* $(,)?) => {
        impl AggregatorStats {
            $(
                pub fn $incr(&self, n: u64) {
                    self.$name.fetch_add(n, Ordering::Relaxed);
                }
            )*

            #[must_use]
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters! {
    lines => add_lines,
    parse_errors => add_parse_errors,
    passthrough => add_passthrough,
    groups_created => add_groups_created,
    completed => add_completed,
    evicted_stale => add_evicted_stale,
    evicted_capacity => add_evicted_capacity,
    drained => add_drained,
    rejected => add_rejected,
    emitted => add_emitted,
    sink_errors => add_sink_errors,
}
