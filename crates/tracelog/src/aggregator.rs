// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The fold step: one record in, at most one finished record out.
//!
//! Per key, a group goes `ABSENT -> OPEN` on its first record, stays `OPEN`
//! on non-terminal records and returns to `ABSENT` on the terminal record
//! (flush) or when the sweeper evicts it. Both exits remove the group from
//! the store atomically, so each group is emitted exactly once.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::completion::CompletionDetector;
use crate::config::Config;
use crate::emitter::Emitter;
use crate::errors::{ConfigError, ParseError};
use crate::group::Group;
use crate::key::KeyExtractor;
use crate::merge::MergeTable;
use crate::parser;
use crate::record::Record;
use crate::stats::AggregatorStats;
use crate::store::GroupStore;

/// What the fold decided for the record it was given.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Hand this record to the emitter now: a combined record, or the input
    /// itself when it bypassed aggregation.
    Emit(Record),
    /// The record was buffered into an open group.
    Hold,
}

/// Groups evicted by one [`Aggregator::sweep`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub stale: usize,
    pub over_capacity: usize,
}

impl SweepReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.stale + self.over_capacity
    }
}

#[derive(Debug)]
pub struct Aggregator {
    store: GroupStore,
    merge: MergeTable,
    completion: CompletionDetector,
    keys: KeyExtractor,
    staleness_timeout: Duration,
    emitter: Emitter,
    stats: Arc<AggregatorStats>,
}

impl Aggregator {
    pub fn new(
        config: &Config,
        emitter: Emitter,
        stats: Arc<AggregatorStats>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store: config.store(),
            merge: config.merge_table()?,
            completion: config.completion_detector()?,
            keys: config.key_extractor(),
            staleness_timeout: config.staleness_timeout,
            emitter,
            stats,
        })
    }

    /// Replaces the merge table, e.g. to register custom strategies. The key
    /// extractor follows the table's key field.
    #[must_use]
    pub fn with_merge_table(mut self, merge: MergeTable) -> Self {
        self.keys = KeyExtractor::new(merge.key_field());
        self.merge = merge;
        self
    }

    #[must_use]
    pub fn store(&self) -> &GroupStore {
        &self.store
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<AggregatorStats> {
        &self.stats
    }

    #[must_use]
    pub fn staleness_timeout(&self) -> Duration {
        self.staleness_timeout
    }

    /// Folds one record into the store.
    ///
    /// Unkeyed records come straight back as [`Outcome::Emit`]. A terminal
    /// record is merged and its group removed under the same shard lock, so
    /// the returned combined record includes it. Groups displaced by capacity
    /// pressure on the way are emitted directly.
    pub fn fold(&self, record: Record, now: Instant) -> Outcome {
        let Some(key) = self.keys.extract(&record).map(str::to_owned) else {
            self.stats.add_passthrough(1);
            return Outcome::Emit(record);
        };

        if self.completion.is_complete(&record) {
            let group = self
                .store
                .complete(&key, now, |group| self.merge.merge(group, record, now));
            if group.record_count == 1 {
                self.stats.add_groups_created(1);
            }
            self.stats.add_completed(1);
            debug!(
                "Flushing group {key} after {} record(s)",
                group.record_count
            );
            return Outcome::Emit(self.finish(group));
        }

        match self.store.reserve(&key) {
            Ok(evicted) => {
                if !evicted.is_empty() {
                    self.stats.add_evicted_capacity(evicted.len() as u64);
                    debug!("Evicted {} group(s) to make room for {key}", evicted.len());
                    self.emit_all(evicted);
                }
            }
            Err(e) => {
                self.stats.add_rejected(1);
                warn!("Passing record for {key} through uncombined: {e}");
                return Outcome::Emit(record);
            }
        }

        let mut group = self.store.get_or_create(&key, now);
        if group.record_count == 0 {
            self.stats.add_groups_created(1);
        }
        self.merge.merge(&mut group, record, now);
        Outcome::Hold
    }

    /// Folds `record` and emits whatever the fold produced.
    pub fn process(&self, record: Record, now: Instant) {
        if let Outcome::Emit(record) = self.fold(record, now) {
            self.emit(record);
        }
    }

    /// Parses and processes one raw line. A malformed line is dropped and
    /// counted; blank lines are skipped silently.
    pub fn process_line(&self, line: &str, now: Instant) -> Result<(), ParseError> {
        self.stats.add_lines(1);
        self.process_parsed(parser::parse(line), now)
    }

    /// Like [`Aggregator::process_line`] for a line read as raw bytes. A line
    /// that is not valid UTF-8 counts as a parse error.
    pub fn process_bytes(&self, line: &[u8], now: Instant) -> Result<(), ParseError> {
        self.stats.add_lines(1);
        let parsed = std::str::from_utf8(line)
            .map_err(ParseError::from)
            .and_then(parser::parse);
        self.process_parsed(parsed, now)
    }

    fn process_parsed(
        &self,
        parsed: Result<Record, ParseError>,
        now: Instant,
    ) -> Result<(), ParseError> {
        match parsed {
            Ok(record) => {
                self.process(record, now);
                Ok(())
            }
            Err(ParseError::Empty) => Ok(()),
            Err(e) => {
                self.stats.add_parse_errors(1);
                debug!("Dropping malformed log line: {e}");
                Err(e)
            }
        }
    }

    /// Flushes groups idle for longer than the staleness timeout, then evicts
    /// the oldest groups while the store is over capacity.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();

        for summary in self.store.snapshot() {
            if now.saturating_duration_since(summary.last_updated_at) <= self.staleness_timeout {
                continue;
            }
            // Lost the race to a flush or a refresh: nothing to do.
            if let Some(group) =
                self.store
                    .remove_if_stale(&summary.key, now, self.staleness_timeout)
            {
                debug!(
                    "Evicting stale group {} after {} record(s)",
                    group.key(),
                    group.record_count
                );
                report.stale += 1;
                self.emit(self.finish(group));
            }
        }

        let over_capacity = self.store.enforce_capacity();
        report.over_capacity = over_capacity.len();
        self.emit_all(over_capacity);

        self.stats.add_evicted_stale(report.stale as u64);
        self.stats.add_evicted_capacity(report.over_capacity as u64);
        report
    }

    /// Force-flushes every open group. Returns how many were flushed.
    pub fn drain(&self) -> usize {
        let groups = self.store.drain();
        let drained = groups.len();
        self.stats.add_drained(drained as u64);
        self.emit_all(groups);
        drained
    }

    fn finish(&self, group: Group) -> Record {
        group.into_record(self.merge.key_field(), self.merge.message_field())
    }

    fn emit_all(&self, groups: Vec<Group>) {
        for group in groups {
            self.emit(self.finish(group));
        }
    }

    fn emit(&self, record: Record) {
        if let Err(e) = self.emitter.emit(record) {
            error!("Failed to emit record: {e}");
        }
    }
}
