// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wires the aggregator, emitter service and sweeper together.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let combiner = LogCombiner::start(Config::from_env()?, vec![Box::new(JsonLinesSink::stdout())])?;
//!
//! let aggregator = combiner.aggregator();
//! tokio::spawn(async move {
//!     aggregator.process_line(&line, Instant::now());
//! });
//!
//! // Flushes every open group and waits for the sinks to receive them.
//! combiner.shutdown().await;
//! ```

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::emitter::{Emitter, EmitterService};
use crate::errors::ConfigError;
use crate::merge::MergeTable;
use crate::sink::Sink;
use crate::stats::{AggregatorStats, StatsSnapshot};
use crate::sweeper::Sweeper;

pub struct LogCombiner {
    aggregator: Arc<Aggregator>,
    emitter: Emitter,
    stats: Arc<AggregatorStats>,
    cancel_token: CancellationToken,
    sweeper_task: JoinHandle<()>,
    emitter_task: JoinHandle<()>,
}

impl LogCombiner {
    /// Spawns the emitter service and the sweeper on the current runtime.
    pub fn start(config: Config, sinks: Vec<Box<dyn Sink>>) -> Result<Self, ConfigError> {
        Self::start_with(config, None, sinks)
    }

    /// Like [`LogCombiner::start`], with a merge table built by the caller
    /// instead of the one described by `config`.
    pub fn start_with(
        config: Config,
        merge_table: Option<MergeTable>,
        sinks: Vec<Box<dyn Sink>>,
    ) -> Result<Self, ConfigError> {
        let stats = Arc::new(AggregatorStats::default());
        let (service, emitter) = EmitterService::new(sinks, Arc::clone(&stats));

        let mut aggregator = Aggregator::new(&config, emitter.clone(), Arc::clone(&stats))?;
        if let Some(merge_table) = merge_table {
            aggregator = aggregator.with_merge_table(merge_table);
        }
        let aggregator = Arc::new(aggregator);

        let emitter_task = tokio::spawn(service.run());
        let cancel_token = CancellationToken::new();
        let sweeper = Sweeper::new(
            Arc::clone(&aggregator),
            config.sweep_interval,
            cancel_token.clone(),
        );
        let sweeper_task = tokio::spawn(sweeper.run());

        debug!(
            "Log combiner started: staleness {:?}, sweep every {:?}, max {} groups ({})",
            config.staleness_timeout, config.sweep_interval, config.max_groups, config.capacity_policy
        );

        Ok(Self {
            aggregator,
            emitter,
            stats,
            cancel_token,
            sweeper_task,
            emitter_task,
        })
    }

    /// Shared handle for producers.
    #[must_use]
    pub fn aggregator(&self) -> Arc<Aggregator> {
        Arc::clone(&self.aggregator)
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Flushes every open group, waits until the sinks received everything
    /// and stops the background tasks.
    pub async fn shutdown(self) -> StatsSnapshot {
        self.cancel_token.cancel();
        if let Err(e) = self.sweeper_task.await {
            error!("Sweeper task failed: {e}");
            // Without the sweeper's final pass, drain here instead.
            self.aggregator.drain();
        }

        if let Err(e) = self.emitter.flush().await {
            error!("Failed to flush emitter: {e}");
        }
        if let Err(e) = self.emitter.shutdown() {
            error!("Failed to stop emitter: {e}");
        }
        if let Err(e) = self.emitter_task.await {
            error!("Emitter task failed: {e}");
        }

        self.stats.snapshot()
    }
}
