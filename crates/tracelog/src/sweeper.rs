// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic background eviction.
//!
//! The sweeper wakes up on a fixed interval and asks the aggregator to flush
//! stale groups and trim the store back to capacity. Cancelling its token
//! triggers one last pass that force-flushes every open group, so nothing
//! buffered is lost at shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregator::Aggregator;

pub struct Sweeper {
    aggregator: Arc<Aggregator>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl Sweeper {
    #[must_use]
    pub fn new(
        aggregator: Arc<Aggregator>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            aggregator,
            interval,
            cancel_token,
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        debug!("Sweeper started, interval {:?}", self.interval);
        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    let drained = self.aggregator.drain();
                    info!("Sweeper stopping, flushed {drained} open group(s)");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.aggregator.sweep(Instant::now());
                    if report.total() > 0 {
                        debug!(
                            "Sweep evicted {} stale and {} over-capacity group(s)",
                            report.stale, report.over_capacity
                        );
                    }
                }
            }
        }
    }
}
