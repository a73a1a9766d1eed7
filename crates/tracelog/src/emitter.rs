// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoupled hand-off of finished records to the sinks.
//!
//! ```text
//!    ┌──────────────┐
//!    │   Emitters   │ (aggregator, sweeper; cloneable)
//!    └──────┬───────┘
//!           │ EmitterCommand over an unbounded channel
//!           v
//!    ┌──────────────┐
//!    │EmitterService│ (single task, owns the sinks)
//!    └──────┬───────┘
//!           v
//!        sinks
//! ```
//!
//! Sending never waits on a sink, so a slow sink grows the queue instead of
//! stalling the fold.

use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::errors::AggregatorError;
use crate::record::Record;
use crate::sink::Sink;
use crate::stats::AggregatorStats;

#[derive(Debug)]
pub enum EmitterCommand {
    Emit(Record),
    /// Acknowledged once every record queued before it reached the sinks and
    /// the sinks were flushed.
    Flush(oneshot::Sender<()>),
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct Emitter {
    tx: mpsc::UnboundedSender<EmitterCommand>,
}

impl Emitter {
    #[cfg(test)]
    pub(crate) fn from_sender(tx: mpsc::UnboundedSender<EmitterCommand>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, record: Record) -> Result<(), AggregatorError> {
        self.tx
            .send(EmitterCommand::Emit(record))
            .map_err(|_| AggregatorError::EmitterClosed)
    }

    pub async fn flush(&self) -> Result<(), AggregatorError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(EmitterCommand::Flush(response_tx))
            .map_err(|_| AggregatorError::EmitterClosed)?;
        response_rx
            .await
            .map_err(|_| AggregatorError::EmitterClosed)
    }

    pub fn shutdown(&self) -> Result<(), AggregatorError> {
        self.tx
            .send(EmitterCommand::Shutdown)
            .map_err(|_| AggregatorError::EmitterClosed)
    }
}

pub struct EmitterService {
    sinks: Vec<Box<dyn Sink>>,
    rx: mpsc::UnboundedReceiver<EmitterCommand>,
    stats: Arc<AggregatorStats>,
}

impl EmitterService {
    #[must_use]
    pub fn new(sinks: Vec<Box<dyn Sink>>, stats: Arc<AggregatorStats>) -> (Self, Emitter) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sinks, rx, stats }, Emitter { tx })
    }

    pub async fn run(mut self) {
        debug!("Emitter service started with {} sink(s)", self.sinks.len());

        loop {
            let command = match self.rx.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) => {
                    // Queue ran dry: push buffered output before waiting.
                    self.flush_sinks().await;
                    match self.rx.recv().await {
                        Some(command) => command,
                        None => break,
                    }
                }
                Err(TryRecvError::Disconnected) => break,
            };

            match command {
                EmitterCommand::Emit(record) => self.deliver(&record).await,
                EmitterCommand::Flush(response_tx) => {
                    self.flush_sinks().await;
                    if response_tx.send(()).is_err() {
                        error!("Failed to acknowledge flush - receiver dropped");
                    }
                }
                EmitterCommand::Shutdown => {
                    debug!("Emitter service shutting down");
                    break;
                }
            }
        }

        self.flush_sinks().await;
        debug!("Emitter service stopped");
    }

    async fn deliver(&mut self, record: &Record) {
        self.stats.add_emitted(1);
        for sink in &mut self.sinks {
            if let Err(e) = sink.accept(record).await {
                self.stats.add_sink_errors(1);
                warn!("Sink {} rejected record: {e}", sink.name());
            }
        }
    }

    async fn flush_sinks(&mut self) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.flush().await {
                self.stats.add_sink_errors(1);
                warn!("Failed to flush sink {}: {e}", sink.name());
            }
        }
    }
}
