// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Downstream consumers of combined and pass-through records.
//!
//! A sink is owned by the [`EmitterService`](crate::emitter::EmitterService)
//! and called from its task only, so implementations may keep mutable state
//! without locking. Retrying a failed record is the sink's own business: the
//! service logs the failure and moves on.

use async_trait::async_trait;
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

use crate::errors::SinkError;
use crate::record::Record;

#[async_trait]
pub trait Sink: Send {
    /// Used in diagnostics.
    fn name(&self) -> &str;

    async fn accept(&mut self, record: &Record) -> Result<(), SinkError>;

    /// Pushes out anything buffered. Called whenever the emitter queue runs
    /// dry and on shutdown.
    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W> {
    name: String,
    writer: BufWriter<W>,
}

impl JsonLinesSink<tokio::io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::from_writer("stdout", tokio::io::stdout())
    }
}

impl JsonLinesSink<fs::File> {
    /// Opens `path` for appending, creating it and its parent directories if
    /// needed.
    pub async fn file(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::from_writer(path.display().to_string(), file))
    }
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn from_writer(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer: BufWriter::new(writer),
        }
    }

    /// Returns the underlying writer. Unflushed output is discarded.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> Sink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn accept(&mut self, record: &Record) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Forwards every record to an in-process receiver.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Record>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Record>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Sink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn accept(&mut self, record: &Record) -> Result<(), SinkError> {
        self.tx.send(record.clone()).map_err(|_| SinkError::Closed)
    }
}
