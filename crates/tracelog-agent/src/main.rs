// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use anyhow::Context;
use std::{env, future::Future};
use tokio::{
    fs::File,
    io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader},
    time::{Duration, Instant},
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use tracelog::{
    aggregator::Aggregator,
    combiner::LogCombiner,
    config::Config,
    sink::{JsonLinesSink, Sink},
};

const STDIN_PATH: &str = "-";
/// Grace period for a pending stdin read once the combiner has shut down.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(100);

pub fn main() -> anyhow::Result<()> {
    let log_level = env::var("TRACELOG_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(&log_level)
                .with_context(|| format!("could not parse log level {log_level}"))?,
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    debug!("Logging subsystem enabled");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = runtime.block_on(run());
    // A blocking stdin read would otherwise keep the runtime alive.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    let input = open_input(env::var("LOG_PATH").ok()).await?;
    let sink = open_output(env::var("TRACELOG_OUTPUT_PATH").ok()).await?;

    let combiner = LogCombiner::start(config, vec![sink])?;
    let aggregator = combiner.aggregator();

    let lines = pump(BufReader::new(input), &aggregator, shutdown_signal()).await;
    debug!("Read {lines} line(s), shutting down");

    let stats = combiner.shutdown().await;
    info!("Log combiner stopped: {}", serde_json::to_string(&stats)?);
    Ok(())
}

async fn open_input(path: Option<String>) -> anyhow::Result<Box<dyn AsyncRead + Unpin + Send>> {
    match path.filter(|path| !path.is_empty() && path != STDIN_PATH) {
        Some(path) => {
            let file = File::open(&path)
                .await
                .with_context(|| format!("could not open log file {path}"))?;
            info!("Reading log lines from {path}");
            Ok(Box::new(file))
        }
        None => {
            info!("Reading log lines from stdin");
            Ok(Box::new(tokio::io::stdin()))
        }
    }
}

async fn open_output(path: Option<String>) -> anyhow::Result<Box<dyn Sink>> {
    match path.filter(|path| !path.is_empty()) {
        Some(path) => {
            let sink = JsonLinesSink::file(&path)
                .await
                .with_context(|| format!("could not open output file {path}"))?;
            Ok(Box::new(sink))
        }
        None => Ok(Box::new(JsonLinesSink::stdout())),
    }
}

/// Feeds every line of `reader` to the aggregator until end of input or until
/// `stop` resolves. Returns the number of lines read.
///
/// Lines are read as bytes so that one undecodable line is dropped by the
/// aggregator instead of ending the stream.
async fn pump<R, S>(mut reader: R, aggregator: &Aggregator, stop: S) -> u64
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let mut buf = Vec::new();
    let mut count = 0;
    tokio::pin!(stop);

    loop {
        tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => {
                    debug!("Reached end of input");
                    break;
                }
                Ok(_) => {
                    count += 1;
                    // Malformed lines are logged and counted by the aggregator.
                    let _ = aggregator.process_bytes(&buf, Instant::now());
                    buf.clear();
                }
                Err(e) => {
                    error!("Failed to read input: {e}");
                    break;
                }
            },
            () = &mut stop => {
                info!("Received shutdown signal");
                break;
            }
        }
    }
    count
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}
