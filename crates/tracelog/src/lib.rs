// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace-keyed log combining.
//!
//! Request handlers emit several structured log lines per request, all tagged
//! with the same trace id. This crate folds those lines into a single combined
//! record per trace and hands it to downstream sinks exactly once:
//!
//! ```text
//!   raw line ──> parser ──> key extractor ──┬── keyed ──> store ──> merge ──> completion ──┬─> emitter ──> sinks
//!                                           │                        ^                    │
//!                                           │                        │ (hold)             │
//!                                           │                    sweeper ─────(evict)──────┘
//!                                           └── unkeyed ─────────────────────────────────────> emitter
//! ```
//!
//! - [`parser`]: raw line to [`record::Record`]
//! - [`key`]: correlation key extraction
//! - [`store`]: sharded, capacity-bounded group store
//! - [`merge`]: per-field merge strategies
//! - [`completion`]: terminal-record detection
//! - [`aggregator`]: the fold step tying the above together
//! - [`sweeper`]: periodic staleness/capacity eviction
//! - [`emitter`] and [`sink`]: decoupled delivery of combined records
//! - [`combiner`]: wires everything up and handles shutdown

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod combiner;
pub mod completion;
pub mod config;
pub mod constants;
pub mod emitter;
pub mod errors;
pub mod group;
pub mod key;
pub mod merge;
pub mod parser;
pub mod record;
pub mod sink;
pub mod stats;
pub mod store;
pub mod sweeper;
