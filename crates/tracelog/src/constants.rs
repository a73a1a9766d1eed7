// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Field carrying the correlation key.
pub const DEFAULT_KEY_FIELD: &str = "traceId";

/// Field whose values are concatenated into the combined message.
pub const DEFAULT_MESSAGE_FIELD: &str = "message";

/// Message logged by the request middleware once a request is done.
pub const DEFAULT_TERMINAL_MARKER: &str = "request completed";

/// A group with no activity for this long is flushed by the sweeper.
pub const DEFAULT_STALENESS_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum number of open groups held in memory.
pub const DEFAULT_MAX_GROUPS: usize = 1_000;

/// Separator used when concatenating messages.
pub const MESSAGE_SEPARATOR: &str = "\n";
