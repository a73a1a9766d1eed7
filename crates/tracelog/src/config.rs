// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::completion::CompletionDetector;
use crate::constants::{
    DEFAULT_KEY_FIELD, DEFAULT_MAX_GROUPS, DEFAULT_MESSAGE_FIELD, DEFAULT_STALENESS_TIMEOUT,
    DEFAULT_SWEEP_INTERVAL, DEFAULT_TERMINAL_MARKER,
};
use crate::errors::ConfigError;
use crate::key::KeyExtractor;
use crate::merge::{Builtin, MergeTable};
use crate::store::{CapacityPolicy, GroupStore};

const ENV_STALENESS_TIMEOUT_SECS: &str = "TRACELOG_STALENESS_TIMEOUT_SECS";
const ENV_SWEEP_INTERVAL_MS: &str = "TRACELOG_SWEEP_INTERVAL_MS";
const ENV_MAX_GROUPS: &str = "TRACELOG_MAX_GROUPS";
const ENV_CAPACITY_POLICY: &str = "TRACELOG_CAPACITY_POLICY";
const ENV_TERMINAL_MARKER: &str = "TRACELOG_TERMINAL_MARKER";
const ENV_TERMINAL_PATTERN: &str = "TRACELOG_TERMINAL_PATTERN";
const ENV_KEY_FIELD: &str = "TRACELOG_KEY_FIELD";
const ENV_MESSAGE_FIELD: &str = "TRACELOG_MESSAGE_FIELD";
const ENV_DEFAULT_STRATEGY: &str = "TRACELOG_DEFAULT_STRATEGY";
const ENV_FIELD_STRATEGIES: &str = "TRACELOG_FIELD_STRATEGIES";

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Idle time after which the sweeper force-flushes a group.
    pub staleness_timeout: Duration,
    pub sweep_interval: Duration,
    pub max_groups: usize,
    pub capacity_policy: CapacityPolicy,
    pub key_field: String,
    pub message_field: String,
    pub terminal_marker: String,
    /// Takes precedence over `terminal_marker` when set.
    pub terminal_pattern: Option<String>,
    pub default_strategy: Builtin,
    pub field_strategies: Vec<(String, Builtin)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            staleness_timeout: DEFAULT_STALENESS_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_groups: DEFAULT_MAX_GROUPS,
            capacity_policy: CapacityPolicy::default(),
            key_field: DEFAULT_KEY_FIELD.to_string(),
            message_field: DEFAULT_MESSAGE_FIELD.to_string(),
            terminal_marker: DEFAULT_TERMINAL_MARKER.to_string(),
            terminal_pattern: None,
            default_strategy: Builtin::KeepLatest,
            field_strategies: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a validated config from `lookup`, falling back to the default
    /// for every variable it does not return.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let staleness_timeout = Duration::from_secs(parse_number(
            &lookup,
            ENV_STALENESS_TIMEOUT_SECS,
            defaults.staleness_timeout.as_secs(),
        ));
        let sweep_interval = Duration::from_millis(parse_number(
            &lookup,
            ENV_SWEEP_INTERVAL_MS,
            u64::try_from(defaults.sweep_interval.as_millis()).unwrap_or(u64::MAX),
        ));
        let max_groups = parse_number(&lookup, ENV_MAX_GROUPS, defaults.max_groups);

        let capacity_policy = match lookup(ENV_CAPACITY_POLICY) {
            Some(value) => value.parse()?,
            None => defaults.capacity_policy,
        };
        let default_strategy = match lookup(ENV_DEFAULT_STRATEGY) {
            Some(value) => value.parse()?,
            None => defaults.default_strategy,
        };
        let field_strategies = match lookup(ENV_FIELD_STRATEGIES) {
            Some(value) => parse_field_strategies(&value)?,
            None => defaults.field_strategies,
        };

        let config = Config {
            staleness_timeout,
            sweep_interval,
            max_groups,
            capacity_policy,
            key_field: lookup(ENV_KEY_FIELD)
                .map(|field| field.trim().to_string())
                .unwrap_or(defaults.key_field),
            message_field: lookup(ENV_MESSAGE_FIELD)
                .map(|field| field.trim().to_string())
                .unwrap_or(defaults.message_field),
            terminal_marker: lookup(ENV_TERMINAL_MARKER).unwrap_or(defaults.terminal_marker),
            terminal_pattern: lookup(ENV_TERMINAL_PATTERN),
            default_strategy,
            field_strategies,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_groups == 0 {
            return Err(ConfigError::Zero("max_groups"));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Zero("sweep_interval"));
        }
        if self.key_field == self.message_field {
            return Err(ConfigError::KeyIsMessageField(self.key_field.clone()));
        }
        self.merge_table()?;
        self.completion_detector()?;
        Ok(())
    }

    pub fn merge_table(&self) -> Result<MergeTable, ConfigError> {
        let mut table = MergeTable::new(&self.key_field, &self.message_field)
            .with_default(Arc::new(self.default_strategy));
        for (field, strategy) in &self.field_strategies {
            table.register(field, Arc::new(*strategy))?;
        }
        Ok(table)
    }

    pub fn completion_detector(&self) -> Result<CompletionDetector, ConfigError> {
        match &self.terminal_pattern {
            Some(pattern) => CompletionDetector::pattern(&self.message_field, pattern),
            None => Ok(CompletionDetector::marker(
                &self.message_field,
                &self.terminal_marker,
            )),
        }
    }

    #[must_use]
    pub fn key_extractor(&self) -> KeyExtractor {
        KeyExtractor::new(&self.key_field)
    }

    #[must_use]
    pub fn store(&self) -> GroupStore {
        GroupStore::new(self.max_groups, self.capacity_policy)
    }
}

fn parse_number<T, F>(lookup: &F, name: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value {value:?} for {name}, using default {default}");
            default
        }),
        None => default,
    }
}

/// Parses `field:strategy` pairs separated by commas and/or whitespace.
fn parse_field_strategies(value: &str) -> Result<Vec<(String, Builtin)>, ConfigError> {
    value
        .replace(',', " ")
        .split_whitespace()
        .map(|entry| match entry.split_once(':') {
            Some((field, strategy)) if !field.is_empty() && !strategy.is_empty() => {
                Ok((field.to_string(), strategy.parse()?))
            }
            _ => Err(ConfigError::MalformedFieldStrategy(entry.to_string())),
        })
        .collect()
}
