// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded, sharded storage for open groups.
//!
//! The store is the only shared mutable state of the pipeline. Groups live in
//! a sharded map: an update takes the write lock of the key's shard only, so
//! producers working on different keys rarely contend, and two records for
//! the same key are applied one after the other.
//!
//! Every way out of the store goes through an atomic removal. Completion,
//! staleness eviction and capacity eviction may race for the same key; the
//! first removal wins and the others observe absence.

use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

use crate::constants::DEFAULT_MAX_GROUPS;
use crate::errors::{AggregatorError, ConfigError};
use crate::group::Group;

/// What to do when a new key arrives and the store is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CapacityPolicy {
    /// Evict the oldest groups (by creation time) to make room.
    #[default]
    EvictOldest,
    /// Refuse to open a group for the new key.
    RejectNew,
}

impl CapacityPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CapacityPolicy::EvictOldest => "evict-oldest",
            CapacityPolicy::RejectNew => "reject-new",
        }
    }
}

impl fmt::Display for CapacityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapacityPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evict-oldest" => Ok(CapacityPolicy::EvictOldest),
            "reject-new" => Ok(CapacityPolicy::RejectNew),
            _ => Err(ConfigError::UnknownCapacityPolicy(s.to_string())),
        }
    }
}

/// Point-in-time view of one group, detached from the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupSummary {
    pub key: String,
    pub created_at: Instant,
    pub last_updated_at: Instant,
    pub record_count: usize,
}

impl From<&Group> for GroupSummary {
    fn from(group: &Group) -> Self {
        Self {
            key: group.key().to_string(),
            created_at: group.created_at,
            last_updated_at: group.last_updated_at,
            record_count: group.record_count,
        }
    }
}

pub struct GroupStore {
    groups: DashMap<String, Group>,
    max_groups: usize,
    policy: CapacityPolicy,
}

impl Default for GroupStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_GROUPS, CapacityPolicy::default())
    }
}

impl GroupStore {
    #[must_use]
    pub fn new(max_groups: usize, policy: CapacityPolicy) -> Self {
        Self {
            groups: DashMap::new(),
            max_groups,
            policy,
        }
    }

    #[must_use]
    pub fn max_groups(&self) -> usize {
        self.max_groups
    }

    #[must_use]
    pub fn policy(&self) -> CapacityPolicy {
        self.policy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.groups.contains_key(key)
    }

    /// Returns the group for `key`, inserting an empty one created at `now`
    /// when there is none.
    ///
    /// The returned guard holds the shard lock: mutate through it and drop it
    /// before calling anything else on the store.
    pub fn get_or_create(&self, key: &str, now: Instant) -> RefMut<'_, String, Group> {
        self.groups
            .entry(key.to_owned())
            .or_insert_with(|| Group::new(key, now))
    }

    /// Applies `fold` to the group for `key` and removes it, all under one
    /// shard lock. With no group for `key`, a fresh one is folded and returned
    /// without ever being inserted.
    pub fn complete<F>(&self, key: &str, now: Instant, fold: F) -> Group
    where
        F: FnOnce(&mut Group),
    {
        match self.groups.entry(key.to_owned()) {
            Entry::Occupied(mut entry) => {
                fold(entry.get_mut());
                entry.remove()
            }
            Entry::Vacant(_) => {
                let mut group = Group::new(key, now);
                fold(&mut group);
                group
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<Group> {
        self.groups.remove(key).map(|(_, group)| group)
    }

    /// Removes the group for `key` only if it has been idle for longer than
    /// `staleness` as of `now`. A group touched since the caller looked at it
    /// is left alone.
    pub fn remove_if_stale(&self, key: &str, now: Instant, staleness: Duration) -> Option<Group> {
        self.groups
            .remove_if(key, |_, group| {
                now.saturating_duration_since(group.last_updated_at) > staleness
            })
            .map(|(_, group)| group)
    }

    /// Copies out a summary of every live group, locking one shard at a time.
    #[must_use]
    pub fn snapshot(&self) -> Vec<GroupSummary> {
        self.groups
            .iter()
            .map(|entry| GroupSummary::from(entry.value()))
            .collect()
    }

    /// Makes room for `key` before it is inserted.
    ///
    /// Returns the groups evicted to make room (empty if `key` already has a
    /// group or the store is under its limit). Under
    /// [`CapacityPolicy::RejectNew`] a full store is an error instead.
    pub fn reserve(&self, key: &str) -> Result<Vec<Group>, AggregatorError> {
        if self.groups.contains_key(key) {
            return Ok(Vec::new());
        }
        let len = self.groups.len();
        if len < self.max_groups {
            return Ok(Vec::new());
        }
        match self.policy {
            CapacityPolicy::EvictOldest => Ok(self.evict_oldest(len + 1 - self.max_groups)),
            CapacityPolicy::RejectNew => Err(AggregatorError::CapacityExceeded {
                max: self.max_groups,
            }),
        }
    }

    /// Evicts oldest groups until the store is back within its limit.
    pub fn enforce_capacity(&self) -> Vec<Group> {
        let len = self.groups.len();
        if len <= self.max_groups {
            return Vec::new();
        }
        self.evict_oldest(len - self.max_groups)
    }

    fn evict_oldest(&self, count: usize) -> Vec<Group> {
        let mut candidates = self.snapshot();
        candidates.sort_by_key(|summary| summary.created_at);
        candidates
            .into_iter()
            .filter_map(|summary| {
                // Skip a key that was flushed and re-created since the snapshot.
                self.groups
                    .remove_if(&summary.key, |_, group| {
                        group.created_at == summary.created_at
                    })
                    .map(|(_, group)| group)
            })
            .take(count)
            .collect()
    }

    /// Removes every live group, oldest first.
    pub fn drain(&self) -> Vec<Group> {
        let mut keys = self.snapshot();
        keys.sort_by_key(|summary| summary.created_at);
        keys.into_iter()
            .filter_map(|summary| self.remove(&summary.key))
            .collect()
    }
}

impl fmt::Debug for GroupStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupStore")
            .field("len", &self.groups.len())
            .field("max_groups", &self.max_groups)
            .field("policy", &self.policy)
            .finish()
    }
}
