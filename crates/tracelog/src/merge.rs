// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-field merge strategies.
//!
//! Every auxiliary field of an incoming record is folded into its group with
//! the strategy registered for that field name, or the table default when none
//! is. The key field is skipped and the message field always accumulates into
//! [`Group::messages`], so neither can be given a strategy.
//!
//! New strategies plug in through the [`MergeStrategy`] trait:
//!
//! ```rust,ignore
//! #[derive(Debug)]
//! struct Longest;
//!
//! impl MergeStrategy for Longest {
//!     fn merge(&self, current: Option<&Value>, incoming: Value) -> Value {
//!         match current {
//!             Some(cur) if cur.to_string().len() >= incoming.to_string().len() => cur.clone(),
//!             _ => incoming,
//!         }
//!     }
//! }
//!
//! table.register("path", Arc::new(Longest))?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Instant;

use crate::constants::{DEFAULT_KEY_FIELD, DEFAULT_MESSAGE_FIELD, MESSAGE_SEPARATOR};
use crate::errors::ConfigError;
use crate::group::Group;
use crate::record::{Record, Value};

/// Combines the value already held by a group with an incoming one.
pub trait MergeStrategy: Send + Sync + fmt::Debug {
    /// `current` is `None` the first time the field is seen for a group.
    fn merge(&self, current: Option<&Value>, incoming: Value) -> Value;
}

/// Strategies available by name from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    ConcatNewline,
    KeepLatest,
    KeepFirst,
    Sum,
    Max,
    Min,
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::ConcatNewline,
        Builtin::KeepLatest,
        Builtin::KeepFirst,
        Builtin::Sum,
        Builtin::Max,
        Builtin::Min,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Builtin::ConcatNewline => "concat-newline",
            Builtin::KeepLatest => "keep-latest",
            Builtin::KeepFirst => "keep-first",
            Builtin::Sum => "sum",
            Builtin::Max => "max",
            Builtin::Min => "min",
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Builtin {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Builtin::ALL
            .into_iter()
            .find(|b| b.as_str() == name)
            .ok_or_else(|| ConfigError::UnknownStrategy(s.to_string()))
    }
}

/// Applies an arithmetic operation when both sides are numeric.
///
/// Two integers stay an integer (signed or unsigned, saturating at the
/// bounds); any float operand makes the result a float. A non-numeric
/// operand on either side falls back to keep-latest.
fn numeric(
    current: Option<&Value>,
    incoming: Value,
    int_op: fn(i128, i128) -> i128,
    float_op: fn(f64, f64) -> f64,
) -> Value {
    let Some(current) = current else {
        return incoming;
    };
    if let (Some(a), Some(b)) = (current.as_i128(), incoming.as_i128()) {
        return Value::from_i128(int_op(a, b));
    }
    match (current.as_f64(), incoming.as_f64()) {
        (Some(a), Some(b)) => Value::Float(float_op(a, b)),
        _ => incoming,
    }
}

impl MergeStrategy for Builtin {
    fn merge(&self, current: Option<&Value>, incoming: Value) -> Value {
        match self {
            Builtin::KeepLatest => incoming,
            Builtin::KeepFirst => current.cloned().unwrap_or(incoming),
            Builtin::ConcatNewline => match current {
                Some(cur) => Value::Str(format!("{cur}{MESSAGE_SEPARATOR}{incoming}")),
                None => incoming,
            },
            Builtin::Sum => numeric(current, incoming, i128::saturating_add, |a, b| a + b),
            Builtin::Max => numeric(current, incoming, i128::max, f64::max),
            Builtin::Min => numeric(current, incoming, i128::min, f64::min),
        }
    }
}

/// Field name to strategy registry, plus the merge loop itself.
#[derive(Clone, Debug)]
pub struct MergeTable {
    key_field: String,
    message_field: String,
    default: Arc<dyn MergeStrategy>,
    strategies: HashMap<String, Arc<dyn MergeStrategy>>,
}

impl Default for MergeTable {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_FIELD, DEFAULT_MESSAGE_FIELD)
    }
}

impl MergeTable {
    /// Creates a table where every auxiliary field is keep-latest.
    #[must_use]
    pub fn new(key_field: impl Into<String>, message_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            message_field: message_field.into(),
            default: Arc::new(Builtin::KeepLatest),
            strategies: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_default(mut self, strategy: Arc<dyn MergeStrategy>) -> Self {
        self.default = strategy;
        self
    }

    #[must_use]
    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    #[must_use]
    pub fn message_field(&self) -> &str {
        &self.message_field
    }

    /// Registers `strategy` for `field`, replacing any earlier registration.
    pub fn register(
        &mut self,
        field: impl Into<String>,
        strategy: Arc<dyn MergeStrategy>,
    ) -> Result<(), ConfigError> {
        let field = field.into();
        if field == self.key_field || field == self.message_field {
            return Err(ConfigError::ReservedField(field));
        }
        self.strategies.insert(field, strategy);
        Ok(())
    }

    #[must_use]
    pub fn strategy_for(&self, field: &str) -> &dyn MergeStrategy {
        self.strategies
            .get(field)
            .map_or(self.default.as_ref(), |strategy| strategy.as_ref())
    }

    /// Folds `record` into `group`.
    ///
    /// Pure apart from the group mutation: no I/O, no clock reads.
    pub fn merge(&self, group: &mut Group, record: Record, now: Instant) {
        for (name, value) in record {
            if name == self.key_field {
                continue;
            }
            if name == self.message_field {
                match value {
                    Value::Str(message) => group.messages.push(message),
                    Value::Other(serde_json::Value::Null) => {}
                    other => group.messages.push(other.to_string()),
                }
                continue;
            }

            let strategy = self.strategy_for(&name);
            match group.fields.get_mut(&name) {
                Some(slot) => {
                    let merged = strategy.merge(Some(&*slot), value);
                    *slot = merged;
                }
                None => {
                    let merged = strategy.merge(None, value);
                    group.fields.insert(name, merged);
                }
            }
        }

        group.record_count += 1;
        group.last_updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplicate::duplicate_item;
    use std::time::Duration;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().cloned().collect()
    }

    #[duplicate_item(
        test_name                   name                expected;
        [test_parse_concat_newline] ["concat-newline"]  [Builtin::ConcatNewline];
        [test_parse_keep_latest]    ["keep-latest"]     [Builtin::KeepLatest];
        [test_parse_keep_first]     ["keep-first"]      [Builtin::KeepFirst];
        [test_parse_sum]            ["sum"]             [Builtin::Sum];
        [test_parse_max]            [" MAX "]           [Builtin::Max];
        [test_parse_min]            ["min"]             [Builtin::Min];
    )]
    #[test]
    fn test_name() {
        let parsed: Builtin = name.parse().unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string().parse::<Builtin>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_strategy() {
        let err = "average".parse::<Builtin>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStrategy(name) if name == "average"));
    }

    #[test]
    fn test_builtin_keep_strategies() {
        let cur = Value::Int(200);
        assert_eq!(Builtin::KeepLatest.merge(Some(&cur), Value::Int(500)), Value::Int(500));
        assert_eq!(Builtin::KeepFirst.merge(Some(&cur), Value::Int(500)), Value::Int(200));
        assert_eq!(Builtin::KeepFirst.merge(None, Value::Int(500)), Value::Int(500));
    }

    #[test]
    fn test_builtin_numeric_strategies() {
        let cur = Value::Int(10);
        assert_eq!(Builtin::Sum.merge(Some(&cur), Value::Int(5)), Value::Int(15));
        assert_eq!(Builtin::Max.merge(Some(&cur), Value::Int(5)), Value::Int(10));
        assert_eq!(Builtin::Min.merge(Some(&cur), Value::Int(5)), Value::Int(5));
        assert_eq!(Builtin::Sum.merge(Some(&cur), Value::Float(0.5)), Value::Float(10.5));
        assert_eq!(
            Builtin::Sum.merge(Some(&Value::Int(i64::MAX)), Value::Int(1)),
            Value::UInt(1 << 63)
        );
        assert_eq!(
            Builtin::Sum.merge(Some(&Value::UInt(u64::MAX)), Value::Int(1)),
            Value::UInt(u64::MAX)
        );
        assert_eq!(
            Builtin::Max.merge(Some(&Value::Int(-1)), Value::UInt(u64::MAX)),
            Value::UInt(u64::MAX)
        );
        assert_eq!(
            Builtin::Min.merge(Some(&Value::UInt(u64::MAX)), Value::Int(-1)),
            Value::Int(-1)
        );
    }

    #[test]
    fn test_builtin_numeric_falls_back_to_latest() {
        let cur = Value::from("fast");
        assert_eq!(Builtin::Sum.merge(Some(&cur), Value::Int(5)), Value::Int(5));
        assert_eq!(
            Builtin::Max.merge(Some(&Value::Int(5)), Value::from("slow")),
            Value::from("slow")
        );
    }

    #[test]
    fn test_builtin_concat_newline_on_field() {
        let merged = Builtin::ConcatNewline.merge(Some(&Value::from("a")), Value::from("b"));
        assert_eq!(merged, Value::from("a\nb"));
    }

    #[test]
    fn test_merge_messages_in_order_and_latest_wins() {
        let table = MergeTable::default();
        let start = Instant::now();
        let mut group = Group::new("abc", start);

        table.merge(
            &mut group,
            record(&[
                ("traceId", Value::from("abc")),
                ("message", Value::from("m1")),
                ("status", Value::Int(200)),
            ]),
            start,
        );
        let later = start + Duration::from_secs(1);
        table.merge(
            &mut group,
            record(&[
                ("traceId", Value::from("abc")),
                ("message", Value::from("m2")),
                ("status", Value::Int(500)),
                ("latencyMs", Value::Int(52)),
            ]),
            later,
        );

        assert_eq!(group.messages, vec!["m1", "m2"]);
        assert_eq!(group.fields.get("status"), Some(&Value::Int(500)));
        assert_eq!(group.fields.get("latencyMs"), Some(&Value::Int(52)));
        assert!(!group.fields.contains_key("traceId"));
        assert_eq!(group.record_count, 2);
        assert_eq!(group.created_at, start);
        assert_eq!(group.last_updated_at, later);
    }

    #[test]
    fn test_merge_uses_registered_strategy() {
        let mut table = MergeTable::default();
        table.register("latencyMs", Arc::new(Builtin::Sum)).unwrap();
        table.register("path", Arc::new(Builtin::KeepFirst)).unwrap();
        let now = Instant::now();
        let mut group = Group::new("abc", now);

        for (latency, path) in [(10, "/hello"), (32, "/other")] {
            table.merge(
                &mut group,
                record(&[
                    ("latencyMs", Value::Int(latency)),
                    ("path", Value::from(path)),
                ]),
                now,
            );
        }

        assert_eq!(group.fields.get("latencyMs"), Some(&Value::Int(42)));
        assert_eq!(group.fields.get("path"), Some(&Value::from("/hello")));
        assert!(group.messages.is_empty());
    }

    #[test]
    fn test_merge_custom_strategy() {
        #[derive(Debug)]
        struct Count;

        impl MergeStrategy for Count {
            fn merge(&self, current: Option<&Value>, _incoming: Value) -> Value {
                match current {
                    Some(Value::Int(n)) => Value::Int(n + 1),
                    _ => Value::Int(1),
                }
            }
        }

        let mut table = MergeTable::default();
        table.register("attempt", Arc::new(Count)).unwrap();
        let now = Instant::now();
        let mut group = Group::new("abc", now);
        for _ in 0..3 {
            table.merge(&mut group, record(&[("attempt", Value::from("x"))]), now);
        }

        assert_eq!(group.fields.get("attempt"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_register_reserved_fields() {
        let mut table = MergeTable::default();
        assert!(matches!(
            table.register("traceId", Arc::new(Builtin::Sum)),
            Err(ConfigError::ReservedField(_))
        ));
        assert!(matches!(
            table.register("message", Arc::new(Builtin::KeepFirst)),
            Err(ConfigError::ReservedField(_))
        ));
    }

    #[test]
    fn test_merge_non_string_message_is_stringified() {
        let table = MergeTable::default();
        let now = Instant::now();
        let mut group = Group::new("abc", now);
        table.merge(&mut group, record(&[("message", Value::Int(7))]), now);
        table.merge(
            &mut group,
            record(&[("message", Value::Other(serde_json::Value::Null))]),
            now,
        );
        assert_eq!(group.messages, vec!["7"]);
    }

    #[test]
    fn test_with_default_strategy() {
        let table = MergeTable::default().with_default(Arc::new(Builtin::KeepFirst));
        let now = Instant::now();
        let mut group = Group::new("abc", now);
        table.merge(&mut group, record(&[("status", Value::Int(200))]), now);
        table.merge(&mut group, record(&[("status", Value::Int(500))]), now);
        assert_eq!(group.fields.get("status"), Some(&Value::Int(200)));
    }
}
