use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of a configuration's monitoring interval.
///
/// Stored as free text in `monitor_configs.interval_type`. Values outside the
/// three known units are kept as `Unrecognized` and sized as minutes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
    Unrecognized(String),
}

impl IntervalUnit {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "MINUTES" => IntervalUnit::Minutes,
            "HOURS" => IntervalUnit::Hours,
            "DAYS" => IntervalUnit::Days,
            _ => IntervalUnit::Unrecognized(raw.to_string()),
        }
    }

    /// Number of minutes in one unit.
    pub fn minutes_per_unit(&self) -> i64 {
        match self {
            IntervalUnit::Minutes => 1,
            IntervalUnit::Hours => 60,
            IntervalUnit::Days => 24 * 60,
            IntervalUnit::Unrecognized(_) => 1,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, IntervalUnit::Unrecognized(_))
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalUnit::Minutes => write!(f, "MINUTES"),
            IntervalUnit::Hours => write!(f, "HOURS"),
            IntervalUnit::Days => write!(f, "DAYS"),
            IntervalUnit::Unrecognized(raw) => write!(f, "{raw}"),
        }
    }
}

/// How the monitored time column stores instants, which decides the type of
/// the bound range parameters in the count query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeColumnType {
    /// DATETIME, TIMESTAMP, DATE and friends.
    DateTime,
    /// Integer milliseconds since the Unix epoch.
    EpochMillis,
    /// Integer seconds since the Unix epoch.
    EpochSeconds,
}

impl TimeColumnType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BIGINT" | "LONG" | "EPOCH_MILLIS" | "EPOCH_MS" | "MILLIS" => TimeColumnType::EpochMillis,
            "INT" | "INTEGER" | "EPOCH_SECONDS" | "EPOCH_SECS" | "SECONDS" => {
                TimeColumnType::EpochSeconds
            }
            _ => TimeColumnType::DateTime,
        }
    }
}

impl fmt::Display for TimeColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
