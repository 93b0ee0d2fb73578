//! Incremental row-growth monitoring for arbitrary database tables.
//!
//! The engine slices the time since each configuration's last checkpoint into
//! fixed windows, counts the rows that landed in every window, estimates the
//! disk footprint of that increment and records one statistic per window.

pub mod config;
pub mod datasource;
pub mod db;
pub mod monitor;

/// Build version, overridable at compile time through `MONITOR_VERSION`.
pub const VERSION: &str = match option_env!("MONITOR_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
