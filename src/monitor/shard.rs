//! Deterministic partitioning of configurations across uncoordinated workers.
//!
//! A configuration with persistent id `id` belongs to shard `id mod total`.
//! The rule depends on nothing but the id and the shard count, so workers
//! need no locking or leader election between them.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::db::entities::monitor_config;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShardSpecError {
    #[error("shard spec '{0}' must have the form '<index>/<total>'")]
    Malformed(String),
    #[error("shard spec '{0}' contains a non-numeric index or total")]
    NonNumeric(String),
    #[error("shard index {index} is out of range for total {total}; need 0 <= index < total")]
    OutOfRange { index: i64, total: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ShardSpec {
    pub index: u32,
    pub total: u32,
}

impl ShardSpec {
    /// Parses `"<index>/<total>"`, surrounding whitespace allowed.
    pub fn parse(raw: &str) -> Result<Self, ShardSpecError> {
        let (index, total) = raw
            .trim()
            .split_once('/')
            .ok_or_else(|| ShardSpecError::Malformed(raw.to_string()))?;
        let (index, total) = (index.trim(), total.trim());
        if index.is_empty() || total.is_empty() {
            return Err(ShardSpecError::Malformed(raw.to_string()));
        }

        let index: i64 = index
            .parse()
            .map_err(|_| ShardSpecError::NonNumeric(raw.to_string()))?;
        let total: i64 = total
            .parse()
            .map_err(|_| ShardSpecError::NonNumeric(raw.to_string()))?;

        if total < 1 || index < 0 || index >= total || total > i64::from(u32::MAX) {
            return Err(ShardSpecError::OutOfRange { index, total });
        }

        Ok(Self {
            index: index as u32,
            total: total as u32,
        })
    }

    pub fn owns(&self, config_id: i64) -> bool {
        config_id.rem_euclid(i64::from(self.total)) == i64::from(self.index)
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}

/// The subset of `configs` owned by `spec`, in input order.
pub fn assign(configs: Vec<monitor_config::Model>, spec: &ShardSpec) -> Vec<monitor_config::Model> {
    configs.into_iter().filter(|c| spec.owns(c.id)).collect()
}
