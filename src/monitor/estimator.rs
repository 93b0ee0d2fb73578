//! Disk footprint estimation for row increments.
//!
//! The average row size of a table is resolved through an ordered list of
//! strategies, first positive answer wins, and cached per (datasource, table)
//! for a configurable time-to-live.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::datasource::introspector::{ColumnMetadata, TableIntrospector, TableStatistics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSizeStrategy {
    /// Average row length reported by the engine's table statistics.
    EngineAvgRowLength,
    /// Reported data length divided by reported row count.
    DataLengthPerRow,
    /// Sum of per-column type widths, inflated by the storage overhead ratio.
    SchemaEstimate,
    ConfiguredDefault,
}

impl RowSizeStrategy {
    pub fn default_order() -> Vec<Self> {
        vec![
            RowSizeStrategy::EngineAvgRowLength,
            RowSizeStrategy::DataLengthPerRow,
            RowSizeStrategy::SchemaEstimate,
            RowSizeStrategy::ConfiguredDefault,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RowSizeStrategy::EngineAvgRowLength => "engine_avg_row_length",
            RowSizeStrategy::DataLengthPerRow => "data_length_per_row",
            RowSizeStrategy::SchemaEstimate => "schema_estimate",
            RowSizeStrategy::ConfiguredDefault => "configured_default",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorSettings {
    pub default_row_size_bytes: i64,
    pub storage_overhead_ratio: f64,
    pub index_overhead_ratio: f64,
    pub include_index_overhead: bool,
    pub cache_ttl: Duration,
    pub strategies: Vec<RowSizeStrategy>,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            default_row_size_bytes: 100,
            storage_overhead_ratio: 0.3,
            index_overhead_ratio: 0.25,
            include_index_overhead: false,
            cache_ttl: Duration::from_secs(30 * 60),
            strategies: RowSizeStrategy::default_order(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FootprintEstimate {
    pub total_bytes: i64,
    pub avg_row_size_bytes: i64,
    /// `None` when no rows were added and nothing was resolved.
    pub source: Option<RowSizeStrategy>,
}

impl FootprintEstimate {
    fn empty() -> Self {
        Self {
            total_bytes: 0,
            avg_row_size_bytes: 0,
            source: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedRowSize {
    bytes: i64,
    source: RowSizeStrategy,
    resolved_at: Instant,
}

pub struct FootprintEstimator {
    introspector: Arc<dyn TableIntrospector>,
    settings: EstimatorSettings,
    cache: DashMap<(String, String), CachedRowSize>,
}

impl FootprintEstimator {
    pub fn new(introspector: Arc<dyn TableIntrospector>, settings: EstimatorSettings) -> Self {
        Self {
            introspector,
            settings,
            cache: DashMap::new(),
        }
    }

    /// Estimated bytes taken by `increment_rows` new rows. Never fails; with
    /// no usable statistics it degrades to the configured default row size.
    /// Index overhead follows `include_index_overhead` from the settings.
    pub async fn estimate(
        &self,
        datasource: &str,
        table: &str,
        increment_rows: i64,
    ) -> FootprintEstimate {
        self.estimate_with_indexes(
            datasource,
            table,
            increment_rows,
            self.settings.include_index_overhead,
        )
        .await
    }

    /// Like [`estimate`](Self::estimate), with index overhead chosen by the caller.
    pub async fn estimate_with_indexes(
        &self,
        datasource: &str,
        table: &str,
        increment_rows: i64,
        include_indexes: bool,
    ) -> FootprintEstimate {
        if increment_rows <= 0 {
            return FootprintEstimate::empty();
        }

        let (avg_row_size_bytes, source) = self.avg_row_size(datasource, table).await;
        let mut total_bytes = avg_row_size_bytes.saturating_mul(increment_rows);
        if include_indexes {
            total_bytes = inflate(total_bytes, self.settings.index_overhead_ratio);
        }

        FootprintEstimate {
            total_bytes,
            avg_row_size_bytes,
            source: Some(source),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn evict(&self, datasource: &str, table: &str) {
        self.cache
            .remove(&(datasource.to_string(), table.to_string()));
    }

    async fn avg_row_size(&self, datasource: &str, table: &str) -> (i64, RowSizeStrategy) {
        let key = (datasource.to_string(), table.to_string());
        let cached = self.cache.get(&key).map(|entry| *entry);
        if let Some(entry) = cached {
            if entry.resolved_at.elapsed() < self.settings.cache_ttl {
                return (entry.bytes, entry.source);
            }
        }

        let (bytes, source) = self.resolve_row_size(datasource, table).await;
        debug!(
            datasource = %datasource,
            table = %table,
            avg_row_size_bytes = bytes,
            source = source.as_str(),
            "Resolved average row size."
        );
        self.cache.insert(
            key,
            CachedRowSize {
                bytes,
                source,
                resolved_at: Instant::now(),
            },
        );
        (bytes, source)
    }

    async fn resolve_row_size(&self, datasource: &str, table: &str) -> (i64, RowSizeStrategy) {
        // Both statistics strategies read the same catalog row; fetch it at most once.
        let mut statistics: Option<Option<TableStatistics>> = None;

        for strategy in &self.settings.strategies {
            let resolved = match strategy {
                RowSizeStrategy::EngineAvgRowLength => self
                    .statistics(datasource, table, &mut statistics)
                    .await
                    .and_then(|s| s.avg_row_length),
                RowSizeStrategy::DataLengthPerRow => self
                    .statistics(datasource, table, &mut statistics)
                    .await
                    .and_then(|s| match (s.data_length, s.row_count) {
                        (Some(data), Some(rows)) if rows > 0 => Some(data / rows),
                        _ => None,
                    }),
                RowSizeStrategy::SchemaEstimate => self.schema_estimate(datasource, table).await,
                RowSizeStrategy::ConfiguredDefault => Some(self.settings.default_row_size_bytes),
            };

            if let Some(bytes) = resolved.filter(|bytes| *bytes > 0) {
                return (bytes, *strategy);
            }
        }

        (
            self.settings.default_row_size_bytes,
            RowSizeStrategy::ConfiguredDefault,
        )
    }

    async fn statistics(
        &self,
        datasource: &str,
        table: &str,
        memo: &mut Option<Option<TableStatistics>>,
    ) -> Option<TableStatistics> {
        if memo.is_none() {
            let fetched = match self.introspector.table_statistics(datasource, table).await {
                Ok(stats) => stats,
                Err(e) => {
                    debug!(datasource = %datasource, table = %table, error = %e, "Table statistics unavailable.");
                    None
                }
            };
            *memo = Some(fetched);
        }
        memo.clone().flatten()
    }

    async fn schema_estimate(&self, datasource: &str, table: &str) -> Option<i64> {
        let columns = match self.introspector.column_metadata(datasource, table).await {
            Ok(columns) => columns,
            Err(e) => {
                debug!(datasource = %datasource, table = %table, error = %e, "Column metadata unavailable.");
                return None;
            }
        };
        if columns.is_empty() {
            return None;
        }
        let raw: i64 = columns.iter().map(column_size).sum();
        Some(inflate(raw, self.settings.storage_overhead_ratio))
    }
}

fn inflate(bytes: i64, ratio: f64) -> i64 {
    (bytes as f64 * (1.0 + ratio)).round() as i64
}

/// Per-row byte estimate for one column. Fixed-width types use their width,
/// variable-width types assume half the declared length or a flat band.
pub fn column_size(column: &ColumnMetadata) -> i64 {
    let data_type = column.data_type.to_ascii_lowercase();
    let base = data_type.split('(').next().unwrap_or("").trim();
    let declared = column.max_length.filter(|len| *len > 0);

    match base {
        "bit" | "bool" | "boolean" | "tinyint" | "year" => 1,
        "smallint" | "int2" | "smallserial" => 2,
        "mediumint" | "date" | "time" | "time without time zone" => 3,
        "int" | "integer" | "int4" | "serial" | "float" | "real" | "float4" => 4,
        "bigint" | "int8" | "bigserial" | "double" | "double precision" | "float8"
        | "datetime" | "timestamp" | "timestamp without time zone"
        | "timestamp with time zone" | "timestamptz" | "time with time zone" => 8,
        "decimal" | "numeric" => {
            let precision = column.numeric_precision.unwrap_or(10);
            ((precision + 2) / 2).max(4)
        }
        "uuid" => 16,
        "char" | "character" | "bpchar" | "binary" => declared.unwrap_or(1),
        "varchar" | "character varying" | "varbinary" => {
            declared.map_or(50, |len| (len / 2).max(1))
        }
        "tinytext" | "tinyblob" => 128,
        "text" | "json" | "jsonb" => 500,
        "mediumtext" => 5_000,
        "longtext" => 50_000,
        "blob" | "bytea" => 1_000,
        "mediumblob" => 10_000,
        "longblob" => 100_000,
        _ => 10,
    }
}

/// Human-readable byte count with two decimals above one KB.
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
