use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::estimator::FootprintEstimator;
use super::store::StatisticsStore;
use super::window::{compute_windows, Interval, TimeWindow};
use crate::datasource::introspector::{IntrospectionError, TableIntrospector};
use crate::db::entities::monitor_config;
use crate::db::services::statistics_service::NewStatistic;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Datasource '{data_source}' unavailable: {source}")]
    DatasourceUnavailable {
        data_source: String,
        #[source]
        source: IntrospectionError,
    },
    #[error("Failed to record windows: {0}")]
    Persist(#[from] DbErr),
    #[error("Configuration {0} no longer exists; nothing recorded")]
    ConfigurationGone(i64),
}

/// What one configuration's run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigRunOutcome {
    pub windows_planned: usize,
    pub windows_persisted: usize,
    pub windows_skipped: usize,
    pub rows_counted: i64,
    pub estimated_bytes: i64,
    /// Checkpoint written by this run, if any window was persisted.
    pub checkpoint: Option<DateTime<Utc>>,
    /// A persist failure ended catch-up before the last planned window.
    pub stopped_early: bool,
}

/// Runs the measure, estimate, persist loop for one configuration.
pub struct WindowEngine {
    introspector: Arc<dyn TableIntrospector>,
    estimator: Arc<FootprintEstimator>,
    statistics: Arc<dyn StatisticsStore>,
}

impl WindowEngine {
    pub fn new(
        introspector: Arc<dyn TableIntrospector>,
        estimator: Arc<FootprintEstimator>,
        statistics: Arc<dyn StatisticsStore>,
    ) -> Self {
        Self {
            introspector,
            estimator,
            statistics,
        }
    }

    /// Measures every window due for `config` at `now`.
    ///
    /// A window whose count fails is skipped and the loop moves on. The
    /// measured records and the new checkpoint are then committed together,
    /// so a failed commit leaves neither behind and the next tick measures
    /// the same windows again. A record rejected inside the commit ends
    /// catch-up there; the checkpoint moves to the end of the last stored one.
    #[instrument(
        skip_all,
        fields(config = %config.config_name, data_source = %config.data_source_name, table = %config.table_name)
    )]
    pub async fn run_config(
        &self,
        config: &monitor_config::Model,
        now: DateTime<Utc>,
    ) -> Result<ConfigRunOutcome, EngineError> {
        let interval = Interval::from_config(config);
        if !interval.unit.is_recognized() {
            warn!(
                interval_type = %config.interval_type,
                interval_value = config.interval_value,
                "Unrecognized interval unit, treating the value as minutes."
            );
        }

        self.introspector
            .check_datasource(&config.data_source_name)
            .await
            .map_err(|source| EngineError::DatasourceUnavailable {
                data_source: config.data_source_name.clone(),
                source,
            })?;

        let windows = compute_windows(config.last_checkpoint, &interval, now);
        let mut outcome = ConfigRunOutcome {
            windows_planned: windows.len(),
            ..ConfigRunOutcome::default()
        };
        if windows.is_empty() {
            debug!(last_checkpoint = ?config.last_checkpoint, "Nothing to measure.");
            return Ok(outcome);
        }
        if config.last_checkpoint.is_none() {
            info!(start = %windows[0].start, end = %windows[0].end, "First run for configuration.");
        } else if windows.len() > 1 {
            info!(windows = windows.len(), "Catching up from last checkpoint.");
        }

        let column_type = config.time_column_kind();
        let mut records = Vec::with_capacity(windows.len());

        for window in &windows {
            let rows = match self
                .introspector
                .count_increment(
                    &config.data_source_name,
                    &config.table_name,
                    &config.time_column_name,
                    column_type,
                    window,
                )
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(start = %window.start, end = %window.end, error = %e, "Failed to count window, skipping it.");
                    outcome.windows_skipped += 1;
                    continue;
                }
            };

            let estimate = self
                .estimator
                .estimate(&config.data_source_name, &config.table_name, rows)
                .await;

            debug!(
                start = %window.start,
                end = %window.end,
                rows,
                estimated_bytes = estimate.total_bytes,
                "Measured window."
            );
            records.push(build_record(config, window, rows, estimate, now));
        }

        if records.is_empty() {
            return Ok(outcome);
        }

        let totals: Vec<(i64, i64)> = records
            .iter()
            .map(|r| (r.increment_count, r.estimated_disk_size_bytes))
            .collect();
        let recorded = match self.statistics.record_windows(config.id, records).await {
            Ok(recorded) => recorded,
            Err(DbErr::RecordNotFound(_)) => return Err(EngineError::ConfigurationGone(config.id)),
            Err(e) => {
                error!(error = %e, "Failed to commit measured windows, nothing recorded.");
                return Err(e.into());
            }
        };

        for (rows, bytes) in totals.iter().take(recorded.persisted) {
            outcome.rows_counted += rows;
            outcome.estimated_bytes += bytes;
        }
        outcome.windows_persisted = recorded.persisted;
        outcome.checkpoint = recorded.checkpoint;
        outcome.stopped_early = recorded.stopped_early;

        info!(
            persisted = outcome.windows_persisted,
            skipped = outcome.windows_skipped,
            rows = outcome.rows_counted,
            estimated_bytes = outcome.estimated_bytes,
            checkpoint = ?outcome.checkpoint,
            "Configuration run finished."
        );
        Ok(outcome)
    }
}

fn build_record(
    config: &monitor_config::Model,
    window: &TimeWindow,
    rows: i64,
    estimate: super::estimator::FootprintEstimate,
    now: DateTime<Utc>,
) -> NewStatistic {
    NewStatistic {
        config_id: Some(config.id),
        data_source_name: config.data_source_name.clone(),
        table_name: config.table_name.clone(),
        statistic_time: now,
        start_time: window.start,
        end_time: window.end,
        increment_count: rows,
        estimated_disk_size_bytes: estimate.total_bytes,
        avg_row_size_bytes: estimate.avg_row_size_bytes,
        interval_type: config.interval_type.clone(),
        interval_value: config.interval_value,
        additional_info: Some(json!({
            "config_name": config.config_name,
            "time_column": config.time_column_name,
            "row_size_source": estimate.source.map(|s| s.as_str()),
        })),
    }
}
