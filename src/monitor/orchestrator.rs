use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};

use super::engine::WindowEngine;
use super::shard::{assign, ShardSpec, ShardSpecError};
use super::store::ConfigStore;
use crate::db::services::monitor_config_service::{
    ensure_unique_targets, validate_config, ConfigValidationError,
};

/// Setup failures. Individual configuration failures never surface here.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid shard specification: {0}")]
    Shard(#[from] ShardSpecError),
    #[error("Failed to load monitor configurations: {0}")]
    LoadConfigs(#[from] DbErr),
    #[error("Invalid monitor configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub shard: Option<ShardSpec>,
    /// Configurations this run was responsible for.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct MonitorOrchestrator {
    engine: Arc<WindowEngine>,
    configs: Arc<dyn ConfigStore>,
}

impl MonitorOrchestrator {
    pub fn new(engine: Arc<WindowEngine>, configs: Arc<dyn ConfigStore>) -> Self {
        Self { engine, configs }
    }

    pub async fn run(&self, shard: Option<&str>) -> Result<RunSummary, OrchestratorError> {
        self.run_at(shard, Utc::now()).await
    }

    /// Runs every enabled configuration owned by `shard` against the clock `now`.
    ///
    /// The shard spec and every enabled configuration are validated before
    /// any monitored table is touched. Each configuration then runs in its own
    /// task, one after another, so an error or panic stays with that one.
    #[instrument(skip(self, now))]
    pub async fn run_at(
        &self,
        shard: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, OrchestratorError> {
        let shard = shard.map(ShardSpec::parse).transpose()?;

        let enabled = self.configs.list_enabled().await?;
        for config in &enabled {
            validate_config(config)?;
        }
        ensure_unique_targets(&enabled)?;

        let candidates = match &shard {
            Some(spec) => assign(enabled, spec),
            None => enabled,
        };
        info!(
            shard = ?shard.map(|s| s.to_string()),
            configs = candidates.len(),
            "Starting monitoring run."
        );

        let mut summary = RunSummary {
            shard,
            total: candidates.len(),
            succeeded: 0,
            failed: 0,
        };

        for config in candidates {
            let engine = self.engine.clone();
            let name = config.config_name.clone();
            let handle = tokio::spawn(async move { engine.run_config(&config, now).await });

            match handle.await {
                Ok(Ok(_)) => summary.succeeded += 1,
                Ok(Err(e)) => {
                    error!(config = %name, error = %e, "Monitoring configuration failed.");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(config = %name, error = %e, "Monitoring task aborted.");
                    summary.failed += 1;
                }
            }
        }

        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Monitoring run finished."
        );
        Ok(summary)
    }
}
