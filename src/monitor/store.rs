use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};
use std::sync::Arc;
use tracing::error;

use crate::db::entities::monitor_config;
use crate::db::services::monitor_config_service;
use crate::db::services::statistics_service::{self, NewStatistic};

/// Where monitoring configurations come from.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn list_enabled(&self) -> Result<Vec<monitor_config::Model>, DbErr>;
}

/// What [`StatisticsStore::record_windows`] committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedWindows {
    /// Leading records that were stored.
    pub persisted: usize,
    /// End of the last stored record, now the configuration's checkpoint.
    pub checkpoint: Option<DateTime<Utc>>,
    /// A record was rejected and the ones after it were not attempted.
    pub stopped_early: bool,
}

#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// Stores `records` in order and moves the checkpoint of `config_id` to
    /// the end of the last stored one, as a single unit of work.
    ///
    /// A rejected record stops the sequence; the records before it and the
    /// matching checkpoint are still committed. Any other failure, including
    /// a missing configuration (`DbErr::RecordNotFound`), commits nothing.
    async fn record_windows(
        &self,
        config_id: i64,
        records: Vec<NewStatistic>,
    ) -> Result<RecordedWindows, DbErr>;
}

/// Both stores backed by the monitor database.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl ConfigStore for SeaOrmStore {
    async fn list_enabled(&self) -> Result<Vec<monitor_config::Model>, DbErr> {
        monitor_config_service::find_enabled(&self.db).await
    }
}

#[async_trait]
impl StatisticsStore for SeaOrmStore {
    async fn record_windows(
        &self,
        config_id: i64,
        records: Vec<NewStatistic>,
    ) -> Result<RecordedWindows, DbErr> {
        let txn = self.db.begin().await?;
        let mut recorded = RecordedWindows::default();

        for record in records {
            let end = record.end_time;
            // Savepoint per record so a rejected insert keeps the earlier ones.
            let savepoint = txn.begin().await?;
            match statistics_service::insert_statistic(&savepoint, record).await {
                Ok(_) => {
                    savepoint.commit().await?;
                    recorded.persisted += 1;
                    recorded.checkpoint = Some(end);
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    error!(
                        config_id,
                        end = %end,
                        error = %e,
                        "Failed to persist statistic, stopping catch-up."
                    );
                    recorded.stopped_early = true;
                    break;
                }
            }
        }

        if let Some(checkpoint) = recorded.checkpoint {
            if !monitor_config_service::update_last_checkpoint(&txn, config_id, checkpoint).await? {
                txn.rollback().await?;
                return Err(DbErr::RecordNotFound(format!(
                    "monitor configuration {config_id}"
                )));
            }
        }

        txn.commit().await?;
        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::monitor_statistic;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn new_statistic() -> NewStatistic {
        NewStatistic {
            config_id: Some(1),
            data_source_name: "primary".to_string(),
            table_name: "orders".to_string(),
            statistic_time: t0(),
            start_time: t0() - chrono::Duration::minutes(10),
            end_time: t0(),
            increment_count: 5,
            estimated_disk_size_bytes: 500,
            avg_row_size_bytes: 100,
            interval_type: "MINUTES".to_string(),
            interval_value: 10,
            additional_info: None,
        }
    }

    fn stored(new: &NewStatistic) -> monitor_statistic::Model {
        monitor_statistic::Model {
            id: 1,
            config_id: new.config_id,
            data_source_name: new.data_source_name.clone(),
            table_name: new.table_name.clone(),
            statistic_time: new.statistic_time,
            start_time: new.start_time,
            end_time: new.end_time,
            increment_count: new.increment_count,
            estimated_disk_size_bytes: new.estimated_disk_size_bytes,
            avg_row_size_bytes: new.avg_row_size_bytes,
            interval_type: new.interval_type.clone(),
            interval_value: new.interval_value,
            created_at: t0(),
            additional_info: None,
        }
    }

    #[tokio::test]
    async fn test_records_and_checkpoint_commit_together() {
        let new = new_statistic();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![stored(&new)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let store = SeaOrmStore::new(Arc::new(db));

        let recorded = store.record_windows(1, vec![new]).await.unwrap();

        assert_eq!(
            recorded,
            RecordedWindows {
                persisted: 1,
                checkpoint: Some(t0()),
                stopped_early: false,
            }
        );
    }

    #[tokio::test]
    async fn test_missing_configuration_rolls_back() {
        let new = new_statistic();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![stored(&new)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let store = SeaOrmStore::new(Arc::new(db));

        let err = store.record_windows(9, vec![new]).await.unwrap_err();
        assert!(matches!(err, DbErr::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_nothing_to_record_leaves_checkpoint_alone() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let store = SeaOrmStore::new(Arc::new(db));

        let recorded = store.record_windows(1, Vec::new()).await.unwrap();
        assert_eq!(recorded, RecordedWindows::default());
    }
}
