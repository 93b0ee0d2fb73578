//! Persistence and read accessors for `monitor_statistics`.
//!
//! Nothing here touches configuration checkpoints; reporting layers can call
//! these freely.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
};
use serde::Serialize;

use crate::db::entities::monitor_statistic;
use crate::monitor::estimator::format_bytes;

const LATEST_PER_TABLE_SQL: &str = r#"
    SELECT s.*
      FROM monitor_statistics s
      JOIN (SELECT MAX(id) AS latest_id
              FROM monitor_statistics
             GROUP BY data_source_name, table_name) latest
        ON latest.latest_id = s.id
     ORDER BY s.data_source_name, s.table_name
"#;

/// A statistic row as produced by the window engine, before it gets an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStatistic {
    pub config_id: Option<i64>,
    pub data_source_name: String,
    pub table_name: String,
    pub statistic_time: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub increment_count: i64,
    pub estimated_disk_size_bytes: i64,
    pub avg_row_size_bytes: i64,
    pub interval_type: String,
    pub interval_value: i32,
    pub additional_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskSpaceSummary {
    pub total_increment_count: i64,
    pub total_estimated_disk_size_bytes: i64,
    pub total_estimated_disk_size_formatted: String,
    pub monitored_tables_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl DiskSpaceSummary {
    /// Sums the given per-table records, which should be the latest one per table.
    pub fn from_latest(latest: &[monitor_statistic::Model], timestamp: DateTime<Utc>) -> Self {
        let total_increment_count = latest.iter().map(|s| s.increment_count).sum();
        let total_estimated_disk_size_bytes: i64 =
            latest.iter().map(|s| s.estimated_disk_size_bytes).sum();
        Self {
            total_increment_count,
            total_estimated_disk_size_bytes,
            total_estimated_disk_size_formatted: format_bytes(total_estimated_disk_size_bytes),
            monitored_tables_count: latest.len(),
            timestamp,
        }
    }
}

pub async fn insert_statistic<C: ConnectionTrait>(
    db: &C,
    new: NewStatistic,
) -> Result<monitor_statistic::Model, DbErr> {
    monitor_statistic::ActiveModel {
        config_id: Set(new.config_id),
        data_source_name: Set(new.data_source_name),
        table_name: Set(new.table_name),
        statistic_time: Set(new.statistic_time),
        start_time: Set(new.start_time),
        end_time: Set(new.end_time),
        increment_count: Set(new.increment_count),
        estimated_disk_size_bytes: Set(new.estimated_disk_size_bytes),
        avg_row_size_bytes: Set(new.avg_row_size_bytes),
        interval_type: Set(new.interval_type),
        interval_value: Set(new.interval_value),
        created_at: Set(Utc::now()),
        additional_info: Set(new.additional_info),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// The most recent record of every monitored (datasource, table).
pub async fn find_latest_per_table(
    db: &DatabaseConnection,
) -> Result<Vec<monitor_statistic::Model>, DbErr> {
    monitor_statistic::Entity::find()
        .from_raw_sql(Statement::from_string(
            db.get_database_backend(),
            LATEST_PER_TABLE_SQL,
        ))
        .all(db)
        .await
}

pub async fn find_latest_for_table(
    db: &DatabaseConnection,
    data_source_name: &str,
    table_name: &str,
) -> Result<Option<monitor_statistic::Model>, DbErr> {
    monitor_statistic::Entity::find()
        .filter(monitor_statistic::Column::DataSourceName.eq(data_source_name))
        .filter(monitor_statistic::Column::TableName.eq(table_name))
        .order_by_desc(monitor_statistic::Column::EndTime)
        .order_by_desc(monitor_statistic::Column::Id)
        .one(db)
        .await
}

/// Records whose window lies entirely inside `[start, end]`.
pub async fn find_by_time_range(
    db: &DatabaseConnection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<monitor_statistic::Model>, DbErr> {
    monitor_statistic::Entity::find()
        .filter(monitor_statistic::Column::StartTime.gte(start))
        .filter(monitor_statistic::Column::EndTime.lte(end))
        .order_by_asc(monitor_statistic::Column::StartTime)
        .order_by_asc(monitor_statistic::Column::Id)
        .all(db)
        .await
}

pub async fn find_by_table_and_time_range(
    db: &DatabaseConnection,
    data_source_name: &str,
    table_name: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<monitor_statistic::Model>, DbErr> {
    monitor_statistic::Entity::find()
        .filter(monitor_statistic::Column::DataSourceName.eq(data_source_name))
        .filter(monitor_statistic::Column::TableName.eq(table_name))
        .filter(monitor_statistic::Column::StartTime.gte(start))
        .filter(monitor_statistic::Column::EndTime.lte(end))
        .order_by_asc(monitor_statistic::Column::StartTime)
        .all(db)
        .await
}

/// Newest first, at most `limit` rows.
pub async fn find_by_config(
    db: &DatabaseConnection,
    config_id: i64,
    limit: u64,
) -> Result<Vec<monitor_statistic::Model>, DbErr> {
    monitor_statistic::Entity::find()
        .filter(monitor_statistic::Column::ConfigId.eq(config_id))
        .order_by_desc(monitor_statistic::Column::EndTime)
        .limit(limit)
        .all(db)
        .await
}

pub async fn count_for_table(
    db: &DatabaseConnection,
    data_source_name: &str,
    table_name: &str,
) -> Result<u64, DbErr> {
    monitor_statistic::Entity::find()
        .filter(monitor_statistic::Column::DataSourceName.eq(data_source_name))
        .filter(monitor_statistic::Column::TableName.eq(table_name))
        .count(db)
        .await
}

/// Retention sweep. Returns the number of deleted rows.
pub async fn purge_created_before(
    db: &DatabaseConnection,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbErr> {
    let result = monitor_statistic::Entity::delete_many()
        .filter(monitor_statistic::Column::CreatedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

pub async fn disk_space_summary(db: &DatabaseConnection) -> Result<DiskSpaceSummary, DbErr> {
    let latest = find_latest_per_table(db).await?;
    Ok(DiskSpaceSummary::from_latest(&latest, Utc::now()))
}
