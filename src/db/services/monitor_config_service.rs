//! Queries over `monitor_configs` plus the checks a configuration must pass
//! before any of its tables is touched.

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder,
};
use std::collections::HashMap;
use thiserror::Error;

use crate::datasource::identifiers::{
    validate_column_name, validate_datasource_name, validate_table_name, IdentifierError,
};
use crate::db::entities::monitor_config;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("Configuration '{config}': {field} is required")]
    MissingField { config: String, field: &'static str },
    #[error("Configuration '{config}': interval value must be greater than 0, got {value}")]
    NonPositiveInterval { config: String, value: i32 },
    #[error("Configuration '{config}': {source}")]
    UnsafeIdentifier {
        config: String,
        #[source]
        source: IdentifierError,
    },
    #[error("Table '{table}' on datasource '{data_source}' is monitored by both '{first}' and '{second}'")]
    DuplicateTarget {
        data_source: String,
        table: String,
        first: String,
        second: String,
    },
}

pub async fn find_enabled(db: &DatabaseConnection) -> Result<Vec<monitor_config::Model>, DbErr> {
    monitor_config::Entity::find()
        .filter(monitor_config::Column::Enabled.eq(true))
        .order_by_asc(monitor_config::Column::Id)
        .all(db)
        .await
}

pub async fn find_all(db: &DatabaseConnection) -> Result<Vec<monitor_config::Model>, DbErr> {
    monitor_config::Entity::find()
        .order_by_asc(monitor_config::Column::Id)
        .all(db)
        .await
}

pub async fn find_by_id(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<monitor_config::Model>, DbErr> {
    monitor_config::Entity::find_by_id(id).one(db).await
}

pub async fn find_by_data_source_and_table(
    db: &DatabaseConnection,
    data_source_name: &str,
    table_name: &str,
) -> Result<Option<monitor_config::Model>, DbErr> {
    monitor_config::Entity::find()
        .filter(monitor_config::Column::DataSourceName.eq(data_source_name))
        .filter(monitor_config::Column::TableName.eq(table_name))
        .one(db)
        .await
}

/// Returns `false` when no configuration with `id` exists.
pub async fn update_last_checkpoint<C: ConnectionTrait>(
    db: &C,
    id: i64,
    checkpoint: DateTime<Utc>,
) -> Result<bool, DbErr> {
    let result = monitor_config::Entity::update_many()
        .col_expr(monitor_config::Column::LastCheckpoint, Expr::value(checkpoint))
        .col_expr(monitor_config::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(monitor_config::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

fn display_name(config: &monitor_config::Model) -> String {
    if config.config_name.trim().is_empty() {
        format!("#{}", config.id)
    } else {
        config.config_name.clone()
    }
}

/// Structural checks only. An unrecognized interval unit passes and is
/// sized as minutes downstream.
pub fn validate_config(config: &monitor_config::Model) -> Result<(), ConfigValidationError> {
    let name = display_name(config);
    let required = [
        ("config_name", &config.config_name),
        ("data_source_name", &config.data_source_name),
        ("table_name", &config.table_name),
        ("time_column_name", &config.time_column_name),
        ("time_column_type", &config.time_column_type),
        ("interval_type", &config.interval_type),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(ConfigValidationError::MissingField {
            config: name,
            field: *field,
        });
    }

    if config.interval_value <= 0 {
        return Err(ConfigValidationError::NonPositiveInterval {
            config: name,
            value: config.interval_value,
        });
    }

    validate_datasource_name(&config.data_source_name)
        .and_then(|_| validate_table_name(&config.table_name))
        .and_then(|_| validate_column_name(&config.time_column_name))
        .map_err(|source| ConfigValidationError::UnsafeIdentifier {
            config: name,
            source,
        })
}

/// Fails on the first (datasource, table) pair claimed by two configurations.
pub fn ensure_unique_targets(
    configs: &[monitor_config::Model],
) -> Result<(), ConfigValidationError> {
    let mut seen: HashMap<(&str, &str), &str> = HashMap::new();
    for config in configs {
        let key = (config.data_source_name.as_str(), config.table_name.as_str());
        if let Some(first) = seen.insert(key, config.config_name.as_str()) {
            return Err(ConfigValidationError::DuplicateTarget {
                data_source: config.data_source_name.clone(),
                table: config.table_name.clone(),
                first: first.to_string(),
                second: config.config_name.clone(),
            });
        }
    }
    Ok(())
}
