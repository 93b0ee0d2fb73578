//! Read-only access to the monitored databases: row counts inside a time
//! window, engine-reported table statistics and column metadata.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, QueryResult, Statement, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::identifiers::{
    split_qualified, validate_column_name, validate_table_name, IdentifierError,
};
use super::router::{DatasourceError, DatasourceRouter};
use crate::db::enums::TimeColumnType;
use crate::monitor::window::TimeWindow;

#[derive(Error, Debug)]
pub enum IntrospectionError {
    #[error(transparent)]
    Datasource(#[from] DatasourceError),
    #[error("Invalid identifier: {0}")]
    Identifier(#[from] IdentifierError),
    #[error("Query failed: {0}")]
    Query(#[from] DbErr),
    #[error("Backend {0:?} does not expose table statistics")]
    Unsupported(DatabaseBackend),
    #[error("Query returned no rows")]
    EmptyResult,
}

impl IntrospectionError {
    pub fn is_datasource_unavailable(&self) -> bool {
        matches!(self, IntrospectionError::Datasource(e) if e.is_unavailable())
    }
}

/// Engine-reported statistics for a table. Every field is optional because
/// engines only fill them after the table has been analyzed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStatistics {
    pub row_count: Option<i64>,
    pub data_length: Option<i64>,
    pub index_length: Option<i64>,
    pub avg_row_length: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<i64>,
    pub numeric_precision: Option<i64>,
}

#[async_trait]
pub trait TableIntrospector: Send + Sync {
    /// Fails with a datasource error when the datasource cannot be used right now.
    async fn check_datasource(&self, datasource: &str) -> Result<(), IntrospectionError>;

    /// Rows whose `time_column` falls in `[window.start, window.end)`.
    async fn count_increment(
        &self,
        datasource: &str,
        table: &str,
        time_column: &str,
        column_type: TimeColumnType,
        window: &TimeWindow,
    ) -> Result<i64, IntrospectionError>;

    /// `Ok(None)` when the catalog has no entry for the table.
    async fn table_statistics(
        &self,
        datasource: &str,
        table: &str,
    ) -> Result<Option<TableStatistics>, IntrospectionError>;

    async fn column_metadata(
        &self,
        datasource: &str,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>, IntrospectionError>;
}

/// `TableIntrospector` over SQL datasources resolved through a [`DatasourceRouter`].
pub struct SqlIntrospector {
    router: Arc<DatasourceRouter>,
}

impl SqlIntrospector {
    pub fn new(router: Arc<DatasourceRouter>) -> Self {
        Self { router }
    }
}

pub fn build_count_sql(backend: DatabaseBackend, table: &str, time_column: &str) -> String {
    let (lower, upper) = match backend {
        DatabaseBackend::Postgres => ("$1", "$2"),
        _ => ("?", "?"),
    };
    format!(
        "SELECT COUNT(*) AS increment_count FROM {table} WHERE {time_column} >= {lower} AND {time_column} < {upper}"
    )
}

pub fn build_statistics_sql(backend: DatabaseBackend) -> Result<&'static str, IntrospectionError> {
    match backend {
        DatabaseBackend::Postgres => Ok(r#"
            SELECT CAST(c.reltuples AS BIGINT) AS row_count,
                   CAST(pg_relation_size(c.oid) AS BIGINT) AS data_length,
                   CAST(pg_indexes_size(c.oid) AS BIGINT) AS index_length,
                   (SELECT CAST(SUM(s.avg_width) AS BIGINT)
                      FROM pg_stats s
                     WHERE s.schemaname = n.nspname AND s.tablename = c.relname) AS avg_row_length
              FROM pg_class c
              JOIN pg_namespace n ON n.oid = c.relnamespace
             WHERE n.nspname::text = COALESCE(CAST($1 AS TEXT), current_schema()::text)
               AND c.relname::text = $2
               AND c.relkind IN ('r', 'p')
            "#),
        DatabaseBackend::MySql => Ok(r#"
            SELECT CAST(table_rows AS SIGNED) AS row_count,
                   CAST(data_length AS SIGNED) AS data_length,
                   CAST(index_length AS SIGNED) AS index_length,
                   CAST(avg_row_length AS SIGNED) AS avg_row_length
              FROM information_schema.tables
             WHERE table_schema = COALESCE(?, DATABASE())
               AND table_name = ?
            "#),
        other => Err(IntrospectionError::Unsupported(other)),
    }
}

pub fn build_columns_sql(backend: DatabaseBackend) -> Result<&'static str, IntrospectionError> {
    match backend {
        DatabaseBackend::Postgres => Ok(r#"
            SELECT CAST(column_name AS TEXT) AS column_name,
                   CAST(data_type AS TEXT) AS data_type,
                   CAST(character_maximum_length AS BIGINT) AS max_length,
                   CAST(numeric_precision AS BIGINT) AS numeric_precision
              FROM information_schema.columns
             WHERE CAST(table_schema AS TEXT) = COALESCE(CAST($1 AS TEXT), current_schema()::text)
               AND CAST(table_name AS TEXT) = $2
             ORDER BY ordinal_position
            "#),
        DatabaseBackend::MySql => Ok(r#"
            SELECT CAST(column_name AS CHAR) AS column_name,
                   CAST(data_type AS CHAR) AS data_type,
                   CAST(character_maximum_length AS SIGNED) AS max_length,
                   CAST(numeric_precision AS SIGNED) AS numeric_precision
              FROM information_schema.columns
             WHERE table_schema = COALESCE(?, DATABASE())
               AND table_name = ?
             ORDER BY ordinal_position
            "#),
        other => Err(IntrospectionError::Unsupported(other)),
    }
}

/// Bound parameters for the half-open window, typed after the column's storage.
pub fn window_bounds(
    backend: DatabaseBackend,
    column_type: TimeColumnType,
    window: &TimeWindow,
) -> [Value; 2] {
    match column_type {
        TimeColumnType::EpochMillis => [
            window.start.timestamp_millis().into(),
            window.end.timestamp_millis().into(),
        ],
        TimeColumnType::EpochSeconds => [window.start.timestamp().into(), window.end.timestamp().into()],
        TimeColumnType::DateTime => match backend {
            DatabaseBackend::Postgres => [window.start.into(), window.end.into()],
            _ => [
                window.start.naive_utc().into(),
                window.end.naive_utc().into(),
            ],
        },
    }
}

fn catalog_values(table: &str) -> Vec<Value> {
    let (schema, bare) = split_qualified(table);
    vec![schema.map(str::to_string).into(), bare.to_string().into()]
}

fn positive(value: Option<i64>) -> Option<i64> {
    value.filter(|v| *v > 0)
}

fn statistics_from_row(row: &QueryResult) -> Result<TableStatistics, DbErr> {
    Ok(TableStatistics {
        row_count: positive(row.try_get::<Option<i64>>("", "row_count")?),
        data_length: positive(row.try_get::<Option<i64>>("", "data_length")?),
        index_length: row.try_get::<Option<i64>>("", "index_length")?,
        avg_row_length: positive(row.try_get::<Option<i64>>("", "avg_row_length")?),
    })
}

fn column_from_row(row: &QueryResult) -> Result<ColumnMetadata, DbErr> {
    Ok(ColumnMetadata {
        name: row.try_get("", "column_name")?,
        data_type: row.try_get("", "data_type")?,
        max_length: row.try_get("", "max_length")?,
        numeric_precision: row.try_get("", "numeric_precision")?,
    })
}

#[async_trait]
impl TableIntrospector for SqlIntrospector {
    async fn check_datasource(&self, datasource: &str) -> Result<(), IntrospectionError> {
        let connection = self.router.resolve(datasource).await?;
        connection.ping().await.map_err(|e| DatasourceError::Unavailable {
            name: datasource.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn count_increment(
        &self,
        datasource: &str,
        table: &str,
        time_column: &str,
        column_type: TimeColumnType,
        window: &TimeWindow,
    ) -> Result<i64, IntrospectionError> {
        validate_table_name(table)?;
        validate_column_name(time_column)?;

        let connection = self.router.resolve(datasource).await?;
        let backend = connection.get_database_backend();
        let sql = build_count_sql(backend, table, time_column);
        let stmt =
            Statement::from_sql_and_values(backend, sql, window_bounds(backend, column_type, window));

        let row = connection
            .query_one(stmt)
            .await?
            .ok_or(IntrospectionError::EmptyResult)?;
        let count: i64 = row.try_get("", "increment_count")?;

        debug!(
            datasource = %datasource,
            table = %table,
            start = %window.start,
            end = %window.end,
            count,
            "Counted window increment."
        );
        Ok(count.max(0))
    }

    async fn table_statistics(
        &self,
        datasource: &str,
        table: &str,
    ) -> Result<Option<TableStatistics>, IntrospectionError> {
        validate_table_name(table)?;

        let connection = self.router.resolve(datasource).await?;
        let backend = connection.get_database_backend();
        let sql = build_statistics_sql(backend)?;
        let stmt = Statement::from_sql_and_values(backend, sql, catalog_values(table));

        match connection.query_one(stmt).await? {
            Some(row) => Ok(Some(statistics_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn column_metadata(
        &self,
        datasource: &str,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>, IntrospectionError> {
        validate_table_name(table)?;

        let connection = self.router.resolve(datasource).await?;
        let backend = connection.get_database_backend();
        let sql = build_columns_sql(backend)?;
        let stmt = Statement::from_sql_and_values(backend, sql, catalog_values(table));

        let rows = connection.query_all(stmt).await?;
        let columns = rows
            .iter()
            .map(column_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }
}
