//! In-memory stand-ins for the introspector and the stores.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::DbErr;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::store::{ConfigStore, RecordedWindows, StatisticsStore};
use super::window::TimeWindow;
use crate::datasource::introspector::{
    ColumnMetadata, IntrospectionError, TableIntrospector, TableStatistics,
};
use crate::datasource::router::DatasourceError;
use crate::db::entities::monitor_config;
use crate::db::enums::TimeColumnType;
use crate::db::services::statistics_service::NewStatistic;

pub fn config(id: i64, name: &str, data_source: &str, table: &str) -> monitor_config::Model {
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    monitor_config::Model {
        id,
        config_name: name.to_string(),
        data_source_name: data_source.to_string(),
        table_name: table.to_string(),
        time_column_name: "created_at".to_string(),
        time_column_type: "DATETIME".to_string(),
        enabled: true,
        interval_type: "MINUTES".to_string(),
        interval_value: 10,
        last_checkpoint: None,
        description: None,
        extend_config: None,
        created_at: created,
        updated_at: created,
    }
}

#[derive(Default)]
pub struct FakeIntrospector {
    statistics: Option<TableStatistics>,
    statistics_fail: bool,
    columns: Vec<ColumnMetadata>,
    unavailable: HashSet<String>,
    rows_per_window: i64,
    failing_windows: HashSet<DateTime<Utc>>,
    panic_tables: HashSet<String>,
    pub statistics_calls: AtomicUsize,
    pub column_calls: AtomicUsize,
    pub counted: Mutex<Vec<(String, TimeWindow)>>,
}

impl FakeIntrospector {
    pub fn with_statistics(mut self, statistics: TableStatistics) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn failing_statistics(mut self) -> Self {
        self.statistics_fail = true;
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnMetadata>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_rows_per_window(mut self, rows: i64) -> Self {
        self.rows_per_window = rows;
        self
    }

    /// The count for the window starting at `start` fails.
    pub fn failing_window_at(mut self, start: DateTime<Utc>) -> Self {
        self.failing_windows.insert(start);
        self
    }

    pub fn unavailable(mut self, data_source: &str) -> Self {
        self.unavailable.insert(data_source.to_string());
        self
    }

    pub fn panicking_on(mut self, table: &str) -> Self {
        self.panic_tables.insert(table.to_string());
        self
    }

    pub fn counted_tables(&self) -> Vec<String> {
        self.counted
            .lock()
            .unwrap()
            .iter()
            .map(|(table, _)| table.clone())
            .collect()
    }

    fn check(&self, data_source: &str) -> Result<(), IntrospectionError> {
        if self.unavailable.contains(data_source) {
            return Err(DatasourceError::Unavailable {
                name: data_source.to_string(),
                reason: "connection refused".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl TableIntrospector for FakeIntrospector {
    async fn check_datasource(&self, datasource: &str) -> Result<(), IntrospectionError> {
        self.check(datasource)
    }

    async fn count_increment(
        &self,
        datasource: &str,
        table: &str,
        _time_column: &str,
        _column_type: TimeColumnType,
        window: &TimeWindow,
    ) -> Result<i64, IntrospectionError> {
        if self.panic_tables.contains(table) {
            panic!("driver crashed while counting {table}");
        }
        self.check(datasource)?;
        if self.failing_windows.contains(&window.start) {
            return Err(DbErr::Custom("statement timeout".to_string()).into());
        }
        self.counted
            .lock()
            .unwrap()
            .push((table.to_string(), *window));
        Ok(self.rows_per_window)
    }

    async fn table_statistics(
        &self,
        datasource: &str,
        _table: &str,
    ) -> Result<Option<TableStatistics>, IntrospectionError> {
        self.statistics_calls.fetch_add(1, Ordering::SeqCst);
        self.check(datasource)?;
        if self.statistics_fail {
            return Err(DbErr::Custom("permission denied for pg_stats".to_string()).into());
        }
        Ok(self.statistics.clone())
    }

    async fn column_metadata(
        &self,
        datasource: &str,
        _table: &str,
    ) -> Result<Vec<ColumnMetadata>, IntrospectionError> {
        self.column_calls.fetch_add(1, Ordering::SeqCst);
        self.check(datasource)?;
        Ok(self.columns.clone())
    }
}

/// Both stores over one in-memory state. A commit applies its records and
/// checkpoint together or not at all.
#[derive(Default)]
pub struct FakeStore {
    pub configs: Mutex<Vec<monitor_config::Model>>,
    pub records: Mutex<Vec<NewStatistic>>,
    pub commits: AtomicUsize,
    fail_load: bool,
    fail_commit: AtomicBool,
    attempts: AtomicUsize,
    failing_attempts: HashSet<usize>,
}

impl FakeStore {
    pub fn with_configs(configs: Vec<monitor_config::Model>) -> Self {
        Self {
            configs: Mutex::new(configs),
            ..Self::default()
        }
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Insert attempt number `attempt` (1-based) is rejected.
    pub fn failing_on_attempt(mut self, attempt: usize) -> Self {
        self.failing_attempts.insert(attempt);
        self
    }

    /// While set, every commit fails after staging its work.
    pub fn set_commit_failing(&self, failing: bool) {
        self.fail_commit.store(failing, Ordering::SeqCst);
    }

    pub fn checkpoint_of(&self, id: i64) -> Option<DateTime<Utc>> {
        self.get(id).and_then(|c| c.last_checkpoint)
    }

    pub fn get(&self, id: i64) -> Option<monitor_config::Model> {
        self.configs
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn records(&self) -> Vec<NewStatistic> {
        self.records.lock().unwrap().clone()
    }

    pub fn records_by_table(&self) -> HashMap<String, Vec<NewStatistic>> {
        let mut grouped: HashMap<String, Vec<NewStatistic>> = HashMap::new();
        for record in self.records() {
            grouped
                .entry(record.table_name.clone())
                .or_default()
                .push(record);
        }
        grouped
    }
}

#[async_trait]
impl ConfigStore for FakeStore {
    async fn list_enabled(&self) -> Result<Vec<monitor_config::Model>, DbErr> {
        if self.fail_load {
            return Err(DbErr::Custom("monitor store is down".to_string()));
        }
        Ok(self
            .configs
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StatisticsStore for FakeStore {
    async fn record_windows(
        &self,
        config_id: i64,
        records: Vec<NewStatistic>,
    ) -> Result<RecordedWindows, DbErr> {
        let mut staged = Vec::new();
        let mut recorded = RecordedWindows::default();
        for record in records {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing_attempts.contains(&attempt) {
                recorded.stopped_early = true;
                break;
            }
            recorded.persisted += 1;
            recorded.checkpoint = Some(record.end_time);
            staged.push(record);
        }

        let mut configs = self.configs.lock().unwrap();
        if let Some(checkpoint) = recorded.checkpoint {
            let Some(config) = configs.iter_mut().find(|c| c.id == config_id) else {
                return Err(DbErr::RecordNotFound(format!(
                    "monitor configuration {config_id}"
                )));
            };
            if self.fail_commit.load(Ordering::SeqCst) {
                return Err(DbErr::Custom("commit failed".to_string()));
            }
            config.last_checkpoint = Some(checkpoint);
        }
        self.records.lock().unwrap().extend(staged);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(recorded)
    }
}
