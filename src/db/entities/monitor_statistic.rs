use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One measured window. Rows are immutable once written; only the retention
/// sweep removes them.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monitor_statistics")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub config_id: Option<i64>,
    pub data_source_name: String,
    pub table_name: String,
    pub statistic_time: ChronoDateTimeUtc,
    pub start_time: ChronoDateTimeUtc,
    pub end_time: ChronoDateTimeUtc,
    pub increment_count: i64,
    pub estimated_disk_size_bytes: i64,
    pub avg_row_size_bytes: i64,
    pub interval_type: String,
    pub interval_value: i32,
    pub created_at: ChronoDateTimeUtc,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub additional_info: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::monitor_config::Entity",
        from = "Column::ConfigId",
        to = "super::monitor_config::Column::Id",
        on_delete = "SetNull"
    )]
    MonitorConfig,
}

impl Related<super::monitor_config::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MonitorConfig.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
