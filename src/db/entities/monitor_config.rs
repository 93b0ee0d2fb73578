use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{IntervalUnit, TimeColumnType};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monitor_configs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub config_name: String,
    pub data_source_name: String,
    pub table_name: String,
    pub time_column_name: String,
    pub time_column_type: String,
    pub enabled: bool,
    pub interval_type: String,
    pub interval_value: i32,
    /// End of the last window that was durably recorded. `None` until the first run.
    pub last_checkpoint: Option<ChronoDateTimeUtc>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub extend_config: Option<Json>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::monitor_statistic::Entity")]
    MonitorStatistic,
}

impl Related<super::monitor_statistic::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MonitorStatistic.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn interval_unit(&self) -> IntervalUnit {
        IntervalUnit::parse(&self.interval_type)
    }

    pub fn time_column_kind(&self) -> TimeColumnType {
        TimeColumnType::parse(&self.time_column_type)
    }
}
