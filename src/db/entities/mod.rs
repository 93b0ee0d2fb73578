//! SeaORM entities for the monitor's own bookkeeping tables.

pub mod monitor_config;
pub mod monitor_statistic;

pub mod prelude {
    pub use super::monitor_config::ActiveModel as MonitorConfigActiveModel;
    pub use super::monitor_config::Column as MonitorConfigColumn;
    pub use super::monitor_config::Entity as MonitorConfig;
    pub use super::monitor_config::Model as MonitorConfigModel;

    pub use super::monitor_statistic::ActiveModel as MonitorStatisticActiveModel;
    pub use super::monitor_statistic::Column as MonitorStatisticColumn;
    pub use super::monitor_statistic::Entity as MonitorStatistic;
    pub use super::monitor_statistic::Model as MonitorStatisticModel;
}
