pub mod monitor_config_service;
pub mod statistics_service;
