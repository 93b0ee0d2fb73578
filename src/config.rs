use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::monitor::estimator::{EstimatorSettings, RowSizeStrategy};

/// Connection settings for one monitored datasource.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DatasourceSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct EstimationSettings {
    #[serde(default = "default_row_size_bytes")]
    pub default_row_size_bytes: i64,
    #[serde(default = "default_storage_overhead_ratio")]
    pub storage_overhead_ratio: f64,
    #[serde(default = "default_index_overhead_ratio")]
    pub index_overhead_ratio: f64,
    #[serde(default)]
    pub include_index_overhead: bool,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "RowSizeStrategy::default_order")]
    pub strategies: Vec<RowSizeStrategy>,
}

impl Default for EstimationSettings {
    fn default() -> Self {
        Self {
            default_row_size_bytes: default_row_size_bytes(),
            storage_overhead_ratio: default_storage_overhead_ratio(),
            index_overhead_ratio: default_index_overhead_ratio(),
            include_index_overhead: false,
            cache_ttl_seconds: default_cache_ttl_seconds(),
            strategies: RowSizeStrategy::default_order(),
        }
    }
}

impl EstimationSettings {
    pub fn to_estimator_settings(&self) -> EstimatorSettings {
        EstimatorSettings {
            default_row_size_bytes: self.default_row_size_bytes,
            storage_overhead_ratio: self.storage_overhead_ratio,
            index_overhead_ratio: self.index_overhead_ratio,
            include_index_overhead: self.include_index_overhead,
            cache_ttl: std::time::Duration::from_secs(self.cache_ttl_seconds),
            strategies: self.strategies.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Connection string of the database holding `monitor_configs` and `monitor_statistics`.
    pub database_url: String,
    pub log_dir: String,
    pub run_interval_seconds: u64,
    pub retention_days: i64,
    pub retention_interval_seconds: u64,
    /// Shard descriptor in `index/total` form; `None` runs every enabled configuration.
    pub shard: Option<String>,
    pub datasources: HashMap<String, DatasourceSettings>,
    pub estimation: EstimationSettings,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialMonitorSettings {
    database_url: Option<String>,
    log_dir: Option<String>,
    run_interval_seconds: Option<u64>,
    retention_days: Option<i64>,
    retention_interval_seconds: Option<u64>,
    shard: Option<String>,
    #[serde(default)]
    datasources: HashMap<String, DatasourceSettings>,
    estimation: Option<EstimationSettings>,
}

// Scalar settings that may be overridden through MONITOR_* environment variables.
#[derive(Deserialize, Default, Debug)]
struct EnvMonitorSettings {
    database_url: Option<String>,
    log_dir: Option<String>,
    run_interval_seconds: Option<u64>,
    retention_days: Option<i64>,
    retention_interval_seconds: Option<u64>,
    shard: Option<String>,
}

fn default_max_connections() -> u32 {
    5
}

fn default_row_size_bytes() -> i64 {
    100
}

fn default_storage_overhead_ratio() -> f64 {
    0.3
}

fn default_index_overhead_ratio() -> f64 {
    0.25
}

fn default_cache_ttl_seconds() -> u64 {
    30 * 60
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_run_interval_seconds() -> u64 {
    10 * 60
}

fn default_retention_days() -> i64 {
    30
}

fn default_retention_interval_seconds() -> u64 {
    24 * 60 * 60
}

impl MonitorSettings {
    /// Layers, lowest precedence first: built-in defaults, plain `DATABASE_URL`,
    /// the TOML file, then `MONITOR_*` environment variables.
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        let file_config: PartialMonitorSettings = match config_path {
            Some(path_str) => {
                let path = Path::new(path_str);
                if path.exists() {
                    let contents = fs::read_to_string(path)
                        .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                    toml::from_str(&contents).map_err(|e| {
                        format!("Failed to parse TOML from config file at {path:?}: {e}")
                    })?
                } else {
                    return Err(format!("Config file not found at {path:?}"));
                }
            }
            None => PartialMonitorSettings::default(),
        };

        let env_config: EnvMonitorSettings = envy::prefixed("MONITOR_")
            .from_env::<EnvMonitorSettings>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        Self::merge(file_config, env_config, std::env::var("DATABASE_URL").ok())
    }

    /// Parses settings from TOML text without consulting the environment.
    pub fn from_toml_str(contents: &str) -> Result<Self, String> {
        let file_config: PartialMonitorSettings =
            toml::from_str(contents).map_err(|e| format!("Failed to parse TOML settings: {e}"))?;
        Self::merge(file_config, EnvMonitorSettings::default(), None)
    }

    fn merge(
        file_config: PartialMonitorSettings,
        env_config: EnvMonitorSettings,
        fallback_database_url: Option<String>,
    ) -> Result<Self, String> {
        let shard = env_config
            .shard
            .or(file_config.shard)
            .filter(|s| !s.trim().is_empty());

        let settings = MonitorSettings {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .or(fallback_database_url)
                .ok_or("DATABASE_URL is required")?,
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            run_interval_seconds: env_config
                .run_interval_seconds
                .or(file_config.run_interval_seconds)
                .unwrap_or_else(default_run_interval_seconds),
            retention_days: env_config
                .retention_days
                .or(file_config.retention_days)
                .unwrap_or_else(default_retention_days),
            retention_interval_seconds: env_config
                .retention_interval_seconds
                .or(file_config.retention_interval_seconds)
                .unwrap_or_else(default_retention_interval_seconds),
            shard,
            datasources: file_config.datasources,
            estimation: file_config.estimation.unwrap_or_default(),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), String> {
        if self.run_interval_seconds == 0 {
            return Err("run_interval_seconds must be greater than 0".to_string());
        }
        if self.retention_interval_seconds == 0 {
            return Err("retention_interval_seconds must be greater than 0".to_string());
        }
        if self.retention_days <= 0 {
            return Err("retention_days must be greater than 0".to_string());
        }
        let estimation = &self.estimation;
        if estimation.default_row_size_bytes <= 0 {
            return Err("estimation.default_row_size_bytes must be greater than 0".to_string());
        }
        if estimation.storage_overhead_ratio < 0.0 || estimation.index_overhead_ratio < 0.0 {
            return Err("estimation overhead ratios must not be negative".to_string());
        }
        for (name, datasource) in &self.datasources {
            if datasource.url.trim().is_empty() {
                return Err(format!("datasource '{name}' has an empty url"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let settings = MonitorSettings::from_toml_str(r#"database_url = "postgres://monitor""#)
            .expect("settings should parse");

        assert_eq!(settings.database_url, "postgres://monitor");
        assert_eq!(settings.log_dir, "logs");
        assert_eq!(settings.run_interval_seconds, 600);
        assert_eq!(settings.retention_days, 30);
        assert!(settings.shard.is_none());
        assert!(settings.datasources.is_empty());
        assert_eq!(settings.estimation, EstimationSettings::default());
    }

    #[test]
    fn test_full_file_parses_datasources_and_estimation() {
        let toml = r#"
            database_url = "postgres://monitor"
            shard = "1/4"
            retention_days = 7

            [datasources.orders_db]
            url = "mysql://orders"
            max_connections = 3

            [datasources.audit]
            url = "postgres://audit"

            [estimation]
            default_row_size_bytes = 256
            include_index_overhead = true
            strategies = ["schema_estimate", "configured_default"]
        "#;
        let settings = MonitorSettings::from_toml_str(toml).expect("settings should parse");

        assert_eq!(settings.shard.as_deref(), Some("1/4"));
        assert_eq!(settings.retention_days, 7);
        assert_eq!(settings.datasources["orders_db"].max_connections, 3);
        assert_eq!(settings.datasources["audit"].max_connections, 5);
        assert_eq!(settings.estimation.default_row_size_bytes, 256);
        assert!(settings.estimation.include_index_overhead);
        assert_eq!(settings.estimation.storage_overhead_ratio, 0.3);
        assert_eq!(
            settings.estimation.strategies,
            vec![RowSizeStrategy::SchemaEstimate, RowSizeStrategy::ConfiguredDefault]
        );
    }

    #[test]
    fn test_missing_database_url_is_rejected() {
        let err = MonitorSettings::from_toml_str("log_dir = \"/tmp\"").unwrap_err();
        assert_eq!(err, "DATABASE_URL is required");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(MonitorSettings::from_toml_str(
            "database_url = \"x\"\nrun_interval_seconds = 0"
        )
        .is_err());
        assert!(MonitorSettings::from_toml_str(
            "database_url = \"x\"\n[estimation]\ndefault_row_size_bytes = 0"
        )
        .is_err());
    }

    #[test]
    fn test_blank_shard_means_unsharded() {
        let settings =
            MonitorSettings::from_toml_str("database_url = \"x\"\nshard = \"  \"").unwrap();
        assert!(settings.shard.is_none());
    }

    #[test]
    fn test_load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_url = \"postgres://from-file\"").unwrap();
        writeln!(file, "run_interval_seconds = 120").unwrap();

        let settings = MonitorSettings::load(file.path().to_str()).unwrap();
        assert_eq!(settings.run_interval_seconds, 120);
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let err = MonitorSettings::load(Some("/definitely/not/here.toml")).unwrap_err();
        assert!(err.contains("Config file not found"));
    }
}
