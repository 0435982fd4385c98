//! Application configuration.
//!
//! Loaded from YAML files and environment variables into a single Config
//! struct, then validated before a run.

mod storage;

pub use storage::{SqliteConfig, StorageConfig, StorageType};

use chrono_tz::Tz;
use serde::Deserialize;

use crate::kpi::{ExecutionStrategy, DEFAULT_WINDOW_DAYS};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "order-kpi.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "ORDER_KPI_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "ORDER_KPI";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "ORDER_KPI_LOG";

/// Zone used when none is configured.
pub const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Unknown timezone for {field}: '{value}'")]
    InvalidTimezone { field: &'static str, value: String },

    #[error("pipeline.window_days must be at least 1, got {0}")]
    InvalidWindow(i64),

    #[error("execution.strategy 'pushdown' requires storage.type 'sqlite'")]
    PushdownWithoutSqlite,
}

/// Timezones and KPI window settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Civil zone the raw order timestamps were written in.
    pub source_timezone: String,
    /// Civil zone for month truncation and "now".
    pub business_timezone: String,
    /// Trailing window of the top-spenders KPI, in days.
    pub window_days: i64,
    /// Restrict monthly trends to the last N months.
    pub horizon_months: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_timezone: DEFAULT_TIMEZONE.to_string(),
            business_timezone: DEFAULT_TIMEZONE.to_string(),
            window_days: DEFAULT_WINDOW_DAYS,
            horizon_months: None,
        }
    }
}

impl PipelineConfig {
    pub fn source_zone(&self) -> Result<Tz, ConfigError> {
        parse_zone("pipeline.source_timezone", &self.source_timezone)
    }

    pub fn business_zone(&self) -> Result<Tz, ConfigError> {
        parse_zone("pipeline.business_timezone", &self.business_timezone)
    }
}

fn parse_zone(field: &'static str, value: &str) -> Result<Tz, ConfigError> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::InvalidTimezone {
            field,
            value: value.to_string(),
        })
}

/// Source file locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub customers_csv: String,
    pub orders_csv: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            customers_csv: "data/customers.csv".to_string(),
            orders_csv: "data/orders.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub strategy: ExecutionStrategy,
}

/// Report output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub input: InputConfig,
    pub execution: ExecutionConfig,
    pub storage: StorageConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `order-kpi.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check settings that deserialization cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.source_zone()?;
        self.pipeline.business_zone()?;

        if self.pipeline.window_days < 1 {
            return Err(ConfigError::InvalidWindow(self.pipeline.window_days));
        }

        if self.execution.strategy == ExecutionStrategy::Pushdown
            && self.storage.storage_type != StorageType::Sqlite
        {
            return Err(ConfigError::PushdownWithoutSqlite);
        }

        Ok(())
    }

    /// Create config for testing: in-memory strategy, UTC on both sides.
    pub fn for_test() -> Self {
        Self {
            pipeline: PipelineConfig {
                source_timezone: "UTC".to_string(),
                business_timezone: "UTC".to_string(),
                ..PipelineConfig::default()
            },
            ..Self::default()
        }
    }
}
