//! Operator configuration
//!
//! The CLI reads its own settings from `OPS_*` environment variables (or a
//! `.env` file loaded by the binary); `DATABASE_URL` is honoured as the
//! conventional fallback for the connection string. Engine settings are a
//! separate [`ReceivablesConfig`] loaded from `RECEIVABLES_*` and an
//! optional file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use core_kernel::CoreError;
use domain_receivables::ReceivablesConfig;
use infra_db::DatabaseConfig;

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Maximum pool size
    pub max_connections: u32,
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit logs as JSON lines
    pub json_logs: bool,
    /// Optional engine configuration file (TOML, YAML or JSON)
    pub config_file: Option<PathBuf>,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            database_url: DatabaseConfig::default().url,
            max_connections: 5,
            log_level: "info".to_string(),
            json_logs: false,
            config_file: None,
        }
    }
}

impl OpsConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut config: Self = config::Config::builder()
            .add_source(config::Environment::with_prefix("OPS"))
            .build()?
            .try_deserialize()?;

        if std::env::var("OPS_DATABASE_URL").is_err() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                config.database_url = url;
            }
        }
        Ok(config)
    }

    /// Pool settings for this run
    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig::new(&self.database_url)
            .max_connections(self.max_connections)
            .min_connections(1)
            .application_name("receivables-ops")
    }

    /// Engine configuration, layering the file (CLI flag wins over
    /// `OPS_CONFIG_FILE`) under `RECEIVABLES_*` variables
    pub fn receivables(
        &self,
        override_file: Option<&Path>,
    ) -> Result<ReceivablesConfig, CoreError> {
        ReceivablesConfig::load(override_file.or(self.config_file.as_deref()))
    }
}
