//! Configuration for waypoint-sweeperd

use crate::error::{SweeperError, SweeperResult};
use serde::{Deserialize, Serialize};
use waypoint_runtime::SweepConfig;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Storage backend holding the invitations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sweep cadence
    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage. Parses, but [`SweeperConfig::validate`] rejects it
    /// since a fresh process-local store never holds invitations.
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_pool_size() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl StorageConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageConfig::Memory => "memory",
            StorageConfig::Postgres { .. } => "postgres",
        }
    }
}

impl SweeperConfig {
    /// The sweeper shares invitations with other processes, so it needs a
    /// persistent backend.
    pub fn validate(&self) -> SweeperResult<()> {
        match self.storage {
            StorageConfig::Memory => Err(SweeperError::NonPersistentStorage(self.storage.kind())),
            StorageConfig::Postgres { .. } => Ok(()),
        }
    }

    /// Layer defaults, an optional file, then `WAYPOINT_`-prefixed environment
    /// variables (nested keys separated by `__`, e.g. `WAYPOINT_STORAGE__URL`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&SweeperConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("WAYPOINT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SweeperConfig::default();
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.sweep.interval_secs, 300);
        assert!(config.sweep.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_memory_backend_is_rejected() {
        let config = SweeperConfig::default();
        assert!(matches!(
            config.validate(),
            Err(SweeperError::NonPersistentStorage("memory"))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("waypoint-sweeperd-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
[storage]
type = "postgres"
url = "postgres://waypoint@localhost/waypoint"

[sweep]
interval_secs = 30
"#,
        )
        .unwrap();

        let config = SweeperConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(
            config.storage,
            StorageConfig::Postgres {
                url: "postgres://waypoint@localhost/waypoint".to_string(),
                max_connections: 5,
                connect_timeout_secs: 5,
            }
        );
        assert_eq!(config.sweep.interval_secs, 30);
        assert!(config.sweep.enabled);
        assert!(config.validate().is_ok());
    }
}
