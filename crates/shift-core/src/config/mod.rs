mod database;
mod logging;

pub use database::DatabaseConfig;
pub use logging::LoggingConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ShiftError};

/// Root configuration, read from `shift.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftConfig {
    /// Target datastore.
    pub database: DatabaseConfig,

    /// Migration sources and run behavior.
    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ShiftConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ShiftError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        let config: Self = toml::from_str(&content)
            .map_err(|e| ShiftError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with defaults for everything but the database URL.
    pub fn default_with_database_url(url: &str) -> Self {
        Self {
            database: DatabaseConfig {
                url: url.to_string(),
                ..Default::default()
            },
            migrations: MigrationsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(ShiftError::Config("database.url must not be empty".into()));
        }
        Ok(())
    }
}

/// Where migrations live and how full runs are serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Directory holding `<id>.up.sql` / `<id>.down.sql` files.
    #[serde(default = "default_migrations_dir")]
    pub dir: PathBuf,

    /// Hold a session advisory lock around multi-step runs.
    #[serde(default = "default_true")]
    pub advisory_lock: bool,

    /// Advisory lock key.
    #[serde(default = "default_lock_key")]
    pub lock_key: i64,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
            advisory_lock: true,
            lock_key: default_lock_key(),
        }
    }
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_true() -> bool {
    true
}

fn default_lock_key() -> i64 {
    0x5348494654 // "SHIFT" in hex
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(content) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
