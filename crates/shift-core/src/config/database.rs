use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Datastore session configuration.
///
/// The URL is handed to the Postgres driver untouched; timeouts become session
/// settings so a stuck statement is cancelled by the server, not by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,

    /// How long to wait for the session to be established, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Server-side `statement_timeout`, in seconds. Unset means no limit.
    #[serde(default)]
    pub statement_timeout_secs: Option<u64>,

    /// Server-side `lock_timeout`, in seconds. Unset means no limit.
    #[serde(default)]
    pub lock_timeout_secs: Option<u64>,

    /// Reported as `application_name` to the server.
    #[serde(default = "default_application_name")]
    pub application_name: String,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Session parameters to set on connect, as `(name, value)` pairs.
    pub fn session_options(&self) -> Vec<(&'static str, String)> {
        let mut options = Vec::new();
        if let Some(secs) = self.statement_timeout_secs {
            options.push(("statement_timeout", format!("{}s", secs)));
        }
        if let Some(secs) = self.lock_timeout_secs {
            options.push(("lock_timeout", format!("{}s", secs)));
        }
        options
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_secs: default_connect_timeout(),
            statement_timeout_secs: None,
            lock_timeout_secs: None,
            application_name: default_application_name(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_application_name() -> String {
    "shift".to_string()
}
