use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::debug;

use shift_core::config::DatabaseConfig;
use shift_core::error::{Result, ShiftError};

/// The one datastore session owned by a driver.
///
/// Backed by a single-connection pool that never recycles its connection, so
/// session state (advisory locks, settings) lives as long as the session does.
#[derive(Debug)]
pub struct Session {
    pool: PgPool,
}

impl Session {
    /// Open a session from configuration.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let options = PgConnectOptions::from_str(&config.url)
            .map_err(|e| ShiftError::Connection(format!("Invalid connection URL: {}", e)))?
            .application_name(&config.application_name)
            .options(config.session_options());

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| ShiftError::Connection(format!("Failed to connect: {}", e)))?;

        debug!("Datastore session opened");
        Ok(Self { pool })
    }

    /// Open a session from a bare connection URL with default settings.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::open(&DatabaseConfig::new(url)).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Start a transaction on the session's connection.
    pub async fn begin(&self) -> sqlx::Result<Transaction<'static, Postgres>> {
        self.pool.begin().await
    }

    /// Release the connection. Waits for an in-flight transaction to finish.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Datastore session closed");
    }
}
