//! Run-level exclusivity using PostgreSQL session advisory locks.
//!
//! Per-step safety never depends on this lock (the ledger primary key already
//! rejects double application). It only keeps two full runs from interleaving.

use sqlx::PgPool;
use tracing::{debug, warn};

/// A session advisory lock keyed by a fixed integer.
#[derive(Debug, Clone, Copy)]
pub struct MigrationLock {
    key: i64,
}

impl MigrationLock {
    pub fn new(key: i64) -> Self {
        Self { key }
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    /// Block until the lock is held by this session.
    pub async fn acquire(&self, pool: &PgPool) -> sqlx::Result<()> {
        debug!(key = self.key, "Acquiring migration lock");
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(self.key)
            .execute(pool)
            .await?;
        debug!(key = self.key, "Migration lock acquired");
        Ok(())
    }

    /// Release the lock. Logs when this session did not hold it.
    pub async fn release(&self, pool: &PgPool) -> sqlx::Result<()> {
        let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
            .bind(self.key)
            .fetch_one(pool)
            .await?;

        if released {
            debug!(key = self.key, "Migration lock released");
        } else {
            warn!(key = self.key, "Migration lock was not held by this session");
        }
        Ok(())
    }
}
