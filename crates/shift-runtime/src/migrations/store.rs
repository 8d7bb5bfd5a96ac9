use chrono::{DateTime, Utc};
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use tracing::debug;

use shift_core::migration::AppliedVersion;

use super::classify::{DatastoreFailure, ErrorClassifier};

/// Name of the ledger table.
pub const LEDGER_TABLE: &str = "schema_migrations";

/// The persisted ledger of applied migration IDs.
///
/// Every write takes the caller's transaction so the ledger changes together
/// with the schema change it records. Errors are returned raw; callers classify.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionStore;

impl VersionStore {
    pub fn new() -> Self {
        Self
    }

    /// Create the ledger table if it does not exist.
    ///
    /// Safe to run from several processes at once: losing the creation race
    /// counts as success.
    pub async fn ensure_schema(&self, pool: &PgPool) -> sqlx::Result<()> {
        let result = sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                id TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if ErrorClassifier.is_concurrent_create(&DatastoreFailure::from(&e)) => {
                debug!("Ledger table created concurrently by another session");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// All applied versions, ordered by ID.
    ///
    /// Ordering uses the C collation so it matches byte-wise ID comparison
    /// regardless of the database locale.
    pub async fn list_applied<'e, E>(&self, executor: E) -> sqlx::Result<Vec<AppliedVersion>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
            r#"SELECT id, applied_at FROM schema_migrations ORDER BY id COLLATE "C" ASC"#,
        )
        .fetch_all(executor)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, applied_at)| AppliedVersion { id, applied_at })
            .collect())
    }

    /// Serialize steps on `id` until the caller's transaction ends.
    ///
    /// A second session stepping the same ID waits here, then reads the
    /// ledger after the first one committed instead of racing its script.
    pub async fn lock_id(&self, conn: &mut PgConnection, id: &str) -> sqlx::Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('schema_migrations'), hashtext($1))")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Whether `id` is recorded. Locks the row for the rest of the transaction
    /// so a concurrent revert of the same ID waits for it.
    pub async fn is_applied(&self, conn: &mut PgConnection, id: &str) -> sqlx::Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT id FROM schema_migrations WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(row.is_some())
    }

    /// Record `id` as applied. A second insert of the same ID fails with a
    /// unique violation.
    pub async fn record_applied(&self, conn: &mut PgConnection, id: &str) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO schema_migrations (id) VALUES ($1)")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        debug!(migration = id, "Recorded in ledger");
        Ok(())
    }

    /// Remove `id` from the ledger. Returns the number of rows removed.
    pub async fn record_reverted(&self, conn: &mut PgConnection, id: &str) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM schema_migrations WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        debug!(migration = id, rows = result.rows_affected(), "Removed from ledger");
        Ok(result.rows_affected())
    }
}
