use std::time::Instant;

use sqlx::PgConnection;
use tracing::{debug, info, warn};

use shift_core::error::{Result, ShiftError};
use shift_core::migration::{Direction, MigrationState, PlannedMigration};

use super::classify::{ErrorClassifier, Stage};
use super::split::split_sql_statements;
use super::store::VersionStore;
use crate::db::Session;

/// A statement that failed, with its 1-based position in the script.
#[derive(Debug)]
pub struct StatementFailure {
    pub index: usize,
    pub statement: String,
    pub source: sqlx::Error,
}

/// Runs one planned migration inside one transaction.
///
/// The script and the ledger update commit together or not at all.
pub struct TransactionalExecutor<'s> {
    session: &'s Session,
    store: VersionStore,
    classifier: ErrorClassifier,
}

impl<'s> TransactionalExecutor<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self {
            session,
            store: VersionStore::new(),
            classifier: ErrorClassifier,
        }
    }

    /// Execute a script's statements in order on `conn`, stopping at the first failure.
    ///
    /// Returns the number of statements executed.
    pub async fn run_script(
        conn: &mut PgConnection,
        script: &str,
    ) -> std::result::Result<usize, StatementFailure> {
        let statements = split_sql_statements(script);

        for (idx, statement) in statements.iter().enumerate() {
            debug!(statement = idx + 1, "Executing: {}", statement);
            // Migration statements run once; keep them out of the statement cache
            let result = sqlx::query(statement)
                .persistent(false)
                .execute(&mut *conn)
                .await;
            if let Err(source) = result {
                return Err(StatementFailure {
                    index: idx + 1,
                    statement: statement.clone(),
                    source,
                });
            }
        }

        Ok(statements.len())
    }

    /// Execute a planned migration: begin, check the ledger, run the script,
    /// update the ledger, commit. Any failure rolls the whole step back.
    pub async fn execute(&self, step: &PlannedMigration) -> Result<()> {
        let id = step.id();
        let direction = step.direction;
        debug!(
            migration = id,
            %direction,
            state = %MigrationState::Pending,
            "Migration queued"
        );

        let script = step
            .script()
            .ok_or_else(|| ShiftError::Irreversible(id.to_string()))?;

        let started = Instant::now();
        info!(
            migration = id,
            %direction,
            state = %MigrationState::Executing,
            "Running migration"
        );

        let mut tx = self
            .session
            .begin()
            .await
            .map_err(|e| self.classifier.classify_sqlx(&e, Some(id), Stage::Begin))?;

        match self.apply(&mut tx, id, direction, script).await {
            Ok(statements) => {
                tx.commit()
                    .await
                    .map_err(|e| self.classifier.classify_sqlx(&e, Some(id), Stage::Commit))?;

                info!(
                    migration = id,
                    %direction,
                    statements,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    state = %MigrationState::Committed,
                    "Migration committed"
                );
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        migration = id,
                        error = %rollback_err,
                        "Rollback failed; the server discards the transaction with the session"
                    );
                }

                warn!(
                    migration = id,
                    %direction,
                    error = %err,
                    state = %MigrationState::RolledBack,
                    "Migration rolled back"
                );
                Err(err)
            }
        }
    }

    async fn apply(
        &self,
        conn: &mut PgConnection,
        id: &str,
        direction: Direction,
        script: &str,
    ) -> Result<usize> {
        self.store
            .lock_id(conn, id)
            .await
            .map_err(|e| self.classifier.classify_sqlx(&e, Some(id), Stage::LedgerRead))?;

        let applied = self
            .store
            .is_applied(conn, id)
            .await
            .map_err(|e| self.classifier.classify_sqlx(&e, Some(id), Stage::LedgerRead))?;

        match (direction, applied) {
            (Direction::Up, true) => return Err(ShiftError::AlreadyApplied(id.to_string())),
            (Direction::Down, false) => return Err(ShiftError::NotApplied(id.to_string())),
            _ => {}
        }

        let statements = Self::run_script(conn, script).await.map_err(|f| {
            debug!(migration = id, statement = f.index, "Failed statement: {}", f.statement);
            self.classifier
                .classify_sqlx(&f.source, Some(id), Stage::Statement(f.index))
        })?;

        let ledger = match direction {
            Direction::Up => self.store.record_applied(conn, id).await.map(|_| true),
            Direction::Down => self.store.record_reverted(conn, id).await.map(|rows| rows > 0),
        };

        match ledger {
            Ok(true) => Ok(statements),
            Ok(false) => Err(ShiftError::NotApplied(id.to_string())),
            Err(e) => Err(self.classifier.classify_sqlx(&e, Some(id), Stage::LedgerWrite)),
        }
    }
}
