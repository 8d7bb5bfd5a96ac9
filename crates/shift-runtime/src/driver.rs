//! The public entry point of the engine.
//!
//! A [`Driver`] owns one datastore session for its whole life. Each call to
//! [`Driver::migrate`] runs one planned migration in one transaction and does
//! not return before that transaction committed or rolled back.

use tracing::{info, warn};

use shift_core::config::DatabaseConfig;
use shift_core::error::{Result, ShiftError};
use shift_core::migration::{AppliedVersion, Migration, MigrationStatus, PlannedMigration};
use shift_core::plan::{validate_sequence, Planner, Target};

use crate::db::Session;
use crate::migrations::{ErrorClassifier, MigrationLock, Stage, TransactionalExecutor, VersionStore};

/// Applies and reverts migrations against one datastore.
#[derive(Debug)]
pub struct Driver {
    session: Session,
    store: VersionStore,
    classifier: ErrorClassifier,
}

impl Driver {
    /// Connect with default session settings and make sure the ledger exists.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::from_config(&DatabaseConfig::new(url)).await
    }

    /// Connect from configuration and make sure the ledger exists.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let session = Session::open(config).await?;
        let store = VersionStore::new();

        if let Err(e) = store.ensure_schema(session.pool()).await {
            session.close().await;
            return Err(ShiftError::Connection(format!(
                "Failed to prepare ledger table: {}",
                e
            )));
        }

        Ok(Self {
            session,
            store,
            classifier: ErrorClassifier,
        })
    }

    /// Run one planned migration end to end.
    ///
    /// Up on an applied ID fails with `AlreadyApplied`, Down on an unapplied ID
    /// with `NotApplied`, Down without a down script with `Irreversible`. On any
    /// error neither the schema nor the ledger changed.
    pub async fn migrate(&self, step: &PlannedMigration) -> Result<()> {
        TransactionalExecutor::new(&self.session).execute(step).await
    }

    /// Run a caller-built plan in order, stopping at the first failure.
    ///
    /// Returns the IDs that committed. Steps committed before a failure stay
    /// committed; the failing step and everything after it did not run.
    pub async fn run(&self, plan: &[PlannedMigration]) -> Result<Vec<String>> {
        validate_sequence(plan)?;

        let mut committed = Vec::with_capacity(plan.len());
        for step in plan {
            if let Err(err) = self.migrate(step).await {
                if !committed.is_empty() {
                    warn!(
                        committed = committed.len(),
                        remaining = plan.len() - committed.len(),
                        "Run stopped at {}",
                        step.id()
                    );
                }
                return Err(err);
            }
            committed.push(step.id().to_string());
        }

        Ok(committed)
    }

    /// Plan against the current ledger and run the plan.
    pub async fn migrate_to(&self, catalog: &[Migration], target: &Target) -> Result<Vec<String>> {
        let planner = Planner::new(catalog)?;
        let applied = self.versions().await?;
        let plan = planner.plan(&applied, target)?;

        if plan.is_empty() {
            info!(goal = ?target, "Nothing to migrate");
            return Ok(Vec::new());
        }

        self.run(&plan).await
    }

    /// Like [`Driver::migrate_to`], holding `lock` for the whole run.
    ///
    /// The lock is released even when the run fails.
    pub async fn migrate_to_exclusive(
        &self,
        catalog: &[Migration],
        target: &Target,
        lock: MigrationLock,
    ) -> Result<Vec<String>> {
        lock.acquire(self.session.pool())
            .await
            .map_err(|e| self.classifier.classify_sqlx(&e, None, Stage::Begin))?;

        let result = self.migrate_to(catalog, target).await;

        if let Err(e) = lock.release(self.session.pool()).await {
            warn!(key = lock.key(), error = %e, "Failed to release migration lock");
        }

        result
    }

    /// Applied IDs in ascending order.
    pub async fn versions(&self) -> Result<Vec<String>> {
        Ok(self.applied().await?.into_iter().map(|v| v.id).collect())
    }

    /// Applied ledger rows in ascending ID order.
    pub async fn applied(&self) -> Result<Vec<AppliedVersion>> {
        self.store
            .list_applied(self.session.pool())
            .await
            .map_err(|e| self.classifier.classify_sqlx(&e, None, Stage::LedgerRead))
    }

    /// The ledger compared against a catalog.
    pub async fn status(&self, catalog: &[Migration]) -> Result<MigrationStatus> {
        let applied = self.applied().await?;
        Ok(MigrationStatus::build(catalog, &applied))
    }

    /// Release the session. The driver can not be used afterwards.
    pub async fn close(self) {
        self.session.close().await;
    }
}
