//! shift - versioned SQL schema migrations for PostgreSQL.
//!
//! Each migration runs in its own transaction together with its ledger
//! update, so a step either fully applies or leaves nothing behind.
//!
//! ```ignore
//! use shift::prelude::*;
//!
//! let driver = Driver::connect("postgres://localhost/app").await?;
//! let catalog = load_migrations_from_dir(Path::new("migrations"))?;
//! driver.migrate_to(&catalog, &Target::Latest).await?;
//! driver.close().await;
//! ```

pub use shift_core::config::{DatabaseConfig, LoggingConfig, MigrationsConfig, ShiftConfig};
pub use shift_core::error::{Result, ShiftError};
pub use shift_core::migration::{
    AppliedEntry, AppliedVersion, Direction, Migration, MigrationState, MigrationStatus,
    PlannedMigration,
};
pub use shift_core::plan::{validate_sequence, PlanError, Planner, Target};
pub use shift_runtime::migrations::{
    create_migration_files, load_migrations_from_dir, split_sql_statements, ErrorClassifier,
    MigrationLock,
};
pub use shift_runtime::Driver;

/// Everything needed to drive migrations from application code.
pub mod prelude {
    pub use crate::{
        load_migrations_from_dir, Direction, Driver, Migration, MigrationLock, PlannedMigration,
        Result, ShiftConfig, ShiftError, Target,
    };
}
