//! Core types for the shift migration engine: the migration model, the error
//! taxonomy, planning and configuration. Nothing in this crate talks to a
//! datastore except the optional test helpers.

pub mod config;
pub mod error;
pub mod migration;
pub mod plan;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{DatabaseConfig, LoggingConfig, MigrationsConfig, ShiftConfig};
pub use error::{Result, ShiftError};
pub use migration::{
    AppliedEntry, AppliedVersion, Direction, Migration, MigrationState, MigrationStatus,
    PlannedMigration,
};
pub use plan::{validate_sequence, PlanError, Planner, Target};
