pub mod classify;
mod executor;
mod loader;
mod lock;
mod split;
mod store;

pub use classify::{DatastoreFailure, ErrorClassifier, FailureKind, Stage};
pub use executor::{StatementFailure, TransactionalExecutor};
pub use loader::{create_migration_files, load_migrations_from_dir};
pub use lock::MigrationLock;
pub use split::split_sql_statements;
pub use store::{VersionStore, LEDGER_TABLE};
