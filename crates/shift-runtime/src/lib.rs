//! Execution side of the shift migration engine: the datastore session, the
//! ledger, per-migration transactions, error classification and the driver
//! that ties them together.

pub mod db;
pub mod driver;
pub mod migrations;

pub use db::Session;
pub use driver::Driver;
pub use migrations::{
    load_migrations_from_dir, ErrorClassifier, MigrationLock, TransactionalExecutor, VersionStore,
};
