//! Test support for code that runs migrations.
//!
//! Migration behavior is only meaningful against a real datastore, so the
//! database helpers here provision a throwaway PostgreSQL database per test
//! instead of mocking the session.
//!
//! # Example
//!
//! ```ignore
//! #[tokio::test]
//! async fn applies_init() {
//!     let Some(server) = TestDatabase::from_env().await.unwrap() else { return };
//!     let db = server.isolated("applies_init").await.unwrap();
//!     let driver = Driver::connect(db.url()).await.unwrap();
//!     // ...
//!     db.cleanup().await.unwrap();
//! }
//! ```

pub mod assertions;
pub mod db;

pub use db::{IsolatedTestDb, TestDatabase, TEST_DATABASE_URL};
