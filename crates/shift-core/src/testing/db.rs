//! Explicit database provisioning for tests.
//!
//! Database configuration is EXPLICIT: pass a URL to `from_url()`, opt in to
//! `TEST_DATABASE_URL` with `from_env()`, or enable the `embedded-test-db`
//! feature and use `embedded()`. `DATABASE_URL` is never read, so a migration
//! test can not run against a production database by accident.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
#[cfg(feature = "embedded-test-db")]
use tokio::sync::OnceCell;

#[cfg(feature = "embedded-test-db")]
static EMBEDDED_PG: OnceCell<postgresql_embedded::PostgreSQL> = OnceCell::const_new();

/// Environment variable that opts a test run into database tests.
pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

/// Administrative connection used to create and drop per-test databases.
pub struct TestDatabase {
    pool: PgPool,
    url: String,
}

impl TestDatabase {
    /// Connect to the server at the given URL.
    pub async fn from_url(url: &str) -> sqlx::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(2).connect(url).await?;

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    /// Connect using `TEST_DATABASE_URL`. Returns `Ok(None)` when it is not set,
    /// so database tests can be skipped on machines without Postgres.
    pub async fn from_env() -> sqlx::Result<Option<Self>> {
        match std::env::var(TEST_DATABASE_URL) {
            Ok(url) => Self::from_url(&url).await.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Start an embedded PostgreSQL instance shared by the whole test binary.
    #[cfg(feature = "embedded-test-db")]
    pub async fn embedded() -> sqlx::Result<Self> {
        let pg = EMBEDDED_PG
            .get_or_try_init(|| async {
                let mut pg = postgresql_embedded::PostgreSQL::default();
                pg.setup()
                    .await
                    .map_err(|e| sqlx::Error::Configuration(e.to_string().into()))?;
                pg.start()
                    .await
                    .map_err(|e| sqlx::Error::Configuration(e.to_string().into()))?;
                Ok::<_, sqlx::Error>(pg)
            })
            .await?;

        let url = pg.settings().url("postgres");
        Self::from_url(&url).await
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Create a dedicated database for a single test.
    pub async fn isolated(&self, test_name: &str) -> sqlx::Result<IsolatedTestDb> {
        // UUID suffix prevents collisions when tests run in parallel
        let db_name = format!(
            "shift_test_{}_{}",
            sanitize_db_name(test_name),
            uuid::Uuid::new_v4().simple()
        );

        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name))
            .execute(&self.pool)
            .await?;

        let url = replace_db_name(&self.url, &db_name);
        let pool = PgPoolOptions::new().max_connections(2).connect(&url).await?;

        Ok(IsolatedTestDb {
            pool,
            db_name,
            url,
            base_url: self.url.clone(),
        })
    }
}

/// A database that exists for the lifetime of one test.
///
/// Its pool plays the part of an independent client: it observes the schema
/// and ledger through a different session than the engine under test.
pub struct IsolatedTestDb {
    pool: PgPool,
    db_name: String,
    url: String,
    base_url: String,
}

impl IsolatedTestDb {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Connection URL for the isolated database.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run raw SQL outside of the engine.
    pub async fn execute(&self, sql: &str) -> sqlx::Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Whether a table exists in the public schema.
    pub async fn table_exists(&self, table: &str) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(format!("public.{}", table))
            .fetch_one(&self.pool)
            .await
    }

    /// Drop the database. Orphans left by panicking tests are harmless.
    pub async fn cleanup(self) -> sqlx::Result<()> {
        self.pool.close().await;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.base_url)
            .await?;

        let _ = sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = $1",
        )
        .bind(&self.db_name)
        .execute(&pool)
        .await;

        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\"", self.db_name))
            .execute(&pool)
            .await?;

        Ok(())
    }
}

/// Sanitize a test name for use in a database name.
fn sanitize_db_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .take(24)
        .collect()
}

/// Replace the database name in a connection URL, keeping any query string.
fn replace_db_name(url: &str, new_db: &str) -> String {
    let (base, query) = match url.find('?') {
        Some(idx) => (&url[..idx], &url[idx..]),
        None => (url, ""),
    };

    // Only the path after the authority names a database
    let authority_start = base.find("://").map(|i| i + 3).unwrap_or(0);
    match base[authority_start..].find('/') {
        Some(slash) => format!("{}{}{}", &base[..=authority_start + slash], new_db, query),
        None => format!("{}/{}{}", base, new_db, query),
    }
}
