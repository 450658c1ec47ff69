//! Local persistent store.
//!
//! SQLite through `sqlx`. Repositories expose pool-level methods for the
//! application and connection-level functions so the sync engine can apply
//! a whole batch inside one transaction.

pub(crate) mod bookmark_repo;
pub(crate) mod device_repo;
pub(crate) mod preferences;

pub use bookmark_repo::BookmarkRepository;
pub use device_repo::DeviceRepository;
pub use preferences::Preferences;

use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Transaction;
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations
pub async fn init_db(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Handle to the local store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self, sqlx::Error> {
        Ok(Self::new(init_db(db_path).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn bookmarks(&self) -> BookmarkRepository {
        BookmarkRepository::new(self.pool.clone())
    }

    pub fn devices(&self) -> DeviceRepository {
        DeviceRepository::new(self.pool.clone())
    }

    pub fn preferences(&self) -> Preferences {
        Preferences::new(self.pool.clone())
    }

    /// Starts a transaction; the single-writer save path for sync batches.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Store;
    use tempfile::TempDir;

    pub struct TestStore {
        pub store: Store,
        pub temp_dir: TempDir,
    }

    pub async fn test_store() -> TestStore {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(&temp_dir.path().join("test.db")).await.unwrap();
        TestStore { store, temp_dir }
    }
}
