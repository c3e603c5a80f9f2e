//! SQLite storage backend for the lockdown ledger.
//!
//! ```rust,no_run
//! use lockdown_core::{LockdownLedger, LockoutSettings, RepositoryProvider};
//! use lockdown_storage_sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), lockdown_core::Error> {
//! let storage = SqliteStorage::connect("sqlite://lockdown.db").await?;
//! storage.migrate().await?;
//!
//! let ledger = LockdownLedger::new(storage.lockdown(), LockoutSettings::default());
//! ledger.record_failure("192.0.2.10", "admin").await?;
//! # Ok(())
//! # }
//! ```

pub mod migrations;
pub mod repositories;

pub use repositories::SqliteLockdownRepository;

use std::{str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use lockdown_core::{
    Error, error::StorageError, map_storage_err, repositories::RepositoryProvider,
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use crate::migrations::{SqliteMigrationManager, all_migrations};

/// How long a connection waits for another process holding the write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

pub struct SqliteStorage {
    pool: SqlitePool,
    lockdown: Arc<SqliteLockdownRepository>,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        let lockdown = Arc::new(SqliteLockdownRepository::new(pool.clone()));
        Self { pool, lockdown }
    }

    /// Open (and create if missing) the database at `url`.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        Self::connect_with(url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Open the database at `url` with a bounded connection pool.
    ///
    /// File databases use WAL journaling so readers are not blocked by the
    /// single writer, and every connection waits up to [`BUSY_TIMEOUT`] for
    /// the write lock.
    pub async fn connect_with(url: &str, max_connections: u32) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| {
                tracing::error!(error = %e, "Invalid SQLite connection string");
                StorageError::Connection(format!("Invalid SQLite connection string: {url}"))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url, "Failed to connect to SQLite");
                StorageError::Connection(e.to_string())
            })?;

        tracing::debug!(url, max_connections, "Connected to SQLite");

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RepositoryProvider for SqliteStorage {
    type LockdownRepo = SqliteLockdownRepository;

    fn lockdown(&self) -> Arc<Self::LockdownRepo> {
        Arc::clone(&self.lockdown)
    }

    async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await?;
        manager.up(&all_migrations()).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        map_storage_err!(sqlx::query("SELECT 1").execute(&self.pool).await)?;
        Ok(())
    }
}
