//! Builder pattern for constructing [`Lockdown`] instances
//!
//! The builder is type-state: a storage backend has to be chosen before
//! `build` becomes available.
//!
//! # Example
//!
//! ```rust,no_run
//! use lockdown::{LockdownBuilder, LockoutSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lockdown = LockdownBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .with_settings(LockoutSettings {
//!             max_retries: 5,
//!             ..Default::default()
//!         })
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     assert!(!lockdown.ledger().is_locked("192.0.2.10").await?);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use lockdown_core::{
    AccountDirectory, Clock, LockdownLedger, LockoutSettings, RepositoryProvider,
    SettingsProvider,
};

use crate::Lockdown;

#[derive(Debug, thiserror::Error)]
pub enum LockdownBuilderError {
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub struct NoStorage;

pub struct WithStorage<R: RepositoryProvider> {
    storage: Arc<R>,
}

pub struct LockdownBuilder<Storage> {
    storage: Storage,
    settings: Arc<dyn SettingsProvider>,
    accounts: Option<Arc<dyn AccountDirectory>>,
    clock: Option<Arc<dyn Clock>>,
    apply_migrations: bool,
}

impl Default for LockdownBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl LockdownBuilder<NoStorage> {
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            settings: Arc::new(LockoutSettings::default()),
            accounts: None,
            clock: None,
            apply_migrations: false,
        }
    }

    /// Use an already constructed storage backend.
    pub fn with_storage<R: RepositoryProvider>(
        self,
        storage: Arc<R>,
    ) -> LockdownBuilder<WithStorage<R>> {
        LockdownBuilder {
            storage: WithStorage { storage },
            settings: self.settings,
            accounts: self.accounts,
            clock: self.clock,
            apply_migrations: self.apply_migrations,
        }
    }
}

#[cfg(feature = "sqlite")]
impl LockdownBuilder<NoStorage> {
    /// Connect to the SQLite database at `url`, creating the file if needed.
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<LockdownBuilder<WithStorage<crate::SqliteStorage>>, LockdownBuilderError> {
        let storage = crate::SqliteStorage::connect(url)
            .await
            .map_err(|e| LockdownBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_storage(Arc::new(storage)))
    }

    /// Connect to SQLite with a bounded connection pool.
    pub async fn with_sqlite_pool(
        self,
        url: &str,
        max_connections: u32,
    ) -> Result<LockdownBuilder<WithStorage<crate::SqliteStorage>>, LockdownBuilderError> {
        let storage = crate::SqliteStorage::connect_with(url, max_connections)
            .await
            .map_err(|e| LockdownBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_storage(Arc::new(storage)))
    }
}

impl<Storage> LockdownBuilder<Storage> {
    /// Use fixed lockout settings.
    ///
    /// Default: 3 retries within 5 minutes lock an IP for 60 minutes
    pub fn with_settings(mut self, settings: LockoutSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    /// Read settings from the host application's configuration store.
    pub fn with_settings_provider(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = settings;
        self
    }

    /// Reject lockdowns for usernames unknown to `accounts`.
    ///
    /// Default: any well-formed username is accepted
    pub fn with_accounts(mut self, accounts: Arc<dyn AccountDirectory>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set whether to apply database migrations during build.
    ///
    /// Default: false
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }
}

impl<R: RepositoryProvider> LockdownBuilder<WithStorage<R>> {
    pub async fn build(self) -> Result<Lockdown<R>, LockdownBuilderError> {
        self.settings
            .settings()
            .validate()
            .map_err(|e| LockdownBuilderError::InvalidConfiguration(e.to_string()))?;

        if self.apply_migrations {
            self.storage
                .storage
                .migrate()
                .await
                .map_err(|e| LockdownBuilderError::Migration(e.to_string()))?;
        }

        let mut ledger =
            LockdownLedger::new(self.storage.storage.lockdown(), LockoutSettings::default())
                .with_settings_provider(self.settings);
        if let Some(accounts) = self.accounts {
            ledger = ledger.with_accounts(accounts);
        }
        if let Some(clock) = self.clock {
            ledger = ledger.with_clock(clock);
        }

        Ok(Lockdown::from_parts(self.storage.storage, ledger))
    }
}
