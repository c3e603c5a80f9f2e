//! # Lockdown
//!
//! Lockdown tracks failed logins per IP address and locks an address out once
//! it crosses a configured number of failures. Locks expire on their own after
//! the configured duration and can be released early by an operator.
//!
//! The crate bundles the ledger with a storage backend, file and environment
//! configuration, and the `lockdown` command line tool.
//!
//! ## Storage Support
//!
//! - SQLite (feature `sqlite`, enabled by default)
//!
//! ## Example
//!
//! ```rust,no_run
//! use lockdown::LockdownBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lockdown = LockdownBuilder::new()
//!         .with_sqlite("sqlite://lockdown.db")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     if lockdown.ledger().record_failure("192.0.2.10", "admin").await? {
//!         println!("192.0.2.10 is now locked down");
//!     }
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

pub mod builder;
pub mod cli;
pub mod commands;
pub mod config;
pub mod output;

pub use builder::{LockdownBuilder, LockdownBuilderError};

/// Re-export core types from lockdown_core
pub use lockdown_core::{
    AccountDirectory, ActiveLockdown, AnyAccount, Clock, Error, LockRecord, LockStatus,
    LockdownLedger, LockdownRepository, LockoutSettings, ManualClock, RepositoryProvider,
    SettingsProvider, StaticAccounts, SystemClock,
};

/// Re-export storage backends
#[cfg(feature = "sqlite")]
pub use lockdown_storage_sqlite::SqliteStorage;

/// A ledger bound to the storage backend it persists to.
pub struct Lockdown<R: RepositoryProvider> {
    storage: Arc<R>,
    ledger: LockdownLedger<R::LockdownRepo>,
}

impl<R: RepositoryProvider> Lockdown<R> {
    /// Create a ledger over `storage` with static settings.
    ///
    /// Use [`LockdownBuilder`] to plug in an account directory, a clock or a
    /// settings provider.
    pub fn new(storage: Arc<R>, settings: LockoutSettings) -> Self {
        let ledger = LockdownLedger::new(storage.lockdown(), settings);
        Self { storage, ledger }
    }

    pub(crate) fn from_parts(storage: Arc<R>, ledger: LockdownLedger<R::LockdownRepo>) -> Self {
        Self { storage, ledger }
    }

    pub fn ledger(&self) -> &LockdownLedger<R::LockdownRepo> {
        &self.ledger
    }

    pub fn storage(&self) -> &Arc<R> {
        &self.storage
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), Error> {
        self.storage.migrate().await
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.storage.health_check().await
    }
}
