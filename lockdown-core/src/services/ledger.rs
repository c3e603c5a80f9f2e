//! The lockdown ledger service.
//!
//! This module implements the lifecycle of an IP lockdown: failed logins are
//! counted per IP, crossing the threshold locks the IP until `release_at`, and
//! an operator can release a lock early.
//!
//! # Example
//!
//! ```rust,ignore
//! use lockdown_core::services::LockdownLedger;
//! use lockdown_core::settings::LockoutSettings;
//!
//! let ledger = LockdownLedger::new(repository, LockoutSettings::default());
//!
//! if ledger.record_failure("192.168.1.1", "admin").await? {
//!     // the IP is now locked down
//! }
//! assert!(ledger.is_locked("192.168.1.1").await?);
//! ledger.release("192.168.1.1").await?;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    Error,
    accounts::{AccountDirectory, AnyAccount},
    clock::{Clock, SystemClock},
    error::{LockdownError, StorageError},
    lockdown::{ActiveLockdown, LockRecord},
    repositories::LockdownRepository,
    settings::{LockoutSettings, SettingsProvider},
    validation::{validate_ip, validate_username},
};

/// Service tracking failed logins and the lockdowns they cause.
///
/// The ledger holds no state of its own. Settings are read from the provider
/// on every call and all persistence goes through the repository, so one ledger
/// can be shared across tasks and several processes can share one store.
pub struct LockdownLedger<R: LockdownRepository> {
    repository: Arc<R>,
    settings: Arc<dyn SettingsProvider>,
    accounts: Arc<dyn AccountDirectory>,
    clock: Arc<dyn Clock>,
}

impl<R: LockdownRepository> LockdownLedger<R> {
    /// Create a ledger that accepts any username and uses the system clock.
    pub fn new(repository: Arc<R>, settings: impl SettingsProvider) -> Self {
        Self {
            repository,
            settings: Arc::new(settings),
            accounts: Arc::new(AnyAccount),
            clock: Arc::new(SystemClock),
        }
    }

    /// Consult `accounts` before locking a username.
    pub fn with_accounts(mut self, accounts: Arc<dyn AccountDirectory>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the settings provider.
    pub fn with_settings_provider(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = settings;
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// The settings as they are right now.
    pub fn settings(&self) -> LockoutSettings {
        self.settings.settings()
    }

    /// Current time according to the ledger's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Count a failed login from `ip` for `username`.
    ///
    /// Returns `true` when this attempt locked the IP (or refreshed an existing
    /// lockdown). Fails with [`LockdownError::InvalidUsername`] when the
    /// username is malformed or unknown to the account directory; nothing is
    /// recorded in that case.
    pub async fn record_failure(&self, ip: &str, username: &str) -> Result<bool, Error> {
        let ip = validate_ip(ip)?.to_string();
        let username = self.check_username(username).await?;
        let settings = self.current_settings()?;
        let now = self.clock.now();

        let outcome = self
            .repository
            .record_failure(&ip, &username, now, &settings)
            .await?;

        match &outcome.lock {
            Some(lock) => {
                tracing::info!(
                    ip = %ip,
                    username = %username,
                    lockdown_id = lock.id,
                    release_at = %lock.release_at,
                    "IP address locked down after repeated failed logins"
                );
            }
            None => {
                tracing::debug!(
                    ip = %ip,
                    failures = outcome.failures,
                    max_retries = settings.max_retries,
                    "Failed login recorded"
                );
            }
        }

        Ok(outcome.locked())
    }

    /// Lock `ip` immediately, without counting failures.
    ///
    /// An IP that is already locked has its `release_at` pushed back instead of
    /// gaining a second record.
    pub async fn lock(&self, ip: &str, username: &str) -> Result<LockRecord, Error> {
        let ip = validate_ip(ip)?.to_string();
        let username = self.check_username(username).await?;
        let settings = self.current_settings()?;
        let now = self.clock.now();

        let record = self
            .repository
            .lock(&ip, &username, now, settings.release_at(now)?)
            .await?;

        tracing::info!(
            ip = %ip,
            username = %username,
            lockdown_id = record.id,
            release_at = %record.release_at,
            "IP address locked down"
        );

        Ok(record)
    }

    /// Whether `ip` is currently locked down.
    pub async fn is_locked(&self, ip: &str) -> Result<bool, Error> {
        let ip = validate_ip(ip)?.to_string();
        let now = self.clock.now();

        Ok(self
            .repository
            .find_active(&ip, now)
            .await?
            .is_some_and(|record| record.is_active_at(now)))
    }

    /// Every active lockdown, oldest first, with the minutes left on each.
    pub async fn list(&self) -> Result<Vec<ActiveLockdown>, Error> {
        let now = self.clock.now();
        let records = self.repository.list_active(now).await?;

        Ok(records
            .iter()
            .filter(|record| record.is_active_at(now))
            .map(|record| ActiveLockdown::from_record(record, now))
            .collect())
    }

    /// Release the active lockdown on `ip` early.
    ///
    /// Fails with [`LockdownError::NotLocked`] when there is nothing to release
    /// and with [`StorageError::NotApplied`] when the update changed no rows.
    pub async fn release(&self, ip: &str) -> Result<LockRecord, Error> {
        let ip = validate_ip(ip)?.to_string();
        let now = self.clock.now();

        let Some(record) = self.repository.find_active(&ip, now).await? else {
            return Err(LockdownError::NotLocked(ip).into());
        };

        let affected = self.repository.release(record.id, now).await?;
        if affected == 0 {
            tracing::warn!(ip = %ip, lockdown_id = record.id, "Release did not apply");
            return Err(StorageError::NotApplied(format!(
                "release of lockdown {} for {ip}",
                record.id
            ))
            .into());
        }

        tracing::info!(ip = %ip, lockdown_id = record.id, "IP address released");

        Ok(LockRecord {
            release_at: now,
            manually_released: true,
            ..record
        })
    }

    /// Change one setting through the settings provider.
    pub async fn update_setting(&self, name: &str, value: &str) -> Result<(), Error> {
        self.settings.update_setting(name, value)
    }

    /// Every lockdown recorded for `ip`, including expired and released ones.
    pub async fn history(&self, ip: &str) -> Result<Vec<LockRecord>, Error> {
        let ip = validate_ip(ip)?.to_string();
        self.repository.history(&ip).await
    }

    /// Remove records that ended longer than the retention period ago.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let before = self.current_settings()?.retention_cutoff(self.clock.now())?;
        let purged = self.repository.purge_expired(before).await?;
        if purged > 0 {
            tracing::info!(count = purged, "Purged expired lockdown records");
        }
        Ok(purged)
    }

    /// Start the background compaction task.
    ///
    /// This spawns a task that periodically removes long expired records. It
    /// is optional: expiry is always evaluated lazily on read.
    ///
    /// # Arguments
    ///
    /// * `shutdown` - A watch receiver that signals when to stop the task
    pub fn start_cleanup_task(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        let settings = Arc::clone(&self.settings);
        let clock = Arc::clone(&self.clock);

        const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let before = match settings.settings().retention_cutoff(clock.now()) {
                            Ok(before) => before,
                            Err(e) => {
                                tracing::warn!(error = %e, "Skipping purge of expired lockdown records");
                                continue;
                            }
                        };
                        match repository.purge_expired(before).await {
                            Ok(count) if count > 0 => {
                                tracing::info!(count, "Purged expired lockdown records");
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to purge expired lockdown records");
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down lockdown cleanup task");
                        break;
                    }
                }
            }
        })
    }

    async fn check_username(&self, username: &str) -> Result<String, Error> {
        if let Err(e) = validate_username(username) {
            tracing::debug!(error = %e, "Rejected username");
            return Err(LockdownError::InvalidUsername(username.to_string()).into());
        }

        let username = username.trim();
        if !self.accounts.username_exists(username).await? {
            tracing::debug!(username = %username, "Rejected unknown username");
            return Err(LockdownError::InvalidUsername(username.to_string()).into());
        }

        Ok(username.to_string())
    }

    fn current_settings(&self) -> Result<LockoutSettings, Error> {
        let settings = self.settings.settings();
        settings.validate()?;
        Ok(settings)
    }
}
