//! Repository trait for lockdown records.
//!
//! This module defines the storage interface for counting failed logins per IP
//! and persisting the lockdown records they produce.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    lockdown::{FailureOutcome, LockRecord},
    settings::LockoutSettings,
};

/// Repository for lockdown data.
///
/// Every method receives the current time from the caller, so implementations
/// never read the clock themselves.
///
/// # Concurrency
///
/// The store is shared by independent processes. `record_failure` and `lock`
/// must run their read-then-write sequence atomically so that racing callers
/// for the same IP never produce two active records. `release` must be a single
/// conditional update.
#[async_trait]
pub trait LockdownRepository: Send + Sync + 'static {
    /// Count a failed login and lock the IP once the threshold is reached.
    ///
    /// Inserts a failure row, counts the IP's failures newer than
    /// `settings.window_start(now)`, and when the count reaches
    /// `settings.max_retries` creates or refreshes the active lockdown with
    /// `release_at = settings.release_at(now)` and clears the IP's
    /// failure rows.
    async fn record_failure(
        &self,
        ip: &str,
        username: &str,
        now: DateTime<Utc>,
        settings: &LockoutSettings,
    ) -> Result<FailureOutcome, Error>;

    /// Create a lockdown directly, or push back `release_at` of the active one.
    async fn lock(
        &self,
        ip: &str,
        username: &str,
        now: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<LockRecord, Error>;

    /// The active lockdown for an IP, if any.
    async fn find_active(&self, ip: &str, now: DateTime<Utc>)
    -> Result<Option<LockRecord>, Error>;

    /// All active lockdowns, oldest first.
    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, Error>;

    /// Mark a record as released by hand.
    ///
    /// Sets `release_at = now` and `manually_released = true` on the record if
    /// it is still unreleased, and returns the number of rows changed.
    async fn release(&self, id: i64, now: DateTime<Utc>) -> Result<u64, Error>;

    /// Every record ever created for an IP, oldest first.
    async fn history(&self, ip: &str) -> Result<Vec<LockRecord>, Error>;

    /// Delete lockdowns that ended before `before` and failures older than it.
    ///
    /// Records that are still active are never deleted.
    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
