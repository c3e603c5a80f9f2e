//! Lockdown records and the views derived from them.
//!
//! A [`LockRecord`] is never physically deleted while it is active. Expiry is
//! logical: a record is active while it has not been released by hand and the
//! current time is before `release_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted lockdown of an IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub id: i64,
    pub ip: String,
    /// The account the lockout was triggered for.
    pub username: Option<String>,
    pub locked_at: DateTime<Utc>,
    pub release_at: DateTime<Utc>,
    pub manually_released: bool,
}

impl LockRecord {
    /// Whether this record still blocks its IP at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.manually_released && now < self.release_at
    }

    /// Whole minutes until release, rounded up and clamped at zero.
    pub fn minutes_left_at(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.release_at - now).num_milliseconds();
        if millis <= 0 {
            0
        } else {
            (millis + 59_999) / 60_000
        }
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> LockStatus {
        if self.manually_released {
            LockStatus::Released
        } else if now < self.release_at {
            LockStatus::Active
        } else {
            LockStatus::Expired
        }
    }
}

/// How a record resolves at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    Active,
    Expired,
    Released,
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockStatus::Active => write!(f, "active"),
            LockStatus::Expired => write!(f, "expired"),
            LockStatus::Released => write!(f, "released"),
        }
    }
}

/// One row of the active lockdown listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLockdown {
    pub id: i64,
    pub minutes_left: i64,
    pub ip: String,
}

impl ActiveLockdown {
    pub fn from_record(record: &LockRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            minutes_left: record.minutes_left_at(now),
            ip: record.ip.clone(),
        }
    }
}

/// Result of counting one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureOutcome {
    /// Failures inside the observation window, including this one. Zero when
    /// the attempt triggered a lockdown and the counter was reset.
    pub failures: u32,
    /// The created or refreshed lockdown, when the threshold was reached.
    pub lock: Option<LockRecord>,
}

impl FailureOutcome {
    pub fn locked(&self) -> bool {
        self.lock.is_some()
    }
}
