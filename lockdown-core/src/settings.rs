//! Tunable lockout parameters.
//!
//! Settings are owned by the host application. The ledger reads them through a
//! [`SettingsProvider`] on every call and never stores them itself.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, error::SettingsError};

/// Configuration for the lockdown ledger.
///
/// Durations are expressed in seconds so the struct deserializes directly from
/// configuration files and environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutSettings {
    /// Number of failed attempts inside the observation window that locks an IP.
    pub max_retries: u32,
    /// How long a lockdown lasts.
    pub lockout_duration_seconds: i64,
    /// Only failures newer than this count towards `max_retries`.
    pub observation_window_seconds: i64,
    /// Expired records older than this are removed by compaction.
    pub retention_period_seconds: i64,
}

impl Default for LockoutSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            lockout_duration_seconds: 60 * 60,
            observation_window_seconds: 5 * 60,
            retention_period_seconds: 30 * 24 * 60 * 60,
        }
    }
}

/// Upper bound for every duration setting: 100 years.
pub const MAX_DURATION_SECONDS: i64 = 100 * 365 * 24 * 60 * 60;

impl LockoutSettings {
    pub fn lockout_duration(&self) -> Duration {
        Duration::seconds(self.lockout_duration_seconds.clamp(0, MAX_DURATION_SECONDS))
    }

    pub fn observation_window(&self) -> Duration {
        Duration::seconds(self.observation_window_seconds.clamp(0, MAX_DURATION_SECONDS))
    }

    pub fn retention_period(&self) -> Duration {
        Duration::seconds(self.retention_period_seconds.clamp(0, MAX_DURATION_SECONDS))
    }

    /// When a lockdown created at `now` ends.
    pub fn release_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, SettingsError> {
        now.checked_add_signed(self.lockout_duration())
            .ok_or_else(|| invalid("lockout_duration_seconds", "release time out of range"))
    }

    /// Oldest failure that still counts at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, SettingsError> {
        now.checked_sub_signed(self.observation_window())
            .ok_or_else(|| invalid("observation_window_seconds", "window start out of range"))
    }

    /// Records that ended before this instant may be purged.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, SettingsError> {
        now.checked_sub_signed(self.retention_period())
            .ok_or_else(|| invalid("retention_period_seconds", "cutoff out of range"))
    }

    /// Reject settings that would make the ledger lock nothing or lock forever.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_retries == 0 {
            return Err(invalid("max_retries", "must be at least 1"));
        }
        for (name, value, min) in [
            ("lockout_duration_seconds", self.lockout_duration_seconds, 1),
            ("observation_window_seconds", self.observation_window_seconds, 1),
            ("retention_period_seconds", self.retention_period_seconds, 0),
        ] {
            if value < min {
                let reason = if min == 0 {
                    "must not be negative"
                } else {
                    "must be positive"
                };
                return Err(invalid(name, reason));
            }
            if value > MAX_DURATION_SECONDS {
                return Err(invalid(name, "must not exceed 100 years"));
            }
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: &str) -> SettingsError {
    SettingsError::Invalid {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Read access to the lockout settings, plus an update hook the host may
/// implement.
pub trait SettingsProvider: Send + Sync + 'static {
    fn settings(&self) -> LockoutSettings;

    /// Change a single setting by name.
    ///
    /// Settings storage belongs to the host application, so the default
    /// implementation refuses.
    fn update_setting(&self, name: &str, value: &str) -> Result<(), Error> {
        tracing::debug!(name, value, "Setting update requested but not supported");
        Err(SettingsError::NotImplemented.into())
    }
}

impl SettingsProvider for LockoutSettings {
    fn settings(&self) -> LockoutSettings {
        self.clone()
    }
}
