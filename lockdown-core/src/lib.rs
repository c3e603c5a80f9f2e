//! Core functionality for the lockdown ledger
//!
//! This crate records failed logins per IP address, decides when an IP crosses
//! into a locked state, and answers lock queries against a pluggable store.
//!
//! See [`LockdownLedger`] for the service, [`LockRecord`] for the persisted
//! record, and [`LockdownRepository`] for the storage interface a backend
//! implements.
//!
pub mod accounts;
pub mod clock;
pub mod error;
pub mod lockdown;
pub mod repositories;
pub mod services;
pub mod settings;
pub mod validation;

pub use accounts::{AccountDirectory, AnyAccount, StaticAccounts};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::Error;
pub use lockdown::{ActiveLockdown, FailureOutcome, LockRecord, LockStatus};
pub use repositories::{LockdownRepository, RepositoryProvider};
pub use services::LockdownLedger;
pub use settings::{LockoutSettings, SettingsProvider};
