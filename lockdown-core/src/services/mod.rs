//! Service layer for business logic
//!
//! Services sit between callers and the repositories and own the lockdown
//! decisions.

pub mod ledger;

pub use ledger::LockdownLedger;
