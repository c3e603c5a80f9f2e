//! Repository implementations for SQLite storage

pub mod lockdown;

pub use lockdown::SqliteLockdownRepository;
