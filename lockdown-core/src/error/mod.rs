pub mod utilities;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Lockdown(#[from] LockdownError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Settings(#[from] SettingsError),
}

/// Errors raised by the lockdown lifecycle itself.
///
/// The display strings are shown to operators verbatim by the command line tool.
#[derive(Debug, Error)]
pub enum LockdownError {
    #[error("Invalid username.")]
    InvalidUsername(String),

    #[error("IP address {0} is not locked down.")]
    NotLocked(String),
}

/// Failures of the underlying store. Every variant is terminal for the calling
/// operation and is never retried.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Write was not applied: {0}")]
    NotApplied(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid IP address: {0}")]
    InvalidIp(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("This command has not been implemented yet.")]
    NotImplemented,

    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: String, reason: String },
}

impl Error {
    /// Whether this is a persistence failure of the underlying store.
    pub fn is_persistence_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_not_locked(&self) -> bool {
        matches!(self, Error::Lockdown(LockdownError::NotLocked(_)))
    }

    pub fn is_invalid_username(&self) -> bool {
        matches!(self, Error::Lockdown(LockdownError::InvalidUsername(_)))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}
