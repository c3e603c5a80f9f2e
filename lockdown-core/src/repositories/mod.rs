//! Repository traits for the data access layer
//!
//! The ledger service talks to storage only through these traits, so backends
//! can be swapped without touching the lockdown lifecycle.
//!
//! - [`LockdownRepository`] defines the record and failure-counter operations
//! - [`RepositoryProvider`] hands out the repository and owns schema lifecycle

pub mod lockdown;

pub use lockdown::LockdownRepository;

use async_trait::async_trait;

use crate::Error;

/// A storage backend able to serve the lockdown ledger.
#[async_trait]
pub trait RepositoryProvider: Send + Sync + 'static {
    /// The lockdown repository implementation type
    type LockdownRepo: LockdownRepository;

    /// Get a shared handle to the lockdown repository
    fn lockdown(&self) -> std::sync::Arc<Self::LockdownRepo>;

    /// Apply any pending schema migrations
    async fn migrate(&self) -> Result<(), Error>;

    /// Check that the backend is reachable
    async fn health_check(&self) -> Result<(), Error>;
}
