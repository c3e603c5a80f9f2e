//! Account lookups used to reject lockdowns for unknown usernames.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::Error;

/// The host application's account store.
#[async_trait]
pub trait AccountDirectory: Send + Sync + 'static {
    async fn username_exists(&self, username: &str) -> Result<bool, Error>;
}

/// Accepts every username. Used when there is no account store to consult.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyAccount;

#[async_trait]
impl AccountDirectory for AnyAccount {
    async fn username_exists(&self, _username: &str) -> Result<bool, Error> {
        Ok(true)
    }
}

/// A fixed set of known usernames.
#[derive(Debug, Clone, Default)]
pub struct StaticAccounts {
    usernames: HashSet<String>,
}

impl StaticAccounts {
    pub fn new<I, S>(usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            usernames: usernames.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl AccountDirectory for StaticAccounts {
    async fn username_exists(&self, username: &str) -> Result<bool, Error> {
        Ok(self.usernames.contains(username))
    }
}
