//! Command line definitions.

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// Manage IP address lockdowns caused by failed logins
#[derive(Debug, Parser)]
#[command(name = "lockdown", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML or YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Database connection string, overrides the configuration file
    #[arg(long, env = "LOCKDOWN_DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Lock down an IP address immediately
    #[command(visible_alias = "lockdown")]
    Lock {
        /// IP address to lock down
        ip: String,
        /// Username the lockdown is recorded against
        username: String,
    },
    /// Check whether an IP address is locked down
    ///
    /// Exits with status 0 when the address is locked and 1 when it is not.
    #[command(visible_alias = "is-locked-down")]
    IsLocked {
        /// IP address to check
        ip: String,
    },
    /// List active lockdowns, oldest first
    List {
        /// Output format
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Release a locked down IP address early
    Release {
        /// IP address to release
        ip: String,
    },
    /// Update a lockout setting
    UpdateSetting {
        /// Setting name
        name: String,
        /// New value
        value: String,
    },
    /// Count a failed login and lock the IP address once the limit is reached
    RecordFailure {
        /// IP address the attempt came from
        ip: String,
        /// Username that was tried
        username: String,
    },
    /// Show every lockdown recorded for an IP address
    History {
        /// IP address to inspect
        ip: String,
        /// Output format
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Delete records that ended longer ago than the retention period
    Purge,
    /// Run database migrations
    Migrate,
}
