//! Command handlers behind the `lockdown` binary.
//!
//! Handlers never print. They return the text for stdout and the exit code so
//! the binary and the tests drive them the same way.

use lockdown_core::RepositoryProvider;

use crate::Lockdown;
use crate::cli::Command;
use crate::output::{HistoryRow, LockdownRow, OutputError, render_list};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Ledger(#[from] lockdown_core::Error),

    #[error("Could not release IP address {ip}.")]
    ReleaseFailed { ip: String },

    #[error(transparent)]
    Render(#[from] OutputError),
}

/// Result of a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub stdout: String,
    pub exit_code: u8,
}

impl CommandOutcome {
    fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: 0,
        }
    }

    fn line(message: impl std::fmt::Display) -> Self {
        Self::success(format!("{message}\n"))
    }
}

/// Run `command` against `lockdown`.
pub async fn execute<R: RepositoryProvider>(
    command: &Command,
    lockdown: &Lockdown<R>,
) -> Result<CommandOutcome, CommandError> {
    let ledger = lockdown.ledger();

    match command {
        Command::Lock { ip, username } => {
            ledger.lock(ip, username).await?;
            Ok(CommandOutcome::line(format!("IP address {ip} locked down.")))
        }
        Command::IsLocked { ip } => {
            if ledger.is_locked(ip).await? {
                Ok(CommandOutcome::line(format!("IP address {ip} is locked down.")))
            } else {
                Ok(CommandOutcome {
                    stdout: format!("IP address {ip} is not locked down.\n"),
                    exit_code: 1,
                })
            }
        }
        Command::List { format } => {
            let rows: Vec<LockdownRow> = ledger.list().await?.iter().map(Into::into).collect();
            Ok(CommandOutcome::success(render_list(&rows, *format)?))
        }
        Command::Release { ip } => match ledger.release(ip).await {
            Ok(_) => Ok(CommandOutcome::line(format!("IP address {ip} released."))),
            Err(e) if e.is_persistence_error() => {
                Err(CommandError::ReleaseFailed { ip: ip.clone() })
            }
            Err(e) => Err(e.into()),
        },
        Command::UpdateSetting { name, value } => {
            ledger.update_setting(name, value).await?;
            Ok(CommandOutcome::line(format!("Setting {name} updated.")))
        }
        Command::RecordFailure { ip, username } => {
            if ledger.record_failure(ip, username).await? {
                Ok(CommandOutcome::line(format!("IP address {ip} locked down.")))
            } else {
                Ok(CommandOutcome::line(format!("Failed login recorded for IP address {ip}.")))
            }
        }
        Command::History { ip, format } => {
            let now = ledger.now();
            let rows: Vec<HistoryRow> = ledger
                .history(ip)
                .await?
                .iter()
                .map(|record| HistoryRow::from_record(record, now))
                .collect();
            Ok(CommandOutcome::success(render_list(&rows, *format)?))
        }
        Command::Purge => {
            let purged = ledger.purge_expired().await?;
            Ok(CommandOutcome::line(format!("Purged {purged} expired records.")))
        }
        Command::Migrate => {
            lockdown.migrate().await?;
            Ok(CommandOutcome::line("Migrations applied."))
        }
    }
}
