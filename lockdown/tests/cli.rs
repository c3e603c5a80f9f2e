//! Tests for the `lockdown` commands against a SQLite database

#![cfg(feature = "sqlite")]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use clap::Parser;
use lockdown::cli::Cli;
use lockdown::commands::{self, CommandError, CommandOutcome};
use lockdown::{Lockdown, LockdownBuilder, ManualClock, SqliteStorage};
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    clock: ManualClock,
    lockdown: Lockdown<SqliteStorage>,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let url = format!("sqlite://{}", dir.path().join("lockdown.db").display());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());

        let lockdown = LockdownBuilder::new()
            .with_sqlite(&url)
            .await
            .expect("Failed to connect to SQLite")
            .with_clock(Arc::new(clock.clone()))
            .apply_migrations(true)
            .build()
            .await
            .expect("Failed to build lockdown");

        Self {
            _dir: dir,
            clock,
            lockdown,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutcome, CommandError> {
        let cli = Cli::try_parse_from(std::iter::once("lockdown").chain(args.iter().copied()))
            .expect("Failed to parse arguments");
        commands::execute(&cli.command, &self.lockdown).await
    }

    async fn stdout(&self, args: &[&str]) -> String {
        self.run(args).await.expect("Command failed").stdout
    }
}

#[tokio::test]
async fn test_release_never_locked_ip() {
    let harness = Harness::new().await;

    let err = harness.run(&["release", "127.0.0.1"]).await.unwrap_err();
    assert_eq!(err.to_string(), "IP address 127.0.0.1 is not locked down.");
}

#[tokio::test]
async fn test_lock_and_is_locked_exit_codes() {
    let harness = Harness::new().await;

    assert_eq!(
        harness.stdout(&["lock", "192.0.2.10", "admin"]).await,
        "IP address 192.0.2.10 locked down.\n"
    );

    let locked = harness.run(&["is-locked", "192.0.2.10"]).await.unwrap();
    assert_eq!(locked.exit_code, 0);
    assert_eq!(locked.stdout, "IP address 192.0.2.10 is locked down.\n");

    let unlocked = harness
        .run(&["is-locked-down", "192.0.2.11"])
        .await
        .unwrap();
    assert_eq!(unlocked.exit_code, 1);
    assert_eq!(unlocked.stdout, "IP address 192.0.2.11 is not locked down.\n");
}

#[tokio::test]
async fn test_lockdown_alias_rejects_invalid_username() {
    let harness = Harness::new().await;

    let err = harness
        .run(&["lockdown", "192.0.2.10", "bad name!"])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid username.");

    let outcome = harness.run(&["is-locked", "192.0.2.10"]).await.unwrap();
    assert_eq!(outcome.exit_code, 1);
}

#[tokio::test]
async fn test_invalid_ip_is_rejected() {
    let harness = Harness::new().await;

    let err = harness.run(&["is-locked", "not-an-ip"]).await.unwrap_err();
    assert!(err.to_string().contains("Invalid IP address"));
}

#[tokio::test]
async fn test_list_formats_show_minutes_left() {
    let harness = Harness::new().await;

    harness.stdout(&["lock", "1.2.3.4", "admin"]).await;
    harness.clock.advance(Duration::minutes(20));
    harness.stdout(&["lock", "5.6.7.8", "editor"]).await;
    harness.clock.advance(Duration::minutes(3));

    assert_eq!(
        harness.stdout(&["list", "--format=csv"]).await,
        "lockdown_ID,minutes_left,lockdown_IP\n1,37,1.2.3.4\n2,57,5.6.7.8\n"
    );

    let json = harness.stdout(&["list", "--format", "json"]).await;
    let rows: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(rows[0]["lockdown_ID"], 1);
    assert_eq!(rows[0]["minutes_left"], 37);
    assert_eq!(rows[1]["lockdown_IP"], "5.6.7.8");

    let table = harness.stdout(&["list"]).await;
    assert!(table.contains("lockdown_ID"));
    assert!(table.contains("5.6.7.8"));

    let yaml = harness.stdout(&["list", "--format=yaml"]).await;
    assert!(yaml.contains("minutes_left: 57"));
}

#[tokio::test]
async fn test_release_then_release_again() {
    let harness = Harness::new().await;

    harness.stdout(&["lock", "192.0.2.10", "admin"]).await;
    assert_eq!(
        harness.stdout(&["release", "192.0.2.10"]).await,
        "IP address 192.0.2.10 released.\n"
    );

    let outcome = harness.run(&["is-locked", "192.0.2.10"]).await.unwrap();
    assert_eq!(outcome.exit_code, 1);

    let err = harness.run(&["release", "192.0.2.10"]).await.unwrap_err();
    assert_eq!(err.to_string(), "IP address 192.0.2.10 is not locked down.");
}

#[tokio::test]
async fn test_lock_expires_without_release() {
    let harness = Harness::new().await;

    harness.stdout(&["lock", "192.0.2.10", "admin"]).await;
    harness.clock.advance(Duration::minutes(60));

    let outcome = harness.run(&["is-locked", "192.0.2.10"]).await.unwrap();
    assert_eq!(outcome.exit_code, 1);
    assert_eq!(harness.stdout(&["list", "--format=json"]).await, "[]\n");
}

#[tokio::test]
async fn test_record_failure_locks_at_threshold() {
    let harness = Harness::new().await;

    for _ in 0..2 {
        assert_eq!(
            harness
                .stdout(&["record-failure", "198.51.100.7", "admin"])
                .await,
            "Failed login recorded for IP address 198.51.100.7.\n"
        );
    }
    assert_eq!(
        harness
            .stdout(&["record-failure", "198.51.100.7", "admin"])
            .await,
        "IP address 198.51.100.7 locked down.\n"
    );

    let outcome = harness.run(&["is-locked", "198.51.100.7"]).await.unwrap();
    assert_eq!(outcome.exit_code, 0);
}

#[tokio::test]
async fn test_update_setting_is_not_implemented() {
    let harness = Harness::new().await;

    let err = harness
        .run(&["update-setting", "max_retries", "5"])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "This command has not been implemented yet.");
}

#[tokio::test]
async fn test_history_keeps_released_records() {
    let harness = Harness::new().await;

    harness.stdout(&["lock", "192.0.2.10", "admin"]).await;
    harness.stdout(&["release", "192.0.2.10"]).await;
    harness.stdout(&["lock", "192.0.2.10", "admin"]).await;

    let json = harness
        .stdout(&["history", "192.0.2.10", "--format=json"])
        .await;
    let rows: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 2);
    assert_eq!(rows[0]["status"], "released");
    assert_eq!(rows[1]["status"], "active");
    assert_eq!(rows[1]["username"], "admin");
}

#[tokio::test]
async fn test_purge_removes_old_records_only() {
    let harness = Harness::new().await;

    harness.stdout(&["lock", "192.0.2.10", "admin"]).await;
    harness.stdout(&["release", "192.0.2.10"]).await;
    harness.clock.advance(Duration::days(31));
    harness.stdout(&["lock", "192.0.2.11", "admin"]).await;

    assert_eq!(
        harness.stdout(&["purge"]).await,
        "Purged 1 expired records.\n"
    );
    assert_eq!(
        harness
            .stdout(&["history", "192.0.2.10", "--format=csv"])
            .await,
        "lockdown_ID,lockdown_IP,username,locked_at,release_at,status\n"
    );

    let outcome = harness.run(&["is-locked", "192.0.2.11"]).await.unwrap();
    assert_eq!(outcome.exit_code, 0);
}

#[tokio::test]
async fn test_migrate_is_idempotent() {
    let harness = Harness::new().await;

    assert_eq!(harness.stdout(&["migrate"]).await, "Migrations applied.\n");
    assert_eq!(harness.stdout(&["migrate"]).await, "Migrations applied.\n");
}

#[tokio::test]
async fn test_lockdown_new_without_builder() {
    let storage = Arc::new(
        SqliteStorage::connect("sqlite::memory:")
            .await
            .expect("Failed to connect to SQLite"),
    );
    let lockdown = Lockdown::new(storage, lockdown::LockoutSettings::default());
    lockdown.migrate().await.expect("Migration failed");
    lockdown.health_check().await.expect("Health check failed");

    let cli = Cli::try_parse_from(["lockdown", "lock", "203.0.113.5", "admin"]).unwrap();
    let outcome = commands::execute(&cli.command, &lockdown).await.unwrap();
    assert_eq!(outcome.stdout, "IP address 203.0.113.5 locked down.\n");
    assert!(lockdown.ledger().is_locked("203.0.113.5").await.unwrap());
}

mod release_not_applied {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use lockdown::{Error, LockRecord, LockdownRepository, LockoutSettings, RepositoryProvider};
    use lockdown_core::FailureOutcome;
    use lockdown_storage_sqlite::SqliteLockdownRepository;

    /// Delegates to SQLite but reports every release as changing no rows.
    struct StaleReleases(Arc<SqliteLockdownRepository>);

    #[async_trait]
    impl LockdownRepository for StaleReleases {
        async fn record_failure(
            &self,
            ip: &str,
            username: &str,
            now: DateTime<Utc>,
            settings: &LockoutSettings,
        ) -> Result<FailureOutcome, Error> {
            self.0.record_failure(ip, username, now, settings).await
        }

        async fn lock(
            &self,
            ip: &str,
            username: &str,
            now: DateTime<Utc>,
            release_at: DateTime<Utc>,
        ) -> Result<LockRecord, Error> {
            self.0.lock(ip, username, now, release_at).await
        }

        async fn find_active(
            &self,
            ip: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<LockRecord>, Error> {
            self.0.find_active(ip, now).await
        }

        async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, Error> {
            self.0.list_active(now).await
        }

        async fn release(&self, _id: i64, _now: DateTime<Utc>) -> Result<u64, Error> {
            Ok(0)
        }

        async fn history(&self, ip: &str) -> Result<Vec<LockRecord>, Error> {
            self.0.history(ip).await
        }

        async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
            self.0.purge_expired(before).await
        }
    }

    struct StaleStorage {
        inner: SqliteStorage,
        repo: Arc<StaleReleases>,
    }

    #[async_trait]
    impl RepositoryProvider for StaleStorage {
        type LockdownRepo = StaleReleases;

        fn lockdown(&self) -> Arc<Self::LockdownRepo> {
            Arc::clone(&self.repo)
        }

        async fn migrate(&self) -> Result<(), Error> {
            self.inner.migrate().await
        }

        async fn health_check(&self) -> Result<(), Error> {
            self.inner.health_check().await
        }
    }

    #[tokio::test]
    async fn test_release_reports_failure_when_no_rows_change() {
        let inner = SqliteStorage::connect("sqlite::memory:")
            .await
            .expect("Failed to connect to SQLite");
        let repo = Arc::new(StaleReleases(inner.lockdown()));
        let storage = Arc::new(StaleStorage { inner, repo });

        let lockdown = LockdownBuilder::new()
            .with_storage(storage)
            .apply_migrations(true)
            .build()
            .await
            .expect("Failed to build lockdown");

        let lock = Cli::try_parse_from(["lockdown", "lock", "192.0.2.10", "admin"]).unwrap();
        commands::execute(&lock.command, &lockdown).await.unwrap();

        let release = Cli::try_parse_from(["lockdown", "release", "192.0.2.10"]).unwrap();
        let err = commands::execute(&release.command, &lockdown)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::ReleaseFailed { .. }));
        assert_eq!(err.to_string(), "Could not release IP address 192.0.2.10.");
        assert!(lockdown.ledger().is_locked("192.0.2.10").await.unwrap());
    }
}
