//! Schema migrations for the SQLite backend.
//!
//! Applied versions are tracked in `_lockdown_migrations`. Each migration runs
//! in its own transaction together with the bookkeeping row, so several
//! processes may migrate the same database file at once.

use async_trait::async_trait;
use chrono::Utc;
use lockdown_core::{Error, error::StorageError};
use sqlx::{SqliteConnection, SqlitePool};

const MIGRATION_TABLE: &str = "_lockdown_migrations";

/// One versioned schema change.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique version number for ordering migrations
    fn version(&self) -> i64;

    fn name(&self) -> &str;

    async fn up(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error>;

    async fn down(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error>;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    /// Unix timestamp, seconds.
    pub applied_at: i64,
}

/// Every schema migration for the SQLite backend, in version order.
pub fn all_migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(CreateLockdownsTable),
        Box::new(CreateLoginFailuresTable),
        Box::new(CreateLockdownIndexes),
    ]
}

fn migration_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| {
        tracing::error!(error = %e, "{context}");
        StorageError::Migration(context.to_string()).into()
    }
}

pub struct SqliteMigrationManager {
    pool: SqlitePool,
}

impl SqliteMigrationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the tracking table if it does not exist yet.
    pub async fn initialize(&self) -> Result<(), Error> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL DEFAULT (unixepoch())
            );"#
        ))
        .execute(&self.pool)
        .await
        .map_err(migration_err("Failed to create migration table"))?;

        Ok(())
    }

    /// Apply pending migrations in version order.
    ///
    /// The version row is claimed before the schema change runs. Claiming is
    /// a write, so a concurrent migrator blocks on the database lock and then
    /// finds the version taken.
    pub async fn up(&self, migrations: &[Box<dyn Migration>]) -> Result<(), Error> {
        for migration in migrations {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(migration_err("Failed to begin migration"))?;

            let claimed = sqlx::query(&format!(
                "INSERT OR IGNORE INTO {MIGRATION_TABLE} (version, name, applied_at) VALUES (?, ?, ?)"
            ))
            .bind(migration.version())
            .bind(migration.name())
            .bind(Utc::now().timestamp())
            .execute(&mut *tx)
            .await
            .map_err(migration_err("Failed to record migration"))?;

            if claimed.rows_affected() == 0 {
                tx.rollback()
                    .await
                    .map_err(migration_err("Failed to roll back migration"))?;
                continue;
            }

            tracing::info!(
                version = migration.version(),
                name = migration.name(),
                "Applying migration"
            );

            let result = migration.up(&mut *tx).await;
            if let Err(e) = result {
                tx.rollback()
                    .await
                    .map_err(migration_err("Failed to roll back migration"))?;
                return Err(migration_err("Failed to apply migration")(e));
            }

            tx.commit()
                .await
                .map_err(migration_err("Failed to commit migration"))?;
        }
        Ok(())
    }

    /// Roll back applied migrations, newest first.
    pub async fn down(&self, migrations: &[Box<dyn Migration>]) -> Result<(), Error> {
        for migration in migrations.iter().rev() {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(migration_err("Failed to begin rollback"))?;

            let removed = sqlx::query(&format!("DELETE FROM {MIGRATION_TABLE} WHERE version = ?"))
                .bind(migration.version())
                .execute(&mut *tx)
                .await
                .map_err(migration_err("Failed to remove migration record"))?;

            if removed.rows_affected() == 0 {
                tx.rollback()
                    .await
                    .map_err(migration_err("Failed to roll back migration"))?;
                continue;
            }

            tracing::info!(
                version = migration.version(),
                name = migration.name(),
                "Rolling back migration"
            );

            let result = migration.down(&mut *tx).await;
            if let Err(e) = result {
                tx.rollback()
                    .await
                    .map_err(migration_err("Failed to roll back migration"))?;
                return Err(migration_err("Failed to revert migration")(e));
            }

            tx.commit()
                .await
                .map_err(migration_err("Failed to commit rollback"))?;
        }
        Ok(())
    }

    pub async fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>, Error> {
        sqlx::query_as::<_, MigrationRecord>(&format!(
            "SELECT version, name, applied_at FROM {MIGRATION_TABLE} ORDER BY version"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(migration_err("Failed to list applied migrations"))
    }

    pub async fn is_applied(&self, version: i64) -> Result<bool, Error> {
        sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {MIGRATION_TABLE} WHERE version = ?)"
        ))
        .bind(version)
        .fetch_one(&self.pool)
        .await
        .map_err(migration_err("Failed to check migration"))
    }
}

/// Lockdown records. Rows are kept after expiry or release as an audit trail.
pub struct CreateLockdownsTable;

#[async_trait]
impl Migration for CreateLockdownsTable {
    fn version(&self) -> i64 {
        1
    }

    fn name(&self) -> &str {
        "CreateLockdownsTable"
    }

    async fn up(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lockdowns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip TEXT NOT NULL,
                username TEXT,
                locked_at INTEGER NOT NULL,
                release_at INTEGER NOT NULL,
                manually_released INTEGER NOT NULL DEFAULT 0
            );"#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn down(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query("DROP TABLE IF EXISTS lockdowns")
            .execute(conn)
            .await?;
        Ok(())
    }
}

/// The per-IP failure counter, one row per failed attempt.
pub struct CreateLoginFailuresTable;

#[async_trait]
impl Migration for CreateLoginFailuresTable {
    fn version(&self) -> i64 {
        2
    }

    fn name(&self) -> &str {
        "CreateLoginFailuresTable"
    }

    async fn up(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS login_failures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip TEXT NOT NULL,
                username TEXT NOT NULL,
                attempted_at INTEGER NOT NULL
            );"#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn down(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query("DROP TABLE IF EXISTS login_failures")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateLockdownIndexes;

#[async_trait]
impl Migration for CreateLockdownIndexes {
    fn version(&self) -> i64 {
        3
    }

    fn name(&self) -> &str {
        "CreateLockdownIndexes"
    }

    async fn up(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_lockdowns_ip_release_at ON lockdowns(ip, release_at)",
        )
        .execute(&mut *conn)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_lockdowns_locked_at ON lockdowns(locked_at)")
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_login_failures_ip_attempted_at ON login_failures(ip, attempted_at)",
        )
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn down(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        for index in [
            "idx_lockdowns_ip_release_at",
            "idx_lockdowns_locked_at",
            "idx_login_failures_ip_attempted_at",
        ] {
            sqlx::query(&format!("DROP INDEX IF EXISTS {index}"))
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}
