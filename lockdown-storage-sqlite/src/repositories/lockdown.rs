//! SQLite implementation of the lockdown repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lockdown_core::{
    Error,
    error::{StorageError, utilities::DatabaseResultExt},
    lockdown::{FailureOutcome, LockRecord},
    repositories::LockdownRepository,
    settings::LockoutSettings,
};
use sqlx::{SqliteConnection, SqlitePool};

/// SQLite repository for lockdown records and the failure counter.
pub struct SqliteLockdownRepository {
    pool: SqlitePool,
}

impl SqliteLockdownRepository {
    /// Create a new SQLite lockdown repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const LOCKDOWN_COLUMNS: &str = "id, ip, username, locked_at, release_at, manually_released";

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct SqliteLockRecord {
    id: i64,
    ip: String,
    username: Option<String>,
    locked_at: i64,
    release_at: i64,
    manually_released: bool,
}

impl TryFrom<SqliteLockRecord> for LockRecord {
    type Error = Error;

    fn try_from(row: SqliteLockRecord) -> Result<Self, Self::Error> {
        Ok(LockRecord {
            id: row.id,
            ip: row.ip,
            username: row.username,
            locked_at: from_timestamp(row.locked_at)?,
            release_at: from_timestamp(row.release_at)?,
            manually_released: row.manually_released,
        })
    }
}

fn from_timestamp(ts: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| StorageError::Database(format!("Invalid timestamp: {ts}")).into())
}

fn into_records(rows: Vec<SqliteLockRecord>) -> Result<Vec<LockRecord>, Error> {
    rows.into_iter().map(LockRecord::try_from).collect()
}

/// Refresh the active lockdown for `ip`, or insert a new one.
///
/// Must run inside a transaction whose first statement was a write, so the
/// lookup and the insert see no concurrent writer.
async fn upsert_lock(
    conn: &mut SqliteConnection,
    ip: &str,
    username: &str,
    now: i64,
    release_at: i64,
) -> Result<LockRecord, Error> {
    let refreshed = sqlx::query_as::<_, SqliteLockRecord>(&format!(
        r#"
        UPDATE lockdowns
        SET release_at = ?
        WHERE ip = ? AND manually_released = 0 AND release_at > ?
        RETURNING {LOCKDOWN_COLUMNS}
        "#
    ))
    .bind(release_at)
    .bind(ip)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await
    .map_db_err_with_context("Failed to refresh lockdown")?;

    if let Some(row) = refreshed {
        return row.try_into();
    }

    let row = sqlx::query_as::<_, SqliteLockRecord>(&format!(
        r#"
        INSERT INTO lockdowns (ip, username, locked_at, release_at, manually_released)
        VALUES (?, ?, ?, ?, 0)
        RETURNING {LOCKDOWN_COLUMNS}
        "#
    ))
    .bind(ip)
    .bind(username)
    .bind(now)
    .bind(release_at)
    .fetch_one(&mut *conn)
    .await
    .map_db_err_with_context("Failed to create lockdown")?;

    row.try_into()
}

#[async_trait]
impl LockdownRepository for SqliteLockdownRepository {
    async fn record_failure(
        &self,
        ip: &str,
        username: &str,
        now: DateTime<Utc>,
        settings: &LockoutSettings,
    ) -> Result<FailureOutcome, Error> {
        let now_ts = now.timestamp();
        let since = settings.window_start(now)?.timestamp();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_db_err_with_context("Failed to begin transaction")?;

        // Writing first takes the database write lock before anything is read.
        sqlx::query("INSERT INTO login_failures (ip, username, attempted_at) VALUES (?, ?, ?)")
            .bind(ip)
            .bind(username)
            .bind(now_ts)
            .execute(&mut *tx)
            .await
            .map_db_err_with_context("Failed to record failed login")?;

        let failures: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM login_failures WHERE ip = ? AND attempted_at >= ?",
        )
        .bind(ip)
        .bind(since)
        .fetch_one(&mut *tx)
        .await
        .map_db_err_with_context("Failed to count failed logins")?;

        let failures = u32::try_from(failures).unwrap_or(u32::MAX);
        if failures < settings.max_retries {
            tx.commit()
                .await
                .map_db_err_with_context("Failed to commit failed login")?;
            return Ok(FailureOutcome {
                failures,
                lock: None,
            });
        }

        let release_at = settings.release_at(now)?.timestamp();
        let lock = upsert_lock(&mut tx, ip, username, now_ts, release_at).await?;

        sqlx::query("DELETE FROM login_failures WHERE ip = ?")
            .bind(ip)
            .execute(&mut *tx)
            .await
            .map_db_err_with_context("Failed to reset failed login counter")?;

        tx.commit()
            .await
            .map_db_err_with_context("Failed to commit lockdown")?;

        Ok(FailureOutcome {
            failures: 0,
            lock: Some(lock),
        })
    }

    async fn lock(
        &self,
        ip: &str,
        username: &str,
        now: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<LockRecord, Error> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_db_err_with_context("Failed to begin transaction")?;

        let lock = upsert_lock(
            &mut tx,
            ip,
            username,
            now.timestamp(),
            release_at.timestamp(),
        )
        .await?;

        tx.commit()
            .await
            .map_db_err_with_context("Failed to commit lockdown")?;

        Ok(lock)
    }

    async fn find_active(
        &self,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LockRecord>, Error> {
        let row = sqlx::query_as::<_, SqliteLockRecord>(&format!(
            r#"
            SELECT {LOCKDOWN_COLUMNS}
            FROM lockdowns
            WHERE ip = ? AND manually_released = 0 AND release_at > ?
            ORDER BY id DESC
            LIMIT 1
            "#
        ))
        .bind(ip)
        .bind(now.timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to look up lockdown")?;

        row.map(LockRecord::try_from).transpose()
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, Error> {
        let rows = sqlx::query_as::<_, SqliteLockRecord>(&format!(
            r#"
            SELECT {LOCKDOWN_COLUMNS}
            FROM lockdowns
            WHERE manually_released = 0 AND release_at > ?
            ORDER BY locked_at ASC, id ASC
            "#
        ))
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_db_err_with_context("Failed to list lockdowns")?;

        into_records(rows)
    }

    async fn release(&self, id: i64, now: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE lockdowns
            SET release_at = ?, manually_released = 1
            WHERE id = ? AND manually_released = 0
            "#,
        )
        .bind(now.timestamp())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to release lockdown")?;

        Ok(result.rows_affected())
    }

    async fn history(&self, ip: &str) -> Result<Vec<LockRecord>, Error> {
        let rows = sqlx::query_as::<_, SqliteLockRecord>(&format!(
            r#"
            SELECT {LOCKDOWN_COLUMNS}
            FROM lockdowns
            WHERE ip = ?
            ORDER BY locked_at ASC, id ASC
            "#
        ))
        .bind(ip)
        .fetch_all(&self.pool)
        .await
        .map_db_err_with_context("Failed to load lockdown history")?;

        into_records(rows)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let before = before.timestamp();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_db_err_with_context("Failed to begin transaction")?;

        let lockdowns = sqlx::query("DELETE FROM lockdowns WHERE release_at < ?")
            .bind(before)
            .execute(&mut *tx)
            .await
            .map_db_err_with_context("Failed to purge lockdowns")?;

        let failures = sqlx::query("DELETE FROM login_failures WHERE attempted_at < ?")
            .bind(before)
            .execute(&mut *tx)
            .await
            .map_db_err_with_context("Failed to purge failed logins")?;

        tx.commit()
            .await
            .map_db_err_with_context("Failed to commit purge")?;

        Ok(lockdowns.rows_affected() + failures.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::{SqliteMigrationManager, all_migrations};
    use chrono::Duration;
    use sqlx::SqlitePool;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create pool");

        let manager = SqliteMigrationManager::new(pool.clone());
        manager
            .initialize()
            .await
            .expect("Failed to initialize migrations");
        manager
            .up(&all_migrations())
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn settings(max_retries: u32) -> LockoutSettings {
        LockoutSettings {
            max_retries,
            lockout_duration_seconds: 40 * 60,
            ..Default::default()
        }
    }

    async fn failure_count(pool: &SqlitePool, ip: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM login_failures WHERE ip = ?")
            .bind(ip)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_failure_below_threshold() {
        let pool = setup_test_db().await;
        let repo = SqliteLockdownRepository::new(pool.clone());
        let now = Utc::now();

        let outcome = repo
            .record_failure("1.2.3.4", "admin", now, &settings(3))
            .await
            .expect("Failed to record failure");

        assert_eq!(outcome.failures, 1);
        assert!(outcome.lock.is_none());
        assert_eq!(failure_count(&pool, "1.2.3.4").await, 1);
    }

    #[tokio::test]
    async fn test_record_failure_locks_and_resets_counter() {
        let pool = setup_test_db().await;
        let repo = SqliteLockdownRepository::new(pool.clone());
        let now = Utc::now();

        for _ in 0..2 {
            repo.record_failure("1.2.3.4", "admin", now, &settings(3))
                .await
                .unwrap();
        }
        let outcome = repo
            .record_failure("1.2.3.4", "admin", now, &settings(3))
            .await
            .unwrap();

        let lock = outcome.lock.expect("Third failure should lock");
        assert_eq!(lock.ip, "1.2.3.4");
        assert_eq!(lock.username.as_deref(), Some("admin"));
        assert_eq!(
            lock.release_at.timestamp(),
            (now + Duration::minutes(40)).timestamp()
        );
        assert!(!lock.manually_released);
        assert_eq!(failure_count(&pool, "1.2.3.4").await, 0);
    }

    #[tokio::test]
    async fn test_record_failure_ignores_old_attempts() {
        let pool = setup_test_db().await;
        let repo = SqliteLockdownRepository::new(pool);
        let now = Utc::now();

        repo.record_failure("1.2.3.4", "admin", now - Duration::minutes(10), &settings(2))
            .await
            .unwrap();
        let outcome = repo
            .record_failure("1.2.3.4", "admin", now, &settings(2))
            .await
            .unwrap();

        assert_eq!(outcome.failures, 1);
        assert!(outcome.lock.is_none());
    }

    #[tokio::test]
    async fn test_lock_refreshes_active_record() {
        let pool = setup_test_db().await;
        let repo = SqliteLockdownRepository::new(pool);
        let now = Utc::now();

        let first = repo
            .lock("1.2.3.4", "admin", now, now + Duration::minutes(10))
            .await
            .unwrap();
        let second = repo
            .lock(
                "1.2.3.4",
                "admin",
                now + Duration::minutes(1),
                now + Duration::minutes(60),
            )
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.locked_at, first.locked_at);
        assert_eq!(
            second.release_at.timestamp(),
            (now + Duration::minutes(60)).timestamp()
        );
        assert_eq!(repo.history("1.2.3.4").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lock_after_expiry_creates_new_record() {
        let pool = setup_test_db().await;
        let repo = SqliteLockdownRepository::new(pool);
        let now = Utc::now();

        let first = repo
            .lock("1.2.3.4", "admin", now, now + Duration::minutes(10))
            .await
            .unwrap();
        let later = now + Duration::minutes(20);
        let second = repo
            .lock("1.2.3.4", "admin", later, later + Duration::minutes(10))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(repo.history("1.2.3.4").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_find_active_respects_expiry() {
        let pool = setup_test_db().await;
        let repo = SqliteLockdownRepository::new(pool);
        let now = Utc::now();

        repo.lock("1.2.3.4", "admin", now, now + Duration::minutes(10))
            .await
            .unwrap();

        assert!(repo.find_active("1.2.3.4", now).await.unwrap().is_some());
        assert!(
            repo.find_active("1.2.3.4", now + Duration::minutes(11))
                .await
                .unwrap()
                .is_none()
        );
        assert!(repo.find_active("5.6.7.8", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_applies_once() {
        let pool = setup_test_db().await;
        let repo = SqliteLockdownRepository::new(pool);
        let now = Utc::now();

        let lock = repo
            .lock("1.2.3.4", "admin", now, now + Duration::minutes(10))
            .await
            .unwrap();

        assert_eq!(repo.release(lock.id, now).await.unwrap(), 1);
        assert_eq!(repo.release(lock.id, now).await.unwrap(), 0);
        assert!(repo.find_active("1.2.3.4", now).await.unwrap().is_none());

        let history = repo.history("1.2.3.4").await.unwrap();
        assert!(history[0].manually_released);
        assert_eq!(history[0].release_at.timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn test_list_active_ordered_by_locked_at() {
        let pool = setup_test_db().await;
        let repo = SqliteLockdownRepository::new(pool);
        let now = Utc::now();

        repo.lock("10.0.0.3", "admin", now, now + Duration::minutes(30))
            .await
            .unwrap();
        repo.lock(
            "10.0.0.1",
            "admin",
            now - Duration::minutes(5),
            now + Duration::minutes(30),
        )
        .await
        .unwrap();
        let released = repo
            .lock("10.0.0.2", "admin", now, now + Duration::minutes(30))
            .await
            .unwrap();
        repo.release(released.id, now).await.unwrap();

        let ips: Vec<_> = repo
            .list_active(now)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.ip)
            .collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.3"]);
    }

    #[tokio::test]
    async fn test_purge_keeps_active_records() {
        let pool = setup_test_db().await;
        let repo = SqliteLockdownRepository::new(pool.clone());
        let now = Utc::now();

        repo.lock(
            "10.0.0.1",
            "admin",
            now - Duration::days(40),
            now - Duration::days(39),
        )
        .await
        .unwrap();
        repo.lock("10.0.0.2", "admin", now, now + Duration::minutes(30))
            .await
            .unwrap();
        repo.record_failure("10.0.0.3", "admin", now - Duration::days(40), &settings(5))
            .await
            .unwrap();

        let purged = repo.purge_expired(now - Duration::days(30)).await.unwrap();
        assert_eq!(purged, 2);

        assert!(repo.history("10.0.0.1").await.unwrap().is_empty());
        assert_eq!(repo.history("10.0.0.2").await.unwrap().len(), 1);
        assert_eq!(failure_count(&pool, "10.0.0.3").await, 0);
    }
}
