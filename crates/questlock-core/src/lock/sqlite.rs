//! SQLite-backed lock channel.
//!
//! SQLite has no advisory-lock function, so a lock is a row in
//! `advisory_locks` keyed by name and owned by the token of the session that
//! inserted it. Exclusion across processes comes from SQLite's own file
//! locking on that table. Acquire polls until the deadline; no grant order is
//! promised.
//!
//! SQLite cannot notice a vanished client, so a session dropped while still
//! owning rows deletes them on the runtime it was dropped on. Rows left by a
//! crashed process are cleared with [`SqliteLockChannel::reap_stale`].

use std::{
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Sqlite, SqlitePool,
};
use tokio::time::Instant;

use super::{
    channel::{AcquireOutcome, LockChannel, LockSession, ReleaseOutcome},
    name::{LockName, LockTimeout},
};
use crate::{Error, Result};

const LOCK_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS advisory_locks (
    name TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    acquired_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_advisory_locks_session ON advisory_locks(session_id);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// A row in the lock table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeldLock {
    pub name: String,
    pub session_id: String,
    pub acquired_at: DateTime<Utc>,
}

/// Dedicated SQLite pool hosting lock sessions.
#[derive(Debug, Clone)]
pub struct SqliteLockChannel {
    pool: SqlitePool,
    poll_interval: Duration,
}

impl SqliteLockChannel {
    /// Open the lock database at `url` and make sure the lock table exists.
    pub async fn connect(
        url: &str,
        pool_size: u32,
        checkout_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self> {
        crate::db::ensure_sqlite_parent(url)?;

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::invalid_config(format!("Invalid lock database URL '{url}': {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size.max(1))
            .acquire_timeout(checkout_timeout)
            .connect_with(options)
            .await
            .map_err(|e| Error::database_error(format!("Failed to open lock database: {e}")))?;

        let channel = Self::from_pool(pool, poll_interval);
        channel.init().await?;
        Ok(channel)
    }

    /// Wrap an existing pool. The pool must not be shared with ordinary
    /// request traffic.
    pub fn from_pool(pool: SqlitePool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Create the lock table if missing.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(LOCK_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database_error(format!("Failed to initialize lock schema: {e}")))?;
        Ok(())
    }

    /// Every lock currently recorded, oldest first.
    pub async fn held_locks(&self) -> Result<Vec<HeldLock>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT name, session_id, acquired_at FROM advisory_locks ORDER BY acquired_at, name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(name, session_id, acquired_at)| {
                let acquired_at = DateTime::from_timestamp(acquired_at, 0).ok_or_else(|| {
                    Error::parse_error(format!("Invalid acquired_at for lock '{name}'"))
                })?;
                Ok(HeldLock {
                    name,
                    session_id,
                    acquired_at,
                })
            })
            .collect()
    }

    /// Delete locks older than `max_age`, returning how many were removed.
    ///
    /// Only safe when no live unit of work can run that long.
    pub async fn reap_stale(&self, max_age: Duration) -> Result<u64> {
        let max_age_secs = i64::try_from(max_age.as_secs())
            .map_err(|_| Error::validation_error("max age is too large"))?;
        let cutoff = Utc::now().timestamp().saturating_sub(max_age_secs);

        let reaped = sqlx::query("DELETE FROM advisory_locks WHERE acquired_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if reaped > 0 {
            tracing::warn!(reaped, max_age_secs, "reaped stale advisory locks");
        }
        Ok(reaped)
    }
}

#[async_trait]
impl LockChannel for SqliteLockChannel {
    type Session = SqliteLockSession;

    async fn borrow(&self) -> Result<Self::Session> {
        let conn = self.pool.acquire().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => Error::ChannelUnavailable(format!(
                "sqlite lock channel exhausted: all {} sessions in use",
                self.pool.size()
            )),
            other => Error::ChannelUnavailable(other.to_string()),
        })?;

        Ok(SqliteLockSession {
            conn: Some(conn),
            token: next_session_token(),
            held: Vec::new(),
            insert_in_flight: false,
            poll_interval: self.poll_interval,
        })
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

fn next_session_token() -> String {
    format!(
        "{}-{}-{}",
        std::process::id(),
        SESSION_SEQ.fetch_add(1, Ordering::Relaxed),
        Utc::now().timestamp_micros()
    )
}

/// One pooled connection plus the token that owns its lock rows.
pub struct SqliteLockSession {
    conn: Option<PoolConnection<Sqlite>>,
    token: String,
    held: Vec<LockName>,
    /// Set while an INSERT may still commit on the connection's worker even
    /// if this session is dropped before it returns.
    insert_in_flight: bool,
    poll_interval: Duration,
}

impl SqliteLockSession {
    fn conn(&mut self) -> Result<&mut PoolConnection<Sqlite>> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::ChannelUnavailable("lock session already returned".into()))
    }

    async fn try_insert(&mut self, name: &LockName) -> Result<bool> {
        let token = self.token.clone();
        let conn = self.conn()?;
        let inserted = sqlx::query(
            "INSERT INTO advisory_locks (name, session_id, acquired_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(name.as_str())
        .bind(&token)
        .bind(Utc::now().timestamp())
        .execute(&mut **conn)
        .await?
        .rows_affected();
        Ok(inserted == 1)
    }
}

#[async_trait]
impl LockSession for SqliteLockSession {
    async fn acquire(&mut self, name: &LockName, timeout: LockTimeout) -> Result<AcquireOutcome> {
        let deadline = Instant::now() + timeout.as_duration();
        loop {
            self.insert_in_flight = true;
            let inserted = self.try_insert(name).await?;
            self.insert_in_flight = false;
            if inserted {
                self.held.push(name.clone());
                return Ok(AcquireOutcome::Granted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(AcquireOutcome::TimedOut);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn release(&mut self, name: &LockName) -> Result<ReleaseOutcome> {
        let token = self.token.clone();
        let conn = self.conn()?;
        let deleted = sqlx::query("DELETE FROM advisory_locks WHERE name = ? AND session_id = ?")
            .bind(name.as_str())
            .bind(&token)
            .execute(&mut **conn)
            .await?
            .rows_affected();

        self.held.retain(|held| held != name);
        Ok(if deleted == 1 {
            ReleaseOutcome::Released
        } else {
            ReleaseOutcome::NotHeld
        })
    }
}

impl Drop for SqliteLockSession {
    fn drop(&mut self) {
        if self.held.is_empty() && !self.insert_in_flight {
            return;
        }
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let token = std::mem::take(&mut self.token);
        let names = std::mem::take(&mut self.held);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let result = sqlx::query("DELETE FROM advisory_locks WHERE session_id = ?")
                        .bind(&token)
                        .execute(&mut *conn)
                        .await;
                    if let Err(e) = result {
                        tracing::warn!(session = %token, error = %e, "failed to clear locks of dropped session");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    session = %token,
                    locks = ?names,
                    "lock session dropped outside a runtime; rows remain until reaped"
                );
            }
        }
    }
}
