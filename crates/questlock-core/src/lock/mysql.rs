//! MySQL lock channel over `GET_LOCK` / `RELEASE_LOCK`.
//!
//! Both functions are scoped to the server session, and the server frees every
//! lock a session holds when it disconnects. A pooled connection is not
//! disconnected when returned, so a session dropped while still holding locks
//! issues `RELEASE_ALL_LOCKS()` before going back, or closes the connection
//! outright when no runtime is available.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
    pool::PoolConnection,
    MySql, MySqlPool,
};

use super::{
    channel::{AcquireOutcome, LockChannel, LockSession, ReleaseOutcome},
    name::{LockName, LockTimeout},
};
use crate::{Error, Result};

/// Dedicated MySQL pool hosting lock sessions.
#[derive(Debug, Clone)]
pub struct MySqlLockChannel {
    pool: MySqlPool,
}

impl MySqlLockChannel {
    pub async fn connect(url: &str, pool_size: u32, checkout_timeout: Duration) -> Result<Self> {
        let options = MySqlConnectOptions::from_str(url)
            .map_err(|e| Error::invalid_config(format!("Invalid lock database URL: {e}")))?;

        let pool = MySqlPoolOptions::new()
            .max_connections(pool_size.max(1))
            .acquire_timeout(checkout_timeout)
            .connect_with(options)
            .await
            .map_err(|e| Error::database_error(format!("Failed to connect lock channel: {e}")))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool. The pool must not be shared with ordinary
    /// request traffic.
    pub const fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockChannel for MySqlLockChannel {
    type Session = MySqlLockSession;

    async fn borrow(&self) -> Result<Self::Session> {
        let conn = self.pool.acquire().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => Error::ChannelUnavailable(format!(
                "mysql lock channel exhausted: all {} sessions in use",
                self.pool.size()
            )),
            other => Error::ChannelUnavailable(other.to_string()),
        })?;

        Ok(MySqlLockSession {
            conn: Some(conn),
            held: 0,
        })
    }

    fn backend(&self) -> &'static str {
        "mysql"
    }
}

/// One pooled MySQL connection and the count of locks it holds.
pub struct MySqlLockSession {
    conn: Option<PoolConnection<MySql>>,
    held: usize,
}

impl MySqlLockSession {
    fn conn(&mut self) -> Result<&mut PoolConnection<MySql>> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::ChannelUnavailable("lock session already returned".into()))
    }
}

#[async_trait]
impl LockSession for MySqlLockSession {
    async fn acquire(&mut self, name: &LockName, timeout: LockTimeout) -> Result<AcquireOutcome> {
        // Counted before the wait: if this session is dropped mid-query the
        // server may still grant, and Drop must then release everything.
        self.held += 1;
        let conn = self.conn()?;
        let granted: Option<i64> = sqlx::query_scalar("SELECT GET_LOCK(?, ?)")
            .bind(name.as_str())
            .bind(timeout.secs())
            .fetch_one(&mut **conn)
            .await?;

        if granted != Some(1) {
            self.held -= 1;
        }
        match granted {
            Some(1) => Ok(AcquireOutcome::Granted),
            Some(0) => Ok(AcquireOutcome::TimedOut),
            Some(other) => Err(Error::database_error(format!(
                "GET_LOCK('{name}') returned unexpected value {other}"
            ))),
            None => Err(Error::database_error(format!(
                "GET_LOCK('{name}') returned NULL"
            ))),
        }
    }

    async fn release(&mut self, name: &LockName) -> Result<ReleaseOutcome> {
        let conn = self.conn()?;
        let released: Option<i64> = sqlx::query_scalar("SELECT RELEASE_LOCK(?)")
            .bind(name.as_str())
            .fetch_one(&mut **conn)
            .await?;

        match released {
            Some(1) => {
                self.held = self.held.saturating_sub(1);
                Ok(ReleaseOutcome::Released)
            }
            // 0: held by another session; NULL: no such lock
            Some(0) | None => Ok(ReleaseOutcome::NotHeld),
            Some(other) => Err(Error::database_error(format!(
                "RELEASE_LOCK('{name}') returned unexpected value {other}"
            ))),
        }
    }
}

impl Drop for MySqlLockSession {
    fn drop(&mut self) {
        if self.held == 0 {
            return;
        }
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let result = sqlx::query("SELECT RELEASE_ALL_LOCKS()")
                        .execute(&mut *conn)
                        .await;
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "failed to release locks of dropped session; closing connection");
                        drop(conn.detach());
                    }
                });
            }
            Err(_) => drop(conn.detach()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn channel() -> Option<MySqlLockChannel> {
        let url = std::env::var("QUESTLOCK_TEST_MYSQL_URL").ok()?;
        MySqlLockChannel::connect(&url, 4, Duration::from_secs(2))
            .await
            .ok()
    }

    #[tokio::test]
    #[ignore = "requires QUESTLOCK_TEST_MYSQL_URL"]
    async fn test_get_lock_excludes_second_session() -> Result<()> {
        let Some(channel) = channel().await else {
            return Ok(());
        };
        let lock = LockName::parse("questlock-test:1")?;
        let mut owner = channel.borrow().await?;
        let mut other = channel.borrow().await?;

        assert_eq!(
            owner.acquire(&lock, LockTimeout::IMMEDIATE).await?,
            AcquireOutcome::Granted
        );
        assert_eq!(
            other.acquire(&lock, LockTimeout::IMMEDIATE).await?,
            AcquireOutcome::TimedOut
        );
        assert_eq!(other.release(&lock).await?, ReleaseOutcome::NotHeld);
        assert_eq!(owner.release(&lock).await?, ReleaseOutcome::Released);
        assert_eq!(owner.release(&lock).await?, ReleaseOutcome::NotHeld);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ignore = "requires QUESTLOCK_TEST_MYSQL_URL"]
    async fn test_cancelled_wait_does_not_strand_a_grant() -> Result<()> {
        let Some(channel) = channel().await else {
            return Ok(());
        };
        let lock = LockName::parse("questlock-test:2")?;
        let mut owner = channel.borrow().await?;
        owner.acquire(&lock, LockTimeout::IMMEDIATE).await?;

        let waiting = tokio::time::timeout(Duration::from_millis(200), async {
            let mut session = channel.borrow().await?;
            session.acquire(&lock, LockTimeout::from_secs(5)?).await
        })
        .await;
        assert!(waiting.is_err(), "wait finished early: {waiting:?}");

        // the abandoned GET_LOCK may now be granted server-side
        owner.release(&lock).await?;
        drop(owner);

        let mut next = channel.borrow().await?;
        assert_eq!(
            next.acquire(&lock, LockTimeout::from_secs(3)?).await?,
            AcquireOutcome::Granted
        );
        assert_eq!(next.release(&lock).await?, ReleaseOutcome::Released);
        Ok(())
    }
}
