//! Runtime-selected lock channel.

use std::time::Duration;

use async_trait::async_trait;

use super::{
    channel::{AcquireOutcome, LockChannel, LockSession, ReleaseOutcome},
    local::{LocalLockChannel, LocalLockSession},
    mysql::{MySqlLockChannel, MySqlLockSession},
    name::{LockName, LockTimeout},
    sqlite::{SqliteLockChannel, SqliteLockSession},
};
use crate::{
    config::{LockBackendKind, LockConfig},
    Result,
};

/// One of the concrete channels, picked from [`LockConfig::backend`].
#[derive(Debug, Clone)]
pub enum AnyLockChannel {
    Sqlite(SqliteLockChannel),
    MySql(MySqlLockChannel),
    Local(LocalLockChannel),
}

impl AnyLockChannel {
    /// Build the configured channel. Its pool is always separate from the
    /// main data pool, even when both point at the same database.
    pub async fn connect(config: &LockConfig) -> Result<Self> {
        let checkout_timeout = Duration::from_millis(config.checkout_timeout_ms);
        tracing::debug!(
            backend = %config.backend,
            pool_size = config.pool_size,
            "opening lock channel"
        );
        match config.backend {
            LockBackendKind::Sqlite => SqliteLockChannel::connect(
                &config.url,
                config.pool_size,
                checkout_timeout,
                Duration::from_millis(config.poll_interval_ms),
            )
            .await
            .map(Self::Sqlite),
            LockBackendKind::MySql => {
                MySqlLockChannel::connect(&config.url, config.pool_size, checkout_timeout)
                    .await
                    .map(Self::MySql)
            }
            LockBackendKind::Local => Ok(Self::Local(LocalLockChannel::new(
                config.pool_size,
                checkout_timeout,
            ))),
        }
    }

    /// The SQLite channel, when that is the configured backend.
    pub const fn as_sqlite(&self) -> Option<&SqliteLockChannel> {
        match self {
            Self::Sqlite(channel) => Some(channel),
            Self::MySql(_) | Self::Local(_) => None,
        }
    }
}

/// Session from an [`AnyLockChannel`].
pub enum AnyLockSession {
    Sqlite(SqliteLockSession),
    MySql(MySqlLockSession),
    Local(LocalLockSession),
}

#[async_trait]
impl LockChannel for AnyLockChannel {
    type Session = AnyLockSession;

    async fn borrow(&self) -> Result<Self::Session> {
        match self {
            Self::Sqlite(channel) => channel.borrow().await.map(AnyLockSession::Sqlite),
            Self::MySql(channel) => channel.borrow().await.map(AnyLockSession::MySql),
            Self::Local(channel) => channel.borrow().await.map(AnyLockSession::Local),
        }
    }

    fn backend(&self) -> &'static str {
        match self {
            Self::Sqlite(channel) => channel.backend(),
            Self::MySql(channel) => channel.backend(),
            Self::Local(channel) => channel.backend(),
        }
    }
}

#[async_trait]
impl LockSession for AnyLockSession {
    async fn acquire(&mut self, name: &LockName, timeout: LockTimeout) -> Result<AcquireOutcome> {
        match self {
            Self::Sqlite(session) => session.acquire(name, timeout).await,
            Self::MySql(session) => session.acquire(name, timeout).await,
            Self::Local(session) => session.acquire(name, timeout).await,
        }
    }

    async fn release(&mut self, name: &LockName) -> Result<ReleaseOutcome> {
        match self {
            Self::Sqlite(session) => session.release(name).await,
            Self::MySql(session) => session.release(name).await,
            Self::Local(session) => session.release(name).await,
        }
    }
}
