//! Lock channel: the dedicated session pool that hosts advisory locks.
//!
//! A lock is bound to the session that took it, so a session is checked out for
//! the whole protected interval instead of per query. The application's main
//! data pool must never be used here: a pooled connection recycled mid-hold
//! would carry the lock to an unrelated request.
//!
//! Returning a session is dropping it. Every backend's session type gives the
//! underlying connection back to its pool from `Drop`, and backends whose
//! primitive does not release on disconnect clean up there as well.

use async_trait::async_trait;

use super::name::{LockName, LockTimeout};
use crate::Result;

/// Result of a single acquire request against the primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The session now holds the lock.
    Granted,
    /// Someone else held the lock for the whole wait bound.
    TimedOut,
}

/// Result of a release request against the primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The session held the lock and gave it up.
    Released,
    /// The session did not hold the lock (never taken, reaped, or lost).
    NotHeld,
}

/// Source of lock sessions, bounded and separate from the main data pool.
#[async_trait]
pub trait LockChannel: Send + Sync {
    type Session: LockSession;

    /// Check out one session.
    ///
    /// Fails with [`crate::Error::ChannelUnavailable`] when the pool is
    /// exhausted past its checkout bound or the backend cannot be reached.
    /// Never retried at this layer.
    async fn borrow(&self) -> Result<Self::Session>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// One borrowed connection able to hold advisory locks.
///
/// Sessions are exclusive to a single acquire/work/release cycle and are never
/// shared between concurrent units of work.
#[async_trait]
pub trait LockSession: Send {
    /// Request `name`, waiting at most `timeout`. Zero means one attempt.
    async fn acquire(&mut self, name: &LockName, timeout: LockTimeout) -> Result<AcquireOutcome>;

    /// Give up `name` on this session.
    async fn release(&mut self, name: &LockName) -> Result<ReleaseOutcome>;
}
