//! User-level lock manager.
//!
//! Runs a unit of work while holding a named advisory lock taken on a session
//! borrowed from the dedicated [`LockChannel`]:
//!
//! 1. borrow a session (returned on every exit path by dropping it)
//! 2. acquire the lock, bounded by the timeout
//! 3. run the work, capturing its result or panic
//! 4. release the lock on the same session, whatever the work did
//! 5. return the session
//! 6. hand back the work's outcome
//!
//! Acquisition failures short-circuit before the work runs. A failed release
//! is a [`ReleaseWarning`]: logged and counted, never allowed to replace the
//! work's own outcome.
//!
//! Grant order among waiters is whatever the backend primitive does; no FIFO
//! guarantee is added here.

use std::{future::Future, panic::AssertUnwindSafe};

use futures::FutureExt;

use super::{
    channel::{AcquireOutcome, LockChannel, LockSession, ReleaseOutcome},
    name::{LockName, LockTimeout},
    stats::{LockStats, LockStatsSnapshot, ReleaseWarning},
};
use crate::Error;

/// Serializes units of work per lock name, across tasks and processes.
#[derive(Debug)]
pub struct UserLockManager<C> {
    channel: C,
    default_timeout: LockTimeout,
    stats: LockStats,
}

impl<C: LockChannel> UserLockManager<C> {
    pub fn new(channel: C, default_timeout: LockTimeout) -> Self {
        Self {
            channel,
            default_timeout,
            stats: LockStats::default(),
        }
    }

    pub const fn channel(&self) -> &C {
        &self.channel
    }

    pub const fn default_timeout(&self) -> LockTimeout {
        self.default_timeout
    }

    pub fn stats(&self) -> LockStatsSnapshot {
        self.stats.snapshot()
    }

    /// Run `work` while holding lock `name`, waiting at most `timeout_secs`
    /// to acquire it.
    ///
    /// `timeout_secs = 0` makes a single attempt; a negative value is rejected
    /// with [`Error::InvalidConfig`] before anything is borrowed.
    ///
    /// Lock failures ([`Error::LockTimeout`], [`Error::LockInfrastructure`],
    /// validation) reach the caller through `E: From<Error>`. Whatever `work`
    /// returns, `Ok` or `Err`, is handed back unchanged after the release. A
    /// panic in `work` is resumed after the release.
    ///
    /// # Not reentrant
    ///
    /// Every call takes its own session. Calling this again for the same
    /// `name` from inside `work` waits on the lock the outer call holds and
    /// fails with [`Error::LockTimeout`] once the inner timeout elapses.
    pub async fn execute_with_lock<T, E, F, Fut>(
        &self,
        name: &str,
        timeout_secs: i64,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Error>,
    {
        let name = LockName::parse(name)?;
        let timeout = LockTimeout::from_secs(timeout_secs)?;
        self.run_locked(&name, timeout, work).await
    }

    /// [`Self::execute_with_lock`] with the configured default timeout.
    pub async fn execute_with_default_timeout<T, E, F, Fut>(
        &self,
        name: &str,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Error>,
    {
        let name = LockName::parse(name)?;
        self.run_locked(&name, self.default_timeout, work).await
    }

    /// Typed entry point for callers that already hold a parsed name and
    /// timeout.
    pub async fn run_locked<T, E, F, Fut>(
        &self,
        name: &LockName,
        timeout: LockTimeout,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Error>,
    {
        let backend = self.channel.backend();

        let mut session = self.channel.borrow().await.map_err(|e| {
            self.stats.record_infrastructure_failure();
            tracing::error!(lock = %name, backend, error = %e, "failed to borrow lock session");
            Error::lock_infrastructure(name.as_str(), e.to_string())
        })?;

        match session.acquire(name, timeout).await {
            Ok(AcquireOutcome::Granted) => {
                self.stats.record_acquired();
                tracing::debug!(lock = %name, backend, "lock acquired");
            }
            Ok(AcquireOutcome::TimedOut) => {
                drop(session);
                self.stats.record_timed_out();
                tracing::warn!(lock = %name, backend, timeout = %timeout, "lock wait timed out");
                return Err(Error::LockTimeout {
                    name: name.to_string(),
                    timeout_secs: timeout.secs(),
                }
                .into());
            }
            Err(e) => {
                drop(session);
                self.stats.record_infrastructure_failure();
                tracing::error!(lock = %name, backend, error = %e, "lock acquire failed");
                return Err(Error::lock_infrastructure(name.as_str(), e.to_string()).into());
            }
        }

        let outcome = AssertUnwindSafe(async move { work().await })
            .catch_unwind()
            .await;
        if !matches!(outcome, Ok(Ok(_))) {
            self.stats.record_work_failure();
        }

        match session.release(name).await {
            Ok(ReleaseOutcome::Released) => {
                tracing::debug!(lock = %name, backend, "lock released");
            }
            Ok(ReleaseOutcome::NotHeld) => self.stats.record_release_warning(&ReleaseWarning {
                name: name.clone(),
                reason: "lock was no longer held by this session".into(),
            }),
            Err(e) => self.stats.record_release_warning(&ReleaseWarning {
                name: name.clone(),
                reason: e.to_string(),
            }),
        }
        drop(session);

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
