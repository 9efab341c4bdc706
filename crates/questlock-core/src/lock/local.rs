//! Process-local lock channel.
//!
//! Named `tokio` mutexes stand in for the database primitive and a semaphore
//! bounds the number of live sessions the way a small pool would. Exclusion
//! only holds inside one process; use it for single-instance deployments and
//! tests, never for a fleet sharing one database.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

use super::{
    channel::{AcquireOutcome, LockChannel, LockSession, ReleaseOutcome},
    name::{LockName, LockTimeout},
};
use crate::{Error, Result};

type KeyMutex = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
struct LockTable(Mutex<HashMap<LockName, KeyMutex>>);

impl LockTable {
    fn key_mutex(&self, name: &LockName) -> Result<KeyMutex> {
        let mut locks = self
            .0
            .lock()
            .map_err(|_| Error::ChannelUnavailable("local lock table poisoned".into()))?;
        Ok(Arc::clone(locks.entry(name.clone()).or_default()))
    }

    /// Drop the entry once nobody holds or waits on it. Waiters keep their own
    /// `Arc`, so a count of one means only the table references it.
    fn prune(&self, name: &LockName) {
        if let Ok(mut locks) = self.0.lock() {
            if locks.get(name).is_some_and(|m| Arc::strong_count(m) == 1) {
                locks.remove(name);
            }
        }
    }

    fn len(&self) -> usize {
        self.0.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}

/// In-process channel with a bounded number of concurrent sessions.
#[derive(Debug, Clone)]
pub struct LocalLockChannel {
    table: Arc<LockTable>,
    permits: Arc<Semaphore>,
    pool_size: u32,
    checkout_timeout: Duration,
}

impl LocalLockChannel {
    pub fn new(pool_size: u32, checkout_timeout: Duration) -> Self {
        let size = pool_size.max(1);
        Self {
            table: Arc::default(),
            permits: Arc::new(Semaphore::new(size as usize)),
            pool_size: size,
            checkout_timeout,
        }
    }

    /// Names currently tracked (held or awaited).
    pub fn tracked_names(&self) -> usize {
        self.table.len()
    }
}

#[async_trait]
impl LockChannel for LocalLockChannel {
    type Session = LocalLockSession;

    async fn borrow(&self) -> Result<Self::Session> {
        let permit = tokio::time::timeout(
            self.checkout_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| {
            Error::ChannelUnavailable(format!(
                "local lock channel exhausted: all {} sessions in use",
                self.pool_size
            ))
        })?
        .map_err(|e| Error::ChannelUnavailable(format!("local lock channel closed: {e}")))?;

        Ok(LocalLockSession {
            table: Arc::clone(&self.table),
            held: HashMap::new(),
            _permit: permit,
        })
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

/// Session over the local table. Dropping it frees every lock it still holds.
pub struct LocalLockSession {
    table: Arc<LockTable>,
    held: HashMap<LockName, OwnedMutexGuard<()>>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl LockSession for LocalLockSession {
    async fn acquire(&mut self, name: &LockName, timeout: LockTimeout) -> Result<AcquireOutcome> {
        let mutex = self.table.key_mutex(name)?;
        let guard = if timeout.is_immediate() {
            mutex.try_lock_owned().ok()
        } else {
            tokio::time::timeout(timeout.as_duration(), mutex.lock_owned())
                .await
                .ok()
        };

        match guard {
            Some(guard) => {
                self.held.insert(name.clone(), guard);
                Ok(AcquireOutcome::Granted)
            }
            None => {
                self.table.prune(name);
                Ok(AcquireOutcome::TimedOut)
            }
        }
    }

    async fn release(&mut self, name: &LockName) -> Result<ReleaseOutcome> {
        match self.held.remove(name) {
            Some(guard) => {
                drop(guard);
                self.table.prune(name);
                Ok(ReleaseOutcome::Released)
            }
            None => Ok(ReleaseOutcome::NotHeld),
        }
    }
}

impl Drop for LocalLockSession {
    fn drop(&mut self) {
        let names: Vec<LockName> = self.held.keys().cloned().collect();
        self.held.clear();
        for name in &names {
            self.table.prune(name);
        }
    }
}
