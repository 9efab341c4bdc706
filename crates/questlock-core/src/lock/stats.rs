//! Lock manager counters.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::Serialize;

use super::name::LockName;

/// A release that failed after the unit of work had already finished.
///
/// Never changes the caller's outcome. A lock left behind is eventually freed
/// by the backend's disconnect behaviour (or reaped), but repeated warnings
/// need operator attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseWarning {
    pub name: LockName,
    pub reason: String,
}

impl fmt::Display for ReleaseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "release of lock '{}' failed: {}", self.name, self.reason)
    }
}

#[derive(Debug, Default)]
pub struct LockStats {
    acquired: AtomicU64,
    timed_out: AtomicU64,
    infrastructure_failures: AtomicU64,
    work_failures: AtomicU64,
    release_warnings: AtomicU64,
}

/// Point-in-time copy of [`LockStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockStatsSnapshot {
    pub acquired: u64,
    pub timed_out: u64,
    pub infrastructure_failures: u64,
    pub work_failures: u64,
    pub release_warnings: u64,
}

impl LockStats {
    pub(crate) fn record_acquired(&self) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_infrastructure_failure(&self) {
        self.infrastructure_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_work_failure(&self) {
        self.work_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release_warning(&self, warning: &ReleaseWarning) {
        self.release_warnings.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(lock = %warning.name, reason = %warning.reason, "{warning}");
    }

    pub fn snapshot(&self) -> LockStatsSnapshot {
        LockStatsSnapshot {
            acquired: self.acquired.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            infrastructure_failures: self.infrastructure_failures.load(Ordering::Relaxed),
            work_failures: self.work_failures.load(Ordering::Relaxed),
            release_warnings: self.release_warnings.load(Ordering::Relaxed),
        }
    }
}
