//! # Questlock Core
//!
//! User-level distributed locking for a gamified task tracker, and the
//! per-user sequence allocation it serializes.
//!
//! A unit of work runs under a named lock through
//! [`UserLockManager::execute_with_lock`]. The lock lives on a session
//! borrowed from a dedicated [`LockChannel`], a small pool kept apart from the
//! main data pool, and is released on every exit path.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` / `expect()` / `panic!()` outside tests
//! - No `unsafe`
//!
//! ## Error Handling
//!
//! All fallible operations return `Result<T, Error>`. Lock failures are
//! [`Error::LockTimeout`] (retryable by the caller) and
//! [`Error::LockInfrastructure`] (dependency outage). Errors from the unit of
//! work pass through untouched.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

pub mod config;
pub mod db;
mod error;
pub mod lock;
pub mod quest;
pub mod sequence;

pub use config::{load_config, Config, LockBackendKind};
pub use error::{Error, Result};
pub use lock::{
    AnyLockChannel, LockChannel, LockName, LockSession, LockStatsSnapshot, LockTimeout,
    UserLockManager,
};
pub use quest::{Quest, QuestService};
pub use sequence::{SequenceAllocator, SequenceKey, UserId};
