//! User-level advisory locking.
//!
//! [`UserLockManager`] serializes units of work per lock name over a
//! [`LockChannel`], a small pool dedicated to holding lock sessions.

pub mod any;
pub mod channel;
pub mod local;
pub mod manager;
pub mod mysql;
pub mod name;
pub mod sqlite;
pub mod stats;

pub use any::{AnyLockChannel, AnyLockSession};
pub use channel::{AcquireOutcome, LockChannel, LockSession, ReleaseOutcome};
pub use local::LocalLockChannel;
pub use manager::UserLockManager;
pub use mysql::MySqlLockChannel;
pub use name::{LockName, LockTimeout, MAX_LOCK_NAME_LEN};
pub use sqlite::{HeldLock, SqliteLockChannel};
pub use stats::{LockStatsSnapshot, ReleaseWarning};
