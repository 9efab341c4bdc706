//! Default configuration values

use super::types::{DatabaseConfig, LockConfig};

pub(super) const MAX_LOCK_POOL_SIZE: u32 = 32;

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:.questlock/questlock.db".to_string(),
            max_connections: 8,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: super::types::LockBackendKind::Sqlite,
            url: "sqlite:.questlock/locks.db".to_string(),
            pool_size: 4,
            checkout_timeout_ms: 2_000,
            default_timeout_secs: 10,
            poll_interval_ms: 25,
        }
    }
}
