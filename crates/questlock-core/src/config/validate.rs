//! Configuration validation

use super::{
    defaults::MAX_LOCK_POOL_SIZE,
    types::{Config, LockBackendKind},
};
use crate::{lock::LockTimeout, Error, Result};

impl Config {
    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any values are out of range or invalid
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(Error::invalid_config("database.url cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(Error::invalid_config(
                "database.max_connections must be at least 1",
            ));
        }

        if self.lock.backend != LockBackendKind::Local && self.lock.url.trim().is_empty() {
            return Err(Error::invalid_config(format!(
                "lock.url cannot be empty for the {} backend",
                self.lock.backend
            )));
        }

        if self.lock.pool_size == 0 || self.lock.pool_size > MAX_LOCK_POOL_SIZE {
            return Err(Error::invalid_config(format!(
                "lock.pool_size must be 1-{MAX_LOCK_POOL_SIZE}, got {}",
                self.lock.pool_size
            )));
        }

        if self.lock.checkout_timeout_ms == 0 {
            return Err(Error::invalid_config(
                "lock.checkout_timeout_ms must be at least 1",
            ));
        }

        if self.lock.poll_interval_ms == 0 {
            return Err(Error::invalid_config(
                "lock.poll_interval_ms must be at least 1",
            ));
        }

        self.default_lock_timeout().map(|_| ())
    }

    /// The configured default wait bound.
    ///
    /// # Errors
    ///
    /// Returns error if `lock.default_timeout_secs` is negative
    pub fn default_lock_timeout(&self) -> Result<LockTimeout> {
        LockTimeout::from_secs(self.lock.default_timeout_secs)
    }
}
