//! Validated lock names and wait bounds.
//!
//! Both are parsed once at the boundary of [`super::UserLockManager`] so that a
//! bad name or a negative timeout fails before a channel session is borrowed.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest name accepted by every backend (MySQL `GET_LOCK` caps names at 64).
pub const MAX_LOCK_NAME_LEN: usize = 64;

/// Opaque key identifying one mutually exclusive resource.
///
/// Convention is `<resource-type>:<owning-user-id>`. Two callers using the same
/// name exclude each other across threads and processes; different names never
/// block each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LockName(String);

impl LockName {
    /// Parse a lock name. The name is used verbatim as the key, so
    /// surrounding whitespace is rejected rather than stripped.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(Error::validation_error("lock name cannot be empty"));
        }
        if raw.trim() != raw {
            return Err(Error::validation_error(format!(
                "lock name '{raw}' has leading or trailing whitespace"
            )));
        }
        let len = raw.chars().count();
        if len > MAX_LOCK_NAME_LEN {
            return Err(Error::validation_error(format!(
                "lock name too long: {len} characters (max {MAX_LOCK_NAME_LEN})"
            )));
        }
        if raw.chars().any(char::is_control) {
            return Err(Error::validation_error(
                "lock name cannot contain control characters",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Build the conventional `<resource>:<owner>` name.
    pub fn scoped(resource: &str, owner: impl fmt::Display) -> Result<Self> {
        Self::parse(&format!("{resource}:{owner}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LockName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<LockName> for String {
    fn from(name: LockName) -> Self {
        name.0
    }
}

/// Upper bound on how long an acquire may wait, in whole seconds.
///
/// Zero means a single attempt without waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockTimeout(u64);

impl LockTimeout {
    /// Single attempt, no wait.
    pub const IMMEDIATE: Self = Self(0);

    /// Reject negative values instead of coercing them.
    pub fn from_secs(secs: i64) -> Result<Self> {
        u64::try_from(secs).map(Self).map_err(|_| {
            Error::invalid_config(format!("lock timeout must be non-negative, got {secs}s"))
        })
    }

    pub const fn secs(self) -> u64 {
        self.0
    }

    pub const fn as_duration(self) -> Duration {
        Duration::from_secs(self.0)
    }

    pub const fn is_immediate(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
