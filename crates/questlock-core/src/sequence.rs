//! Per-user sequence counters.
//!
//! A counter is durable state in the main data database, one row per
//! `(user, resource)`. It is only ever mutated inside a unit of work run under
//! that counter's lock: the read and write helpers here are crate-private, and
//! every public mutating path goes through [`UserLockManager`].

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    lock::{LockChannel, LockName, LockTimeout, UserLockManager},
    Error, Result,
};

/// Resource name of the quest counter.
pub const QUEST_RESOURCE: &str = "quest";

const MAX_RESOURCE_LEN: usize = 32;

/// Positive user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn new(raw: i64) -> Result<Self> {
        if raw > 0 {
            Ok(Self(raw))
        } else {
            Err(Error::validation_error(format!(
                "user id must be positive, got {raw}"
            )))
        }
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one counter: a user and the kind of resource it numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceKey {
    user: UserId,
    resource: String,
}

impl SequenceKey {
    /// `resource` is lowercase ASCII letters, digits, `_` or `-`, 1-32 chars.
    pub fn new(user: UserId, resource: &str) -> Result<Self> {
        let valid = !resource.is_empty()
            && resource.len() <= MAX_RESOURCE_LEN
            && resource
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid {
            return Err(Error::validation_error(format!(
                "invalid sequence resource '{resource}': use 1-{MAX_RESOURCE_LEN} lowercase letters, digits, '_' or '-'"
            )));
        }
        Ok(Self {
            user,
            resource: resource.to_string(),
        })
    }

    /// The quest counter of `user`.
    pub fn quest(user: UserId) -> Self {
        Self {
            user,
            resource: QUEST_RESOURCE.to_string(),
        }
    }

    pub const fn user(&self) -> UserId {
        self.user
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// `<resource>-sequence:<user>`, e.g. `quest-sequence:42`.
    pub fn lock_name(&self) -> Result<LockName> {
        LockName::scoped(&format!("{}-sequence", self.resource), self.user)
    }
}

/// Last value handed out for `key`, zero if none yet.
pub(crate) async fn read_last(pool: &SqlitePool, key: &SequenceKey) -> Result<i64> {
    let last: Option<i64> = sqlx::query_scalar(
        "SELECT last_value FROM user_sequences WHERE user_id = ? AND resource = ?",
    )
    .bind(key.user.get())
    .bind(&key.resource)
    .fetch_optional(pool)
    .await?;
    Ok(last.unwrap_or(0))
}

pub(crate) async fn write_last(
    conn: &mut SqliteConnection,
    key: &SequenceKey,
    value: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO user_sequences (user_id, resource, last_value, updated_at)
         VALUES (?, ?, ?, strftime('%s', 'now'))
         ON CONFLICT(user_id, resource)
         DO UPDATE SET last_value = excluded.last_value, updated_at = excluded.updated_at",
    )
    .bind(key.user.get())
    .bind(&key.resource)
    .bind(value)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) fn successor(key: &SequenceKey, current: i64) -> Result<i64> {
    current.checked_add(1).ok_or_else(|| {
        Error::database_error(format!(
            "sequence {}:{} exhausted",
            key.resource, key.user
        ))
    })
}

/// Hands out the next value of a counter under its user-level lock.
#[derive(Debug)]
pub struct SequenceAllocator<C> {
    locks: Arc<UserLockManager<C>>,
    pool: SqlitePool,
}

impl<C: LockChannel> SequenceAllocator<C> {
    pub const fn new(locks: Arc<UserLockManager<C>>, pool: SqlitePool) -> Self {
        Self { locks, pool }
    }

    /// Read C, write C+1 and return it, all while holding the counter's lock.
    pub async fn next(&self, key: &SequenceKey, timeout: LockTimeout) -> Result<i64> {
        let name = key.lock_name()?;
        self.locks
            .run_locked(&name, timeout, || async {
                let current = read_last(&self.pool, key).await?;
                let next = successor(key, current)?;
                let mut tx = self.pool.begin().await?;
                write_last(&mut tx, key, next).await?;
                tx.commit().await?;
                tracing::debug!(lock = %name, value = next, "sequence advanced");
                Ok::<_, Error>(next)
            })
            .await
    }

    /// Last value handed out. Read-only; may be stale by the time it returns.
    pub async fn current(&self, key: &SequenceKey) -> Result<i64> {
        read_last(&self.pool, key).await
    }
}
