//! Quest creation: the caller that motivates the user-level lock.
//!
//! Each quest gets the next ordinal of its owner's quest counter. Reading the
//! counter, writing it back and inserting the quest all happen inside one unit
//! of work under `quest-sequence:<user>`, so concurrent requests for the same
//! user, on any instance, get distinct, gap-free ordinals.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    lock::{LockChannel, LockTimeout, UserLockManager},
    sequence::{read_last, successor, write_last, SequenceKey, UserId},
    Error, Result,
};

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quest {
    pub id: i64,
    pub user_id: UserId,
    /// 1-based ordinal within the user's quests.
    pub seq: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

fn validate_title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(Error::validation_error("quest title cannot be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::validation_error(format!(
            "quest title cannot exceed {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

#[derive(Debug)]
pub struct QuestService<C> {
    locks: Arc<UserLockManager<C>>,
    pool: SqlitePool,
}

impl<C: LockChannel> QuestService<C> {
    pub const fn new(locks: Arc<UserLockManager<C>>, pool: SqlitePool) -> Self {
        Self { locks, pool }
    }

    /// Create a quest using the lock manager's default timeout.
    pub async fn create_quest(&self, user: UserId, title: &str) -> Result<Quest> {
        self.create_quest_with_timeout(user, title, self.locks.default_timeout())
            .await
    }

    pub async fn create_quest_with_timeout(
        &self,
        user: UserId,
        title: &str,
        timeout: LockTimeout,
    ) -> Result<Quest> {
        let title = validate_title(title)?;
        let key = SequenceKey::quest(user);
        let name = key.lock_name()?;

        self.locks
            .run_locked(&name, timeout, || async {
                let seq = successor(&key, read_last(&self.pool, &key).await?)?;
                let created_at = Utc::now();

                let mut tx = self.pool.begin().await?;
                write_last(&mut tx, &key, seq).await?;
                let id = sqlx::query(
                    "INSERT INTO quests (user_id, seq, title, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(user.get())
                .bind(seq)
                .bind(&title)
                .bind(created_at.timestamp())
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();
                tx.commit().await?;

                tracing::info!(user = %user, seq, quest_id = id, "quest created");
                Ok::<_, Error>(Quest {
                    id,
                    user_id: user,
                    seq,
                    title: title.clone(),
                    created_at,
                })
            })
            .await
    }

    /// Quests of `user` in ordinal order.
    pub async fn list_quests(&self, user: UserId) -> Result<Vec<Quest>> {
        let rows: Vec<(i64, i64, String, i64)> = sqlx::query_as(
            "SELECT id, seq, title, created_at FROM quests WHERE user_id = ? ORDER BY seq",
        )
        .bind(user.get())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, seq, title, created_at)| {
                let created_at = DateTime::from_timestamp(created_at, 0).ok_or_else(|| {
                    Error::parse_error(format!("Invalid created_at for quest {id}"))
                })?;
                Ok(Quest {
                    id,
                    user_id: user,
                    seq,
                    title,
                    created_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{config::DatabaseConfig, db, lock::LocalLockChannel};

    async fn service(dir: &tempfile::TempDir) -> Result<QuestService<LocalLockChannel>> {
        let pool = db::open(&DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("quests.db").display()),
            max_connections: 4,
        })
        .await?;
        let locks = Arc::new(UserLockManager::new(
            LocalLockChannel::new(4, Duration::from_secs(1)),
            LockTimeout::from_secs(5)?,
        ));
        Ok(QuestService::new(locks, pool))
    }

    #[test]
    fn test_title_validation() {
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(201)).is_err());
        assert_eq!(validate_title("  Slay the dragon ").ok().as_deref(), Some("Slay the dragon"));
    }

    #[tokio::test]
    async fn test_quests_are_numbered_per_user() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let quests = service(&dir).await?;
        let alice = UserId::new(1)?;
        let bob = UserId::new(2)?;

        let first = quests.create_quest(alice, "Water the plants").await?;
        let second = quests.create_quest(alice, "Read a chapter").await?;
        let other = quests.create_quest(bob, "Go for a run").await?;

        assert_eq!((first.seq, second.seq, other.seq), (1, 2, 1));

        let listed = quests.list_quests(alice).await?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "Water the plants");
        assert_eq!(listed[1].seq, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_title_consumes_no_ordinal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let quests = service(&dir).await?;
        let user = UserId::new(5)?;

        assert!(quests.create_quest(user, "").await.is_err());
        let quest = quests.create_quest(user, "Stretch").await?;
        assert_eq!(quest.seq, 1);
        Ok(())
    }
}
