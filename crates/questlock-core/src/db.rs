//! Main data database: sequence counters and quests.
//!
//! This pool serves ordinary request transactions and is never used to hold
//! lock sessions; see [`crate::lock::LockChannel`].

use std::{path::Path, str::FromStr, time::Duration};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Row, SqlitePool,
};

use crate::{config::DatabaseConfig, Error, Result};

const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Database schema as SQL string - executed once on open
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY CHECK(version = 1)
);

CREATE TABLE IF NOT EXISTS user_sequences (
    user_id INTEGER NOT NULL,
    resource TEXT NOT NULL,
    last_value INTEGER NOT NULL CHECK(last_value >= 0),
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, resource)
);

CREATE TABLE IF NOT EXISTS quests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    title TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (user_id, seq)
);

CREATE INDEX IF NOT EXISTS idx_quests_user ON quests(user_id);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the main data database and apply the schema.
pub async fn open(config: &DatabaseConfig) -> Result<SqlitePool> {
    ensure_sqlite_parent(&config.url)?;

    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| {
            Error::invalid_config(format!("Invalid database URL '{}': {e}", config.url))
        })?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await
        .map_err(|e| Error::database_error(format!("Failed to connect to database: {e}")))?;

    init_schema(&pool).await?;
    check_schema_version(&pool).await?;
    Ok(pool)
}

/// Initialize database schema
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| Error::database_error(format!("Failed to initialize schema: {e}")))?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(CURRENT_SCHEMA_VERSION)
        .execute(pool)
        .await
        .map_err(|e| Error::database_error(format!("Failed to set schema version: {e}")))?;

    Ok(())
}

async fn check_schema_version(pool: &SqlitePool) -> Result<()> {
    let version: Option<i64> = sqlx::query("SELECT version FROM schema_version")
        .fetch_optional(pool)
        .await
        .map_err(|e| Error::database_error(format!("Failed to read schema version: {e}")))?
        .map(|row| {
            row.try_get("version")
                .map_err(|e| Error::database_error(format!("Failed to parse schema version: {e}")))
        })
        .transpose()?;

    match version {
        Some(v) if v == CURRENT_SCHEMA_VERSION => Ok(()),
        Some(v) => Err(Error::database_error(format!(
            "Schema version mismatch: database has version {v}, expected {CURRENT_SCHEMA_VERSION}"
        ))),
        None => Err(Error::database_error("Schema version missing")),
    }
}

/// Create the parent directory of a file-backed SQLite URL.
pub(crate) fn ensure_sqlite_parent(url: &str) -> Result<()> {
    let Some(rest) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::io_error(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })
        }
        _ => Ok(()),
    }
}
