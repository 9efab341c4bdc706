//! `questlock init`

use anyhow::Result;
use questlock_core::LockBackendKind;
use serde::Serialize;

use super::{print_json, App};

#[derive(Debug, Serialize)]
struct InitOutput<'a> {
    database_url: &'a str,
    lock_backend: LockBackendKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    lock_url: Option<&'a str>,
    lock_pool_size: u32,
    default_timeout_secs: u64,
}

/// Both schemas are created when [`App::open`] connects; this reports what
/// was set up.
pub async fn run(app: &App) -> Result<()> {
    let lock = &app.config.lock;
    tracing::info!(
        database = %app.config.database.url,
        backend = %lock.backend,
        "questlock initialized"
    );

    print_json(&InitOutput {
        database_url: &app.config.database.url,
        lock_backend: lock.backend,
        lock_url: (lock.backend != LockBackendKind::Local).then_some(lock.url.as_str()),
        lock_pool_size: lock.pool_size,
        default_timeout_secs: app.locks.default_timeout().secs(),
    })
}
