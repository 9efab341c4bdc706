//! `questlock locks list|reap` (sqlite backend)

use std::time::Duration;

use anyhow::Result;
use questlock_core::{lock::SqliteLockChannel, Error};
use serde::Serialize;

use super::{print_json, App};

fn sqlite_channel(app: &App) -> Result<&SqliteLockChannel> {
    app.locks.channel().as_sqlite().ok_or_else(|| {
        Error::validation_error(format!(
            "lock table commands need the sqlite lock backend, configured backend is {}",
            app.config.lock.backend
        ))
        .into()
    })
}

pub async fn list(app: &App) -> Result<()> {
    let held = sqlite_channel(app)?.held_locks().await?;
    print_json(&held)
}

#[derive(Debug, Serialize)]
struct ReapOutput {
    older_than_secs: u64,
    reaped: u64,
}

pub async fn reap(app: &App, older_than_secs: u64) -> Result<()> {
    let reaped = sqlite_channel(app)?
        .reap_stale(Duration::from_secs(older_than_secs))
        .await?;
    print_json(&ReapOutput {
        older_than_secs,
        reaped,
    })
}
