//! `questlock seq next|show`

use anyhow::Result;
use questlock_core::{SequenceKey, UserId};
use serde::Serialize;

use super::{print_json, App};

#[derive(Debug, Serialize)]
struct SequenceValue<'a> {
    user_id: UserId,
    resource: &'a str,
    lock: String,
    value: i64,
}

fn output(key: &SequenceKey, value: i64) -> Result<()> {
    print_json(&SequenceValue {
        user_id: key.user(),
        resource: key.resource(),
        lock: key.lock_name()?.to_string(),
        value,
    })
}

pub async fn next(app: &App, key: &SequenceKey) -> Result<()> {
    let value = app
        .sequences()
        .next(key, app.locks.default_timeout())
        .await?;
    output(key, value)
}

pub async fn show(app: &App, key: &SequenceKey) -> Result<()> {
    let value = app.sequences().current(key).await?;
    output(key, value)
}
