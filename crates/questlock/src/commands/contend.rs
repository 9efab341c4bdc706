//! `questlock contend`: N concurrent callers allocating from one counter.

use std::{sync::Arc, time::Instant};

use anyhow::Result;
use futures::future::join_all;
use questlock_core::{Error, LockStatsSnapshot, LockTimeout, SequenceKey};
use serde::Serialize;

use super::{print_json, App};

#[derive(Debug, Serialize)]
struct CallerFailure {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ContendReport {
    lock: String,
    callers: u32,
    timeout_secs: u64,
    start: i64,
    values: Vec<i64>,
    /// Distinct and consecutive. Callers on other instances may still
    /// interleave values between `start` and the lowest value seen here.
    contiguous: bool,
    failures: Vec<CallerFailure>,
    elapsed_ms: u128,
    stats: LockStatsSnapshot,
}

fn is_contiguous(sorted: &[i64]) -> bool {
    sorted.windows(2).all(|pair| pair[1] == pair[0] + 1)
}

pub async fn run(app: &App, key: SequenceKey, callers: u32, timeout: Option<i64>) -> Result<()> {
    let timeout = timeout.map_or_else(
        || Ok(app.locks.default_timeout()),
        LockTimeout::from_secs,
    )?;
    let lock = key.lock_name()?.to_string();
    let sequences = Arc::new(app.sequences());
    let key = Arc::new(key);
    let start = sequences.current(&key).await?;

    tracing::info!(%lock, callers, %timeout, "starting contention run");
    let started = Instant::now();

    let handles = (0..callers).map(|_| {
        let sequences = Arc::clone(&sequences);
        let key = Arc::clone(&key);
        tokio::spawn(async move { sequences.next(&key, timeout).await })
    });
    let joined = join_all(handles).await;
    let elapsed_ms = started.elapsed().as_millis();

    let mut values = Vec::new();
    let mut errors: Vec<Error> = Vec::new();
    for outcome in joined {
        match outcome {
            Ok(Ok(value)) => values.push(value),
            Ok(Err(e)) => errors.push(e),
            Err(join) => errors.push(Error::lock_infrastructure(lock.clone(), join.to_string())),
        }
    }
    values.sort_unstable();

    print_json(&ContendReport {
        lock: lock.clone(),
        callers,
        timeout_secs: timeout.secs(),
        start,
        contiguous: is_contiguous(&values),
        values,
        failures: errors
            .iter()
            .map(|e| CallerFailure {
                code: e.code(),
                message: e.to_string(),
            })
            .collect(),
        elapsed_ms,
        stats: app.locks.stats(),
    })?;

    match errors.into_iter().next() {
        Some(first) => Err(first.into()),
        None => Ok(()),
    }
}
