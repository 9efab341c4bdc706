// Integration tests have relaxed clippy settings.
// Production code (src/) must use strict zero-unwrap/panic patterns.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::too_many_lines,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::cast_possible_wrap
)]
//! Lock manager properties against the SQLite channel.
//!
//! Two channels opened on the same lock file stand in for two application
//! instances sharing one database.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use questlock_core::{
    config::DatabaseConfig,
    db,
    lock::{SqliteLockChannel, UserLockManager},
    Error, LockTimeout, QuestService, SequenceAllocator, SequenceKey, UserId,
};
use tempfile::TempDir;
use tokio::sync::oneshot;

type Manager = UserLockManager<SqliteLockChannel>;

fn lock_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("locks.db").display())
}

fn data_config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("quests.db").display()),
        max_connections: 8,
    }
}

async fn instance_with(dir: &TempDir, pool_size: u32, checkout: Duration) -> Arc<Manager> {
    let channel = SqliteLockChannel::connect(
        &lock_url(dir),
        pool_size,
        checkout,
        Duration::from_millis(5),
    )
    .await
    .unwrap();
    Arc::new(UserLockManager::new(
        channel,
        LockTimeout::from_secs(10).unwrap(),
    ))
}

async fn instance(dir: &TempDir) -> Arc<Manager> {
    instance_with(dir, 8, Duration::from_secs(2)).await
}

/// Hold `name` on `mgr` until the returned sender fires.
async fn hold(
    mgr: &Arc<Manager>,
    name: &'static str,
) -> (oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let (held_tx, held_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let mgr = Arc::clone(mgr);
    let task = tokio::spawn(async move {
        mgr.execute_with_lock(name, 5, || async move {
            held_tx.send(()).unwrap();
            let _ = release_rx.await;
            Ok::<_, Error>(())
        })
        .await
        .unwrap();
    });
    held_rx.await.unwrap();
    (release_tx, task)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mutual_exclusion_across_instances_loses_no_updates() {
    let dir = tempfile::tempdir().unwrap();
    let instances = [instance(&dir).await, instance(&dir).await];
    let counter = Arc::new(AtomicI64::new(100));
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));
    let callers = 8;

    let mut handles = Vec::new();
    for i in 0..callers {
        let mgr = Arc::clone(&instances[i % 2]);
        let counter = Arc::clone(&counter);
        let inside = Arc::clone(&inside);
        let max_inside = Arc::clone(&max_inside);
        handles.push(tokio::spawn(async move {
            mgr.execute_with_lock("quest-sequence:42", 10, || async move {
                let now_inside = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now_inside, Ordering::SeqCst);

                // deliberately non-atomic read-modify-write
                let read = counter.load(Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.store(read + 1, Ordering::SeqCst);

                inside.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, Error>(())
            })
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 100 + callers as i64);
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_names_run_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = instance(&dir).await;
    let work = Duration::from_millis(400);

    let started = Instant::now();
    let (a, b) = tokio::join!(
        mgr.execute_with_lock("quest-sequence:1", 5, || async {
            tokio::time::sleep(work).await;
            Ok::<_, Error>(())
        }),
        mgr.execute_with_lock("quest-sequence:2", 5, || async {
            tokio::time::sleep(work).await;
            Ok::<_, Error>(())
        }),
    );
    let elapsed = started.elapsed();

    a.unwrap();
    b.unwrap();
    assert!(
        elapsed < Duration::from_millis(750),
        "distinct locks serialized: {elapsed:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn held_lock_times_out_other_instance_without_running_work() {
    let dir = tempfile::tempdir().unwrap();
    let holder = instance(&dir).await;
    let contender = instance(&dir).await;
    let (release, task) = hold(&holder, "quest-sequence:42").await;

    let ran = AtomicBool::new(false);
    let started = Instant::now();
    let result = contender
        .execute_with_lock("quest-sequence:42", 1, || async {
            ran.store(true, Ordering::SeqCst);
            Ok::<_, Error>(())
        })
        .await;
    let waited = started.elapsed();

    assert!(
        matches!(result, Err(Error::LockTimeout { timeout_secs: 1, .. })),
        "got {result:?}"
    );
    assert!(!ran.load(Ordering::SeqCst));
    assert!(waited >= Duration::from_millis(900), "gave up early: {waited:?}");
    assert_eq!(contender.stats().timed_out, 1);

    release.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn zero_timeout_fails_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = instance(&dir).await;
    let (release, task) = hold(&mgr, "quest-sequence:42").await;

    let started = Instant::now();
    let result = mgr
        .execute_with_lock("quest-sequence:42", 0, || async { Ok::<_, Error>(()) })
        .await;

    assert!(matches!(result, Err(Error::LockTimeout { timeout_secs: 0, .. })));
    assert!(started.elapsed() < Duration::from_millis(500));

    release.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_work_releases_lock_and_keeps_its_error() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = instance(&dir).await;
    let other = instance(&dir).await;

    let result: Result<(), Error> = mgr
        .execute_with_lock("quest-sequence:7", 5, || async {
            Err(Error::validation_error("reward already claimed"))
        })
        .await;
    assert_eq!(
        result,
        Err(Error::validation_error("reward already claimed"))
    );

    let started = Instant::now();
    other
        .execute_with_lock("quest-sequence:7", 0, || async { Ok::<_, Error>(()) })
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_work_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = instance(&dir).await;

    let task = {
        let mgr = Arc::clone(&mgr);
        tokio::spawn(async move {
            mgr.execute_with_lock("quest-sequence:8", 5, || async {
                if true {
                    panic!("achievement handler blew up");
                }
                Ok::<(), Error>(())
            })
            .await
        })
    };
    assert!(task.await.unwrap_err().is_panic());

    let other = instance(&dir).await;
    other
        .execute_with_lock("quest-sequence:8", 0, || async { Ok::<_, Error>(()) })
        .await
        .unwrap();
    assert!(other.channel().held_locks().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn caller_abandoning_the_wait_leaves_no_stuck_lock() {
    use sqlx::{Connection, SqliteConnection};

    let dir = tempfile::tempdir().unwrap();
    let mgr = instance(&dir).await;

    let mut blocker = SqliteConnection::connect(&lock_url(&dir)).await.unwrap();
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut blocker)
        .await
        .unwrap();

    let ran = AtomicBool::new(false);
    let abandoned = tokio::time::timeout(
        Duration::from_millis(200),
        mgr.execute_with_lock("quest-sequence:42", 3, || async {
            ran.store(true, Ordering::SeqCst);
            Ok::<_, Error>(())
        }),
    )
    .await;
    assert!(abandoned.is_err(), "acquire finished early: {abandoned:?}");
    assert!(!ran.load(Ordering::SeqCst));

    sqlx::query("COMMIT").execute(&mut blocker).await.unwrap();

    let other = instance(&dir).await;
    other
        .execute_with_lock("quest-sequence:42", 3, || async { Ok::<_, Error>(()) })
        .await
        .unwrap();
    assert!(other.channel().held_locks().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn padded_name_is_rejected_not_aliased() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = instance(&dir).await;
    let (release, task) = hold(&mgr, "quest-sequence:42").await;

    let result = mgr
        .execute_with_lock(" quest-sequence:42", 0, || async { Ok::<_, Error>(()) })
        .await;
    assert!(
        matches!(result, Err(Error::ValidationError(_))),
        "got {result:?}"
    );

    release.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exhausted_channel_is_infrastructure_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = instance_with(&dir, 1, Duration::from_millis(100)).await;
    let (release, task) = hold(&mgr, "quest-sequence:1").await;

    let ran = AtomicBool::new(false);
    let result = mgr
        .execute_with_lock("quest-sequence:2", 1, || async {
            ran.store(true, Ordering::SeqCst);
            Ok::<_, Error>(())
        })
        .await;
    assert!(
        matches!(result, Err(Error::LockInfrastructure { .. })),
        "got {result:?}"
    );
    assert!(!ran.load(Ordering::SeqCst));

    release.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_callers_get_contiguous_sequence_values() {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::open(&data_config(&dir)).await.unwrap();
    let allocator = Arc::new(SequenceAllocator::new(instance(&dir).await, pool));
    let key = SequenceKey::quest(UserId::new(42).unwrap());
    assert_eq!(key.lock_name().unwrap().as_str(), "quest-sequence:42");

    for _ in 0..3 {
        allocator.next(&key, LockTimeout::IMMEDIATE).await.unwrap();
    }
    let start = allocator.current(&key).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let allocator = Arc::clone(&allocator);
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            allocator
                .next(&key, LockTimeout::from_secs(10).unwrap())
                .await
        }));
    }

    let mut values = BTreeSet::new();
    for handle in handles {
        assert!(values.insert(handle.await.unwrap().unwrap()), "duplicate value");
    }
    let expected: BTreeSet<i64> = (start + 1..=start + 5).collect();
    assert_eq!(values, expected);
    assert_eq!(allocator.current(&key).await.unwrap(), start + 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_quest_creation_numbers_without_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::open(&data_config(&dir)).await.unwrap();
    let quests = Arc::new(QuestService::new(instance(&dir).await, pool));
    let user = UserId::new(42).unwrap();

    let mut handles = Vec::new();
    for i in 0..5 {
        let quests = Arc::clone(&quests);
        handles.push(tokio::spawn(async move {
            quests
                .create_quest(user, &format!("Daily quest {i}"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let seqs: Vec<i64> = quests
        .list_quests(user)
        .await
        .unwrap()
        .iter()
        .map(|q| q.seq)
        .collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
}

#[test]
fn separate_runtimes_share_one_counter() {
    let dir = tempfile::tempdir().unwrap();
    let lock_url = lock_url(&dir);
    let data = data_config(&dir);

    // schema first, so both "processes" open an initialised database
    tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(async { db::open(&data).await.unwrap().close().await });

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let lock_url = lock_url.clone();
            let data = data.clone();
            std::thread::spawn(move || {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_all()
                    .build()
                    .unwrap();
                rt.block_on(async move {
                    let channel = SqliteLockChannel::connect(
                        &lock_url,
                        4,
                        Duration::from_secs(2),
                        Duration::from_millis(5),
                    )
                    .await
                    .unwrap();
                    let locks = Arc::new(UserLockManager::new(
                        channel,
                        LockTimeout::from_secs(10).unwrap(),
                    ));
                    let allocator = Arc::new(SequenceAllocator::new(
                        locks,
                        db::open(&data).await.unwrap(),
                    ));
                    let key = SequenceKey::quest(UserId::new(9).unwrap());

                    let tasks: Vec<_> = (0..5)
                        .map(|_| {
                            let allocator = Arc::clone(&allocator);
                            let key = key.clone();
                            tokio::spawn(async move {
                                allocator
                                    .next(&key, LockTimeout::from_secs(10).unwrap())
                                    .await
                                    .unwrap()
                            })
                        })
                        .collect();

                    let mut values = Vec::new();
                    for task in tasks {
                        values.push(task.await.unwrap());
                    }
                    values
                })
            })
        })
        .collect();

    let mut all: Vec<i64> = workers
        .into_iter()
        .flat_map(|w| w.join().unwrap())
        .collect();
    all.sort_unstable();
    assert_eq!(all, (1..=10).collect::<Vec<_>>());
}
