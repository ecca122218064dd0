use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use statusline::timeline::{
    LockProvider, MemoryLockProvider, MemoryStatusBoard, MemoryTimelineStore, TimelineEngine,
};
use statusline::{RecordStatusChange, StatusLineError};
use uuid::Uuid;

fn engine_with(locks: MemoryLockProvider) -> (TimelineEngine, MemoryStatusBoard) {
    let board = MemoryStatusBoard::new();
    let engine = TimelineEngine::builder(
        Arc::new(MemoryTimelineStore::new()),
        Arc::new(locks),
        Arc::new(board.clone()),
    )
    .build();
    (engine, board)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creations_never_share_a_prior() {
    let (engine, board) = engine_with(MemoryLockProvider::new(Duration::from_secs(5)));
    let monitor = Uuid::new_v4();
    let writers = 32;

    let tasks = (0..writers).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .record_status_change(RecordStatusChange::new(monitor, Uuid::new_v4()))
                .await
        })
    });
    let changes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task joins").expect("status recorded"))
        .collect();

    let priors: Vec<Uuid> = changes.iter().filter_map(|change| change.closed_prior).collect();
    assert_eq!(priors.len(), writers - 1, "exactly one writer saw an empty timeline");
    let distinct: HashSet<Uuid> = priors.iter().copied().collect();
    assert_eq!(distinct.len(), priors.len(), "a prior was closed twice");

    let timeline = engine.timeline(monitor).await.expect("timeline");
    assert_eq!(timeline.len(), writers);
    let audit = engine.audit(monitor).await.expect("audit");
    assert!(audit.is_consistent(), "{:?}", audit.violations);

    let current = engine.current(monitor).await.expect("current").expect("open interval");
    assert_eq!(board.current(monitor), Some(current.status_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deletions_keep_one_interval() {
    let (engine, _board) = engine_with(MemoryLockProvider::new(Duration::from_secs(5)));
    let monitor = Uuid::new_v4();
    let mut ids = Vec::new();
    for _ in 0..8 {
        let change = engine
            .record_status_change(RecordStatusChange::new(monitor, Uuid::new_v4()))
            .await
            .expect("seeded");
        ids.push(change.interval.id);
    }

    let tasks = ids.into_iter().map(|id| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.delete_interval(id).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task joins"))
        .collect();

    let refused = results
        .iter()
        .filter(|result| matches!(result, Err(StatusLineError::Validation(_))))
        .count();
    assert_eq!(refused, 1);
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 7);

    let timeline = engine.timeline(monitor).await.expect("timeline");
    assert_eq!(timeline.len(), 1);
    assert!(timeline[0].is_open());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn other_monitors_do_not_wait_on_a_held_lock() {
    let locks = MemoryLockProvider::new(Duration::from_millis(100));
    let (engine, _board) = engine_with(locks.clone());
    let (busy, free) = (Uuid::new_v4(), Uuid::new_v4());

    let held = locks.lock(&busy.to_string()).await.expect("held");

    engine
        .record_status_change(RecordStatusChange::new(free, Uuid::new_v4()))
        .await
        .expect("unrelated monitor proceeds");

    let err = engine
        .record_status_change(RecordStatusChange::new(busy, Uuid::new_v4()))
        .await
        .expect_err("contended monitor times out");
    assert!(matches!(err, StatusLineError::LockTimeout { .. }));
    assert!(err.is_retryable());
    assert!(engine.timeline(busy).await.expect("timeline").is_empty());

    locks.release(held).await.expect("released");
    engine
        .record_status_change(RecordStatusChange::new(busy, Uuid::new_v4()))
        .await
        .expect("lock is free again");
}
