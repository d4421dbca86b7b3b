//! Worker pool behaviour over the in-memory queue.

mod common;

use std::time::Duration;

use common::*;
use landwatch_core::{JobOutcome, WorkerConfig, WorkerPool};
use landwatch_state::{
    CancellationSource, JobId, JobQueue, JobStatus, JobStore, Priority, StorageError,
};
use tokio::sync::watch;

fn pool(h: &Harness, workers: usize) -> WorkerPool {
    WorkerPool::new(
        h.pipeline.clone(),
        h.queue.clone(),
        WorkerConfig {
            workers,
            poll_interval_ms: 5,
        },
    )
}

fn harness() -> Harness {
    Harness::new(Setup {
        source: optical_source(),
        ..Setup::default()
    })
}

#[tokio::test]
async fn high_priority_runs_first() {
    let h = harness();
    for (id, priority) in [
        ("job-1", Priority::Normal),
        ("job-2", Priority::Normal),
        ("job-3", Priority::High),
    ] {
        let job_id = h.add_job(id);
        h.queue.enqueue(job_id, priority).await.unwrap();
    }

    let summary = pool(&h, 1).drain().await;
    let order: Vec<&str> = summary.reports.iter().map(|r| r.job_id.as_str()).collect();
    assert_eq!(order, vec!["job-3", "job-1", "job-2"]);
    assert!(summary.failures.is_empty());
}

#[tokio::test]
async fn duplicate_submission_is_refused() {
    let h = harness();
    let id = h.add_job("job-dup");
    h.queue.enqueue(id.clone(), Priority::Normal).await.unwrap();

    let err = h
        .queue
        .enqueue(id.clone(), Priority::High)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::DuplicateJob { .. }));

    let summary = pool(&h, 2).drain().await;
    assert_eq!(summary.processed(), 1);
}

#[tokio::test]
async fn several_workers_drain_the_queue() {
    let h = harness();
    let ids: Vec<JobId> = (0..6).map(|i| h.add_job(&format!("job-{i}"))).collect();
    for id in &ids {
        h.queue.enqueue(id.clone(), Priority::Normal).await.unwrap();
    }

    let summary = pool(&h, 3).drain().await;
    assert_eq!(summary.processed(), ids.len());
    assert!(summary
        .reports
        .iter()
        .all(|r| r.outcome == JobOutcome::Completed));

    let stats = h.queue.stats().await.unwrap();
    assert_eq!(stats.completed, ids.len() as u64);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.high + stats.normal, 0);
    for id in &ids {
        assert_eq!(h.store.load(id).await.unwrap().status, JobStatus::Completed);
    }
}

#[tokio::test]
async fn completed_job_can_be_enqueued_again() {
    let h = harness();
    let id = h.add_job("job-again");
    h.queue.enqueue(id.clone(), Priority::Normal).await.unwrap();
    pool(&h, 1).drain().await;

    h.queue.enqueue(id.clone(), Priority::Normal).await.unwrap();
    let summary = pool(&h, 1).drain().await;
    assert_eq!(summary.reports[0].outcome, JobOutcome::Rejected);
}

#[tokio::test]
async fn job_cancelled_while_queued() {
    let h = harness();
    let id = h.add_job("job-queued");
    h.queue.enqueue(id.clone(), Priority::Normal).await.unwrap();
    h.queue.cancel(&id).await.unwrap();

    let summary = pool(&h, 1).drain().await;
    assert_eq!(summary.reports[0].outcome, JobOutcome::Cancelled);
    assert_eq!(h.store.load(&id).await.unwrap().status, JobStatus::Cancelled);
    // acknowledged jobs drop their cancel flag
    assert!(!h.queue.is_cancelled(&id).await.unwrap());
}

#[tokio::test]
async fn spawned_workers_stop_on_shutdown() {
    let h = harness();
    let (tx, rx) = watch::channel(false);
    let handles = pool(&h, 2).spawn(rx);

    for i in 0..4 {
        let id = h.add_job(&format!("job-live-{i}"));
        h.queue.enqueue(id, Priority::Normal).await.unwrap();
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while h.queue.stats().await.unwrap().completed < 4 {
        assert!(tokio::time::Instant::now() < deadline, "workers did not finish");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tx.send(true).unwrap();
    let mut processed = 0;
    for handle in handles {
        processed += handle.await.unwrap().processed();
    }
    assert_eq!(processed, 4);
}
