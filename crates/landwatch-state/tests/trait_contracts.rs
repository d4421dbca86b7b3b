//! Trait contract tests for JobStore, StorageSink, ZoneRepository and JobQueue.
//!
//! These tests verify the behavioral contracts of the collaborator traits
//! using in-memory fakes. Any conforming implementation must pass these.

use chrono::NaiveDate;
use landwatch_geo::{BBox, GeoTransform, Geometry, Polygon, ProbabilityRaster, WGS84_EPSG};
use landwatch_state::fakes::{
    MemoryJobQueue, MemoryJobStore, MemoryStorageSink, MemoryZoneRepository,
};
use landwatch_state::storage_traits::*;
use landwatch_state::*;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn seeded_store() -> (MemoryJobStore, JobId) {
    let store = MemoryJobStore::new();
    let aoi = AreaOfInterest {
        id: AoiId::from("aoi-1"),
        name: "river delta".into(),
        geometry: Geometry::Polygon(Polygon::rectangle(&BBox::new(0.0, 0.0, 0.01, 0.01))),
        owner: "user-1".into(),
    };
    let job = Job::new(aoi.id.clone(), date(1), date(20)).with_id(JobId::from("job-1"));
    let id = job.id.clone();
    store.insert_aoi(aoi);
    store.insert_job(job);
    (store, id)
}

// ===========================================================================
// JobStore contract tests
// ===========================================================================

#[tokio::test]
async fn store_load_not_found() {
    let store = MemoryJobStore::new();
    let err = store.load(&JobId::from("missing")).await.unwrap_err();
    assert!(matches!(err, StorageError::JobNotFound { .. }));
}

#[tokio::test]
async fn store_load_aoi_round_trip() {
    let (store, id) = seeded_store();
    let job = store.load(&id).await.unwrap();
    let aoi = store.load_aoi(&job.aoi_id).await.unwrap();
    assert_eq!(aoi.name, "river delta");
}

#[tokio::test]
async fn store_processing_sets_started_at() {
    let (store, id) = seeded_store();
    store
        .update_status(&id, JobUpdate::progress(JobStatus::Processing, 0))
        .await
        .unwrap();
    let job = store.load(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_none());
}

#[tokio::test]
async fn store_rejects_skipping_processing() {
    let (store, id) = seeded_store();
    let err = store
        .update_status(&id, JobUpdate::failed(0, "boom"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::IllegalTransition { .. }));
    assert_eq!(store.load(&id).await.unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn store_rejects_progress_regression() {
    let (store, id) = seeded_store();
    store
        .update_status(&id, JobUpdate::progress(JobStatus::Processing, 35))
        .await
        .unwrap();
    let err = store
        .update_status(&id, JobUpdate::progress(JobStatus::Processing, 20))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::ProgressRegression {
            current: 35,
            requested: 20,
            ..
        }
    ));
}

#[tokio::test]
async fn store_terminal_job_is_immutable() {
    let (store, id) = seeded_store();
    store
        .update_status(&id, JobUpdate::progress(JobStatus::Processing, 10))
        .await
        .unwrap();
    store
        .update_status(&id, JobUpdate::failed(10, "ingest failed: boom"))
        .await
        .unwrap();

    let err = store
        .update_status(&id, JobUpdate::failed(10, "again"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::TerminalJob { .. }));

    let job = store.load(&id).await.unwrap();
    assert_eq!(job.error_message.as_deref(), Some("ingest failed: boom"));
    assert_eq!(job.progress, 10);
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn store_pending_can_be_cancelled() {
    let (store, id) = seeded_store();
    store.update_status(&id, JobUpdate::cancelled(0)).await.unwrap();
    assert_eq!(store.load(&id).await.unwrap().status, JobStatus::Cancelled);
}

#[tokio::test]
async fn store_history_records_accepted_updates_only() {
    let (store, id) = seeded_store();
    store
        .update_status(&id, JobUpdate::progress(JobStatus::Processing, 0))
        .await
        .unwrap();
    let _ = store
        .update_status(&id, JobUpdate::progress(JobStatus::Pending, 0))
        .await;
    store
        .update_status(&id, JobUpdate::progress(JobStatus::Processing, 10))
        .await
        .unwrap();

    let progress: Vec<u8> = store.history(&id).iter().map(|u| u.progress).collect();
    assert_eq!(progress, vec![0, 10]);
}

#[tokio::test]
async fn store_detections_indexed_by_job() {
    let (store, id) = seeded_store();
    let detection = Detection {
        id: DetectionId::from("d-1"),
        job_id: id.clone(),
        geometry: Polygon::rectangle(&BBox::new(0.0, 0.0, 0.001, 0.001)),
        confidence_score: 0.7,
        area_sqm: 1200.0,
        change_type: ChangeType::Unknown,
        flagged: false,
        flag_reasons: vec![],
    };
    store.save_detections(&id, &[detection.clone()]).await.unwrap();

    assert_eq!(store.detections_for(&id).await.unwrap(), vec![detection]);
    assert!(store
        .detections_for(&JobId::from("other"))
        .await
        .unwrap()
        .is_empty());
}

// ===========================================================================
// StorageSink contract tests
// ===========================================================================

#[tokio::test]
async fn sink_keeps_raster_unmodified() {
    let sink = MemoryStorageSink::new();
    let raster = ProbabilityRaster::new(
        2,
        1,
        vec![0.2, f32::NAN],
        GeoTransform::north_up(0.0, 1.0, 0.5, WGS84_EPSG),
    )
    .unwrap();
    let id = JobId::from("j");
    let url = sink.save_raster(&id, &raster).await.unwrap();
    assert_eq!(url, "memory://rasters/j");

    let stored = sink.raster_for(&id).unwrap();
    assert_eq!(stored.data[0], 0.2);
    assert!(stored.data[1].is_nan());
}

// ===========================================================================
// ZoneRepository contract tests
// ===========================================================================

#[tokio::test]
async fn zones_list_only_active_in_order() {
    let square = |x: f64| Polygon::rectangle(&BBox::new(x, 0.0, x + 1.0, 1.0));
    let mut inactive = ProtectedZone::new("z2", "old park", "PARK", square(2.0));
    inactive.active = false;
    let repo = MemoryZoneRepository::new(vec![
        ProtectedZone::new("z1", "north forest", "FOREST", square(0.0)),
        inactive,
        ProtectedZone::new("z3", "lake", "WATER_BODY", square(4.0)),
    ]);

    let ids: Vec<String> = repo
        .list_active_zones()
        .await
        .unwrap()
        .into_iter()
        .map(|z| z.id)
        .collect();
    assert_eq!(ids, vec!["z1", "z3"]);
}

// ===========================================================================
// JobQueue contract tests
// ===========================================================================

#[tokio::test]
async fn queue_high_lane_first_fifo_within_lane() {
    let queue = MemoryJobQueue::new();
    queue.enqueue(JobId::from("n1"), Priority::Normal).await.unwrap();
    queue.enqueue(JobId::from("h1"), Priority::High).await.unwrap();
    queue.enqueue(JobId::from("n2"), Priority::Normal).await.unwrap();
    queue.enqueue(JobId::from("h2"), Priority::High).await.unwrap();

    let mut order = Vec::new();
    while let Some(id) = queue.dequeue().await.unwrap() {
        order.push(id.0);
    }
    assert_eq!(order, vec!["h1", "h2", "n1", "n2"]);
}

#[tokio::test]
async fn queue_refuses_duplicate_until_complete() {
    let queue = MemoryJobQueue::new();
    let id = JobId::from("j");
    queue.enqueue(id.clone(), Priority::Normal).await.unwrap();

    let err = queue.enqueue(id.clone(), Priority::High).await.unwrap_err();
    assert!(matches!(err, StorageError::DuplicateJob { .. }));

    let got = queue.dequeue().await.unwrap().unwrap();
    assert!(queue.enqueue(id.clone(), Priority::Normal).await.is_err());
    assert_eq!(queue.stats().await.unwrap().in_flight, 1);

    queue.complete(&got).await.unwrap();
    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.completed, 1);
    assert!(queue.enqueue(id, Priority::Normal).await.is_ok());
}

#[tokio::test]
async fn queue_cancel_sets_flag() {
    let queue = MemoryJobQueue::new();
    let id = JobId::from("j");
    queue.enqueue(id.clone(), Priority::Normal).await.unwrap();
    assert!(!queue.is_cancelled(&id).await.unwrap());
    queue.cancel(&id).await.unwrap();
    assert!(queue.is_cancelled(&id).await.unwrap());
    assert_eq!(queue.stats().await.unwrap().queued(), 1);
}

#[tokio::test]
async fn queue_complete_clears_flag_of_unqueued_job() {
    let queue = MemoryJobQueue::new();
    let id = JobId::from("never-queued");
    queue.cancel(&id).await.unwrap();
    assert!(queue.is_cancelled(&id).await.unwrap());

    queue.complete(&id).await.unwrap();
    assert!(!queue.is_cancelled(&id).await.unwrap());
    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.in_flight, 0);
}
