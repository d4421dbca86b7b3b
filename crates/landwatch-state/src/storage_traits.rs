//! Collaborator trait definitions for landwatch
//!
//! These traits define every external system the pipeline talks to:
//! - `JobStore`: durable job records, AOIs and detections
//! - `StorageSink`: artifact persistence (rasters, vector layers)
//! - `ZoneRepository`: protected-zone layer
//! - `JobQueue` / `CancellationSource`: priority queue and cancel flags
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use landwatch_geo::ProbabilityRaster;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::records::{
    AoiId, AreaOfInterest, Detection, Job, JobId, JobUpdate, Priority, ProtectedZone,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// JobStore
// ---------------------------------------------------------------------------

/// Durable job state.
///
/// Guarantees:
/// - `update_status` is atomic: either the whole update applies or none of it.
/// - Status changes follow `allowed_transitions`; terminal jobs are immutable.
/// - `progress` never decreases.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Read a job. Returns `StorageError::JobNotFound` if absent.
    async fn load(&self, job_id: &JobId) -> StorageResult<Job>;

    /// Read an area of interest.
    async fn load_aoi(&self, aoi_id: &AoiId) -> StorageResult<AreaOfInterest>;

    /// Apply a status/progress update.
    async fn update_status(&self, job_id: &JobId, update: JobUpdate) -> StorageResult<()>;

    /// Store detections for a job, replacing any previous set.
    async fn save_detections(&self, job_id: &JobId, detections: &[Detection])
        -> StorageResult<()>;

    /// Detections stored for a job, in insertion order.
    async fn detections_for(&self, job_id: &JobId) -> StorageResult<Vec<Detection>>;
}

// ---------------------------------------------------------------------------
// StorageSink
// ---------------------------------------------------------------------------

/// Artifact store for job outputs. Returns a URL for each artifact.
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Persist the change-probability raster unmodified.
    async fn save_raster(&self, job_id: &JobId, raster: &ProbabilityRaster)
        -> StorageResult<String>;

    /// Persist detections as a vector layer.
    async fn save_vectors(&self, job_id: &JobId, detections: &[Detection])
        -> StorageResult<String>;
}

// ---------------------------------------------------------------------------
// ZoneRepository
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ZoneRepository: Send + Sync {
    /// All zones with `active == true`, in a stable order.
    async fn list_active_zones(&self) -> StorageResult<Vec<ProtectedZone>>;
}

// ---------------------------------------------------------------------------
// JobQueue
// ---------------------------------------------------------------------------

/// Cooperative cancellation flags, polled at pipeline checkpoints.
#[async_trait]
pub trait CancellationSource: Send + Sync {
    async fn is_cancelled(&self, job_id: &JobId) -> StorageResult<bool>;
}

/// Queue depth snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub high: usize,
    pub normal: usize,
    pub in_flight: usize,
    pub completed: u64,
}

impl QueueStats {
    pub fn queued(&self) -> usize {
        self.high + self.normal
    }
}

/// Two-lane job queue carrying job ids only.
///
/// Semantics:
/// - `dequeue` drains the high lane before the normal lane, FIFO within a lane.
/// - A job id that is queued or in flight cannot be enqueued again.
/// - `complete` releases the id once its worker is done with it.
#[async_trait]
pub trait JobQueue: CancellationSource {
    async fn enqueue(&self, job_id: JobId, priority: Priority) -> StorageResult<()>;

    /// Next job id, or `None` when both lanes are empty.
    async fn dequeue(&self) -> StorageResult<Option<JobId>>;

    /// Request cancellation of a job. The flag also applies to a job run
    /// directly, without passing through the queue.
    async fn cancel(&self, job_id: &JobId) -> StorageResult<()>;

    /// Acknowledge that a job has finished. Always drops its cancellation
    /// flag; releases the idempotency key when the job was in flight.
    async fn complete(&self, job_id: &JobId) -> StorageResult<()>;

    async fn stats(&self) -> StorageResult<QueueStats>;
}
