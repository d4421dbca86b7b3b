//! In-memory fakes for collaborator traits
//!
//! Provides `MemoryJobStore`, `MemoryStorageSink`, `MemoryZoneRepository`
//! and `MemoryJobQueue`. They satisfy the trait contracts without external
//! dependencies and back both the test suites and `landwatch simulate`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use landwatch_geo::{FeatureCollection, ProbabilityRaster};

use crate::error::StorageError;
use crate::records::*;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryJobStore
// ---------------------------------------------------------------------------

/// In-memory job store backed by `HashMap`s keyed by id.
///
/// Every accepted update is also appended to a history log so tests can
/// inspect the exact sequence of writes a pipeline run performed.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    aois: Mutex<HashMap<AoiId, AreaOfInterest>>,
    detections: Mutex<HashMap<JobId, Vec<Detection>>>,
    history: Mutex<Vec<(JobId, JobUpdate)>>,
    fail_detection_writes: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_aoi(&self, aoi: AreaOfInterest) {
        self.aois.lock().unwrap().insert(aoi.id.clone(), aoi);
    }

    pub fn insert_job(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    /// Current record, if any.
    pub fn get(&self, job_id: &JobId) -> Option<Job> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    /// Accepted updates for a job, oldest first.
    pub fn history(&self, job_id: &JobId) -> Vec<JobUpdate> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, u)| u.clone())
            .collect()
    }

    /// Make `save_detections` fail with a backend error.
    pub fn set_fail_detection_writes(&self, fail: bool) {
        self.fail_detection_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn load(&self, job_id: &JobId) -> StorageResult<Job> {
        self.get(job_id).ok_or_else(|| StorageError::JobNotFound {
            job_id: job_id.to_string(),
        })
    }

    async fn load_aoi(&self, aoi_id: &AoiId) -> StorageResult<AreaOfInterest> {
        let aois = self.aois.lock().unwrap();
        aois.get(aoi_id)
            .cloned()
            .ok_or_else(|| StorageError::AoiNotFound {
                aoi_id: aoi_id.to_string(),
            })
    }

    async fn update_status(&self, job_id: &JobId, update: JobUpdate) -> StorageResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StorageError::JobNotFound {
                job_id: job_id.to_string(),
            })?;

        if update.status != job.status {
            validate_transition(job_id, job.status, update.status)?;
        } else if job.status.is_terminal() {
            return Err(StorageError::TerminalJob {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }
        if update.progress > 100 {
            return Err(StorageError::InvalidProgress {
                job_id: job_id.to_string(),
                progress: update.progress,
            });
        }
        if update.progress < job.progress {
            return Err(StorageError::ProgressRegression {
                job_id: job_id.to_string(),
                current: job.progress,
                requested: update.progress,
            });
        }

        let now = Utc::now();
        if update.status == JobStatus::Processing && job.started_at.is_none() {
            job.started_at = Some(now);
        }
        if update.status.is_terminal() {
            job.completed_at = Some(now);
        }
        job.status = update.status;
        job.progress = update.progress;
        if update.status == JobStatus::Failed {
            job.error_message = update.error_message.clone();
        }
        if update.status == JobStatus::Completed {
            job.result = update.result.clone();
        }
        drop(jobs);

        self.history
            .lock()
            .unwrap()
            .push((job_id.clone(), update));
        Ok(())
    }

    async fn save_detections(
        &self,
        job_id: &JobId,
        detections: &[Detection],
    ) -> StorageResult<()> {
        if self.fail_detection_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("detection table unavailable".into()));
        }
        self.detections
            .lock()
            .unwrap()
            .insert(job_id.clone(), detections.to_vec());
        Ok(())
    }

    async fn detections_for(&self, job_id: &JobId) -> StorageResult<Vec<Detection>> {
        let detections = self.detections.lock().unwrap();
        Ok(detections.get(job_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MemoryStorageSink
// ---------------------------------------------------------------------------

/// In-memory artifact sink. URLs use the `memory://` scheme.
#[derive(Debug, Default)]
pub struct MemoryStorageSink {
    rasters: Mutex<HashMap<JobId, ProbabilityRaster>>,
    vectors: Mutex<HashMap<JobId, FeatureCollection>>,
}

impl MemoryStorageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raster_for(&self, job_id: &JobId) -> Option<ProbabilityRaster> {
        self.rasters.lock().unwrap().get(job_id).cloned()
    }

    pub fn vectors_for(&self, job_id: &JobId) -> Option<FeatureCollection> {
        self.vectors.lock().unwrap().get(job_id).cloned()
    }

    /// Number of artifacts written, rasters and vector layers together.
    pub fn artifact_count(&self) -> usize {
        self.rasters.lock().unwrap().len() + self.vectors.lock().unwrap().len()
    }
}

#[async_trait]
impl StorageSink for MemoryStorageSink {
    async fn save_raster(
        &self,
        job_id: &JobId,
        raster: &ProbabilityRaster,
    ) -> StorageResult<String> {
        self.rasters
            .lock()
            .unwrap()
            .insert(job_id.clone(), raster.clone());
        Ok(format!("memory://rasters/{job_id}"))
    }

    async fn save_vectors(
        &self,
        job_id: &JobId,
        detections: &[Detection],
    ) -> StorageResult<String> {
        self.vectors
            .lock()
            .unwrap()
            .insert(job_id.clone(), detections_to_geojson(detections));
        Ok(format!("memory://vectors/{job_id}"))
    }
}

// ---------------------------------------------------------------------------
// MemoryZoneRepository
// ---------------------------------------------------------------------------

/// Zone layer held in a `Vec`, enumeration order = insertion order.
#[derive(Debug, Default)]
pub struct MemoryZoneRepository {
    zones: Mutex<Vec<ProtectedZone>>,
}

impl MemoryZoneRepository {
    pub fn new(zones: Vec<ProtectedZone>) -> Self {
        Self {
            zones: Mutex::new(zones),
        }
    }

    pub fn push(&self, zone: ProtectedZone) {
        self.zones.lock().unwrap().push(zone);
    }

    pub fn replace(&self, zones: Vec<ProtectedZone>) {
        *self.zones.lock().unwrap() = zones;
    }
}

#[async_trait]
impl ZoneRepository for MemoryZoneRepository {
    async fn list_active_zones(&self) -> StorageResult<Vec<ProtectedZone>> {
        let zones = self.zones.lock().unwrap();
        Ok(zones.iter().filter(|z| z.active).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryJobQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct QueueState {
    high: VecDeque<JobId>,
    normal: VecDeque<JobId>,
    /// Queued or in flight; the idempotency key set
    active: HashSet<JobId>,
    in_flight: HashSet<JobId>,
    cancelled: HashSet<JobId>,
    completed: u64,
}

/// Two-lane in-memory queue.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    state: Mutex<QueueState>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CancellationSource for MemoryJobQueue {
    async fn is_cancelled(&self, job_id: &JobId) -> StorageResult<bool> {
        Ok(self.state.lock().unwrap().cancelled.contains(job_id))
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job_id: JobId, priority: Priority) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.active.insert(job_id.clone()) {
            return Err(StorageError::DuplicateJob {
                job_id: job_id.to_string(),
            });
        }
        match priority {
            Priority::High => state.high.push_back(job_id),
            Priority::Normal => state.normal.push_back(job_id),
        }
        Ok(())
    }

    async fn dequeue(&self) -> StorageResult<Option<JobId>> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let next = state.high.pop_front().or_else(|| state.normal.pop_front());
        if let Some(id) = &next {
            state.in_flight.insert(id.clone());
        }
        Ok(next)
    }

    async fn cancel(&self, job_id: &JobId) -> StorageResult<()> {
        self.state.lock().unwrap().cancelled.insert(job_id.clone());
        Ok(())
    }

    async fn complete(&self, job_id: &JobId) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.cancelled.remove(job_id);
        if state.in_flight.remove(job_id) {
            state.active.remove(job_id);
            state.completed += 1;
        }
        Ok(())
    }

    async fn stats(&self) -> StorageResult<QueueStats> {
        let state = self.state.lock().unwrap();
        Ok(QueueStats {
            high: state.high.len(),
            normal: state.normal.len(),
            in_flight: state.in_flight.len(),
            completed: state.completed,
        })
    }
}
