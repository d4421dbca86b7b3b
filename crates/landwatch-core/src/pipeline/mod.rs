//! Job pipeline orchestration.
//!
//! [`JobPipeline::run`] drives one job from PENDING through the stages
//!
//! 1. load the AOI and compute its bounding box
//! 2. select a before/after imagery pair
//! 3. load both scenes
//! 4. infer a change surface and extract regions (blocking pool)
//! 5. flag regions against protected zones
//! 6. persist the raster, the vector layer and the detections
//!
//! and is the only place that writes job state. Progress is persisted at
//! each [`Checkpoint`], after polling the cancellation source. The stages
//! run under the configured wall-clock budget.

pub mod checkpoint;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use landwatch_geo::WGS84_EPSG;
use landwatch_state::{
    CancellationSource, Detection, DetectionId, Job, JobId, JobResult, JobStatus, JobStore,
    JobUpdate, StorageSink,
};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Stage};
use crate::extract::DetectionExtractor;
use crate::imagery::{ImageryPairSelector, ImagerySource};
use crate::inference::{ChangeInferenceEngine, ChangeModel, InferenceError};
use crate::metrics::METRICS;
use crate::obs;
use crate::validate::SpatialValidator;
use crate::zones::ZoneIndexHandle;

pub use checkpoint::Checkpoint;

/// Collaborators and settings shared by every run.
pub struct PipelineContext {
    pub store: Arc<dyn JobStore>,
    pub sink: Arc<dyn StorageSink>,
    pub cancellation: Arc<dyn CancellationSource>,
    pub selector: ImageryPairSelector,
    pub engine: Arc<ChangeInferenceEngine>,
    pub extractor: DetectionExtractor,
    pub validator: SpatialValidator,
    pub zones: Arc<ZoneIndexHandle>,
    pub config: PipelineConfig,
}

impl PipelineContext {
    /// Wire a context from configuration. Inference starts without a model.
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn JobStore>,
        sink: Arc<dyn StorageSink>,
        cancellation: Arc<dyn CancellationSource>,
        imagery: Arc<dyn ImagerySource>,
        zones: Arc<ZoneIndexHandle>,
    ) -> Self {
        Self {
            store,
            sink,
            cancellation,
            selector: ImageryPairSelector::new(
                imagery,
                config.selector.clone(),
                config.retry.clone(),
            ),
            engine: Arc::new(ChangeInferenceEngine::new(config.inference.clone())),
            extractor: DetectionExtractor::new(&config.inference),
            validator: SpatialValidator,
            zones,
            config,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn ChangeModel>) -> Self {
        let engine = ChangeInferenceEngine::new(self.config.inference.clone()).with_model(model);
        self.engine = Arc::new(engine);
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Failed,
    Cancelled,
    /// The job was not PENDING; nothing was changed.
    Rejected,
}

/// Summary of one `run` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub outcome: JobOutcome,
    /// Persisted status after the run
    pub status: JobStatus,
    pub progress: u8,
    pub detection_count: usize,
    pub flagged_count: usize,
    pub degraded: bool,
    pub error: Option<String>,
    /// A later re-run may succeed
    pub retryable: bool,
    pub duration_ms: u64,
}

impl JobReport {
    fn new(job_id: &JobId, outcome: JobOutcome, status: JobStatus, progress: u8) -> Self {
        Self {
            job_id: job_id.clone(),
            outcome,
            status,
            progress,
            detection_count: 0,
            flagged_count: 0,
            degraded: false,
            error: None,
            retryable: false,
            duration_ms: 0,
        }
    }
}

/// Why the stages stopped early.
enum Halt {
    Cancelled,
    TimedOut,
    Failed { stage: Stage, error: PipelineError },
}

/// Raises its flag when dropped. Held across blocking work so a run dropped
/// by the time budget tells the worker thread to stop.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn fail<E: Into<PipelineError>>(stage: Stage) -> impl FnOnce(E) -> Halt {
    move |e| Halt::Failed {
        stage,
        error: e.into(),
    }
}

struct StagesDone {
    result: JobResult,
}

/// Runs jobs against a shared [`PipelineContext`]. Cheap to clone.
#[derive(Clone)]
pub struct JobPipeline {
    ctx: Arc<PipelineContext>,
}

impl JobPipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Run one job to a terminal state.
    ///
    /// Stage failures, cancellation and timeouts are persisted on the job and
    /// reported in the returned [`JobReport`]. `Err` means the job could not
    /// be read or its final state could not be written.
    pub async fn run(&self, job_id: &JobId) -> Result<JobReport, PipelineError> {
        let span = obs::job_span(job_id.as_str());
        self.run_inner(job_id).instrument(span).await
    }

    async fn run_inner(&self, job_id: &JobId) -> Result<JobReport, PipelineError> {
        let started = Instant::now();
        let store = &self.ctx.store;
        let job = store.load(job_id).await?;

        if job.status != JobStatus::Pending {
            warn!(status = %job.status, "job is not pending, refusing to run");
            return Ok(JobReport::new(
                job_id,
                JobOutcome::Rejected,
                job.status,
                job.progress,
            ));
        }

        if self.is_cancelled(job_id).await {
            return self.finish_cancelled(job_id, 0, started).await;
        }

        store
            .update_status(job_id, JobUpdate::progress(JobStatus::Processing, 0))
            .await?;
        obs::emit_job_started(job_id.as_str(), job.aoi_id.as_str());

        let progress = AtomicU8::new(0);
        let budget = self.ctx.config.job_timeout();
        let outcome = tokio::time::timeout(budget, self.stages(&job, &progress)).await;
        let last = progress.load(Ordering::SeqCst);

        match outcome {
            Ok(Ok(done)) => self.finish_completed(job_id, done, last, started).await,
            Ok(Err(Halt::Cancelled)) => self.finish_cancelled(job_id, last, started).await,
            Ok(Err(Halt::Failed { stage, error })) => {
                let message = format!("{stage} failed: {error}");
                self.finish_failed(job_id, last, message, error.is_retryable(), started)
                    .await
            }
            Ok(Err(Halt::TimedOut)) | Err(_) => {
                warn!(budget_secs = budget.as_secs(), "job exceeded its time budget");
                let message = PipelineError::Timeout.to_string();
                self.finish_failed(job_id, last, message, false, started).await
            }
        }
    }

    async fn is_cancelled(&self, job_id: &JobId) -> bool {
        match self.ctx.cancellation.is_cancelled(job_id).await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                warn!(error = %e, "cancellation check failed, continuing");
                false
            }
        }
    }

    /// Poll cancellation, then persist the checkpoint's progress.
    async fn checkpoint(
        &self,
        job_id: &JobId,
        checkpoint: Checkpoint,
        stage: Stage,
        progress: &AtomicU8,
    ) -> Result<(), Halt> {
        if self.is_cancelled(job_id).await {
            info!(checkpoint = checkpoint.as_str(), "cancellation requested");
            return Err(Halt::Cancelled);
        }
        let value = checkpoint.progress();
        self.ctx
            .store
            .update_status(job_id, JobUpdate::progress(JobStatus::Processing, value))
            .await
            .map_err(fail(stage))?;
        progress.store(value, Ordering::SeqCst);
        obs::emit_job_checkpoint(job_id.as_str(), checkpoint.as_str(), value);
        Ok(())
    }

    async fn stages(&self, job: &Job, progress: &AtomicU8) -> Result<StagesDone, Halt> {
        let ctx = &self.ctx;
        let job_id = &job.id;

        let aoi = ctx.store.load_aoi(&job.aoi_id).await.map_err(fail(Stage::Aoi))?;
        let bbox = aoi.geometry.bbox().ok_or_else(|| Halt::Failed {
            stage: Stage::Aoi,
            error: PipelineError::InvalidInput(format!("AOI {} has no geometry", aoi.id)),
        })?;
        self.checkpoint(job_id, Checkpoint::BboxComputed, Stage::Aoi, progress)
            .await?;

        let pair = ctx
            .selector
            .select_pair(&bbox, job.date_from, job.date_to, job.cloud_threshold)
            .await
            .map_err(fail(Stage::ImagerySearch))?;
        self.checkpoint(job_id, Checkpoint::PairFound, Stage::ImagerySearch, progress)
            .await?;

        let before = ctx
            .selector
            .load(&pair.before, &bbox)
            .await
            .map_err(fail(Stage::BeforeLoad))?;
        self.checkpoint(job_id, Checkpoint::BeforeLoaded, Stage::BeforeLoad, progress)
            .await?;

        let after = ctx
            .selector
            .load(&pair.after, &bbox)
            .await
            .map_err(fail(Stage::AfterLoad))?;
        self.checkpoint(job_id, Checkpoint::AfterLoaded, Stage::AfterLoad, progress)
            .await?;

        for (label, raster) in [("before", &before), ("after", &after)] {
            if raster.transform.epsg != WGS84_EPSG {
                return Err(Halt::Failed {
                    stage: Stage::Inference,
                    error: PipelineError::InvalidInput(format!(
                        "{label} raster is EPSG:{}, expected EPSG:{WGS84_EPSG}",
                        raster.transform.epsg
                    )),
                });
            }
        }

        let engine = Arc::clone(&ctx.engine);
        let extractor = ctx.extractor.clone();
        let (threshold, min_area) = (job.change_threshold, job.min_area_sqm);
        let abandoned = Arc::new(AtomicBool::new(false));
        let _guard = AbandonOnDrop(Arc::clone(&abandoned));
        let (surface, regions) = tokio::task::spawn_blocking(move || {
            if abandoned.load(Ordering::SeqCst) {
                return Ok::<_, InferenceError>(None);
            }
            let surface = engine.run_pipeline(&before, &after)?;
            if abandoned.load(Ordering::SeqCst) {
                debug!("run abandoned during inference, skipping extraction");
                return Ok::<_, InferenceError>(None);
            }
            let regions = extractor.extract(&surface.raster, threshold, min_area);
            Ok::<_, InferenceError>(Some((surface, regions)))
        })
        .await
        .map_err(|e| Halt::Failed {
            stage: Stage::Inference,
            error: PipelineError::Internal(e.to_string()),
        })?
        .map_err(fail(Stage::Inference))?
        .ok_or(Halt::TimedOut)?;

        if surface.degraded {
            obs::emit_job_degraded(job_id.as_str(), surface.method.as_str());
            METRICS.inc_degraded_runs();
        }
        debug!(regions = regions.len(), method = %surface.method, "inference complete");
        self.checkpoint(job_id, Checkpoint::InferenceComplete, Stage::Inference, progress)
            .await?;

        let detections: Vec<Detection> = regions
            .into_iter()
            .map(|r| Detection {
                id: DetectionId::new(),
                job_id: job_id.clone(),
                geometry: r.polygon,
                confidence_score: r.confidence,
                area_sqm: r.area_sqm,
                change_type: r.change_type,
                flagged: false,
                flag_reasons: Vec::new(),
            })
            .collect();
        let index = ctx.zones.snapshot();
        let detections = ctx.validator.validate(detections, &aoi.geometry, &index);
        self.checkpoint(
            job_id,
            Checkpoint::ValidationComplete,
            Stage::Validation,
            progress,
        )
        .await?;

        let raster_url = ctx
            .sink
            .save_raster(job_id, &surface.raster)
            .await
            .map_err(fail(Stage::Persist))?;
        let detections_url = ctx
            .sink
            .save_vectors(job_id, &detections)
            .await
            .map_err(fail(Stage::Persist))?;
        ctx.store
            .save_detections(job_id, &detections)
            .await
            .map_err(fail(Stage::Persist))?;

        Ok(StagesDone {
            result: JobResult {
                raster_url,
                detections_url,
                detection_count: detections.len(),
                flagged_count: detections.iter().filter(|d| d.flagged).count(),
                sensor_family: pair.sensor_family,
                before_image: pair.before.id,
                after_image: pair.after.id,
                inference_method: surface.method.as_str().to_string(),
                model_version: surface.model_version,
                degraded: surface.degraded,
            },
        })
    }

    async fn persist_final(&self, job_id: &JobId, update: JobUpdate) -> Result<(), PipelineError> {
        self.ctx
            .store
            .update_status(job_id, update)
            .await
            .map_err(|e| {
                obs::emit_job_finalize_error(job_id.as_str(), &e);
                PipelineError::from(e)
            })
    }

    async fn finish_completed(
        &self,
        job_id: &JobId,
        done: StagesDone,
        last: u8,
        started: Instant,
    ) -> Result<JobReport, PipelineError> {
        // Artifacts are already written; a late cancel still wins.
        if self.is_cancelled(job_id).await {
            info!(
                checkpoint = Checkpoint::ArtifactsPersisted.as_str(),
                "cancellation requested"
            );
            return self.finish_cancelled(job_id, last, started).await;
        }

        let result = done.result;
        let mut report = JobReport::new(
            job_id,
            JobOutcome::Completed,
            JobStatus::Completed,
            Checkpoint::ArtifactsPersisted.progress(),
        );
        report.detection_count = result.detection_count;
        report.flagged_count = result.flagged_count;
        report.degraded = result.degraded;

        self.persist_final(job_id, JobUpdate::completed(result)).await?;
        obs::emit_job_checkpoint(
            job_id.as_str(),
            Checkpoint::ArtifactsPersisted.as_str(),
            report.progress,
        );

        METRICS.inc_jobs_completed();
        METRICS.add_detections(report.detection_count as u64, report.flagged_count as u64);
        report.duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_job_finished(
            job_id.as_str(),
            JobStatus::Completed.as_str(),
            report.duration_ms,
            report.detection_count as u64,
        );
        Ok(report)
    }

    async fn finish_cancelled(
        &self,
        job_id: &JobId,
        last: u8,
        started: Instant,
    ) -> Result<JobReport, PipelineError> {
        self.persist_final(job_id, JobUpdate::cancelled(last)).await?;
        METRICS.inc_jobs_cancelled();

        let mut report = JobReport::new(job_id, JobOutcome::Cancelled, JobStatus::Cancelled, last);
        report.duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_job_finished(
            job_id.as_str(),
            JobStatus::Cancelled.as_str(),
            report.duration_ms,
            0,
        );
        Ok(report)
    }

    async fn finish_failed(
        &self,
        job_id: &JobId,
        last: u8,
        message: String,
        retryable: bool,
        started: Instant,
    ) -> Result<JobReport, PipelineError> {
        error!(error = %message, progress = last, "job failed");
        self.persist_final(job_id, JobUpdate::failed(last, message.clone()))
            .await?;
        METRICS.inc_jobs_failed();

        let mut report = JobReport::new(job_id, JobOutcome::Failed, JobStatus::Failed, last);
        report.error = Some(message);
        report.retryable = retryable;
        report.duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_job_finished(
            job_id.as_str(),
            JobStatus::Failed.as_str(),
            report.duration_ms,
            0,
        );
        Ok(report)
    }
}
