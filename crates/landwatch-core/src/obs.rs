//! Structured observability hooks for the job lifecycle.
//!
//! - Job-scoped tracing spans via the [`JobSpan`] guard
//! - `emit_*` functions for start, checkpoint, finish, degraded inference
//!   and finalization errors
//!
//! Events are emitted at `info!` level with an `event` field naming them.

use tracing::info;

/// Guard holding a job-scoped span open for the duration of a run.
///
/// The guard is `!Send`; async code should use [`job_span`] with
/// `tracing::Instrument` instead.
///
/// ```ignore
/// let _span = JobSpan::enter("job-12345");
/// ```
pub struct JobSpan {
    _span: tracing::span::EnteredSpan,
}

impl JobSpan {
    pub fn enter(job_id: &str) -> Self {
        Self {
            _span: job_span(job_id).entered(),
        }
    }
}

/// Span tagged with the job id.
pub fn job_span(job_id: &str) -> tracing::Span {
    tracing::info_span!("landwatch.job", job_id = %job_id)
}

pub fn emit_job_started(job_id: &str, aoi_id: &str) {
    info!(event = "job.started", job_id = %job_id, aoi_id = %aoi_id);
}

/// Emit event: a checkpoint was persisted.
pub fn emit_job_checkpoint(job_id: &str, checkpoint: &str, progress: u8) {
    info!(
        event = "job.checkpoint",
        job_id = %job_id,
        checkpoint = %checkpoint,
        progress = progress,
    );
}

/// Emit event: job reached a terminal status.
pub fn emit_job_finished(job_id: &str, status: &str, duration_ms: u64, detections: u64) {
    info!(
        event = "job.finished",
        job_id = %job_id,
        status = %status,
        duration_ms = duration_ms,
        detections = detections,
    );
}

/// Emit event: inference ran without a model.
pub fn emit_job_degraded(job_id: &str, method: &str) {
    info!(event = "job.degraded", job_id = %job_id, method = %method);
}

/// Emit event: terminal state could not be persisted (warning level).
pub fn emit_job_finalize_error(job_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "job.finalize_error", job_id = %job_id, error = %error);
}
