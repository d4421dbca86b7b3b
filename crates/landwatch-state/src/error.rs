//! Error types for landwatch-state

use thiserror::Error;

use crate::records::JobStatus;

/// Errors raised by job stores, queues and artifact sinks
#[derive(Error, Debug)]
pub enum StorageError {
    /// Job id unknown to the store
    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// Area of interest unknown to the store
    #[error("area of interest not found: {aoi_id}")]
    AoiNotFound { aoi_id: String },

    /// Status change outside the transition table
    #[error("illegal transition for job {job_id}: {from} -> {to}")]
    IllegalTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// Job already reached COMPLETED, FAILED or CANCELLED
    #[error("job {job_id} is terminal ({status}) and cannot be modified")]
    TerminalJob { job_id: String, status: JobStatus },

    /// Progress must never move backwards within a run
    #[error("progress regression for job {job_id}: {current} -> {requested}")]
    ProgressRegression {
        job_id: String,
        current: u8,
        requested: u8,
    },

    /// Progress outside 0..=100
    #[error("invalid progress {progress} for job {job_id}")]
    InvalidProgress { job_id: String, progress: u8 },

    /// Job id already queued or in flight
    #[error("job {job_id} is already queued or running")]
    DuplicateJob { job_id: String },

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// I/O failure in a filesystem backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend unavailable or rejected the request
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
