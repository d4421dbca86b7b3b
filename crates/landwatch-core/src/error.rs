//! Pipeline error taxonomy.

use landwatch_state::StorageError;
use thiserror::Error;

use crate::imagery::ImageryError;
use crate::inference::InferenceError;

/// Pipeline stage, used to prefix persisted failure messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Aoi,
    ImagerySearch,
    BeforeLoad,
    AfterLoad,
    Inference,
    Validation,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Aoi => "aoi",
            Stage::ImagerySearch => "imagery search",
            Stage::BeforeLoad => "before imagery load",
            Stage::AfterLoad => "after imagery load",
            Stage::Inference => "inference",
            Stage::Validation => "validation",
            Stage::Persist => "persist",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end a job run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no imagery found: {0}")]
    NoImageryFound(String),

    /// Transient catalog errors outlasted the retry budget.
    #[error("imagery catalog unavailable after {attempts} attempt(s): {reason}")]
    CatalogUnavailable { attempts: u32, reason: String },

    #[error("model failed: {0}")]
    Model(String),

    #[error("timeout")]
    Timeout,

    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),

    /// Task join failure or other runtime fault
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether re-running the job later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::CatalogUnavailable { .. })
    }
}

impl From<ImageryError> for PipelineError {
    fn from(err: ImageryError) -> Self {
        match err {
            ImageryError::NotFound(msg) => PipelineError::NoImageryFound(msg),
            ImageryError::CatalogUnavailable { attempts, reason } => {
                PipelineError::CatalogUnavailable { attempts, reason }
            }
            // A bare transient error only escapes when retries are bypassed.
            ImageryError::Transient(reason) => PipelineError::CatalogUnavailable {
                attempts: 1,
                reason,
            },
            ImageryError::Invalid(msg) => PipelineError::InvalidInput(msg),
        }
    }
}

impl From<InferenceError> for PipelineError {
    fn from(err: InferenceError) -> Self {
        match err {
            e @ InferenceError::ShapeMismatch { .. } => PipelineError::ShapeMismatch(e.to_string()),
            InferenceError::InvalidInput(msg) => PipelineError::InvalidInput(msg),
            InferenceError::Model(msg) => PipelineError::Model(msg),
        }
    }
}
