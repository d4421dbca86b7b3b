//! Landwatch Core Library
//!
//! The change-detection job pipeline: imagery pair selection, change
//! inference, region extraction, protected-zone validation and the
//! orchestrator and worker pool that run jobs end to end.

pub mod config;
pub mod error;
pub mod extract;
pub mod imagery;
pub mod inference;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod telemetry;
pub mod validate;
pub mod worker;
pub mod zones;

pub use config::{
    ConfigError, InferenceConfig, PipelineConfig, RetryPolicy, SelectorConfig, WorkerConfig,
};
pub use error::{PipelineError, Stage};
pub use extract::{DetectionExtractor, ExtractedRegion};
pub use imagery::{
    ImageCandidate, ImageryError, ImageryPair, ImageryPairSelector, ImagerySource, SearchRequest,
    SyntheticImagerySource,
};
pub use inference::{
    ChangeInferenceEngine, ChangeModel, ChangeSurface, InferenceError, InferenceMethod,
    InferenceOutput, ModelError, Tensor,
};
pub use pipeline::{Checkpoint, JobOutcome, JobPipeline, JobReport, PipelineContext};
pub use validate::SpatialValidator;
pub use worker::{DrainSummary, WorkerPool};
pub use zones::{ZoneIndex, ZoneIndexHandle};

pub use metrics::METRICS;
pub use obs::{
    emit_job_checkpoint, emit_job_degraded, emit_job_finalize_error, emit_job_finished,
    emit_job_started, JobSpan,
};
pub use telemetry::init_tracing;

/// Landwatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
