//! Fixed progress checkpoints of a job run.

/// Point at which progress is persisted and cancellation is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Checkpoint {
    BboxComputed,
    PairFound,
    BeforeLoaded,
    AfterLoaded,
    InferenceComplete,
    ValidationComplete,
    ArtifactsPersisted,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 7] = [
        Checkpoint::BboxComputed,
        Checkpoint::PairFound,
        Checkpoint::BeforeLoaded,
        Checkpoint::AfterLoaded,
        Checkpoint::InferenceComplete,
        Checkpoint::ValidationComplete,
        Checkpoint::ArtifactsPersisted,
    ];

    pub fn progress(self) -> u8 {
        match self {
            Checkpoint::BboxComputed => 10,
            Checkpoint::PairFound => 20,
            Checkpoint::BeforeLoaded => 35,
            Checkpoint::AfterLoaded => 50,
            Checkpoint::InferenceComplete => 75,
            Checkpoint::ValidationComplete => 85,
            Checkpoint::ArtifactsPersisted => 100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Checkpoint::BboxComputed => "bbox_computed",
            Checkpoint::PairFound => "pair_found",
            Checkpoint::BeforeLoaded => "before_loaded",
            Checkpoint::AfterLoaded => "after_loaded",
            Checkpoint::InferenceComplete => "inference_complete",
            Checkpoint::ValidationComplete => "validation_complete",
            Checkpoint::ArtifactsPersisted => "artifacts_persisted",
        }
    }
}
