//! Landwatch-State: job records and collaborator interfaces
//!
//! This crate defines everything the change-detection pipeline reads or
//! writes outside of its own memory: jobs and their status machine,
//! detections, protected zones, the job queue, and artifact storage.
//!
//! ## Layer 1 - Data/Persistence
//!
//! Focus: state-transition integrity and backend-agnostic traits.
//!
//! ## Key Components
//!
//! - `Job` / `JobStatus`: job record and its closed transition table
//! - `JobStore`, `StorageSink`, `ZoneRepository`, `JobQueue`: async traits
//! - `fakes`: in-memory implementations used by tests and simulations
//! - `FsStorageSink`: content-addressed filesystem artifact store

mod error;
pub mod fakes;
mod fs_sink;
pub mod records;
pub mod storage_traits;

pub use error::StorageError;
pub use fs_sink::{decode_raster, encode_raster, FsStorageSink};
pub use records::{
    allowed_transitions, detections_to_geojson, validate_transition, AoiId, AreaOfInterest,
    ChangeType, Detection, DetectionId, Job, JobId, JobResult, JobStatus, JobUpdate, Priority,
    ProtectedZone,
};
pub use storage_traits::{
    CancellationSource, JobQueue, JobStore, QueueStats, StorageResult, StorageSink,
    ZoneRepository,
};
