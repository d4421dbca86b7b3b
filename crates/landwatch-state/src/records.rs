//! Persistent record types.

use chrono::{DateTime, NaiveDate, Utc};
use landwatch_geo::{Feature, FeatureCollection, Geometry, MultiPolygon, Polygon, SensorFamily};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random id
            pub fn new() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier of a change-detection job
    JobId
);
string_id!(
    /// Unique identifier of an area of interest
    AoiId
);
string_id!(
    /// Unique identifier of a detection
    DetectionId
);

// ---------------------------------------------------------------------------
// Job status machine
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses reachable in one step from `from`.
pub fn allowed_transitions(from: JobStatus) -> &'static [JobStatus] {
    use JobStatus::*;
    match from {
        Pending => &[Processing, Cancelled],
        Processing => &[Completed, Failed, Cancelled],
        Completed | Failed | Cancelled => &[],
    }
}

/// Check a status change against the transition table.
pub fn validate_transition(job_id: &JobId, from: JobStatus, to: JobStatus) -> StorageResult<()> {
    if from.is_terminal() {
        return Err(StorageError::TerminalJob {
            job_id: job_id.to_string(),
            status: from,
        });
    }
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StorageError::IllegalTransition {
            job_id: job_id.to_string(),
            from,
            to,
        })
    }
}

/// Queue lane of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// User-defined region watched for change. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaOfInterest {
    pub id: AoiId,
    pub name: String,
    /// WGS84 polygon
    pub geometry: Geometry,
    pub owner: String,
}

/// Summary written alongside a COMPLETED status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub raster_url: String,
    pub detections_url: String,
    pub detection_count: usize,
    pub flagged_count: usize,
    pub sensor_family: SensorFamily,
    pub before_image: String,
    pub after_image: String,
    /// `"model"` or `"difference_fallback"`
    pub inference_method: String,
    pub model_version: Option<String>,
    /// Output came from the non-ML fallback
    pub degraded: bool,
}

/// A change-detection request and its durable progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub aoi_id: AoiId,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    /// Maximum scene cloud cover, percent 0-100
    pub cloud_threshold: f64,
    /// Probability above which a pixel counts as changed
    pub change_threshold: f64,
    pub min_area_sqm: f64,
    pub priority: Priority,
    pub status: JobStatus,
    pub progress: u8,
    pub error_message: Option<String>,
    pub result: Option<JobResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// New PENDING job with default thresholds.
    pub fn new(aoi_id: AoiId, date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            id: JobId::new(),
            aoi_id,
            date_from,
            date_to,
            cloud_threshold: 20.0,
            change_threshold: 0.5,
            min_area_sqm: 25.0,
            priority: Priority::Normal,
            status: JobStatus::Pending,
            progress: 0,
            error_message: None,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn with_cloud_threshold(mut self, percent: f64) -> Self {
        self.cloud_threshold = percent;
        self
    }

    pub fn with_change_threshold(mut self, threshold: f64) -> Self {
        self.change_threshold = threshold;
        self
    }

    pub fn with_min_area_sqm(mut self, area: f64) -> Self {
        self.min_area_sqm = area;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// A single atomic job mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub progress: u8,
    pub error_message: Option<String>,
    pub result: Option<JobResult>,
}

impl JobUpdate {
    pub fn progress(status: JobStatus, progress: u8) -> Self {
        Self {
            status,
            progress,
            error_message: None,
            result: None,
        }
    }

    pub fn failed(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress,
            error_message: Some(message.into()),
            result: None,
        }
    }

    pub fn cancelled(progress: u8) -> Self {
        Self::progress(JobStatus::Cancelled, progress)
    }

    pub fn completed(result: JobResult) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: 100,
            error_message: None,
            result: Some(result),
        }
    }
}

/// Kind of land-use change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    NewConstruction,
    Demolished,
    Modified,
    Unknown,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::NewConstruction => "NEW_CONSTRUCTION",
            ChangeType::Demolished => "DEMOLISHED",
            ChangeType::Modified => "MODIFIED",
            ChangeType::Unknown => "UNKNOWN",
        }
    }
}

/// A changed region found by a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: DetectionId,
    pub job_id: JobId,
    pub geometry: Polygon,
    pub confidence_score: f64,
    pub area_sqm: f64,
    pub change_type: ChangeType,
    pub flagged: bool,
    pub flag_reasons: Vec<String>,
}

impl Detection {
    pub fn to_feature(&self) -> Feature {
        Feature::new(Geometry::Polygon(self.geometry.clone()))
            .with_id(self.id.as_str())
            .with_property("job_id", self.job_id.as_str())
            .with_property("confidence_score", self.confidence_score)
            .with_property("area_sqm", self.area_sqm)
            .with_property("change_type", self.change_type.as_str())
            .with_property("flagged", self.flagged)
            .with_property("flag_reasons", self.flag_reasons.clone())
    }
}

/// GeoJSON document listing detections in the given order.
pub fn detections_to_geojson(detections: &[Detection]) -> FeatureCollection {
    detections.iter().map(Detection::to_feature).collect()
}

/// Legally protected area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedZone {
    pub id: String,
    pub name: String,
    /// e.g. `"FOREST"`, `"WATER_BODY"`
    pub zone_type: String,
    pub geometry: MultiPolygon,
    pub active: bool,
}

impl ProtectedZone {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        zone_type: impl Into<String>,
        geometry: impl Into<MultiPolygon>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            zone_type: zone_type.into(),
            geometry: geometry.into(),
            active: true,
        }
    }
}
