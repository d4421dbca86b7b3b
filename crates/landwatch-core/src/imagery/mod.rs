//! Satellite imagery catalog access.
//!
//! - [`ImagerySource`]: async catalog trait (search + load)
//! - [`selector`]: optical-first / SAR-fallback pair selection
//! - [`retry`]: exponential backoff for transient catalog errors
//! - [`synthetic`]: seeded simulation source
//! - [`fakes`]: scripted source for tests

pub mod fakes;
pub mod retry;
pub mod selector;
pub mod synthetic;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use landwatch_geo::{BBox, Raster, SensorFamily};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use retry::with_retry;
pub use selector::ImageryPairSelector;
pub use synthetic::SyntheticImagerySource;

/// Errors raised by an imagery source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImageryError {
    /// Network hiccup, throttling or 5xx; worth retrying.
    #[error("transient catalog error: {0}")]
    Transient(String),

    /// Retry budget spent on transient errors.
    #[error("catalog unavailable after {attempts} attempt(s): {reason}")]
    CatalogUnavailable { attempts: u32, reason: String },

    /// No suitable scene pair. Terminal.
    #[error("{0}")]
    NotFound(String),

    /// Malformed request or unusable asset.
    #[error("invalid imagery: {0}")]
    Invalid(String),
}

impl ImageryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ImageryError::Transient(_))
    }
}

/// One scene returned by a catalog search. Transient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub id: String,
    pub collection: String,
    pub acquired: DateTime<Utc>,
    /// Scene cloud cover in percent; `None` for SAR or when unknown
    pub cloud_cover: Option<f64>,
    pub footprint: BBox,
}

/// Catalog query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub collection: String,
    pub bbox: BBox,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Upper bound on cloud cover, percent
    pub max_cloud_cover: Option<f64>,
}

/// Before/after scenes of one sensor family.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageryPair {
    pub before: ImageCandidate,
    pub after: ImageCandidate,
    pub sensor_family: SensorFamily,
}

/// Satellite image catalog.
#[async_trait]
pub trait ImagerySource: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<ImageCandidate>, ImageryError>;

    /// Load a scene clipped to `bbox`.
    async fn load(&self, candidate: &ImageCandidate, bbox: &BBox) -> Result<Raster, ImageryError>;
}
