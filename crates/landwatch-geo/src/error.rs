//! Error types for landwatch-geo

use thiserror::Error;

/// Errors raised while building geometries or rasters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    /// A ring needs three distinct vertices plus the closing vertex
    #[error("ring must have at least 4 coordinates, got {0}")]
    RingTooShort(usize),

    /// NaN or infinite coordinate
    #[error("geometry contains a non-finite coordinate")]
    NonFiniteCoordinate,

    /// Polygon or multipolygon without any ring
    #[error("geometry has no rings")]
    EmptyGeometry,

    /// Raster buffer does not match the declared shape
    #[error("raster data length mismatch: expected {expected}, got {actual}")]
    DataLength { expected: usize, actual: usize },

    /// Raster with a zero dimension
    #[error("raster has zero size: {width}x{height}x{bands}")]
    EmptyRaster {
        width: usize,
        height: usize,
        bands: usize,
    },

    /// Degenerate or non-finite pixel size
    #[error("invalid geotransform: {0}")]
    InvalidTransform(String),
}
