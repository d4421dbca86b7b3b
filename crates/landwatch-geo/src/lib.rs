//! Landwatch-Geo: geometry and raster primitives
//!
//! This crate holds the interchange shapes shared by every other landwatch
//! crate: GeoJSON-shaped polygons, boundary-inclusive predicates, and
//! georeferenced rasters.
//!
//! ## Layer 0 - Shapes
//!
//! Focus: exact, allocation-light geometry with no I/O.
//!
//! ## Key Components
//!
//! - `Polygon` / `MultiPolygon` / `Geometry`: GeoJSON-compatible geometry
//! - `predicates`: segment, point-in-polygon and polygon intersection tests
//! - `Raster` / `ProbabilityRaster`: grids bound to a `GeoTransform`
//! - `geojson`: `Feature` and `FeatureCollection` documents

mod error;
pub mod geojson;
pub mod geometry;
pub mod predicates;
pub mod raster;

pub use error::GeoError;
pub use geojson::{Feature, FeatureCollection};
pub use geometry::{BBox, Coord, Geometry, MultiPolygon, Polygon};
pub use predicates::{point_in_polygon, polygons_intersect, segments_intersect};
pub use raster::{GeoTransform, ProbabilityRaster, Raster, SensorFamily, WGS84_EPSG};

/// Result type for geometry and raster operations
pub type Result<T> = std::result::Result<T, GeoError>;
