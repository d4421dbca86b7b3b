//! Georeferenced grids.
//!
//! Pixel `(col, row)` covers the world rectangle from
//! `pixel_to_world(col, row)` to `pixel_to_world(col + 1, row + 1)`. Rows grow
//! downward; for a north-up grid `pixel_height` is negative.

use serde::{Deserialize, Serialize};

use crate::error::GeoError;
use crate::geometry::{BBox, Coord};

/// EPSG code of WGS84 geographic coordinates.
pub const WGS84_EPSG: u32 = 4326;

/// Mean earth radius in metres (IUGG).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Imaging technology of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorFamily {
    Optical,
    Sar,
}

impl SensorFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorFamily::Optical => "optical",
            SensorFamily::Sar => "sar",
        }
    }
}

impl std::fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Affine pixel-to-world mapping without rotation terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub epsg: u32,
}

impl GeoTransform {
    /// North-up transform with the origin at the top-left corner.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_size: f64, epsg: u32) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width: pixel_size,
            pixel_height: -pixel_size,
            epsg,
        }
    }

    /// North-up transform stretching a `width x height` grid over `bbox`.
    pub fn for_bbox(bbox: &BBox, width: usize, height: usize, epsg: u32) -> Result<Self, GeoError> {
        if width == 0 || height == 0 {
            return Err(GeoError::EmptyRaster {
                width,
                height,
                bands: 1,
            });
        }
        let t = Self {
            origin_x: bbox.min_x,
            origin_y: bbox.max_y,
            pixel_width: bbox.width() / width as f64,
            pixel_height: -bbox.height() / height as f64,
            epsg,
        };
        t.check()?;
        Ok(t)
    }

    pub fn check(&self) -> Result<(), GeoError> {
        let finite = [self.origin_x, self.origin_y, self.pixel_width, self.pixel_height]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(GeoError::InvalidTransform("non-finite parameter".into()));
        }
        if self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return Err(GeoError::InvalidTransform(format!(
                "zero pixel size ({} x {})",
                self.pixel_width, self.pixel_height
            )));
        }
        Ok(())
    }

    /// World coordinate of the pixel corner at fractional `(col, row)`.
    pub fn pixel_to_world(&self, col: f64, row: f64) -> Coord {
        Coord::new(
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }

    pub fn is_geographic(&self) -> bool {
        self.epsg == WGS84_EPSG
    }

    /// Ground area of one pixel in `row`, in square metres.
    ///
    /// Projected grids are assumed metric. Geographic grids use a spherical
    /// earth, scaling the east-west extent by `cos(latitude)` at the row
    /// centre.
    pub fn pixel_area_sqm(&self, row: usize) -> f64 {
        if !self.is_geographic() {
            return (self.pixel_width * self.pixel_height).abs();
        }
        let lat = self.origin_y + (row as f64 + 0.5) * self.pixel_height;
        let deg = std::f64::consts::PI / 180.0;
        let dy = self.pixel_height.abs() * deg * EARTH_RADIUS_M;
        let dx = self.pixel_width.abs() * deg * EARTH_RADIUS_M * (lat * deg).cos().abs();
        dx * dy
    }

    /// World extent of a `width x height` grid.
    pub fn bounds(&self, width: usize, height: usize) -> BBox {
        let a = self.pixel_to_world(0.0, 0.0);
        let b = self.pixel_to_world(width as f64, height as f64);
        BBox::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
    }
}

/// Multi-band `f32` image, band-major: sample `(band, row, col)` is at
/// `band * width * height + row * width + col`. NaN is nodata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub data: Vec<f32>,
    pub transform: GeoTransform,
    pub sensor: SensorFamily,
}

impl Raster {
    pub fn new(
        width: usize,
        height: usize,
        bands: usize,
        data: Vec<f32>,
        transform: GeoTransform,
        sensor: SensorFamily,
    ) -> Result<Self, GeoError> {
        let r = Self {
            width,
            height,
            bands,
            data,
            transform,
            sensor,
        };
        r.check_layout()?;
        Ok(r)
    }

    pub fn check_layout(&self) -> Result<(), GeoError> {
        if self.width == 0 || self.height == 0 || self.bands == 0 {
            return Err(GeoError::EmptyRaster {
                width: self.width,
                height: self.height,
                bands: self.bands,
            });
        }
        let expected = self.width * self.height * self.bands;
        if self.data.len() != expected {
            return Err(GeoError::DataLength {
                expected,
                actual: self.data.len(),
            });
        }
        self.transform.check()
    }

    #[inline]
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    /// Samples of one band. Panics on an out-of-range band.
    pub fn band(&self, band: usize) -> &[f32] {
        let n = self.pixels();
        &self.data[band * n..(band + 1) * n]
    }

    /// Whether one sample carries data: finite and positive for optical
    /// reflectance, finite for SAR backscatter.
    #[inline]
    pub fn is_valid_sample(&self, value: f32) -> bool {
        match self.sensor {
            SensorFamily::Optical => value.is_finite() && value > 0.0,
            SensorFamily::Sar => value.is_finite(),
        }
    }

    /// Fraction of samples that carry data.
    pub fn valid_fraction(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let valid = self.data.iter().filter(|v| self.is_valid_sample(**v)).count();
        valid as f64 / self.data.len() as f64
    }

    /// Per-pixel mask, row-major: true when every band carries data.
    pub fn pixel_mask(&self) -> Vec<bool> {
        let n = self.pixels();
        let mut mask = vec![true; n];
        for band in self.data.chunks_exact(n.max(1)) {
            for (m, v) in mask.iter_mut().zip(band) {
                *m &= self.is_valid_sample(*v);
            }
        }
        mask
    }

    pub fn bounds(&self) -> BBox {
        self.transform.bounds(self.width, self.height)
    }
}

/// Single-band change probability grid with values in `[0, 1]` or NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityRaster {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
    pub transform: GeoTransform,
}

impl ProbabilityRaster {
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<f32>,
        transform: GeoTransform,
    ) -> Result<Self, GeoError> {
        if width == 0 || height == 0 {
            return Err(GeoError::EmptyRaster {
                width,
                height,
                bands: 1,
            });
        }
        if data.len() != width * height {
            return Err(GeoError::DataLength {
                expected: width * height,
                actual: data.len(),
            });
        }
        transform.check()?;
        Ok(Self {
            width,
            height,
            data,
            transform,
        })
    }

    #[inline]
    pub fn get(&self, col: usize, row: usize) -> f32 {
        self.data[row * self.width + col]
    }

    pub fn bounds(&self) -> BBox {
        self.transform.bounds(self.width, self.height)
    }

    /// Little-endian `f32` samples, row-major. Used as the persisted payload.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() * 4);
        for v in &self.data {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }
}
