//! Seeded synthetic imagery for simulation runs.
//!
//! The source fabricates a static landscape per AOI plus a handful of
//! rectangular construction footprints, each with a build date inside the
//! configured construction period. A scene shows a footprint only if it was
//! acquired on or after that date, so before/after pairs spanning the period
//! contain real, deterministic change for the difference algorithm to find.
//!
//! Everything derives from `seed`; the same seed and request always yield
//! the same scenes and pixels.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use landwatch_geo::{BBox, GeoTransform, Raster, SensorFamily, WGS84_EPSG};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{ImageCandidate, ImageryError, ImagerySource, SearchRequest};

/// Optical band order: B04 (red), B03 (green), B02 (blue), B08 (nir).
const OPTICAL_BANDS: usize = 4;
/// SAR band order: VV, VH (dB).
const SAR_BANDS: usize = 2;

const VEGETATION_OPTICAL: [f32; OPTICAL_BANDS] = [600.0, 900.0, 500.0, 3500.0];
const BUILT_OPTICAL: [f32; OPTICAL_BANDS] = [2200.0, 2100.0, 2000.0, 2600.0];
const VEGETATION_SAR: [f32; SAR_BANDS] = [-12.0, -18.0];
const BUILT_SAR: [f32; SAR_BANDS] = [-3.0, -9.0];

/// Rectangle of new construction in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    pub col: usize,
    pub row: usize,
    pub width: usize,
    pub height: usize,
    pub built_on: NaiveDate,
}

impl Footprint {
    fn contains(&self, col: usize, row: usize) -> bool {
        col >= self.col
            && col < self.col + self.width
            && row >= self.row
            && row < self.row + self.height
    }
}

/// Deterministic stand-in for a STAC catalog.
#[derive(Debug, Clone)]
pub struct SyntheticImagerySource {
    seed: u64,
    width: usize,
    height: usize,
    footprints: usize,
    construction_start: NaiveDate,
    construction_days: i64,
    optical_collection: String,
    sar_collection: String,
    /// Upper bound of generated optical cloud cover, percent
    max_cloud_cover: f64,
}

/// FNV-1a over a sequence of byte slices.
fn fnv1a(parts: &[&[u8]]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for part in parts {
        for byte in *part {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash ^= 0xff;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn bbox_key(bbox: &BBox) -> [u8; 32] {
    let mut key = [0u8; 32];
    for (i, v) in bbox.to_array().iter().enumerate() {
        key[i * 8..(i + 1) * 8].copy_from_slice(&v.to_bits().to_le_bytes());
    }
    key
}

impl SyntheticImagerySource {
    /// 64x64 scenes, six footprints built during 2024.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            width: 64,
            height: 64,
            footprints: 6,
            construction_start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap_or_default(),
            construction_days: 240,
            optical_collection: "sentinel-2-l2a".into(),
            sar_collection: "sentinel-1-grd".into(),
            max_cloud_cover: 40.0,
        }
    }

    pub fn with_size(mut self, width: usize, height: usize) -> Self {
        self.width = width.max(24);
        self.height = height.max(24);
        self
    }

    /// Footprints are placed in distinct cells of a 3x3 layout, so at most 9.
    pub fn with_footprints(mut self, count: usize) -> Self {
        self.footprints = count.min(9);
        self
    }

    pub fn with_construction_period(mut self, start: NaiveDate, days: i64) -> Self {
        self.construction_start = start;
        self.construction_days = days.max(0);
        self
    }

    pub fn with_max_cloud_cover(mut self, percent: f64) -> Self {
        self.max_cloud_cover = percent.clamp(0.0, 100.0);
        self
    }

    fn rng_for(&self, parts: &[&[u8]]) -> StdRng {
        let mut all: Vec<&[u8]> = Vec::with_capacity(parts.len() + 1);
        let seed = self.seed.to_le_bytes();
        all.push(&seed);
        all.extend_from_slice(parts);
        StdRng::seed_from_u64(fnv1a(&all))
    }

    /// Construction footprints for an AOI, in pixel space.
    pub fn footprints_for(&self, bbox: &BBox) -> Vec<Footprint> {
        let key = bbox_key(bbox);
        let mut rng = self.rng_for(&[b"footprints", &key]);

        let cell_w = self.width / 3;
        let cell_h = self.height / 3;
        let mut cells: Vec<usize> = (0..9).collect();
        cells.shuffle(&mut rng);

        cells
            .into_iter()
            .take(self.footprints)
            .map(|cell| {
                let max_w = (cell_w - 2).clamp(1, 12);
                let max_h = (cell_h - 2).clamp(1, 12);
                let width = rng.gen_range(max_w.min(7)..=max_w);
                let height = rng.gen_range(max_h.min(7)..=max_h);
                let col = (cell % 3) * cell_w + rng.gen_range(1..=cell_w - width - 1);
                let row = (cell / 3) * cell_h + rng.gen_range(1..=cell_h - height - 1);
                let offset = rng.gen_range(0..=self.construction_days);
                Footprint {
                    col,
                    row,
                    width,
                    height,
                    built_on: self.construction_start + Duration::days(offset),
                }
            })
            .collect()
    }

    fn scenes(&self, request: &SearchRequest) -> Vec<ImageCandidate> {
        let optical = request.collection == self.optical_collection;
        let (revisit_days, tag) = if optical {
            (5, "S2")
        } else if request.collection == self.sar_collection {
            (6, "S1")
        } else {
            return Vec::new();
        };

        let key = bbox_key(&request.bbox);
        let mut out = Vec::new();
        let mut day = request.start.date_naive();
        let last = request.end.date_naive();
        while day <= last {
            let ordinal = day.num_days_from_ce() as i64;
            if ordinal.rem_euclid(revisit_days) == 0 {
                let date_key = ordinal.to_le_bytes();
                let cloud_cover = optical.then(|| {
                    let mut rng = self.rng_for(&[b"cloud", &key, &date_key]);
                    (rng.gen::<f64>() * self.max_cloud_cover * 10.0).round() / 10.0
                });
                let acquired: DateTime<Utc> =
                    day.and_hms_opt(10, 30, 0).unwrap_or_default().and_utc();
                if acquired >= request.start && acquired <= request.end {
                    out.push(ImageCandidate {
                        id: format!(
                            "SYN_{tag}_{}_{:08x}",
                            day.format("%Y%m%d"),
                            fnv1a(&[&key]) as u32
                        ),
                        collection: request.collection.clone(),
                        acquired,
                        cloud_cover,
                        footprint: request.bbox,
                    });
                }
            }
            day += Duration::days(1);
        }
        out
    }

    fn render(&self, candidate: &ImageCandidate, bbox: &BBox) -> Result<Raster, ImageryError> {
        let (sensor, background, built): (SensorFamily, &[f32], &[f32]) =
            if candidate.collection == self.optical_collection {
                (SensorFamily::Optical, &VEGETATION_OPTICAL, &BUILT_OPTICAL)
            } else if candidate.collection == self.sar_collection {
                (SensorFamily::Sar, &VEGETATION_SAR, &BUILT_SAR)
            } else {
                return Err(ImageryError::Invalid(format!(
                    "unknown collection {}",
                    candidate.collection
                )));
            };
        let bands = background.len();
        let amplitude = match sensor {
            SensorFamily::Optical => 15.0,
            SensorFamily::Sar => 0.2,
        };

        let acquired = candidate.acquired.date_naive();
        let visible: Vec<Footprint> = self
            .footprints_for(bbox)
            .into_iter()
            .filter(|f| f.built_on <= acquired)
            .collect();

        let key = bbox_key(bbox);
        let mut texture = self.rng_for(&[b"texture", &key]);
        let mut noise = self.rng_for(&[b"noise", &key, candidate.id.as_bytes()]);

        let pixels = self.width * self.height;
        let mut data = vec![0f32; pixels * bands];
        for row in 0..self.height {
            for col in 0..self.width {
                let idx = row * self.width + col;
                let base: &[f32] = if visible.iter().any(|f| f.contains(col, row)) {
                    built
                } else {
                    background
                };
                for band in 0..bands {
                    let static_var: f32 = texture.gen_range(-1.0..1.0) * amplitude * 2.0;
                    let temporal: f32 = noise.gen_range(-1.0..1.0) * amplitude * 0.25;
                    data[band * pixels + idx] = base[band] + static_var + temporal;
                }
            }
        }

        let transform = GeoTransform::for_bbox(bbox, self.width, self.height, WGS84_EPSG)
            .map_err(|e| ImageryError::Invalid(e.to_string()))?;
        Raster::new(self.width, self.height, bands, data, transform, sensor)
            .map_err(|e| ImageryError::Invalid(e.to_string()))
    }
}

#[async_trait]
impl ImagerySource for SyntheticImagerySource {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<ImageCandidate>, ImageryError> {
        Ok(self
            .scenes(request)
            .into_iter()
            .filter(|c| match (request.max_cloud_cover, c.cloud_cover) {
                (Some(max), Some(cc)) => cc <= max,
                _ => true,
            })
            .collect())
    }

    async fn load(&self, candidate: &ImageCandidate, bbox: &BBox) -> Result<Raster, ImageryError> {
        self.render(candidate, bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(collection: &str, from: NaiveDate, to: NaiveDate) -> SearchRequest {
        SearchRequest {
            collection: collection.into(),
            bbox: BBox::new(30.0, -2.0, 30.01, -1.99),
            start: from.and_hms_opt(0, 0, 0).unwrap().and_utc(),
            end: to.and_hms_opt(0, 0, 0).unwrap().and_utc(),
            max_cloud_cover: None,
        }
    }

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    #[tokio::test]
    async fn test_same_seed_same_scenes() {
        let a = SyntheticImagerySource::new(7);
        let b = SyntheticImagerySource::new(7);
        let req = request("sentinel-2-l2a", d(1, 1), d(1, 20));
        assert_eq!(a.search(&req).await.unwrap(), b.search(&req).await.unwrap());
    }

    #[tokio::test]
    async fn test_optical_revisit_and_cloud_cover() {
        let src = SyntheticImagerySource::new(1);
        let scenes = src
            .search(&request("sentinel-2-l2a", d(3, 1), d(3, 31)))
            .await
            .unwrap();
        assert!(scenes.len() >= 5);
        for s in &scenes {
            let cc = s.cloud_cover.unwrap();
            assert!((0.0..=40.0).contains(&cc));
            assert_eq!(s.acquired.date_naive().num_days_from_ce() % 5, 0);
        }
    }

    #[tokio::test]
    async fn test_footprints_appear_after_build_date() {
        let src = SyntheticImagerySource::new(3);
        let req = request("sentinel-1-grd", d(1, 1), d(1, 12));
        let early = src.search(&req).await.unwrap().remove(0);
        let mut late = early.clone();
        late.acquired = d(12, 1).and_hms_opt(10, 30, 0).unwrap().and_utc();
        late.id = "late".into();

        let before = src.load(&early, &req.bbox).await.unwrap();
        let after = src.load(&late, &req.bbox).await.unwrap();
        let fp = src.footprints_for(&req.bbox)[0];
        let idx = (fp.row + 1) * 64 + fp.col + 1;
        assert!(before.band(0)[idx] < -8.0);
        assert!(after.band(0)[idx] > -6.0);
        assert_eq!(before.valid_fraction(), 1.0);
    }

    #[test]
    fn test_footprints_do_not_overlap() {
        let src = SyntheticImagerySource::new(11).with_footprints(9);
        let fps = src.footprints_for(&BBox::new(0.0, 0.0, 0.01, 0.01));
        assert_eq!(fps.len(), 9);
        for (i, a) in fps.iter().enumerate() {
            for b in &fps[i + 1..] {
                let apart = a.col + a.width <= b.col
                    || b.col + b.width <= a.col
                    || a.row + a.height <= b.row
                    || b.row + b.height <= a.row;
                assert!(apart, "{a:?} overlaps {b:?}");
            }
        }
    }
}
