//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use landwatch_core::imagery::fakes::ScriptedImagerySource;
use landwatch_core::{
    ChangeModel, ImageCandidate, JobPipeline, PipelineConfig, PipelineContext, RetryPolicy,
    ZoneIndex, ZoneIndexHandle,
};
use landwatch_geo::{BBox, GeoTransform, Geometry, Polygon, Raster, SensorFamily, WGS84_EPSG};
use landwatch_state::fakes::{MemoryJobQueue, MemoryJobStore, MemoryStorageSink};
use landwatch_state::{AoiId, AreaOfInterest, CancellationSource, Job, JobId, ProtectedZone};

pub const S2: &str = "sentinel-2-l2a";
pub const S1: &str = "sentinel-1-grd";
pub const SIZE: usize = 16;

pub const VEGETATION: [f32; 4] = [600.0, 900.0, 500.0, 3500.0];
pub const BUILT: [f32; 4] = [2200.0, 2100.0, 2000.0, 2600.0];

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

/// 16 x 16 pixels of 0.0001 degrees near the equator.
pub fn aoi_bbox() -> BBox {
    BBox::new(30.0, -2.0, 30.0016, -1.9984)
}

pub fn grid() -> GeoTransform {
    GeoTransform::for_bbox(&aoi_bbox(), SIZE, SIZE, WGS84_EPSG).unwrap()
}

pub fn block(c0: usize, r0: usize, w: usize, h: usize) -> Vec<(usize, usize)> {
    let mut px = Vec::new();
    for r in r0..r0 + h {
        for c in c0..c0 + w {
            px.push((c, r));
        }
    }
    px
}

/// Four-band optical scene; `built` pixels carry the construction signature.
pub fn optical(built: &[(usize, usize)]) -> Raster {
    let n = SIZE * SIZE;
    let mut data = vec![0.0; n * 4];
    for band in 0..4 {
        for i in 0..n {
            let px = (i % SIZE, i / SIZE);
            let v = if built.contains(&px) { BUILT[band] } else { VEGETATION[band] };
            data[band * n + i] = v;
        }
    }
    Raster::new(SIZE, SIZE, 4, data, grid(), SensorFamily::Optical).unwrap()
}

/// Two-band SAR scene in dB.
pub fn sar(built: &[(usize, usize)]) -> Raster {
    let n = SIZE * SIZE;
    let mut data = vec![0.0; n * 2];
    for i in 0..n {
        let px = (i % SIZE, i / SIZE);
        let (vv, vh) = if built.contains(&px) { (-3.0, -9.0) } else { (-12.0, -18.0) };
        data[i] = vv;
        data[n + i] = vh;
    }
    Raster::new(SIZE, SIZE, 2, data, grid(), SensorFamily::Sar).unwrap()
}

/// Overwrite every band of the given pixels with a nodata value.
pub fn with_nodata(mut raster: Raster, pixels: &[(usize, usize)], value: f32) -> Raster {
    let n = raster.pixels();
    for band in 0..raster.bands {
        for (c, r) in pixels {
            raster.data[band * n + r * SIZE + c] = value;
        }
    }
    raster
}

/// World footprint of a pixel block on the test grid.
pub fn block_bbox(c0: usize, r0: usize, w: usize, h: usize) -> BBox {
    let g = grid();
    let a = g.pixel_to_world(c0 as f64, r0 as f64);
    let b = g.pixel_to_world((c0 + w) as f64, (r0 + h) as f64);
    BBox::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
}

pub fn scene(id: &str, collection: &str, on: NaiveDate, cloud: Option<f64>) -> ImageCandidate {
    ImageCandidate {
        id: id.into(),
        collection: collection.into(),
        acquired: on.and_hms_opt(10, 30, 0).unwrap().and_utc(),
        cloud_cover: cloud,
        footprint: aoi_bbox(),
    }
}

/// Optical pair around June 1 / June 20 with a 5 x 5 construction block.
pub fn optical_source() -> ScriptedImagerySource {
    ScriptedImagerySource::new(vec![
        scene("S2_before", S2, date(6, 2), Some(4.0)),
        scene("S2_after", S2, date(6, 19), Some(6.0)),
    ])
    .with_raster("S2_before", optical(&[]))
    .with_raster("S2_after", optical(&block(4, 4, 5, 5)))
}

pub fn zone(id: &str, zone_type: &str, bbox: BBox) -> ProtectedZone {
    ProtectedZone::new(id, id, zone_type, Polygon::rectangle(&bbox))
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryPolicy {
            max_retries: 2,
            backoff_base_ms: 1,
        },
        ..PipelineConfig::default()
    }
}

#[derive(Default)]
pub struct Setup {
    pub source: ScriptedImagerySource,
    pub zones: Vec<ProtectedZone>,
    pub config: Option<PipelineConfig>,
    pub model: Option<Arc<dyn ChangeModel>>,
    pub cancellation: Option<Arc<dyn CancellationSource>>,
}

pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub sink: Arc<MemoryStorageSink>,
    pub queue: Arc<MemoryJobQueue>,
    pub zones: Arc<ZoneIndexHandle>,
    pub pipeline: JobPipeline,
}

impl Harness {
    pub fn new(setup: Setup) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let sink = Arc::new(MemoryStorageSink::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let zones = Arc::new(ZoneIndexHandle::new(ZoneIndex::build(setup.zones)));

        store.insert_aoi(AreaOfInterest {
            id: AoiId::from("aoi-1"),
            name: "hillside".into(),
            geometry: Geometry::Polygon(Polygon::rectangle(&aoi_bbox())),
            owner: "user-1".into(),
        });

        let cancellation: Arc<dyn CancellationSource> = match setup.cancellation {
            Some(c) => c,
            None => queue.clone() as Arc<dyn CancellationSource>,
        };
        let mut ctx = PipelineContext::new(
            setup.config.unwrap_or_else(test_config),
            store.clone(),
            sink.clone(),
            cancellation,
            Arc::new(setup.source),
            zones.clone(),
        );
        if let Some(model) = setup.model {
            ctx = ctx.with_model(model);
        }

        Self {
            store,
            sink,
            queue,
            zones,
            pipeline: JobPipeline::new(ctx),
        }
    }

    /// Insert a PENDING job for June 1 to June 20.
    pub fn add_job(&self, id: &str) -> JobId {
        let job =
            Job::new(AoiId::from("aoi-1"), date(6, 1), date(6, 20)).with_id(JobId::from(id));
        let job_id = job.id.clone();
        self.store.insert_job(job);
        job_id
    }

    pub fn add_custom_job(&self, job: Job) -> JobId {
        let job_id = job.id.clone();
        self.store.insert_job(job);
        job_id
    }
}
