//! Scripted imagery source for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use landwatch_geo::{BBox, Raster};

use super::{ImageCandidate, ImageryError, ImagerySource, SearchRequest};

/// Catalog that answers from a fixed candidate list.
///
/// Searches filter by collection, datetime range and cloud cover like a real
/// STAC endpoint (optical scenes with unknown cloud cover pass the cloud
/// filter so the caller has to reject them). Rasters are registered per
/// candidate id.
#[derive(Debug, Default)]
pub struct ScriptedImagerySource {
    candidates: Vec<ImageCandidate>,
    rasters: Mutex<HashMap<String, Raster>>,
    ignore_window: bool,
    failing_searches: AtomicU32,
    failing_loads: AtomicU32,
    search_calls: AtomicU32,
    load_calls: AtomicU32,
    load_delay: Option<Duration>,
}

impl ScriptedImagerySource {
    pub fn new(candidates: Vec<ImageCandidate>) -> Self {
        Self {
            candidates,
            ..Self::default()
        }
    }

    /// Return every candidate of the collection regardless of the window.
    pub fn ignoring_request_window(mut self) -> Self {
        self.ignore_window = true;
        self
    }

    /// Fail the next `n` searches with a transient error.
    pub fn failing_searches(self, n: u32) -> Self {
        self.failing_searches.store(n, Ordering::SeqCst);
        self
    }

    /// Fail the next `n` loads with a transient error.
    pub fn failing_loads(self, n: u32) -> Self {
        self.failing_loads.store(n, Ordering::SeqCst);
        self
    }

    /// Sleep before answering each load.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn with_raster(self, id: &str, raster: Raster) -> Self {
        self.rasters.lock().unwrap().insert(id.to_string(), raster);
        self
    }

    pub fn search_calls(&self) -> u32 {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn load_calls(&self) -> u32 {
        self.load_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ImagerySource for ScriptedImagerySource {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<ImageCandidate>, ImageryError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_searches) {
            return Err(ImageryError::Transient("catalog returned 503".into()));
        }

        Ok(self
            .candidates
            .iter()
            .filter(|c| c.collection == request.collection)
            .filter(|c| {
                self.ignore_window || (c.acquired >= request.start && c.acquired <= request.end)
            })
            .filter(|c| match (request.max_cloud_cover, c.cloud_cover) {
                (Some(max), Some(cc)) => cc <= max,
                _ => true,
            })
            .cloned()
            .collect())
    }

    async fn load(&self, candidate: &ImageCandidate, _bbox: &BBox) -> Result<Raster, ImageryError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.failing_loads) {
            return Err(ImageryError::Transient("asset download reset".into()));
        }
        self.rasters
            .lock()
            .unwrap()
            .get(&candidate.id)
            .cloned()
            .ok_or_else(|| ImageryError::Invalid(format!("no asset for scene {}", candidate.id)))
    }
}
