//! Region extraction from a change-probability surface.
//!
//! Pixels strictly above the threshold are labelled into 8-connected
//! components. Each component yields one region: its ground area, mean
//! probability and a polygon traced from its largest 4-connected part.

pub mod vectorize;

use std::collections::VecDeque;

use landwatch_geo::{Polygon, ProbabilityRaster};
use landwatch_state::ChangeType;
use tracing::{debug, warn};

use crate::config::InferenceConfig;
use vectorize::{split_parts, trace_polygon, Pixel};

/// One changed region before it is attached to a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRegion {
    pub polygon: Polygon,
    pub area_sqm: f64,
    pub confidence: f64,
    pub change_type: ChangeType,
    pub pixel_count: usize,
}

#[derive(Debug, Clone)]
pub struct DetectionExtractor {
    new_construction_confidence: f64,
}

impl Default for DetectionExtractor {
    fn default() -> Self {
        Self::new(&InferenceConfig::default())
    }
}

/// 8-connected labelling of `mask`; components in row-major discovery order.
pub fn label_components(mask: &[bool], width: usize, height: usize) -> Vec<Vec<Pixel>> {
    let mut seen = vec![false; mask.len()];
    let mut components = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        let mut pixels = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            let (c, r) = (idx % width, idx / width);
            pixels.push((c, r));
            for dr in -1i64..=1 {
                for dc in -1i64..=1 {
                    let (nc, nr) = (c as i64 + dc, r as i64 + dr);
                    if nc < 0 || nr < 0 || nc >= width as i64 || nr >= height as i64 {
                        continue;
                    }
                    let n = nr as usize * width + nc as usize;
                    if mask[n] && !seen[n] {
                        seen[n] = true;
                        queue.push_back(n);
                    }
                }
            }
        }
        components.push(pixels);
    }
    components
}

impl DetectionExtractor {
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            new_construction_confidence: config.new_construction_confidence,
        }
    }

    pub fn classify(&self, confidence: f64) -> ChangeType {
        if confidence > self.new_construction_confidence {
            ChangeType::NewConstruction
        } else {
            ChangeType::Unknown
        }
    }

    /// Regions with probability above `threshold` covering at least
    /// `min_area_sqm`. NaN pixels never count as changed.
    pub fn extract(
        &self,
        raster: &ProbabilityRaster,
        threshold: f64,
        min_area_sqm: f64,
    ) -> Vec<ExtractedRegion> {
        let mask: Vec<bool> = raster.data.iter().map(|p| f64::from(*p) > threshold).collect();
        let components = label_components(&mask, raster.width, raster.height);
        let transform = raster.transform;
        let area_of = |pixels: &[Pixel]| -> f64 {
            pixels
                .iter()
                .map(|&(_, r)| transform.pixel_area_sqm(r))
                .sum()
        };

        let total = components.len();
        let mut regions = Vec::new();
        for pixels in components {
            let area_sqm = area_of(&pixels);
            if area_sqm < min_area_sqm {
                continue;
            }
            let confidence = pixels
                .iter()
                .map(|&(c, r)| f64::from(raster.get(c, r)))
                .sum::<f64>()
                / pixels.len() as f64;

            let parts = split_parts(&pixels);
            if parts.len() > 1 {
                debug!(
                    parts = parts.len(),
                    "component splits into several polygons, keeping largest"
                );
            }
            let Some(largest) = parts
                .iter()
                .reduce(|best, p| if area_of(p) > area_of(best) { p } else { best })
            else {
                continue;
            };
            let polygon = match trace_polygon(largest, &transform) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, pixels = pixels.len(), "failed to vectorize region");
                    continue;
                }
            };

            regions.push(ExtractedRegion {
                polygon,
                area_sqm,
                confidence,
                change_type: self.classify(confidence),
                pixel_count: pixels.len(),
            });
        }

        debug!(
            components = total,
            kept = regions.len(),
            threshold,
            min_area_sqm,
            "extracted change regions"
        );
        regions
    }
}
