//! Protected-zone flagging of detections.

use landwatch_geo::Geometry;
use landwatch_state::Detection;
use tracing::debug;

use crate::zones::ZoneIndex;

/// Marks detections that intersect a protected zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialValidator;

pub fn flag_reason(zone_type: &str) -> String {
    format!("Intersects {zone_type}")
}

impl SpatialValidator {
    /// Set `flagged` and `flag_reasons` on every detection.
    ///
    /// Only zones intersecting the AOI are considered, in index order. The
    /// detections keep their order, count and geometry; previous flags are
    /// overwritten, so validating twice gives the same result.
    pub fn validate(
        &self,
        mut detections: Vec<Detection>,
        aoi_geometry: &Geometry,
        index: &ZoneIndex,
    ) -> Vec<Detection> {
        let relevant = index.intersecting(aoi_geometry);

        for detection in &mut detections {
            detection.flag_reasons = if relevant.is_empty() {
                Vec::new()
            } else {
                index
                    .intersecting_polygon(&detection.geometry)
                    .into_iter()
                    .filter(|zone| relevant.iter().any(|r| std::ptr::eq(*r, *zone)))
                    .map(|zone| flag_reason(&zone.zone_type))
                    .collect()
            };
            detection.flagged = !detection.flag_reasons.is_empty();
        }

        debug!(
            relevant_zones = relevant.len(),
            detections = detections.len(),
            flagged = detections.iter().filter(|d| d.flagged).count(),
            "validated detections against protected zones"
        );
        detections
    }
}
