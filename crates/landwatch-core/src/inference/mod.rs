//! Change inference over a before/after raster pair.
//!
//! [`ChangeInferenceEngine::preprocess`] stacks the normalized bands of both
//! rasters into a [`Tensor`]; [`ChangeInferenceEngine::infer`] hands it to a
//! pluggable [`ChangeModel`] or, when none is usable, to the deterministic
//! difference fallback in [`fallback`].

pub mod fallback;

use std::sync::Arc;

use landwatch_geo::{ProbabilityRaster, Raster, SensorFamily};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::InferenceConfig;

/// Optical reflectance scale (Sentinel-2 L2A digital numbers).
const OPTICAL_SCALE: f32 = 10_000.0;
/// SAR backscatter range mapped onto [0, 1], in dB.
const SAR_DB_MIN: f32 = -30.0;
const SAR_DB_RANGE: f32 = 50.0;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum InferenceError {
    #[error("before raster is {before:?} (w, h, bands) but after raster is {after:?}")]
    ShapeMismatch {
        before: [usize; 3],
        after: [usize; 3],
    },

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Model(String),
}

/// Errors reported by a model backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    /// Backend not loaded or not reachable. The engine falls back.
    #[error("model unavailable: {0}")]
    Unavailable(String),

    #[error("model failed: {0}")]
    Failed(String),
}

/// Channel-major stack of normalized bands: `before[0..b]` then `after[0..b]`.
///
/// Nodata samples are zero in `data`; `valid` marks the pixels that carry
/// data in every band of both images.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<f32>,
    pub valid: Vec<bool>,
}

impl Tensor {
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    pub fn channel(&self, c: usize) -> &[f32] {
        let n = self.pixels();
        &self.data[c * n..(c + 1) * n]
    }

    /// Bands per input raster.
    pub fn bands_per_image(&self) -> usize {
        self.channels / 2
    }

    /// Overwrite nodata pixels of a per-pixel surface with NaN.
    pub fn mask_nodata(&self, surface: &mut [f32]) {
        for (v, ok) in surface.iter_mut().zip(&self.valid) {
            if !ok {
                *v = f32::NAN;
            }
        }
    }
}

/// Trained change model, treated as a pure function.
pub trait ChangeModel: Send + Sync {
    fn version(&self) -> &str;

    /// Per-pixel change probability, `width * height` values, row-major.
    fn predict(&self, input: &Tensor) -> Result<Vec<f32>, ModelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMethod {
    Model,
    DifferenceFallback,
}

impl InferenceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceMethod::Model => "model",
            InferenceMethod::DifferenceFallback => "difference_fallback",
        }
    }
}

impl std::fmt::Display for InferenceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput {
    pub probabilities: Vec<f32>,
    pub method: InferenceMethod,
    pub model_version: Option<String>,
    /// True when the fallback stood in for a configured or expected model
    pub degraded: bool,
}

/// Probability surface plus how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSurface {
    pub raster: ProbabilityRaster,
    pub method: InferenceMethod,
    pub model_version: Option<String>,
    pub degraded: bool,
}

pub struct ChangeInferenceEngine {
    model: Option<Arc<dyn ChangeModel>>,
    config: InferenceConfig,
}

impl std::fmt::Debug for ChangeInferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeInferenceEngine")
            .field("model", &self.model.as_ref().map(|m| m.version().to_string()))
            .field("config", &self.config)
            .finish()
    }
}

fn shape(r: &Raster) -> [usize; 3] {
    [r.width, r.height, r.bands]
}

fn normalize(value: f32, sensor: SensorFamily) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    let v = match sensor {
        SensorFamily::Optical => value / OPTICAL_SCALE,
        SensorFamily::Sar => (value - SAR_DB_MIN) / SAR_DB_RANGE,
    };
    v.clamp(0.0, 1.0)
}

impl ChangeInferenceEngine {
    /// Engine without a model; every run uses the fallback.
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            model: None,
            config,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn ChangeModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Reject rasters that are empty, malformed or mostly nodata.
    pub fn check_quality(&self, raster: &Raster, label: &str) -> Result<(), InferenceError> {
        raster
            .check_layout()
            .map_err(|e| InferenceError::InvalidInput(format!("{label} raster: {e}")))?;
        let valid = raster.valid_fraction();
        if valid < self.config.min_valid_fraction {
            return Err(InferenceError::InvalidInput(format!(
                "{label} raster has {:.1}% valid pixels, need {:.1}%",
                valid * 100.0,
                self.config.min_valid_fraction * 100.0
            )));
        }
        Ok(())
    }

    /// Normalize and stack both rasters. Shapes must match exactly.
    pub fn preprocess(&self, before: &Raster, after: &Raster) -> Result<Tensor, InferenceError> {
        if shape(before) != shape(after) {
            return Err(InferenceError::ShapeMismatch {
                before: shape(before),
                after: shape(after),
            });
        }
        for (label, r) in [("before", before), ("after", after)] {
            r.check_layout()
                .map_err(|e| InferenceError::InvalidInput(format!("{label} raster: {e}")))?;
        }
        if before.sensor != after.sensor {
            return Err(InferenceError::InvalidInput(format!(
                "sensor mismatch: before is {}, after is {}",
                before.sensor, after.sensor
            )));
        }
        if before.transform != after.transform {
            return Err(InferenceError::InvalidInput(
                "before and after rasters are not on the same grid".into(),
            ));
        }

        let mut data = Vec::with_capacity(before.data.len() * 2);
        for r in [before, after] {
            data.extend(
                r.data
                    .iter()
                    .map(|v| if r.is_valid_sample(*v) { normalize(*v, r.sensor) } else { 0.0 }),
            );
        }
        let valid = before
            .pixel_mask()
            .into_iter()
            .zip(after.pixel_mask())
            .map(|(b, a)| b && a)
            .collect();
        Ok(Tensor {
            width: before.width,
            height: before.height,
            channels: before.bands * 2,
            data,
            valid,
        })
    }

    /// Run the model, or the fallback when no model is usable. Pixels without
    /// data in either image come out NaN.
    pub fn infer(&self, tensor: &Tensor) -> Result<InferenceOutput, InferenceError> {
        let Some(model) = &self.model else {
            debug!("no change model configured, using difference fallback");
            return Ok(self.fallback(tensor));
        };

        match model.predict(tensor) {
            Ok(mut probabilities) => {
                if probabilities.len() != tensor.pixels() {
                    return Err(InferenceError::InvalidInput(format!(
                        "model returned {} values for a {}x{} grid",
                        probabilities.len(),
                        tensor.width,
                        tensor.height
                    )));
                }
                for p in &mut probabilities {
                    if p.is_finite() {
                        *p = p.clamp(0.0, 1.0);
                    }
                }
                tensor.mask_nodata(&mut probabilities);
                Ok(InferenceOutput {
                    probabilities,
                    method: InferenceMethod::Model,
                    model_version: Some(model.version().to_string()),
                    degraded: false,
                })
            }
            Err(ModelError::Unavailable(reason)) => {
                warn!(
                    model = %model.version(),
                    reason = %reason,
                    "change model unavailable, using difference fallback"
                );
                Ok(self.fallback(tensor))
            }
            Err(ModelError::Failed(reason)) => Err(InferenceError::Model(reason)),
        }
    }

    /// Quality gate, preprocess and infer; the surface takes the after grid.
    pub fn run_pipeline(
        &self,
        before: &Raster,
        after: &Raster,
    ) -> Result<ChangeSurface, InferenceError> {
        let tensor = self.preprocess(before, after)?;
        self.check_quality(before, "before")?;
        self.check_quality(after, "after")?;

        let out = self.infer(&tensor)?;
        let raster = ProbabilityRaster::new(
            after.width,
            after.height,
            out.probabilities,
            after.transform,
        )
        .map_err(|e| InferenceError::InvalidInput(e.to_string()))?;

        Ok(ChangeSurface {
            raster,
            method: out.method,
            model_version: out.model_version,
            degraded: out.degraded,
        })
    }

    fn fallback(&self, tensor: &Tensor) -> InferenceOutput {
        InferenceOutput {
            probabilities: fallback::difference_surface(tensor, self.config.fallback_percentile),
            method: InferenceMethod::DifferenceFallback,
            model_version: None,
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landwatch_geo::GeoTransform;

    fn raster(w: usize, h: usize, bands: usize, fill: f32, sensor: SensorFamily) -> Raster {
        Raster::new(
            w,
            h,
            bands,
            vec![fill; w * h * bands],
            GeoTransform::north_up(10.0, 50.0, 0.0001, 4326),
            sensor,
        )
        .unwrap()
    }

    fn engine() -> ChangeInferenceEngine {
        ChangeInferenceEngine::new(InferenceConfig::default())
    }

    struct ConstModel(Result<Vec<f32>, ModelError>);

    impl ChangeModel for ConstModel {
        fn version(&self) -> &str {
            "const-1"
        }

        fn predict(&self, _input: &Tensor) -> Result<Vec<f32>, ModelError> {
            self.0.clone()
        }
    }

    #[test]
    fn test_preprocess_stacks_channels() {
        let b = raster(3, 2, 4, 5000.0, SensorFamily::Optical);
        let a = raster(3, 2, 4, 20_000.0, SensorFamily::Optical);
        let t = engine().preprocess(&b, &a).unwrap();
        assert_eq!(t.channels, 8);
        assert_eq!(t.data.len(), 3 * 2 * 8);
        assert_eq!(t.channel(0)[0], 0.5);
        assert_eq!(t.channel(7)[0], 1.0);
    }

    #[test]
    fn test_sar_normalization_range() {
        assert_eq!(normalize(-30.0, SensorFamily::Sar), 0.0);
        assert_eq!(normalize(20.0, SensorFamily::Sar), 1.0);
        assert!((normalize(-5.0, SensorFamily::Sar) - 0.5).abs() < 1e-6);
        assert_eq!(normalize(f32::NAN, SensorFamily::Sar), 0.0);
    }

    #[test]
    fn test_band_count_mismatch_rejected() {
        let b = raster(4, 4, 4, 1000.0, SensorFamily::Optical);
        let a = raster(4, 4, 3, 1000.0, SensorFamily::Optical);
        let err = engine().preprocess(&b, &a).unwrap_err();
        assert_eq!(
            err,
            InferenceError::ShapeMismatch {
                before: [4, 4, 4],
                after: [4, 4, 3]
            }
        );
    }

    #[test]
    fn test_sensor_mismatch_is_invalid_input() {
        let b = raster(4, 4, 2, 1000.0, SensorFamily::Optical);
        let a = raster(4, 4, 2, -10.0, SensorFamily::Sar);
        let err = engine().preprocess(&b, &a).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidInput(_)));
    }

    #[test]
    fn test_mostly_nodata_raster_fails_quality_gate() {
        let b = raster(4, 4, 1, 1000.0, SensorFamily::Optical);
        let mut a = b.clone();
        for v in a.data.iter_mut().take(10) {
            *v = f32::NAN;
        }
        let err = engine().run_pipeline(&b, &a).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidInput(msg) if msg.contains("valid pixels")));
    }

    #[test]
    fn test_model_output_clamped() {
        let eng = engine().with_model(Arc::new(ConstModel(Ok(vec![1.5, -0.2, 0.4, 0.9]))));
        let r = raster(2, 2, 2, -10.0, SensorFamily::Sar);
        let surface = eng.run_pipeline(&r, &r).unwrap();
        assert_eq!(surface.raster.data, vec![1.0, 0.0, 0.4, 0.9]);
        assert_eq!(surface.method, InferenceMethod::Model);
        assert_eq!(surface.model_version.as_deref(), Some("const-1"));
        assert!(!surface.degraded);
    }

    #[test]
    fn test_model_wrong_size_is_invalid_input() {
        let eng = engine().with_model(Arc::new(ConstModel(Ok(vec![0.5]))));
        let r = raster(2, 2, 2, -10.0, SensorFamily::Sar);
        assert!(matches!(
            eng.run_pipeline(&r, &r).unwrap_err(),
            InferenceError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_unavailable_model_degrades_to_fallback() {
        let eng = engine().with_model(Arc::new(ConstModel(Err(ModelError::Unavailable(
            "weights missing".into(),
        )))));
        let r = raster(2, 2, 2, -10.0, SensorFamily::Sar);
        let surface = eng.run_pipeline(&r, &r).unwrap();
        assert_eq!(surface.method, InferenceMethod::DifferenceFallback);
        assert!(surface.degraded);
        assert!(surface.raster.data.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_failed_model_is_error() {
        let eng = engine().with_model(Arc::new(ConstModel(Err(ModelError::Failed(
            "CUDA OOM".into(),
        )))));
        let r = raster(2, 2, 2, -10.0, SensorFamily::Sar);
        assert_eq!(
            eng.run_pipeline(&r, &r).unwrap_err(),
            InferenceError::Model("CUDA OOM".into())
        );
    }

    #[test]
    fn test_optical_nodata_hole_is_nan_not_change() {
        // vegetation in both scenes; before has NaN and zero-valued pixels
        let veg = [600.0f32, 900.0, 500.0, 3500.0];
        let data: Vec<f32> = veg.iter().flat_map(|v| vec![*v; 16]).collect();
        let after = Raster::new(
            4,
            4,
            4,
            data,
            GeoTransform::north_up(10.0, 50.0, 0.0001, 4326),
            SensorFamily::Optical,
        )
        .unwrap();
        let mut before = after.clone();
        for band in 0..4 {
            before.data[band * 16] = f32::NAN;
            before.data[band * 16 + 5] = 0.0;
        }

        let t = engine().preprocess(&before, &after).unwrap();
        assert!(!t.valid[0] && !t.valid[5] && t.valid[1]);

        let surface = engine().run_pipeline(&before, &after).unwrap();
        let data = &surface.raster.data;
        assert!(data[0].is_nan() && data[5].is_nan());
        assert!(data
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 0 && *i != 5)
            .all(|(_, v)| *v == 0.0));
    }

    #[test]
    fn test_sar_nodata_hole_is_nan_not_change() {
        let after = raster(4, 4, 2, -12.0, SensorFamily::Sar);
        let mut before = after.clone();
        before.data[3] = f32::NAN;
        before.data[16 + 3] = f32::INFINITY;

        let surface = engine().run_pipeline(&before, &after).unwrap();
        assert!(surface.raster.data[3].is_nan());
        assert_eq!(surface.raster.data.iter().filter(|v| v.is_nan()).count(), 1);
        assert!(surface.raster.data.iter().filter(|v| v.is_finite()).all(|v| *v == 0.0));
    }

    #[test]
    fn test_model_output_masked_at_nodata() {
        let eng = engine().with_model(Arc::new(ConstModel(Ok(vec![0.9; 16]))));
        let after = raster(4, 4, 2, -12.0, SensorFamily::Sar);
        let mut before = after.clone();
        before.data[16 + 6] = f32::NAN;
        let surface = eng.run_pipeline(&before, &after).unwrap();
        assert!(surface.raster.data[6].is_nan());
        assert_eq!(surface.raster.data[7], 0.9);
    }
}
