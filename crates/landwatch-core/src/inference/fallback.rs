//! Deterministic pixel-difference change surface.
//!
//! With four or more bands per image (red, green, blue, nir) the per-pixel
//! difference is `|NDVI_after - NDVI_before|`; otherwise it is the absolute
//! difference of the band means. The surface is divided by the given
//! percentile of the difference distribution and clipped to `[0, 1]`.
//! Pixels without data in either image stay NaN and take no part in the
//! percentile.

use super::Tensor;

const RED: usize = 0;
const NIR: usize = 3;

/// Below this the difference distribution is treated as flat.
const FLAT_EPSILON: f32 = 1e-6;

fn ndvi(red: f32, nir: f32) -> f32 {
    let sum = nir + red;
    if sum.abs() <= f32::EPSILON {
        0.0
    } else {
        (nir - red) / sum
    }
}

/// Raw per-pixel difference magnitude, NaN where either image lacks data.
pub fn difference(tensor: &Tensor) -> Vec<f32> {
    let mut diff = raw_difference(tensor);
    tensor.mask_nodata(&mut diff);
    diff
}

fn raw_difference(tensor: &Tensor) -> Vec<f32> {
    let bands = tensor.bands_per_image();
    let n = tensor.pixels();
    if bands == 0 {
        return vec![0.0; n];
    }

    if bands >= 4 {
        let (b_red, b_nir) = (tensor.channel(RED), tensor.channel(NIR));
        let (a_red, a_nir) = (tensor.channel(bands + RED), tensor.channel(bands + NIR));
        (0..n)
            .map(|i| (ndvi(a_red[i], a_nir[i]) - ndvi(b_red[i], b_nir[i])).abs())
            .collect()
    } else {
        (0..n)
            .map(|i| {
                let mean = |offset: usize| {
                    (0..bands).map(|b| tensor.channel(offset + b)[i]).sum::<f32>() / bands as f32
                };
                (mean(bands) - mean(0)).abs()
            })
            .collect()
    }
}

/// Nearest-rank percentile of the finite values, `q` in `[0, 1]`.
pub fn percentile(values: &[f32], q: f64) -> Option<f32> {
    let mut finite: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(f32::total_cmp);
    let rank = (q.clamp(0.0, 1.0) * finite.len() as f64).ceil() as usize;
    Some(finite[rank.clamp(1, finite.len()) - 1])
}

/// Normalized change probability, `width * height` values in `[0, 1]` or NaN.
pub fn difference_surface(tensor: &Tensor, q: f64) -> Vec<f32> {
    let diff = difference(tensor);
    let scale = percentile(&diff, q).filter(|s| *s > FLAT_EPSILON);
    diff.into_iter()
        .map(|d| match scale {
            _ if !d.is_finite() => f32::NAN,
            Some(scale) => (d / scale).clamp(0.0, 1.0),
            None => 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(width: usize, height: usize, before: &[Vec<f32>], after: &[Vec<f32>]) -> Tensor {
        let mut data = Vec::new();
        for band in before.iter().chain(after) {
            data.extend_from_slice(band);
        }
        Tensor {
            width,
            height,
            channels: before.len() + after.len(),
            data,
            valid: vec![true; width * height],
        }
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let v: Vec<f32> = (1..=20).map(|i| i as f32).collect();
        assert_eq!(percentile(&v, 0.95), Some(19.0));
        assert_eq!(percentile(&v, 1.0), Some(20.0));
        assert_eq!(percentile(&v, 0.0), Some(1.0));
        assert_eq!(percentile(&[f32::NAN], 0.5), None);
    }

    #[test]
    fn test_ndvi_difference_for_four_bands() {
        // pixel 0 unchanged vegetation, pixel 1 vegetation -> bare
        let veg = [0.06f32, 0.09, 0.05, 0.35];
        let bare = [0.22f32, 0.21, 0.20, 0.26];
        let before: Vec<Vec<f32>> = (0..4).map(|b| vec![veg[b], veg[b]]).collect();
        let after: Vec<Vec<f32>> = (0..4).map(|b| vec![veg[b], bare[b]]).collect();
        let d = difference(&tensor(2, 1, &before, &after));
        assert_eq!(d[0], 0.0);
        let expected = (ndvi(0.22, 0.26) - ndvi(0.06, 0.35)).abs();
        assert!((d[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_mean_band_difference_for_sar() {
        let before = vec![vec![0.2, 0.2], vec![0.4, 0.4]];
        let after = vec![vec![0.2, 0.6], vec![0.4, 0.8]];
        let d = difference(&tensor(2, 1, &before, &after));
        assert_eq!(d[0], 0.0);
        assert!((d[1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_surface_is_deterministic_and_clipped() {
        let before = vec![vec![0.0; 20]];
        let after = vec![(0..20).map(|i| i as f32 / 20.0).collect::<Vec<_>>()];
        let t = tensor(5, 4, &before, &after);
        let s1 = difference_surface(&t, 0.95);
        let s2 = difference_surface(&t, 0.95);
        assert_eq!(s1, s2);
        assert!(s1.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(s1[19], 1.0);
        assert_eq!(s1[0], 0.0);
    }

    #[test]
    fn test_identical_images_yield_zero_surface() {
        let band = vec![vec![0.3; 9]];
        let s = difference_surface(&tensor(3, 3, &band, &band), 0.95);
        assert!(s.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_nodata_pixels_stay_nan_and_skip_the_percentile() {
        // 20 pixels of small noise, one pixel of real change, two nodata holes
        let before = vec![vec![0.30; 20]];
        let mut after: Vec<f32> = (0..20).map(|i| 0.30 + (i % 3) as f32 * 0.001).collect();
        after[7] = 0.80;
        let mut t = tensor(5, 4, &before, &[after]);
        t.valid[0] = false;
        t.valid[19] = false;
        // a zeroed nodata sample would otherwise read as a 0.30 change
        t.data[20] = 0.0;

        let d = difference(&t);
        assert!(d[0].is_nan() && d[19].is_nan());
        assert!(d[1].is_finite());

        let s = difference_surface(&t, 0.95);
        assert!(s[0].is_nan() && s[19].is_nan());
        assert_eq!(s[7], 1.0);
        assert!(s.iter().filter(|v| v.is_finite()).all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_flat_surface_keeps_nodata() {
        let band = vec![vec![0.3; 4]];
        let mut t = tensor(2, 2, &band, &band);
        t.valid[2] = false;
        let s = difference_surface(&t, 0.95);
        assert_eq!(s[0], 0.0);
        assert!(s[2].is_nan());
    }
}
