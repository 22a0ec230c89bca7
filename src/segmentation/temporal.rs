use super::types::{check_dimensions, Mask, BACKGROUND, FOREGROUND};
use crate::capture::FrameSource;
use crate::error::{Result, SegmentError};
use image::{Luma, RgbImage};
use ndarray::{Array4, ArrayViewMut1, Axis};

/// The whole sequence stacked along time
///
/// Shape is (frames, height, width, 3). This is width × height × frames × 3
/// bytes and is the single large allocation of a run.
pub struct Volume {
    data: Array4<u8>,
}

impl Volume {
    pub fn from_source<S: FrameSource + ?Sized>(source: &mut S) -> Result<Self> {
        let _span = tracing::debug_span!("load_volume").entered();
        let depth = source.frame_count();
        let (width, height) = source.resolution();
        tracing::info!(
            "Loading {}x{}x{} volume ({} MiB)",
            width,
            height,
            depth,
            (width as usize * height as usize * depth * 3) >> 20
        );

        let mut data = Array4::<u8>::zeros((depth, height as usize, width as usize, 3));
        for (index, mut slot) in data.axis_iter_mut(Axis(0)).enumerate() {
            let frame = source.read_frame(index)?;
            check_dimensions(index, (width, height), &frame)?;
            for (dst, &src) in slot.iter_mut().zip(frame.as_raw().iter()) {
                *dst = src;
            }
        }
        Ok(Self { data })
    }

    pub fn from_frames(frames: &[RgbImage]) -> Result<Self> {
        let (width, height) = frames.first().map_or((0, 0), |f| f.dimensions());
        let mut raw = Vec::with_capacity(frames.len() * width as usize * height as usize * 3);
        for (index, frame) in frames.iter().enumerate() {
            check_dimensions(index, (width, height), frame)?;
            raw.extend_from_slice(frame.as_raw());
        }
        let data = Array4::from_shape_vec(
            (frames.len(), height as usize, width as usize, 3),
            raw,
        )?;
        Ok(Self { data })
    }

    pub fn depth(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.data.shape()[2] as u32, self.data.shape()[1] as u32)
    }

    /// Copy frame `z` out of the volume
    pub fn frame(&self, z: usize) -> Option<RgbImage> {
        if z >= self.depth() {
            return None;
        }
        let (width, height) = self.resolution();
        let raw: Vec<u8> = self.data.index_axis(Axis(0), z).iter().copied().collect();
        RgbImage::from_raw(width, height, raw)
    }
}

/// Coefficients of the second-order Deriche recursive filter
#[derive(Debug, Clone, Copy)]
struct Deriche {
    a0: f32,
    a1: f32,
    a2: f32,
    a3: f32,
    b1: f32,
    b2: f32,
    coef_p: f32,
    coef_n: f32,
}

impl Deriche {
    fn second_order(sigma: f32) -> Self {
        let alpha = 1.695 / sigma.max(0.1);
        let ema = (-alpha).exp();
        let ema2 = (-2.0 * alpha).exp();
        let b1 = -2.0 * ema;
        let b2 = ema2;

        let k = (1.0 - ema2) / (2.0 * alpha * ema);
        let kn = -2.0 * (-1.0 + 3.0 * ema - 3.0 * ema * ema + ema * ema * ema)
            / (3.0 * ema + 1.0 + 3.0 * ema * ema + ema * ema * ema);
        let a0 = kn;
        let a1 = -kn * (1.0 + k * alpha) * ema;
        let a2 = kn * (1.0 - k * alpha) * ema;
        let a3 = -kn * ema2;

        Self {
            a0,
            a1,
            a2,
            a3,
            b1,
            b2,
            coef_p: (a0 + a1) / (1.0 + b1 + b2),
            coef_n: (a2 + a3) / (1.0 + b1 + b2),
        }
    }

    /// Causal plus anti-causal pass over one line, boundaries seeded with the edge value
    fn apply(&self, input: &[f32], mut output: ArrayViewMut1<f32>, causal: &mut Vec<f32>) {
        let n = input.len();
        if n == 0 {
            return;
        }
        causal.clear();

        let mut xp = input[0];
        let mut yp = self.coef_p * xp;
        let mut yb = yp;
        for &xc in input.iter() {
            let yc = self.a0 * xc + self.a1 * xp - self.b1 * yp - self.b2 * yb;
            causal.push(yc);
            xp = xc;
            yb = yp;
            yp = yc;
        }

        let mut xn = input[n - 1];
        let mut xa = xn;
        let mut yn = self.coef_n * xn;
        let mut ya = yn;
        for i in (0..n).rev() {
            let xc = input[i];
            let yc = self.a2 * xn + self.a3 * xa - self.b1 * yn - self.b2 * ya;
            xa = xn;
            xn = xc;
            ya = yn;
            yn = yc;
            output[i] = causal[i] + yc;
        }
    }
}

/// Flags pixels whose value bends sharply over time
///
/// A second-derivative-of-Gaussian along the time axis responds to short
/// events and stays near zero for static or linearly drifting pixels. Fails
/// on flickering backgrounds and on motion slow relative to `sigma`.
#[derive(Debug, Clone)]
pub struct TemporalGradientModel {
    sigma: f32,
    threshold: f32,
    cleanup: bool,
}

impl TemporalGradientModel {
    pub fn new(sigma: f32, threshold: f32, cleanup: bool) -> Result<Self> {
        if !(sigma > 0.0) || !sigma.is_finite() {
            return Err(SegmentError::invalid_parameter(
                "sigma",
                format!("{} must be positive", sigma),
            ));
        }
        if !(threshold >= 0.0) || !threshold.is_finite() {
            return Err(SegmentError::invalid_parameter(
                "temporal_threshold",
                format!("{} must be a non-negative number", threshold),
            ));
        }
        Ok(Self {
            sigma,
            threshold,
            cleanup,
        })
    }

    /// Filtered response magnitude, same shape as the volume
    pub fn response(&self, volume: &Volume) -> Array4<f32> {
        let _span = tracing::debug_span!("deriche", sigma = self.sigma).entered();
        let mut output = Array4::<f32>::zeros(volume.data.raw_dim());
        let filter = Deriche::second_order(self.sigma);
        let mut line = Vec::with_capacity(volume.depth());
        let mut causal = Vec::with_capacity(volume.depth());

        for (src, out) in volume
            .data
            .lanes(Axis(0))
            .into_iter()
            .zip(output.lanes_mut(Axis(0)))
        {
            line.clear();
            line.extend(src.iter().map(|&v| v as f32));
            filter.apply(&line, out, &mut causal);
        }
        output.mapv_inplace(f32::abs);

        if self.cleanup {
            let _span = tracing::debug_span!("volume_open").entered();
            for axis in 0..3 {
                extremum_along(&mut output, Axis(axis), f32::min);
            }
            for axis in 0..3 {
                extremum_along(&mut output, Axis(axis), f32::max);
            }
        }
        output
    }

    /// One mask per frame: foreground where any channel's response reaches the threshold
    pub fn segment_volume(&self, volume: &Volume) -> Vec<Mask> {
        let response = self.response(volume);
        let (width, height) = volume.resolution();
        let masks: Vec<Mask> = response
            .axis_iter(Axis(0))
            .map(|frame| {
                Mask::from_fn(width, height, |x, y| {
                    let (x, y) = (x as usize, y as usize);
                    let active = (0..3).any(|c| frame[[y, x, c]] >= self.threshold);
                    Luma([if active { FOREGROUND } else { BACKGROUND }])
                })
            })
            .collect();

        tracing::debug!(
            "Temporal gradient flagged {} voxels",
            masks
                .iter()
                .map(|m| m.pixels().filter(|p| p[0] == FOREGROUND).count())
                .sum::<usize>()
        );
        masks
    }
}

/// 3-wide running min or max along `axis`, window clipped at the borders
fn extremum_along(volume: &mut Array4<f32>, axis: Axis, op: fn(f32, f32) -> f32) {
    let mut line = Vec::with_capacity(volume.len_of(axis));
    for mut lane in volume.lanes_mut(axis) {
        line.clear();
        line.extend(lane.iter().copied());
        let n = line.len();
        for (i, dst) in lane.iter_mut().enumerate() {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(n - 1);
            *dst = line[lo..=hi].iter().copied().fold(line[i], op);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frames_with_flash(count: usize, flash_at: usize) -> Vec<RgbImage> {
        (0..count)
            .map(|z| {
                let mut frame = RgbImage::from_pixel(6, 5, Rgb([60, 80, 100]));
                if z == flash_at {
                    frame.put_pixel(3, 2, Rgb([255, 255, 255]));
                }
                frame
            })
            .collect()
    }

    #[test]
    fn test_static_sequence_has_no_foreground() {
        let frames: Vec<RgbImage> = (0..12)
            .map(|_| RgbImage::from_fn(6, 5, |x, y| Rgb([x as u8 * 40, y as u8 * 50, 255])))
            .collect();
        let volume = Volume::from_frames(&frames).unwrap();

        for cleanup in [false, true] {
            let model = TemporalGradientModel::new(5.0, 10.0, cleanup).unwrap();
            let masks = model.segment_volume(&volume);
            assert_eq!(masks.len(), 12);
            assert!(masks.iter().all(|m| m.pixels().all(|p| p[0] == BACKGROUND)));
        }
    }

    #[test]
    fn test_flash_is_foreground() {
        let frames = frames_with_flash(15, 7);
        let volume = Volume::from_frames(&frames).unwrap();
        let model = TemporalGradientModel::new(1.0, 10.0, false).unwrap();
        let masks = model.segment_volume(&volume);

        assert_eq!(masks[7].get_pixel(3, 2)[0], FOREGROUND);
        assert_eq!(masks[7].get_pixel(0, 0)[0], BACKGROUND);
        assert!(masks[0].pixels().all(|p| p[0] == BACKGROUND));
    }

    #[test]
    fn test_response_of_constant_line_vanishes() {
        let filter = Deriche::second_order(5.0);
        let input = vec![200.0_f32; 20];
        let mut output = ndarray::Array1::<f32>::zeros(20);
        let mut causal = Vec::new();
        filter.apply(&input, output.view_mut(), &mut causal);
        assert!(output.iter().all(|v| v.abs() < 1e-2), "{:?}", output);
    }

    #[test]
    fn test_cleanup_removes_isolated_voxel() {
        let frames = frames_with_flash(15, 7);
        let volume = Volume::from_frames(&frames).unwrap();
        let model = TemporalGradientModel::new(1.0, 10.0, true).unwrap();
        let masks = model.segment_volume(&volume);
        assert!(masks.iter().all(|m| m.pixels().all(|p| p[0] == BACKGROUND)));
    }

    #[test]
    fn test_extremum_along_matches_windowed_reference() {
        let mut volume = Array4::<f32>::from_shape_fn((4, 3, 5, 3), |(z, y, x, c)| {
            ((z * 7 + y * 13 + x * 5 + c * 11) % 17) as f32
        });
        let original = volume.clone();
        extremum_along(&mut volume, Axis(2), f32::min);

        for ((z, y, x, c), &v) in volume.indexed_iter() {
            let lo = x.saturating_sub(1);
            let hi = (x + 1).min(4);
            let expected = (lo..=hi)
                .map(|j| original[[z, y, j, c]])
                .fold(f32::INFINITY, f32::min);
            assert_eq!(v, expected, "at {:?}", (z, y, x, c));
        }
    }

    #[test]
    fn test_volume_round_trip_and_mismatch() {
        let frames = frames_with_flash(3, 1);
        let volume = Volume::from_frames(&frames).unwrap();
        assert_eq!(volume.depth(), 3);
        assert_eq!(volume.resolution(), (6, 5));
        assert_eq!(volume.frame(1).unwrap(), frames[1]);
        assert!(volume.frame(3).is_none());

        let bad = vec![frames[0].clone(), RgbImage::new(2, 2)];
        assert!(matches!(
            Volume::from_frames(&bad),
            Err(SegmentError::DimensionMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(TemporalGradientModel::new(0.0, 10.0, false).is_err());
        assert!(TemporalGradientModel::new(5.0, -1.0, false).is_err());
    }
}
