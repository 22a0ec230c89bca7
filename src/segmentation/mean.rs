use super::types::{check_dimensions, Mask, SegmentationModel, BACKGROUND, FOREGROUND};
use crate::capture::FrameSource;
use crate::error::{Result, SegmentError};
use image::{Luma, Rgb, RgbImage};
use ndarray::{Array3, ArrayView3, Zip};

/// Luminance weights applied to the per-channel absolute difference
const LUMA: [f64; 3] = [0.299, 0.587, 0.114];

/// Global mean-image background subtraction
///
/// The whole sequence is averaged once; every frame is then compared against
/// that single estimate. There is no adaptation, so any background element
/// that changes for more than a few frames ends up in the mean.
pub struct MeanImageModel {
    mean: Array3<f64>,
    threshold: f32,
    frames_segmented: usize,
}

impl MeanImageModel {
    /// First pass over `source`: accumulate every frame and divide by the count
    pub fn from_source<S: FrameSource + ?Sized>(source: &mut S, threshold: f32) -> Result<Self> {
        let _span = tracing::debug_span!("mean_image").entered();
        let count = source.frame_count();
        if count == 0 {
            return Err(SegmentError::FrameCountUnknown {
                path: "<empty source>".into(),
            });
        }

        let (width, height) = source.resolution();
        let mut sum = Array3::<f64>::zeros((height as usize, width as usize, 3));
        for index in 0..count {
            let frame = source.read_frame(index)?;
            check_dimensions(index, (width, height), &frame)?;
            Zip::from(&mut sum)
                .and(&frame_view(&frame)?)
                .for_each(|s, &v| *s += v as f64);
        }
        sum /= count as f64;
        tracing::info!("Mean image computed over {} frames", count);

        Self::from_mean(sum, threshold)
    }

    /// Build from an already computed mean of shape (height, width, 3)
    pub fn from_mean(mean: Array3<f64>, threshold: f32) -> Result<Self> {
        if !(threshold >= 0.0) || !threshold.is_finite() {
            return Err(SegmentError::invalid_parameter(
                "mean_threshold",
                format!("{} must be a non-negative number", threshold),
            ));
        }
        if mean.shape()[2] != 3 {
            return Err(SegmentError::invalid_parameter(
                "mean",
                format!("expected 3 channels, got {}", mean.shape()[2]),
            ));
        }
        Ok(Self {
            mean,
            threshold,
            frames_segmented: 0,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        let shape = self.mean.shape();
        (shape[1] as u32, shape[0] as u32)
    }

    /// The background estimate rounded to 8 bits
    pub fn mean_image(&self) -> RgbImage {
        let (width, height) = self.resolution();
        RgbImage::from_fn(width, height, |x, y| {
            let (x, y) = (x as usize, y as usize);
            Rgb([0, 1, 2].map(|c| self.mean[[y, x, c]].round().clamp(0.0, 255.0) as u8))
        })
    }

    pub fn mean(&self) -> &Array3<f64> {
        &self.mean
    }
}

impl SegmentationModel for MeanImageModel {
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask> {
        let _span = tracing::debug_span!("mean_segment", frame = self.frames_segmented).entered();
        check_dimensions(self.frames_segmented, self.resolution(), frame)?;
        self.frames_segmented += 1;

        let threshold = self.threshold as f64;
        let mean = &self.mean;
        let mask = Mask::from_fn(frame.width(), frame.height(), |x, y| {
            let pixel = frame.get_pixel(x, y);
            let (x, y) = (x as usize, y as usize);
            let gray: f64 = (0..3)
                .map(|c| LUMA[c] * (pixel[c] as f64 - mean[[y, x, c]]).abs())
                .sum();
            Luma([if gray > threshold { FOREGROUND } else { BACKGROUND }])
        });
        Ok(mask)
    }

    fn name(&self) -> &'static str {
        "mean"
    }
}

fn frame_view(frame: &RgbImage) -> Result<ArrayView3<'_, u8>> {
    let (width, height) = frame.dimensions();
    Ok(ArrayView3::from_shape(
        (height as usize, width as usize, 3),
        frame.as_raw().as_slice(),
    )?)
}
