use crate::error::{Result, SegmentError};
use image::{GrayImage, RgbImage};

/// Per-pixel classification, one byte per pixel, same dimensions as the frame
///
/// Encoded as [`BACKGROUND`], [`SHADOW`] or [`FOREGROUND`].
pub type Mask = GrayImage;

pub const BACKGROUND: u8 = 0;
pub const SHADOW: u8 = 127;
pub const FOREGROUND: u8 = 255;

/// Outcome of classifying a single pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Background,
    Shadow,
    Foreground,
}

impl Label {
    pub fn encode(self) -> u8 {
        match self {
            Label::Background => BACKGROUND,
            Label::Shadow => SHADOW,
            Label::Foreground => FOREGROUND,
        }
    }
}

/// Trait for models that classify one frame at a time
///
/// The mixture model and the mean-image model both implement this; the
/// temporal-gradient model needs the whole sequence and does not.
pub trait SegmentationModel {
    /// Classify `frame`, returning a mask in the background/shadow/foreground encoding
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask>;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Drop any learned state
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless models
    }
}

/// Fail with [`SegmentError::DimensionMismatch`] unless `frame` is `expected` sized
pub fn check_dimensions(index: usize, expected: (u32, u32), frame: &RgbImage) -> Result<()> {
    let actual = frame.dimensions();
    if actual != expected {
        return Err(SegmentError::DimensionMismatch {
            index,
            expected,
            actual,
        });
    }
    Ok(())
}
