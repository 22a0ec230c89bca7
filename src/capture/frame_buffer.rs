use super::FrameSource;
use crate::error::{Result, SegmentError};
use image::RgbImage;

/// Frames already held in memory
pub struct FrameBuffer {
    frames: Vec<RgbImage>,
}

impl FrameBuffer {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self { frames }
    }
}

impl FrameSource for FrameBuffer {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn resolution(&self) -> (u32, u32) {
        self.frames.first().map_or((0, 0), |f| f.dimensions())
    }

    fn read_frame(&mut self, index: usize) -> Result<RgbImage> {
        self.frames.get(index).cloned().ok_or_else(|| {
            SegmentError::source_unavailable(
                "<memory>",
                format!("frame {} out of range ({} frames)", index, self.frames.len()),
            )
        })
    }
}
