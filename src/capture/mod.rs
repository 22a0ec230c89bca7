mod frame_buffer;
mod image_sequence;

pub use frame_buffer::FrameBuffer;
pub use image_sequence::ImageSequence;

use crate::error::Result;
use image::RgbImage;

/// A finite, ordered, randomly-seekable sequence of decoded colour frames
pub trait FrameSource {
    /// Number of frames, known before the first read
    fn frame_count(&self) -> usize;

    /// Resolution every frame is expected to have
    ///
    /// Returns (width, height)
    fn resolution(&self) -> (u32, u32);

    /// Read the frame at `index` (0-based)
    fn read_frame(&mut self, index: usize) -> Result<RgbImage>;
}
