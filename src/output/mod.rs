mod image_directory;

pub use image_directory::ImageDirectory;

use crate::error::Result;
use image::RgbImage;

/// Trait for output destinations
pub trait OutputSink {
    /// Persist the output frame for sequence position `index`
    fn write_frame(&mut self, index: usize, frame: &RgbImage) -> Result<()>;
}
