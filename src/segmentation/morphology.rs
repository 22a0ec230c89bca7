use super::types::Mask;
use imageproc::distance_transform::Norm;
use imageproc::morphology;

/// Morphological open (erode then dilate) of a binary mask
///
/// The neighbourhood is the L1 ball of `radius`, which for radius 1 is the
/// 3×3 ellipse (a cross). Non-zero pixels are foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskPostprocessor {
    radius: u8,
}

impl Default for MaskPostprocessor {
    fn default() -> Self {
        Self { radius: 1 }
    }
}

impl MaskPostprocessor {
    pub fn new(radius: u8) -> Self {
        Self { radius }
    }

    pub fn radius(&self) -> u8 {
        self.radius
    }

    pub fn open(&self, mask: &Mask) -> Mask {
        let _span = tracing::debug_span!("mask_open", radius = self.radius).entered();
        if self.radius == 0 {
            return mask.clone();
        }
        morphology::open(mask, Norm::L1, self.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::types::{BACKGROUND, FOREGROUND};
    use image::Luma;

    fn block_mask() -> Mask {
        let mut mask = Mask::new(12, 10);
        for y in 2..7 {
            for x in 2..7 {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
        mask.put_pixel(10, 8, Luma([FOREGROUND]));
        mask
    }

    #[test]
    fn test_removes_speckle_keeps_blob() {
        let opened = MaskPostprocessor::default().open(&block_mask());

        assert_eq!(opened.get_pixel(10, 8)[0], BACKGROUND);
        assert_eq!(opened.get_pixel(4, 4)[0], FOREGROUND);
        assert_eq!(opened.get_pixel(2, 4)[0], FOREGROUND);
        // Corners of a square are not covered by any cross inside it
        assert_eq!(opened.get_pixel(2, 2)[0], BACKGROUND);
    }

    #[test]
    fn test_open_is_idempotent() {
        let post = MaskPostprocessor::new(1);
        let once = post.open(&block_mask());
        assert_eq!(post.open(&once), once);

        let post = MaskPostprocessor::new(2);
        let once = post.open(&block_mask());
        assert_eq!(post.open(&once), once);
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let mask = block_mask();
        assert_eq!(MaskPostprocessor::new(0).open(&mask), mask);
    }

    #[test]
    fn test_empty_mask_stays_empty() {
        let mask = Mask::new(5, 5);
        assert_eq!(MaskPostprocessor::default().open(&mask), mask);
    }
}
