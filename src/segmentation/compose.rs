use super::types::{Mask, BACKGROUND, FOREGROUND, SHADOW};
use image::{Luma, Rgb, RgbImage};

/// Drop shadow pixels, leaving a plain foreground/background mask
pub fn foreground_only(mask: &Mask) -> Mask {
    let mut out = mask.clone();
    for p in out.pixels_mut() {
        if p[0] != FOREGROUND {
            *p = Luma([BACKGROUND]);
        }
    }
    out
}

/// Keep frame pixels under foreground, zero everything else
pub fn apply_mask(frame: &RgbImage, mask: &Mask) -> RgbImage {
    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        if mask.get_pixel(x, y)[0] == FOREGROUND {
            *frame.get_pixel(x, y)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// Render a mask for inspection: foreground white, shadow grey, background black
pub fn mask_to_rgb(mask: &Mask) -> RgbImage {
    RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        let value = match mask.get_pixel(x, y)[0] {
            BACKGROUND => BACKGROUND,
            SHADOW => SHADOW,
            _ => FOREGROUND,
        };
        Rgb([value, value, value])
    })
}
