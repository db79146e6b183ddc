use image::{Rgb, RgbImage, Rgba};

/// Semi-transparent green used for predicted road pixels.
pub const ROAD_OVERLAY: Rgba<u8> = Rgba([0, 255, 0, 127]);

/// Alpha-blend `color` over `base` wherever `mask` is set.
///
/// `mask` is row-major and must cover every pixel of `base`.
pub fn overlay_mask(base: &RgbImage, mask: &[bool], color: Rgba<u8>) -> Option<RgbImage> {
    let (w, h) = base.dimensions();
    if mask.len() != (w * h) as usize {
        return None;
    }
    let mut out = base.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if mask[(y * w + x) as usize] {
            *pixel = blend(*pixel, color);
        }
    }
    Some(out)
}

/// Paste-with-alpha: `dst * (1 - a) + src * a`, rounded to nearest.
pub fn blend(dst: Rgb<u8>, src: Rgba<u8>) -> Rgb<u8> {
    let a = src[3] as u32;
    let inv = 255 - a;
    let mix = |d: u8, s: u8| -> u8 { ((d as u32 * inv + s as u32 * a + 127) / 255) as u8 };
    Rgb([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2])])
}
