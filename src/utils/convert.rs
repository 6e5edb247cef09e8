use image::{Rgba, RgbaImage};

use crate::dct::BLOCK_SIZE;

/// Samples per pixel in the YCbCr working buffer.
pub const YCBCR_CHANNELS: usize = 3;

// YCbCr formulas per ITU-R BT.601, full range as used by JFIF:
// Y  =  0.299·R + 0.587·G + 0.114·B
// Cb = -0.168736·R - 0.331264·G + 0.5·B + 128
// Cr =  0.5·R - 0.418688·G - 0.081312·B + 128

fn to_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

pub fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = -0.168736 * r - 0.331264 * g + 0.5 * b + 128.0;
    let cr = 0.5 * r - 0.418688 * g - 0.081312 * b + 128.0;
    [to_u8(y), to_u8(cb), to_u8(cr)]
}

/// Convert YCbCr pixel to RGB pixel (clamping output to 0..255)
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = y as f64;
    let cb = cb as f64 - 128.0;
    let cr = cr as f64 - 128.0;
    [
        to_u8(y + 1.402 * cr),
        to_u8(y - 0.344136 * cb - 0.714136 * cr),
        to_u8(y + 1.772 * cb),
    ]
}

/// Builds an interleaved Y, Cb, Cr working buffer from an RGBA image.
/// Alpha is ignored.
pub fn rgba_to_ycbcr_buffer(image: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.width() as usize * image.height() as usize * 3);
    for pixel in image.pixels() {
        out.extend_from_slice(&rgb_to_ycbcr(pixel[0], pixel[1], pixel[2]));
    }
    out
}

/// Extracts only the luma plane.
pub fn extract_luminance(image: &RgbaImage) -> Vec<u8> {
    image
        .pixels()
        .map(|p| rgb_to_ycbcr(p[0], p[1], p[2])[0])
        .collect()
}

/// Writes the given 8x8 blocks of a YCbCr working buffer back into `image`
/// as RGB, keeping each pixel's original alpha. Pixels outside the listed
/// blocks are left exactly as they were.
pub fn merge_blocks_back(image: &mut RgbaImage, ycbcr: &[u8], blocks: &[(usize, usize)]) {
    let width = image.width() as usize;
    for &(block_row, block_col) in blocks {
        for r in 0..BLOCK_SIZE {
            for c in 0..BLOCK_SIZE {
                let x = block_col * BLOCK_SIZE + c;
                let y = block_row * BLOCK_SIZE + r;
                let base = (y * width + x) * YCBCR_CHANNELS;
                let [red, green, blue] = ycbcr_to_rgb(ycbcr[base], ycbcr[base + 1], ycbcr[base + 2]);
                let alpha = image.get_pixel(x as u32, y as u32)[3];
                image.put_pixel(x as u32, y as u32, Rgba([red, green, blue, alpha]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grey_is_pure_luma() {
        assert_eq!(rgb_to_ycbcr(77, 77, 77), [77, 128, 128]);
        assert_eq!(ycbcr_to_rgb(77, 128, 128), [77, 77, 77]);
    }

    #[test]
    fn test_primary_colours() {
        assert_eq!(rgb_to_ycbcr(255, 0, 0), [76, 85, 255]);
        assert_eq!(rgb_to_ycbcr(0, 0, 255), [29, 255, 107]);
    }

    #[test]
    fn test_round_trip_is_close() {
        for (r, g, b) in [(10u8, 200u8, 90u8), (128, 64, 32), (240, 230, 220)] {
            let [y, cb, cr] = rgb_to_ycbcr(r, g, b);
            let back = ycbcr_to_rgb(y, cb, cr);
            for (orig, got) in [r, g, b].iter().zip(back.iter()) {
                assert!((*orig as i16 - *got as i16).abs() <= 2, "{r},{g},{b} -> {back:?}");
            }
        }
    }

    #[test]
    fn test_merge_only_touches_listed_blocks() {
        let mut image = RgbaImage::from_pixel(16, 16, Rgba([100, 120, 140, 200]));
        let mut ycbcr = rgba_to_ycbcr_buffer(&image);
        for v in ycbcr.iter_mut().step_by(3) {
            *v = 50;
        }
        merge_blocks_back(&mut image, &ycbcr, &[(1, 0)]);

        assert_eq!(image.get_pixel(0, 0), &Rgba([100, 120, 140, 200]));
        let changed = image.get_pixel(3, 12);
        assert_eq!(changed[3], 200);
        assert_eq!(extract_luminance(&image)[12 * 16 + 3], 50);
    }
}
