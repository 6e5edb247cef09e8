use anyhow::{Result, anyhow};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

use crate::platform::{Platform, resize_cover_for_platform};

/// Load image from bytes (supports PNG, JPEG, BMP, etc.)
pub fn load_image_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    let img = image::load_from_memory(bytes).map_err(|e| anyhow!("Image decode error: {}", e))?;
    Ok(img)
}

/// Decode any supported container straight to RGBA.
pub fn load_rgba_from_bytes(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(load_image_from_bytes(bytes)?.to_rgba8())
}

/// Save image to PNG bytes
pub fn save_image_to_bytes(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| anyhow!("Image encode error: {}", e))?;
    Ok(buf)
}

/// Encode to JPEG at the given quality. Alpha is dropped.
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(|e| anyhow!("JPEG encode error: {}", e))?;
    Ok(buf)
}

/// Mimics what a platform does to an upload: downscale to its maximum width,
/// then re-encode as JPEG at its quality and decode again.
pub fn simulate_channel(image: &RgbaImage, platform: Platform) -> Result<RgbaImage> {
    let resized = resize_cover_for_platform(image, platform);
    let jpeg = encode_jpeg(&resized, platform.recompress_quality())?;
    load_rgba_from_bytes(&jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_png_round_trip_is_lossless() {
        let image = RgbaImage::from_fn(8, 4, |x, y| Rgba([x as u8, y as u8, 7, 200]));
        let bytes = save_image_to_bytes(&DynamicImage::ImageRgba8(image.clone())).unwrap();
        assert_eq!(load_rgba_from_bytes(&bytes).unwrap(), image);
    }

    #[test]
    fn test_jpeg_round_trip_keeps_dimensions() {
        let image = RgbaImage::from_pixel(40, 24, Rgba([120, 100, 80, 255]));
        let bytes = encode_jpeg(&image, 80).unwrap();
        let decoded = load_rgba_from_bytes(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (40, 24));
        let p = decoded.get_pixel(20, 12);
        assert!((p[0] as i16 - 120).abs() <= 3);
    }

    #[test]
    fn test_simulate_channel_downscales() {
        let image = RgbaImage::from_pixel(2200, 1100, Rgba([60, 70, 80, 255]));
        let out = simulate_channel(&image, Platform::Instagram).unwrap();
        assert_eq!(out.dimensions(), (1080, 540));
    }

    #[test]
    fn test_garbage_bytes_fail_to_load() {
        assert!(load_image_from_bytes(b"not an image").is_err());
    }
}
