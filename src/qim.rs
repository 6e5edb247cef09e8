//! Quantization index modulation in the luma DCT domain.
//!
//! Each full 8x8 luma block carries one bit. Block `b` (row-major over the
//! block grid) uses the AC coefficient at zigzag index `AC_ORDER[b % 6]`; the
//! coefficient is snapped to a multiple of its step whose index parity equals
//! the bit. Steps are twice the quality-50 luminance table, so the bins outlive
//! a platform re-encode at any quality of 50 or above. Blocks close to black
//! or white are compressed toward their mean first so the shift is not
//! clipped away.

use image::RgbaImage;
use log::{debug, warn};

use crate::Embedded;
use crate::dct::{self, BLOCK_AREA, BLOCK_SIZE, Block, PlaneLayout};
use crate::error::{Result, StegError};
use crate::platform::{Platform, resize_cover_for_platform};
use crate::utils::convert::{
    YCBCR_CHANNELS, extract_luminance, merge_blocks_back, rgba_to_ycbcr_buffer,
};
use crate::utils::transport::{self, SlotReader, SoftBit, TransportParams};

// --- Constants ---
/// Reed-Solomon parity bytes per body codeword.
pub const NSYM: usize = 64;

/// Blocks per transported bit.
pub const REPEAT: usize = 3;

/// Average bit margin below which a byte is treated as an erasure.
pub const ERASURE_MARGIN: f64 = 0.08;

/// Zigzag indices cycled through block by block.
pub const AC_ORDER: [usize; 6] = [3, 4, 5, 6, 7, 8];

/// Quality class whose luminance table sets the QIM bins.
const STEP_QUALITY: u8 = 50;

/// Multiplier applied to the quality-50 table entry to get the QIM step.
const STEP_SCALE: u16 = 2;

pub const PARAMS: TransportParams = TransportParams {
    nsym: NSYM,
    repeat: REPEAT,
    erasure_margin: ERASURE_MARGIN,
};

/// Per-coefficient QIM steps in natural order.
pub type StepTable = [u16; BLOCK_AREA];

/// The quality-50 luminance table, every entry scaled by the step multiplier.
pub fn step_table() -> Result<StepTable> {
    let mut table = dct::quantization_table(STEP_QUALITY)?;
    for entry in table.iter_mut() {
        *entry *= STEP_SCALE;
    }
    Ok(table)
}

/// Natural index of the coefficient modulated by block number `slot`.
fn coefficient_for(slot: usize) -> usize {
    dct::ZIGZAG_TO_NATURAL[AC_ORDER[slot % AC_ORDER.len()]]
}

fn block_position(slot: usize, blocks_wide: usize) -> (usize, usize) {
    (slot / blocks_wide, slot % blocks_wide)
}

/// Distance from the 0/255 rails a block needs so that moving one AC
/// coefficient by up to `step` never clips. An AC basis function peaks at a
/// quarter of its coefficient.
fn headroom(step: f64) -> f64 {
    (step / 4.0).ceil() + 1.0
}

/// Compresses a level-shifted block around its mean until every sample lies
/// within `room` of the rails. Blocks already inside are left alone.
fn ensure_headroom(block: &mut Block, room: f64) {
    let (lo, hi) = (-128.0 + room, 127.0 - room);
    let (min, max) = block
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(mn, mx), &v| (mn.min(v), mx.max(v)));
    if min >= lo && max <= hi {
        return;
    }

    let mean = block.iter().sum::<f64>() / BLOCK_AREA as f64;
    let centre = mean.clamp(lo, hi);
    let mut scale: f64 = 1.0;
    if max > mean {
        scale = scale.min((hi - centre) / (max - mean));
    }
    if min < mean {
        scale = scale.min((centre - lo) / (mean - min));
    }
    for v in block.iter_mut() {
        *v = centre + scale * (*v - mean);
    }
}

/// Number of bit slots (full 8x8 blocks) in a `width` x `height` image.
pub fn slot_count(width: u32, height: u32) -> usize {
    (width as usize / BLOCK_SIZE) * (height as usize / BLOCK_SIZE)
}

/// Largest frame, in bytes, a `width` x `height` carrier holds.
pub fn frame_capacity(width: u32, height: u32) -> usize {
    PARAMS.max_frame_len(slot_count(width, height))
}

/// Largest frame the cover holds after the platform's pre-resize.
pub fn capacity(cover: &RgbaImage, platform: Platform) -> usize {
    let (width, height) = platform.target_dimensions(cover.width(), cover.height());
    frame_capacity(width, height)
}

/// Embeds a single bit into one 8x8 block of a plane.
///
/// The block is first pulled away from the 0/255 rails if needed, then
/// transformed. The selected coefficient is moved to the nearest multiple of
/// its step whose index parity equals `bit`, and the block is transformed back
/// and written in place.
///
/// # Arguments
/// * `pixels` - Interleaved 8-bit buffer described by `layout`
/// * `block_coords` - (row, col) of the block, in block units
/// * `natural_index` - Coefficient to modulate, row-major
/// * `steps` - QIM step table, see [`step_table`]
/// * `bit` - The value to embed
///
/// # Returns
/// * `Ok(())` on successful embedding
/// * `Err(StegError::Domain)` if block coordinates are out of bounds
pub fn embed_bit_in_block(
    pixels: &mut [u8],
    layout: &PlaneLayout,
    block_coords: (usize, usize),
    natural_index: usize,
    steps: &StepTable,
    bit: bool,
) -> Result<()> {
    let (block_row, block_col) = block_coords;
    let step = steps[natural_index] as f64;

    // Step 1: make room so the modulation survives the clamp on write.
    let mut block = dct::extract_block(pixels, layout, block_row, block_col)?;
    ensure_headroom(&mut block, headroom(step));

    // Step 2: pixels to frequency domain.
    let mut coeffs = dct::forward_dct(&block);

    // Step 3: snap to the nearest bin of the right parity.
    let mut indices = dct::quantize(&coeffs, steps);
    let index = indices[natural_index];
    if (index.rem_euclid(2) == 1) != bit {
        let ratio = coeffs[natural_index] / step;
        indices[natural_index] += if ratio >= index as f64 { 1 } else { -1 };
    }
    coeffs[natural_index] = dct::dequantize(&indices, steps)[natural_index];

    // Step 4: back to pixels.
    dct::write_block(pixels, layout, block_row, block_col, &dct::inverse_dct(&coeffs))
}

/// Reads the bit held by one block, with its distance from the bin edge.
pub fn extract_bit_from_block(
    pixels: &[u8],
    layout: &PlaneLayout,
    block_coords: (usize, usize),
    natural_index: usize,
    steps: &StepTable,
) -> Result<SoftBit> {
    let (block_row, block_col) = block_coords;
    let coeffs = dct::forward_dct(&dct::extract_block(pixels, layout, block_row, block_col)?);

    let index = dct::quantize(&coeffs, steps)[natural_index];
    let ratio = coeffs[natural_index] / steps[natural_index] as f64;
    Ok(SoftBit {
        bit: index.rem_euclid(2) == 1,
        margin: 0.5 - (ratio - index as f64).abs(),
    })
}

/// Lazily decodes blocks of a luma plane as transport slots.
struct LumaReader {
    luma: Vec<u8>,
    layout: PlaneLayout,
    steps: StepTable,
}

impl LumaReader {
    fn new(image: &RgbaImage) -> Result<Self> {
        Ok(LumaReader {
            luma: extract_luminance(image),
            layout: PlaneLayout {
                width: image.width() as usize,
                height: image.height() as usize,
                channels: 1,
                channel: 0,
            },
            steps: step_table()?,
        })
    }
}

impl SlotReader for LumaReader {
    fn slot_count(&self) -> usize {
        self.layout.blocks_wide() * self.layout.blocks_tall()
    }

    fn read_slot(&mut self, slot: usize) -> Result<SoftBit> {
        let natural = coefficient_for(slot);
        let position = block_position(slot, self.layout.blocks_wide());
        extract_bit_from_block(&self.luma, &self.layout, position, natural, &self.steps)
    }
}

/// Public entry point to embed a frame with QIM.
///
/// The cover is first resized for `platform`; the returned image has the
/// resized dimensions. Only the blocks that carry bits are rewritten.
pub fn embed(cover: &RgbaImage, frame: &[u8], platform: Platform) -> Result<Embedded> {
    // 1. Check capacity against the post-resize geometry.
    let available = capacity(cover, platform);
    if frame.len() > available {
        return Err(StegError::CapacityExceeded {
            needed: frame.len(),
            available,
        });
    }

    // 2. Resize and build the YCbCr working buffer.
    let mut image = resize_cover_for_platform(cover, platform);
    let mut working = rgba_to_ycbcr_buffer(&image);
    let layout = PlaneLayout {
        width: image.width() as usize,
        height: image.height() as usize,
        channels: YCBCR_CHANNELS,
        channel: 0,
    };

    // 3. One bit per block in traversal order.
    let steps = step_table()?;
    let slots = transport::prepare_packet(frame, &PARAMS)?;
    let mut touched = Vec::with_capacity(slots.len());
    for (slot, &bit) in slots.iter().enumerate() {
        let position = block_position(slot, layout.blocks_wide());
        embed_bit_in_block(&mut working, &layout, position, coefficient_for(slot), &steps, bit)?;
        touched.push(position);
    }
    merge_blocks_back(&mut image, &working, &touched);
    debug!(
        "qim: {} of {} blocks carry a {}-byte frame",
        slots.len(),
        slot_count(image.width(), image.height()),
        frame.len()
    );

    // 4. Self-test on the finished image.
    let verified = extract(&image).is_ok_and(|decoded| decoded == frame);
    if !verified {
        warn!(
            "qim self-test failed for {}x{} cover; payload may not survive",
            image.width(),
            image.height()
        );
    }

    Ok(Embedded { image, verified })
}

/// Public entry point to extract a QIM frame.
pub fn extract(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut reader = LumaReader::new(image)?;
    transport::decode_packet(&mut reader, &PARAMS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    // Smooth mid-tone pattern with mild texture, far from clipping.
    fn create_cover(width: u32, height: u32, seed: u64) -> RgbaImage {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        RgbaImage::from_fn(width, height, |x, y| {
            let base = 96.0 + 40.0 * ((x as f64 / 37.0).sin() + (y as f64 / 23.0).cos()) / 2.0;
            let noise: f64 = rng.random_range(-6.0..6.0);
            let v = (base + noise) as u8;
            Rgba([v, v.saturating_add(10), v.saturating_sub(12), 255])
        })
    }

    #[test]
    fn test_coefficients_stay_in_embeddable_band() {
        let steps = step_table().unwrap();
        for slot in 0..AC_ORDER.len() {
            let natural = coefficient_for(slot);
            let zigzag = dct::ZIGZAG_TO_NATURAL
                .iter()
                .position(|&n| n == natural)
                .unwrap();
            assert!(dct::EMBEDDABLE_AC.contains(&zigzag));
            assert!(steps[natural] >= 20);
        }
    }

    #[test]
    fn test_step_uses_quality_50_table() {
        let table = dct::quantization_table(50).unwrap();
        let steps = step_table().unwrap();
        for (step, entry) in steps.iter().zip(table.iter()) {
            assert_eq!(*step, 2 * entry);
        }
    }

    #[test]
    fn test_embed_and_extract_bit_roundtrip() {
        let cover = create_cover(32, 32, 1);
        let mut working = rgba_to_ycbcr_buffer(&cover);
        let layout = PlaneLayout {
            width: 32,
            height: 32,
            channels: 3,
            channel: 0,
        };
        let steps = step_table().unwrap();
        let natural = coefficient_for(2);

        for bit in [true, false] {
            embed_bit_in_block(&mut working, &layout, (1, 2), natural, &steps, bit).unwrap();
            let soft = extract_bit_from_block(&working, &layout, (1, 2), natural, &steps).unwrap();
            assert_eq!(soft.bit, bit);
            assert!(soft.margin > 0.4, "margin {}", soft.margin);
        }
    }

    #[test]
    fn test_bits_survive_on_saturated_blocks() {
        let layout = PlaneLayout {
            width: 8,
            height: 8,
            channels: 1,
            channel: 0,
        };
        let steps = step_table().unwrap();
        for fill in [0u8, 3, 250, 255] {
            for slot in 0..AC_ORDER.len() {
                let natural = coefficient_for(slot);
                for bit in [true, false] {
                    let mut pixels = vec![fill; 64];
                    embed_bit_in_block(&mut pixels, &layout, (0, 0), natural, &steps, bit).unwrap();
                    let soft = extract_bit_from_block(&pixels, &layout, (0, 0), natural, &steps)
                        .unwrap();
                    assert_eq!(soft.bit, bit, "fill={fill} slot={slot}");
                    assert!(soft.margin > 0.3, "fill={fill} slot={slot} margin {}", soft.margin);
                }
            }
        }
    }

    #[test]
    fn test_headroom_only_touches_blocks_near_the_rails() {
        let mut mid = [0.0; BLOCK_AREA];
        for (i, v) in mid.iter_mut().enumerate() {
            *v = i as f64 - 32.0;
        }
        let before = mid;
        ensure_headroom(&mut mid, 9.0);
        assert_eq!(mid, before);

        let mut ramp = [0.0; BLOCK_AREA];
        for (i, v) in ramp.iter_mut().enumerate() {
            *v = -128.0 + 4.0 * i as f64;
        }
        ensure_headroom(&mut ramp, 9.0);
        assert!(ramp.iter().all(|&v| (-119.0 - 1e-9..=118.0 + 1e-9).contains(&v)));
        // Affine: ordering is preserved.
        assert!(ramp.windows(2).all(|w| w[0] < w[1]));

        let mut white = [127.0; BLOCK_AREA];
        ensure_headroom(&mut white, 9.0);
        assert!(white.iter().all(|&v| (v - 118.0).abs() < 1e-9));
    }

    #[test]
    fn test_block_bounds_checking() {
        let mut pixels = vec![128u8; 16 * 16];
        let layout = PlaneLayout {
            width: 16,
            height: 16,
            channels: 1,
            channel: 0,
        };
        let steps = step_table().unwrap();
        assert!(embed_bit_in_block(&mut pixels, &layout, (2, 0), 1, &steps, true).is_err());
        assert!(extract_bit_from_block(&pixels, &layout, (0, 2), 1, &steps).is_err());
    }

    #[test]
    fn test_capacity_accounts_for_resize() {
        let big = RgbaImage::new(2160, 2160);
        assert_eq!(capacity(&big, Platform::Instagram), frame_capacity(1080, 1080));
        assert_eq!(capacity(&big, Platform::NoResize), frame_capacity(2160, 2160));
        assert_eq!(frame_capacity(8, 8), 0);
        // 4096 blocks -> 170 packet bytes -> 150 body bytes -> 86 frame bytes
        assert_eq!(frame_capacity(512, 512), 86);
    }

    #[test]
    fn test_embed_extract_frame() {
        let cover = create_cover(512, 512, 2);
        let frame: Vec<u8> = (0..40u8).map(|i| i.wrapping_mul(37)).collect();
        assert!(frame.len() <= frame_capacity(512, 512));

        let embedded = embed(&cover, &frame, Platform::Generic).unwrap();
        assert!(embedded.verified);
        assert_eq!(embedded.image.dimensions(), (512, 512));
        assert_eq!(extract(&embedded.image).unwrap(), frame);
    }

    #[test]
    fn test_untouched_blocks_keep_their_pixels() {
        let cover = create_cover(512, 512, 3);
        let frame = vec![0x42u8; 10];
        let embedded = embed(&cover, &frame, Platform::NoResize).unwrap();

        let used = PARAMS.slots_needed(frame.len());
        let blocks_wide = 512 / BLOCK_SIZE;
        let last = slot_count(512, 512) - 1;
        assert!(used <= last);
        let (row, col) = block_position(last, blocks_wide);
        for y in 0..BLOCK_SIZE {
            for x in 0..BLOCK_SIZE {
                let (px, py) = ((col * BLOCK_SIZE + x) as u32, (row * BLOCK_SIZE + y) as u32);
                assert_eq!(embedded.image.get_pixel(px, py), cover.get_pixel(px, py));
            }
        }
    }

    #[test]
    fn test_capacity_exceeded_before_any_work() {
        let cover = create_cover(64, 64, 4);
        let available = frame_capacity(64, 64);
        let result = embed(&cover, &vec![0u8; available + 1], Platform::Generic);
        assert_eq!(
            result.unwrap_err(),
            StegError::CapacityExceeded {
                needed: available + 1,
                available
            }
        );
    }

    #[test]
    fn test_white_and_black_covers_round_trip() {
        let frame: Vec<u8> = (0..60u8).map(|i| i.wrapping_mul(91)).collect();
        for fill in [255u8, 0] {
            let cover = RgbaImage::from_pixel(512, 512, Rgba([fill, fill, fill, 255]));
            let embedded = embed(&cover, &frame, Platform::NoResize).unwrap();
            assert!(embedded.verified, "fill={fill}");
            assert_eq!(extract(&embedded.image).unwrap(), frame, "fill={fill}");
        }
    }

    #[test]
    fn test_unverifiable_embed_still_returns_image() {
        // A zero-length frame is never accepted on read, so the self-test fails.
        let cover = create_cover(512, 512, 6);
        let embedded = embed(&cover, &[], Platform::NoResize).unwrap();
        assert!(!embedded.verified);
        assert_eq!(embedded.image.dimensions(), (512, 512));
        assert!(extract(&embedded.image).is_err());
    }

    #[test]
    fn test_extract_from_unmarked_image_fails() {
        let cover = create_cover(256, 256, 5);
        let result = extract(&cover);
        assert!(
            matches!(result, Err(StegError::Uncorrectable(_)) | Err(StegError::Format(_))),
            "got {result:?}"
        );
    }
}
