//! Least-significant-bit ("dot") codec for lossless carriers.
//!
//! Bits go into the LSB of the R, G and B samples in raster order; alpha is
//! never touched. The transport layer is shared with the QIM codec, with a
//! lighter parity budget and no repetition. Nothing here survives lossy
//! recompression.

use image::RgbaImage;
use log::{debug, warn};

use crate::Embedded;
use crate::error::{Result, StegError};
use crate::utils::transport::{self, SlotReader, SoftBit, TransportParams};

/// Reed-Solomon parity bytes per body codeword.
pub const NSYM: usize = 16;

/// Colour samples used per pixel.
const SAMPLES_PER_PIXEL: usize = 3;

pub const PARAMS: TransportParams = TransportParams {
    nsym: NSYM,
    repeat: 1,
    erasure_margin: 0.0,
};

/// Index of bit slot `slot` in an RGBA sample buffer.
fn sample_index(slot: usize) -> usize {
    (slot / SAMPLES_PER_PIXEL) * 4 + slot % SAMPLES_PER_PIXEL
}

pub fn slot_count(width: u32, height: u32) -> usize {
    width as usize * height as usize * SAMPLES_PER_PIXEL
}

/// Largest frame, in bytes, the cover holds.
pub fn capacity(cover: &RgbaImage) -> usize {
    PARAMS.max_frame_len(slot_count(cover.width(), cover.height()))
}

struct LsbReader<'a> {
    samples: &'a [u8],
    slots: usize,
}

impl SlotReader for LsbReader<'_> {
    fn slot_count(&self) -> usize {
        self.slots
    }

    fn read_slot(&mut self, slot: usize) -> Result<SoftBit> {
        self.samples
            .get(sample_index(slot))
            .map(|&sample| SoftBit::hard(sample & 1 == 1))
            .ok_or_else(|| StegError::Domain(format!("slot {slot} beyond carrier")))
    }
}

/// Embeds `frame` into a copy of `cover`. The capacity check runs before the
/// cover is copied.
pub fn embed(cover: &RgbaImage, frame: &[u8]) -> Result<Embedded> {
    let available = capacity(cover);
    if frame.len() > available {
        return Err(StegError::CapacityExceeded {
            needed: frame.len(),
            available,
        });
    }

    let slots = transport::prepare_packet(frame, &PARAMS)?;
    let mut image = cover.clone();
    let samples: &mut [u8] = &mut image;
    for (slot, &bit) in slots.iter().enumerate() {
        let sample = &mut samples[sample_index(slot)];
        *sample = (*sample & !1) | bit as u8;
    }
    debug!(
        "dot: {} of {} samples carry a {}-byte frame",
        slots.len(),
        slot_count(cover.width(), cover.height()),
        frame.len()
    );

    let verified = extract(&image).is_ok_and(|decoded| decoded == frame);
    if !verified {
        warn!("dot self-test failed");
    }
    Ok(Embedded { image, verified })
}

pub fn extract(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut reader = LsbReader {
        samples: image.as_raw(),
        slots: slot_count(image.width(), image.height()),
    };
    transport::decode_packet(&mut reader, &PARAMS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn create_cover(width: u32, height: u32, seed: u64) -> RgbaImage {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        RgbaImage::from_fn(width, height, |_, _| {
            Rgba([rng.random(), rng.random(), rng.random(), rng.random()])
        })
    }

    #[test]
    fn test_capacity_64x64() {
        // 12288 slots -> 1536 packet bytes -> 1516 body bytes -> 5·239 + 225
        let cover = create_cover(64, 64, 1);
        assert_eq!(capacity(&cover), 1420);
    }

    #[test]
    fn test_round_trip_full_capacity() {
        let cover = create_cover(64, 64, 2);
        let frame: Vec<u8> = (0..capacity(&cover)).map(|i| (i * 13 % 256) as u8).collect();
        let embedded = embed(&cover, &frame).unwrap();
        assert!(embedded.verified);
        assert_eq!(extract(&embedded.image).unwrap(), frame);
    }

    #[test]
    fn test_alpha_and_high_bits_untouched() {
        let cover = create_cover(32, 32, 3);
        let embedded = embed(&cover, &[0xA5; 50]).unwrap();
        for (before, after) in cover.pixels().zip(embedded.image.pixels()) {
            assert_eq!(before[3], after[3]);
            for c in 0..3 {
                assert_eq!(before[c] & !1, after[c] & !1);
            }
        }
    }

    #[test]
    fn test_corrupted_lsbs_are_corrected() {
        let cover = create_cover(64, 64, 4);
        let frame = vec![0x3C; 200];
        let mut image = embed(&cover, &frame).unwrap().image;
        // Flip one bit in each of 5 body bytes of the first codeword.
        for byte in [21usize, 40, 77, 150, 230] {
            let slot = byte * 8 + 3;
            let samples: &mut [u8] = &mut image;
            samples[sample_index(slot)] ^= 1;
        }
        assert_eq!(extract(&image).unwrap(), frame);
    }

    #[test]
    fn test_capacity_exceeded_leaves_cover_alone() {
        let cover = create_cover(16, 16, 5);
        let available = capacity(&cover);
        let err = embed(&cover, &vec![1u8; available + 1]).unwrap_err();
        assert_eq!(
            err,
            StegError::CapacityExceeded {
                needed: available + 1,
                available
            }
        );
    }

    #[test]
    fn test_unverifiable_embed_still_returns_image() {
        // Zero-length frames are rejected on read, so the self-test cannot pass.
        let cover = create_cover(16, 16, 7);
        let embedded = embed(&cover, &[]).unwrap();
        assert!(!embedded.verified);
        assert_eq!(embedded.image.dimensions(), cover.dimensions());
    }

    #[test]
    fn test_unmarked_image_fails() {
        let cover = create_cover(64, 64, 6);
        let result = extract(&cover);
        assert!(
            matches!(result, Err(StegError::Uncorrectable(_)) | Err(StegError::Format(_))),
            "got {result:?}"
        );
    }
}
