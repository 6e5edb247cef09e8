//! 8x8 block transform primitives shared by the frequency-domain codec.
//!
//! This module provides the direct DCT-II / DCT-III pair in JPEG normalization,
//! standard luminance quantization tables, the zigzag scan order, and helpers
//! that move 8x8 single-channel blocks in and out of interleaved pixel buffers.

use std::sync::OnceLock;

use crate::error::{Result, StegError};

// --- Constants ---
/// The size of the square blocks the image will be processed in.
pub const BLOCK_SIZE: usize = 8;

/// Number of coefficients in a block.
pub const BLOCK_AREA: usize = BLOCK_SIZE * BLOCK_SIZE;

/// Zigzag positions eligible for embedding: the first 24 AC terms.
/// The DC term (zigzag 0) is never touched.
pub const EMBEDDABLE_AC: std::ops::RangeInclusive<usize> = 1..=24;

/// Standard JPEG luminance quantization table (ITU T.81 Annex K), natural order.
pub const BASE_LUMINANCE_TABLE: [u16; BLOCK_AREA] = [
    16, 11, 10, 16, 24, 40, 51, 61, //
    12, 12, 14, 19, 26, 58, 60, 55, //
    14, 13, 16, 24, 40, 57, 69, 56, //
    14, 17, 22, 29, 51, 87, 80, 62, //
    18, 22, 37, 56, 68, 109, 103, 77, //
    24, 35, 55, 64, 81, 104, 113, 92, //
    49, 64, 78, 87, 103, 121, 120, 101, //
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// Maps a zigzag scan index to the natural row-major index (row * 8 + col).
pub const ZIGZAG_TO_NATURAL: [usize; BLOCK_AREA] = [
    0, 1, 8, 16, 9, 2, 3, 10, //
    17, 24, 32, 25, 18, 11, 4, 5, //
    12, 19, 26, 33, 40, 48, 41, 34, //
    27, 20, 13, 6, 7, 14, 21, 28, //
    35, 42, 49, 56, 57, 50, 43, 36, //
    29, 22, 15, 23, 30, 37, 44, 51, //
    58, 59, 52, 45, 38, 31, 39, 46, //
    53, 60, 61, 54, 47, 55, 62, 63,
];

pub type Block = [f64; BLOCK_AREA];

/// cos((2x + 1)·u·π / 16) indexed `[x][u]`.
fn cosine_table() -> &'static [[f64; BLOCK_SIZE]; BLOCK_SIZE] {
    static TABLE: OnceLock<[[f64; BLOCK_SIZE]; BLOCK_SIZE]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [[0.0; BLOCK_SIZE]; BLOCK_SIZE];
        for (x, row) in table.iter_mut().enumerate() {
            for (u, entry) in row.iter_mut().enumerate() {
                *entry = ((2 * x + 1) as f64 * u as f64 * std::f64::consts::PI / 16.0).cos();
            }
        }
        table
    })
}

fn alpha(k: usize) -> f64 {
    if k == 0 { std::f64::consts::FRAC_1_SQRT_2 } else { 1.0 }
}

/// Forward 8x8 DCT-II.
///
/// `F(u,v) = 0.25·α(u)·α(v)·Σ f(x,y)·cos((2x+1)uπ/16)·cos((2y+1)vπ/16)`, with
/// `u`/`x` the row and `v`/`y` the column. Input is expected level-shifted.
pub fn forward_dct(block: &Block) -> Block {
    let cos = cosine_table();
    let mut out = [0.0; BLOCK_AREA];
    for u in 0..BLOCK_SIZE {
        for v in 0..BLOCK_SIZE {
            let mut sum = 0.0;
            for x in 0..BLOCK_SIZE {
                for y in 0..BLOCK_SIZE {
                    sum += block[x * BLOCK_SIZE + y] * cos[x][u] * cos[y][v];
                }
            }
            out[u * BLOCK_SIZE + v] = 0.25 * alpha(u) * alpha(v) * sum;
        }
    }
    out
}

/// Inverse 8x8 DCT (DCT-III), the exact inverse of [`forward_dct`].
pub fn inverse_dct(coeffs: &Block) -> Block {
    let cos = cosine_table();
    let mut out = [0.0; BLOCK_AREA];
    for x in 0..BLOCK_SIZE {
        for y in 0..BLOCK_SIZE {
            let mut sum = 0.0;
            for u in 0..BLOCK_SIZE {
                for v in 0..BLOCK_SIZE {
                    sum += alpha(u) * alpha(v) * coeffs[u * BLOCK_SIZE + v] * cos[x][u] * cos[y][v];
                }
            }
            out[x * BLOCK_SIZE + y] = 0.25 * sum;
        }
    }
    out
}

/// Scales the base luminance table to a JPEG quality factor.
///
/// # Arguments
/// * `quality` - JPEG quality in 1..=100; 50 yields the base table unchanged
///
/// # Returns
/// * `Ok(table)` in natural order, every entry at least 1
/// * `Err(StegError::Domain)` if `quality` is outside 1..=100
pub fn quantization_table(quality: u8) -> Result<[u16; BLOCK_AREA]> {
    if !(1..=100).contains(&quality) {
        return Err(StegError::Domain(format!(
            "quality must be within 1..=100, got {quality}"
        )));
    }
    let q = quality as f64;
    let scale = if quality < 50 { 5000.0 / q } else { 200.0 - 2.0 * q };

    let mut table = [0u16; BLOCK_AREA];
    for (entry, &base) in table.iter_mut().zip(BASE_LUMINANCE_TABLE.iter()) {
        *entry = ((base as f64 * scale / 100.0).floor() as u16).max(1);
    }
    Ok(table)
}

pub fn quantize(coeffs: &Block, table: &[u16; BLOCK_AREA]) -> [i32; BLOCK_AREA] {
    let mut out = [0i32; BLOCK_AREA];
    for i in 0..BLOCK_AREA {
        out[i] = (coeffs[i] / table[i] as f64).round() as i32;
    }
    out
}

pub fn dequantize(quantized: &[i32; BLOCK_AREA], table: &[u16; BLOCK_AREA]) -> Block {
    let mut out = [0.0; BLOCK_AREA];
    for i in 0..BLOCK_AREA {
        out[i] = quantized[i] as f64 * table[i] as f64;
    }
    out
}

/// Geometry of an interleaved 8-bit pixel buffer.
#[derive(Debug, Clone, Copy)]
pub struct PlaneLayout {
    pub width: usize,
    pub height: usize,
    /// Samples per pixel.
    pub channels: usize,
    /// Which sample within a pixel this plane reads.
    pub channel: usize,
}

impl PlaneLayout {
    pub fn blocks_wide(&self) -> usize {
        self.width / BLOCK_SIZE
    }

    pub fn blocks_tall(&self) -> usize {
        self.height / BLOCK_SIZE
    }

    fn check(&self, buffer_len: usize, block_row: usize, block_col: usize) -> Result<()> {
        if self.channel >= self.channels {
            return Err(StegError::Domain(format!(
                "channel {} out of range for {} channels",
                self.channel, self.channels
            )));
        }
        if buffer_len < self.width * self.height * self.channels {
            return Err(StegError::Domain("pixel buffer shorter than its layout".into()));
        }
        if block_row >= self.blocks_tall() || block_col >= self.blocks_wide() {
            return Err(StegError::Domain(format!(
                "block ({block_row}, {block_col}) out of bounds"
            )));
        }
        Ok(())
    }

    fn sample_index(&self, row: usize, col: usize) -> usize {
        (row * self.width + col) * self.channels + self.channel
    }
}

/// Reads one 8x8 block of a single channel, level-shifted by -128.
pub fn extract_block(
    pixels: &[u8],
    layout: &PlaneLayout,
    block_row: usize,
    block_col: usize,
) -> Result<Block> {
    layout.check(pixels.len(), block_row, block_col)?;
    let mut block = [0.0; BLOCK_AREA];
    for r in 0..BLOCK_SIZE {
        for c in 0..BLOCK_SIZE {
            let idx = layout.sample_index(block_row * BLOCK_SIZE + r, block_col * BLOCK_SIZE + c);
            block[r * BLOCK_SIZE + c] = pixels[idx] as f64 - 128.0;
        }
    }
    Ok(block)
}

/// Writes one 8x8 block back, undoing the level shift and clamping to 0..=255.
pub fn write_block(
    pixels: &mut [u8],
    layout: &PlaneLayout,
    block_row: usize,
    block_col: usize,
    block: &Block,
) -> Result<()> {
    layout.check(pixels.len(), block_row, block_col)?;
    for r in 0..BLOCK_SIZE {
        for c in 0..BLOCK_SIZE {
            let idx = layout.sample_index(block_row * BLOCK_SIZE + r, block_col * BLOCK_SIZE + c);
            pixels[idx] = (block[r * BLOCK_SIZE + c] + 128.0).round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(())
}
