// src/utils/transport.rs
//! Shared bit transport for both embedding codecs.
//!
//! A packet is a Reed-Solomon protected length header followed by the frame
//! bytes, chunk-encoded with the codec's parity length. Every bit is written to
//! `repeat` consecutive carrier slots and read back by majority vote.

use log::debug;

use crate::error::{Result, StegError};
use crate::reed_solomon;
use crate::utils::bits::{bits_to_bytes, bytes_to_bits};

/// Parity bytes protecting the 4-byte length field.
pub const HEADER_NSYM: usize = 16;

/// Size of the big-endian frame length field.
pub const LENGTH_FIELD_LEN: usize = 4;

/// Encoded header size in bytes.
pub const HEADER_LEN: usize = LENGTH_FIELD_LEN + HEADER_NSYM;

/// Per-codec transport configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportParams {
    /// Reed-Solomon parity bytes per body codeword.
    pub nsym: usize,
    /// Carrier slots per bit.
    pub repeat: usize,
    /// Bytes whose weakest bit confidence falls below this are handed to the
    /// decoder as erasures. Zero disables erasure hints.
    pub erasure_margin: f64,
}

/// One bit read from the carrier, with how far it sat from a decision boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftBit {
    pub bit: bool,
    /// 0.0 means on the boundary, 0.5 means dead centre of its bin.
    pub margin: f64,
}

impl SoftBit {
    pub fn hard(bit: bool) -> Self {
        SoftBit { bit, margin: 0.5 }
    }
}

/// Random access to the carrier's slots in traversal order.
pub trait SlotReader {
    fn slot_count(&self) -> usize;
    fn read_slot(&mut self, slot: usize) -> Result<SoftBit>;
}

impl TransportParams {
    /// Encoded packet length in bytes for a frame of `frame_len` bytes.
    pub fn packet_len(&self, frame_len: usize) -> usize {
        HEADER_LEN + reed_solomon::encoded_len(frame_len, self.nsym)
    }

    /// Carrier slots required for a frame of `frame_len` bytes.
    pub fn slots_needed(&self, frame_len: usize) -> usize {
        self.packet_len(frame_len) * 8 * self.repeat
    }

    /// Largest frame that fits in `slots` carrier slots.
    pub fn max_frame_len(&self, slots: usize) -> usize {
        let bytes = slots / self.repeat.max(1) / 8;
        if bytes <= HEADER_LEN {
            return 0;
        }
        reed_solomon::max_data_len(bytes - HEADER_LEN, self.nsym).min(u32::MAX as usize)
    }
}

/// Builds the slot sequence for `frame`.
pub fn prepare_packet(frame: &[u8], params: &TransportParams) -> Result<Vec<bool>> {
    let frame_len = u32::try_from(frame.len())
        .map_err(|_| StegError::Domain(format!("frame of {} bytes is too long", frame.len())))?;

    let mut packet = reed_solomon::encode(&frame_len.to_be_bytes(), HEADER_NSYM)?;
    packet.extend(reed_solomon::encode_chunked(frame, params.nsym)?);

    let bits = bytes_to_bits(&packet);
    let mut slots = Vec::with_capacity(bits.len() * params.repeat);
    for bit in bits {
        slots.extend(std::iter::repeat_n(bit, params.repeat));
    }
    Ok(slots)
}

/// Reads `count` bytes starting at packet byte `first_byte`, returning the
/// voted bytes and each byte's confidence.
fn read_bytes(
    reader: &mut dyn SlotReader,
    params: &TransportParams,
    first_byte: usize,
    count: usize,
) -> Result<(Vec<u8>, Vec<f64>)> {
    let mut bits = Vec::with_capacity(count * 8);
    let mut confidence = vec![f64::INFINITY; count];

    for bit_index in first_byte * 8..(first_byte + count) * 8 {
        let mut ones = 0usize;
        let mut score = 0.0;
        for r in 0..params.repeat {
            let soft = reader.read_slot(bit_index * params.repeat + r)?;
            if soft.bit {
                ones += 1;
                score += soft.margin;
            } else {
                score -= soft.margin;
            }
        }
        let zeros = params.repeat - ones;
        let bit = if ones != zeros { ones > zeros } else { score > 0.0 };

        let byte = bit_index / 8 - first_byte;
        let agreement = (if bit { score } else { -score }) / params.repeat as f64;
        confidence[byte] = confidence[byte].min(agreement.max(0.0));
        bits.push(bit);
    }
    Ok((bits_to_bytes(&bits), confidence))
}

/// Picks erasure hints inside one codeword: the least confident bytes below
/// the margin, at most half the parity budget.
fn pick_erasures(confidence: &[f64], margin: f64, nsym: usize) -> Vec<usize> {
    let mut weak: Vec<usize> = (0..confidence.len())
        .filter(|&i| confidence[i] < margin)
        .collect();
    weak.sort_by(|&a, &b| confidence[a].total_cmp(&confidence[b]));
    weak.truncate(nsym / 2);
    weak
}

/// Recovers the frame bytes carried by `reader`.
///
/// # Returns
/// * `Ok(frame)` with the exact bytes passed to [`prepare_packet`]
/// * `Err(StegError::Uncorrectable)` if the header or a body codeword is beyond repair
/// * `Err(StegError::Format)` if the carrier is too small or the decoded
///   length cannot be a packet of this carrier
pub fn decode_packet(reader: &mut dyn SlotReader, params: &TransportParams) -> Result<Vec<u8>> {
    let available = reader.slot_count();
    if available < params.slots_needed(0) {
        return Err(StegError::Format("carrier too small to hold a packet".into()));
    }

    // Step 1: the length header.
    let (header, header_conf) = read_bytes(reader, params, 0, HEADER_LEN)?;
    let header_erasures = pick_erasures(&header_conf, params.erasure_margin, HEADER_NSYM);
    let length = reed_solomon::decode(&header, HEADER_NSYM, &header_erasures)?;
    let frame_len = u32::from_be_bytes([length[0], length[1], length[2], length[3]]) as usize;

    if frame_len == 0 || frame_len > params.max_frame_len(available) {
        return Err(StegError::Format(format!(
            "declared frame length {frame_len} does not fit this carrier"
        )));
    }
    debug!(
        "transport header ok: frame {frame_len} bytes, {} header erasures",
        header_erasures.len()
    );

    // Step 2: the body, with erasure hints routed per codeword.
    let body_len = reed_solomon::encoded_len(frame_len, params.nsym);
    let (body, body_conf) = read_bytes(reader, params, HEADER_LEN, body_len)?;

    let mut erasures = Vec::new();
    for chunk in reed_solomon::chunk_layout(frame_len, params.nsym)? {
        let range = chunk.codeword_offset..chunk.codeword_offset + chunk.codeword_len;
        erasures.extend(
            pick_erasures(&body_conf[range], params.erasure_margin, params.nsym)
                .into_iter()
                .map(|i| i + chunk.codeword_offset),
        );
    }
    debug!("transport body: {} erasure hints", erasures.len());

    reed_solomon::decode_chunked(&body, frame_len, params.nsym, &erasures)
}
