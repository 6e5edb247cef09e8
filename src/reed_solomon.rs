//! Reed-Solomon forward error correction over GF(2^8).
//!
//! Codewords are systematic (`data ++ parity`) with first consecutive root α^0,
//! and are stored highest-degree coefficient first: byte `i` of an `n`-byte
//! codeword is the coefficient of x^(n-1-i). Decoding corrects unknown-position
//! errors plus caller-supplied erasures as long as `2·errors + erasures ≤ nsym`.
//!
//! Payloads longer than one codeword are split by [`chunk_layout`] into an
//! explicit ordered list of chunks, each holding at most `255 - nsym` data bytes.

use std::sync::OnceLock;

use crate::error::{Result, StegError};
use crate::gf256;

/// Longest codeword the field supports.
pub const MAX_CODEWORD_LEN: usize = 255;

/// Generator polynomials, one per parity length, each built on first use.
static GENERATORS: [OnceLock<Vec<u8>>; MAX_CODEWORD_LEN] =
    [const { OnceLock::new() }; MAX_CODEWORD_LEN];

fn check_nsym(nsym: usize) -> Result<()> {
    if nsym == 0 || nsym >= MAX_CODEWORD_LEN {
        return Err(StegError::Domain(format!(
            "parity length must be within 1..{MAX_CODEWORD_LEN}, got {nsym}"
        )));
    }
    Ok(())
}

/// g(x) = ∏ (x - α^i) for i in 0..nsym, highest degree first.
fn generator(nsym: usize) -> &'static [u8] {
    GENERATORS[nsym].get_or_init(|| {
        let mut g = vec![1u8];
        for i in 0..nsym {
            g = gf256::poly_mul(&g, &[1, gf256::exp(i)]);
        }
        g
    })
}

/// Appends `nsym` parity bytes to `data`.
///
/// # Arguments
/// * `data` - Message bytes; `data.len() + nsym` must not exceed 255
/// * `nsym` - Number of parity bytes
///
/// # Returns
/// * `Ok(codeword)` with the original data followed by the parity
/// * `Err(StegError::Domain)` if the codeword would not fit in the field
pub fn encode(data: &[u8], nsym: usize) -> Result<Vec<u8>> {
    check_nsym(nsym)?;
    if data.len() + nsym > MAX_CODEWORD_LEN {
        return Err(StegError::Domain(format!(
            "codeword of {} bytes exceeds {MAX_CODEWORD_LEN}",
            data.len() + nsym
        )));
    }

    let generator = generator(nsym);
    let mut remainder = vec![0u8; data.len() + nsym];
    remainder[..data.len()].copy_from_slice(data);

    // Synthetic division of data·x^nsym by the monic generator.
    for i in 0..data.len() {
        let coef = remainder[i];
        if coef == 0 {
            continue;
        }
        for (j, &g) in generator.iter().enumerate().skip(1) {
            remainder[i + j] ^= gf256::multiply(g, coef);
        }
    }

    let mut codeword = data.to_vec();
    codeword.extend_from_slice(&remainder[data.len()..]);
    Ok(codeword)
}

/// S_i = r(α^i) for i in 0..nsym.
fn syndromes(codeword: &[u8], nsym: usize) -> Vec<u8> {
    (0..nsym)
        .map(|i| gf256::poly_eval(codeword, gf256::exp(i)))
        .collect()
}

/// Removes the contribution of known erasures from the syndromes. The first
/// `nsym - erasures` entries of the result are syndromes of the remaining
/// unknown errors only.
fn forney_syndromes(synd: &[u8], erasures: &[usize], n: usize) -> Vec<u8> {
    let mut fsynd = synd.to_vec();
    for &pos in erasures {
        let x = gf256::exp(n - 1 - pos);
        for j in 0..fsynd.len().saturating_sub(1) {
            fsynd[j] = gf256::multiply(fsynd[j], x) ^ fsynd[j + 1];
        }
    }
    fsynd
}

/// Berlekamp-Massey. Returns the error locator σ(x) in ascending powers,
/// σ[0] = 1, with trailing zero coefficients trimmed.
fn berlekamp_massey(synd: &[u8]) -> Result<Vec<u8>> {
    let n = synd.len();
    let mut c = vec![0u8; n + 1];
    c[0] = 1;
    let mut b = vec![0u8; n + 1];
    b[0] = 1;

    let mut ell = 0usize;
    let mut prev_delta = 1u8;
    let mut m = 1usize;

    for r in 0..n {
        let mut delta = synd[r];
        for i in 1..=ell.min(r) {
            delta ^= gf256::multiply(c[i], synd[r - i]);
        }

        if delta == 0 {
            m += 1;
            continue;
        }

        let factor = gf256::divide(delta, prev_delta)?;
        let before = c.clone();
        for j in 0..=n - m {
            c[j + m] ^= gf256::multiply(factor, b[j]);
        }

        if 2 * ell <= r {
            ell = r + 1 - ell;
            b = before;
            prev_delta = delta;
            m = 1;
        } else {
            m += 1;
        }
    }

    c.truncate(ell + 1);
    while c.len() > 1 && c.last() == Some(&0) {
        c.pop();
    }
    Ok(c)
}

/// Evaluates an ascending-power polynomial.
fn eval_ascending(poly: &[u8], x: u8) -> u8 {
    poly.iter().rev().fold(0u8, |acc, &c| gf256::multiply(acc, x) ^ c)
}

/// Ascending-power erasure locator Γ(x) = ∏ (1 + X_e·x).
fn erasure_locator(erasures: &[usize], n: usize) -> Vec<u8> {
    erasures.iter().fold(vec![1u8], |acc, &pos| {
        gf256::poly_mul(&acc, &[1, gf256::exp(n - 1 - pos)])
    })
}

/// Corrects `codeword` in place and returns its data part.
///
/// `erasures` are indices into `codeword` whose values are known to be
/// unreliable. Each may be listed once.
///
/// # Returns
/// * `Ok(data)` when the codeword is clean or was corrected
/// * `Err(StegError::Domain)` for an oversized codeword or bad erasure index
/// * `Err(StegError::Uncorrectable)` when `2·errors + erasures > nsym` or the
///   corrected word still fails the syndrome check
pub fn decode(codeword: &[u8], nsym: usize, erasures: &[usize]) -> Result<Vec<u8>> {
    check_nsym(nsym)?;
    let n = codeword.len();
    if n > MAX_CODEWORD_LEN {
        return Err(StegError::Domain(format!(
            "codeword of {n} bytes exceeds {MAX_CODEWORD_LEN}"
        )));
    }
    if n < nsym {
        return Err(StegError::Domain(format!(
            "codeword of {n} bytes is shorter than its {nsym} parity bytes"
        )));
    }

    let mut erased = erasures.to_vec();
    erased.sort_unstable();
    erased.dedup();
    if let Some(&bad) = erased.iter().find(|&&p| p >= n) {
        return Err(StegError::Domain(format!(
            "erasure position {bad} outside codeword of {n} bytes"
        )));
    }
    if erased.len() > nsym {
        return Err(StegError::Uncorrectable(format!(
            "{} erasures exceed {nsym} parity bytes",
            erased.len()
        )));
    }

    let mut msg = codeword.to_vec();
    for &pos in &erased {
        msg[pos] = 0;
    }

    let synd = syndromes(&msg, nsym);
    if synd.iter().all(|&s| s == 0) {
        msg.truncate(n - nsym);
        return Ok(msg);
    }

    let fsynd = forney_syndromes(&synd, &erased, n);
    let sigma = berlekamp_massey(&fsynd[..nsym - erased.len()])?;
    let error_count = sigma.len() - 1;
    if 2 * error_count + erased.len() > nsym {
        return Err(StegError::Uncorrectable(format!(
            "{error_count} errors and {} erasures exceed {nsym} parity bytes",
            erased.len()
        )));
    }

    let locator = gf256::poly_mul(&sigma, &erasure_locator(&erased, n));
    let degree = locator.len() - 1;

    // Chien search over every position of the (possibly shortened) codeword.
    let positions: Vec<usize> = (0..n)
        .filter(|&p| eval_ascending(&locator, gf256::exp(gf256::FIELD_ORDER - p % 255)) == 0)
        .collect();
    if positions.len() != degree {
        return Err(StegError::Uncorrectable(format!(
            "located {} of {degree} error positions",
            positions.len()
        )));
    }

    // Forney: e = X·Ω(X⁻¹) / Λ'(X⁻¹), Ω = S·Λ mod x^nsym.
    let mut omega = gf256::poly_mul(&synd, &locator);
    omega.truncate(nsym);
    let derivative: Vec<u8> = (1..locator.len())
        .map(|i| if i % 2 == 1 { locator[i] } else { 0 })
        .collect();

    for &p in &positions {
        let x = gf256::exp(p);
        let x_inv = gf256::exp(gf256::FIELD_ORDER - p % 255);
        let denominator = eval_ascending(&derivative, x_inv);
        if denominator == 0 {
            return Err(StegError::Uncorrectable(
                "error locator has a repeated root".into(),
            ));
        }
        let numerator = gf256::multiply(x, eval_ascending(&omega, x_inv));
        msg[n - 1 - p] ^= gf256::divide(numerator, denominator)?;
    }

    if syndromes(&msg, nsym).iter().any(|&s| s != 0) {
        return Err(StegError::Uncorrectable(
            "residual syndrome after correction".into(),
        ));
    }

    msg.truncate(n - nsym);
    Ok(msg)
}

/// Where one chunk's data and codeword live inside the full payload and the
/// full encoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    pub data_offset: usize,
    pub data_len: usize,
    pub codeword_offset: usize,
    pub codeword_len: usize,
}

/// Splits `data_len` bytes into consecutive chunks of at most `255 - nsym`
/// data bytes each.
pub fn chunk_layout(data_len: usize, nsym: usize) -> Result<Vec<ChunkLayout>> {
    check_nsym(nsym)?;
    let per_chunk = MAX_CODEWORD_LEN - nsym;
    let mut layout = Vec::with_capacity(data_len.div_ceil(per_chunk));
    let mut data_offset = 0;
    let mut codeword_offset = 0;
    while data_offset < data_len {
        let len = per_chunk.min(data_len - data_offset);
        layout.push(ChunkLayout {
            data_offset,
            data_len: len,
            codeword_offset,
            codeword_len: len + nsym,
        });
        data_offset += len;
        codeword_offset += len + nsym;
    }
    Ok(layout)
}

/// Length of the chunked encoding of `data_len` bytes.
pub fn encoded_len(data_len: usize, nsym: usize) -> usize {
    if nsym == 0 || nsym >= MAX_CODEWORD_LEN {
        return data_len;
    }
    data_len + nsym * data_len.div_ceil(MAX_CODEWORD_LEN - nsym)
}

/// Largest payload whose chunked encoding fits in `available` bytes.
pub fn max_data_len(available: usize, nsym: usize) -> usize {
    if nsym == 0 || nsym >= MAX_CODEWORD_LEN {
        return available;
    }
    let full = available / MAX_CODEWORD_LEN;
    let rest = available % MAX_CODEWORD_LEN;
    full * (MAX_CODEWORD_LEN - nsym) + rest.saturating_sub(nsym)
}

/// Encodes a payload of any length as consecutive codewords.
pub fn encode_chunked(data: &[u8], nsym: usize) -> Result<Vec<u8>> {
    let layout = chunk_layout(data.len(), nsym)?;
    let mut out = Vec::with_capacity(encoded_len(data.len(), nsym));
    for chunk in &layout {
        out.extend(encode(
            &data[chunk.data_offset..chunk.data_offset + chunk.data_len],
            nsym,
        )?);
    }
    Ok(out)
}

/// Decodes the output of [`encode_chunked`] back into `data_len` bytes.
///
/// `erasures` are byte offsets into `encoded`; each is routed to the chunk
/// that contains it.
pub fn decode_chunked(
    encoded: &[u8],
    data_len: usize,
    nsym: usize,
    erasures: &[usize],
) -> Result<Vec<u8>> {
    let expected = encoded_len(data_len, nsym);
    if encoded.len() != expected {
        return Err(StegError::Domain(format!(
            "expected {expected} encoded bytes for {data_len} data bytes, got {}",
            encoded.len()
        )));
    }

    let layout = chunk_layout(data_len, nsym)?;
    let mut out = Vec::with_capacity(data_len);
    for chunk in &layout {
        let range = chunk.codeword_offset..chunk.codeword_offset + chunk.codeword_len;
        let local: Vec<usize> = erasures
            .iter()
            .filter(|&&e| range.contains(&e))
            .map(|&e| e - chunk.codeword_offset)
            .collect();
        out.extend(decode(&encoded[range], nsym, &local)?);
    }
    Ok(out)
}
