//! Arithmetic over GF(2^8) with the primitive polynomial 0x11D
//! (x^8 + x^4 + x^3 + x^2 + 1) and generator α = 2.
//!
//! Log/antilog tables are built once on first use and shared read-only.

use std::sync::OnceLock;

use crate::error::{Result, StegError};

/// Primitive polynomial for GF(2^8).
pub const PRIMITIVE_POLY: u16 = 0x11D;

/// Number of non-zero field elements.
pub const FIELD_ORDER: usize = 255;

struct Tables {
    /// Antilog table, padded to 512 entries so `exp[log a + log b]` never wraps.
    exp: [u8; 512],
    log: [u8; 256],
}

fn build_tables() -> Tables {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];

    let mut x: u16 = 1;
    for i in 0..FIELD_ORDER {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= PRIMITIVE_POLY;
        }
    }
    for i in FIELD_ORDER..512 {
        exp[i] = exp[i - FIELD_ORDER];
    }

    Tables { exp, log }
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(build_tables)
}

/// α^power, for any power (reduced modulo 255).
pub fn exp(power: usize) -> u8 {
    tables().exp[power % FIELD_ORDER]
}

/// Discrete log of a non-zero element. `log(0)` is undefined and returns 0.
pub fn log(x: u8) -> usize {
    tables().log[x as usize] as usize
}

/// Field addition (and subtraction): XOR.
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

pub fn multiply(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = tables();
    t.exp[t.log[a as usize] as usize + t.log[b as usize] as usize]
}

/// Divides `a` by `b`.
///
/// # Returns
/// * `Err(StegError::Domain)` when `b` is zero
pub fn divide(a: u8, b: u8) -> Result<u8> {
    if b == 0 {
        return Err(StegError::Domain("division by zero in GF(2^8)".into()));
    }
    if a == 0 {
        return Ok(0);
    }
    let t = tables();
    let idx = t.log[a as usize] as usize + FIELD_ORDER - t.log[b as usize] as usize;
    Ok(t.exp[idx])
}

/// Multiplicative inverse; zero has none.
pub fn inverse(x: u8) -> Result<u8> {
    divide(1, x)
}

/// Raises `x` to an arbitrary power.
pub fn pow(x: u8, power: usize) -> u8 {
    if x == 0 {
        return if power == 0 { 1 } else { 0 };
    }
    exp(log(x) * power)
}

/// Evaluates a polynomial stored highest-degree first.
pub fn poly_eval(poly: &[u8], x: u8) -> u8 {
    poly.iter().fold(0u8, |acc, &c| add(multiply(acc, x), c))
}

/// Multiplies two polynomials stored in the same coefficient order.
pub fn poly_mul(a: &[u8], b: &[u8]) -> Vec<u8> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0u8; a.len() + b.len() - 1];
    for (i, &ac) in a.iter().enumerate() {
        if ac == 0 {
            continue;
        }
        for (j, &bc) in b.iter().enumerate() {
            out[i + j] = add(out[i + j], multiply(ac, bc));
        }
    }
    out
}
