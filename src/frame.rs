//! Outer encryption layer: the Stego Frame.
//!
//! Wire format: `"STEGSTR1" | version (1 byte) | iv (12 bytes) | AES-256-GCM ciphertext + 16-byte tag`.
//! The key is derived once from a fixed label, so any copy of this software
//! can open any frame. The layer hides the payload's structure from the
//! carrier, not its content from other installs.

use std::sync::OnceLock;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Result, StegError};

pub const MAGIC: &[u8; 8] = b"STEGSTR1";
pub const VERSION: u8 = 1;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Bytes a frame adds on top of its plaintext.
pub const OVERHEAD: usize = MAGIC.len() + 1 + IV_LEN + TAG_LEN;

const APP_KEY_LABEL: &[u8] = b"stegstr-decrypt-v1";

/// SHA-256 of the application label, computed on first use.
fn app_key() -> &'static [u8; 32] {
    static KEY: OnceLock<[u8; 32]> = OnceLock::new();
    KEY.get_or_init(|| Sha256::digest(APP_KEY_LABEL).into())
}

fn cipher() -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(app_key())
        .map_err(|e| StegError::Domain(format!("AES key error: {e}")))
}

/// Encrypts `plaintext` under the application key with a fresh nonce.
pub fn seal(plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);

    let ciphertext = cipher()?
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| StegError::Domain("plaintext too long for AES-GCM".into()))?;

    let mut out = Vec::with_capacity(OVERHEAD + plaintext.len());
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Verifies magic and version, then decrypts.
///
/// # Returns
/// * `Err(StegError::Format)` for short input, foreign magic or an unknown
///   version; no decryption is attempted in these cases
/// * `Err(StegError::Decryption)` if the authentication tag does not verify
pub fn open(frame: &[u8]) -> Result<Vec<u8>> {
    if frame.len() < OVERHEAD {
        return Err(StegError::Format(format!(
            "frame of {} bytes is shorter than the {OVERHEAD}-byte minimum",
            frame.len()
        )));
    }
    if !is_stego_frame(frame) {
        return Err(StegError::Format("missing STEGSTR1 magic".into()));
    }
    let version = frame[MAGIC.len()];
    if version != VERSION {
        return Err(StegError::Format(format!("unsupported frame version {version}")));
    }

    let iv_start = MAGIC.len() + 1;
    let iv = &frame[iv_start..iv_start + IV_LEN];
    cipher()?
        .decrypt(Nonce::from_slice(iv), &frame[iv_start + IV_LEN..])
        .map_err(|_| StegError::Decryption)
}

/// True if `bytes` start with the frame magic.
pub fn is_stego_frame(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}
