//! Inner encryption layer: the recipients envelope.
//!
//! The bundle is encrypted once under a random content key. That key is then
//! wrapped for every recipient with an AES-256 key derived from the X25519
//! shared secret between the sender and that recipient. The resulting JSON is
//! the plaintext of the outer frame, so the carrier never reveals whether a
//! payload is open or restricted.
//!
//! ```json
//! { "t": "r", "s": "<sender pub hex>",
//!   "r": [ { "p": "<recipient pub hex>", "k": "<base64(iv ++ wrapped key)>" } ],
//!   "c": "<base64(iv ++ ciphertext)>" }
//! ```

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{Result, StegError};
use crate::utils::hmac_utils::derive_wrap_key;

const ENVELOPE_TAG: &str = "r";
const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;

/// Serialized shape of a recipients envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientsEnvelope {
    pub t: String,
    /// Sender public key, hex.
    pub s: String,
    pub r: Vec<RecipientEntry>,
    /// base64(iv ++ ciphertext) of the bundle.
    pub c: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientEntry {
    /// Recipient public key, hex.
    pub p: String,
    /// base64(iv ++ AES-GCM(wrap key, content key)).
    pub k: String,
}

/// A local X25519 key pair.
#[derive(Clone)]
pub struct Identity {
    secret: StaticSecret,
    public: PublicKey,
}

impl Identity {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self::from_secret_bytes(bytes)
    }

    pub fn from_secret_bytes(bytes: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Identity { secret, public }
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        Ok(Self::from_secret_bytes(decode_key_hex(secret_hex)?))
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public.as_bytes())
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    fn wrap_key_with(&self, peer: &PublicKey) -> Result<[u8; KEY_LEN]> {
        let shared = self.secret.diffie_hellman(peer);
        derive_wrap_key(shared.as_bytes())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public", &self.public_hex())
            .finish_non_exhaustive()
    }
}

fn decode_key_hex(key_hex: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = hex::decode(key_hex.trim())
        .map_err(|e| StegError::Format(format!("invalid key hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| StegError::Format(format!("key must be 32 bytes, got {}", b.len())))
}

pub fn parse_public_key_hex(key_hex: &str) -> Result<PublicKey> {
    Ok(PublicKey::from(decode_key_hex(key_hex)?))
}

fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| StegError::Domain(format!("AES key error: {e}")))?;
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| StegError::Domain("plaintext too long for AES-GCM".into()))?;

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt(key: &[u8; KEY_LEN], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < IV_LEN {
        return Err(StegError::Format("sealed value shorter than its IV".into()));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| StegError::Domain(format!("AES key error: {e}")))?;
    let (iv, ciphertext) = sealed.split_at(IV_LEN);
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| StegError::Decryption)
}

fn decode_base64(value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| StegError::Format(format!("invalid base64: {e}")))
}

/// Builds a recipients envelope around `bundle`.
///
/// # Arguments
/// * `bundle` - The application bundle, usually UTF-8 JSON
/// * `sender` - Identity whose public key goes into `s`
/// * `recipients` - Everyone who may open it; include the sender's own key
///   to be able to re-open the embed later
///
/// # Returns
/// * `Ok(json)` ready to be sealed in a frame
/// * `Err(StegError::Domain)` if `recipients` is empty
pub fn seal_for_recipients(
    bundle: &[u8],
    sender: &Identity,
    recipients: &[PublicKey],
) -> Result<Vec<u8>> {
    if recipients.is_empty() {
        return Err(StegError::Domain("at least one recipient is required".into()));
    }

    let mut content_key = [0u8; KEY_LEN];
    rand::rng().fill_bytes(&mut content_key);

    let mut entries = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        let wrap_key = sender.wrap_key_with(recipient)?;
        entries.push(RecipientEntry {
            p: hex::encode(recipient.as_bytes()),
            k: STANDARD.encode(encrypt(&wrap_key, &content_key)?),
        });
    }

    let envelope = RecipientsEnvelope {
        t: ENVELOPE_TAG.to_string(),
        s: sender.public_hex(),
        r: entries,
        c: STANDARD.encode(encrypt(&content_key, bundle)?),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Parses `plaintext` as a recipients envelope.
///
/// # Returns
/// * `Ok(None)` for anything not tagged `"t": "r"`, which is open-mode data
/// * `Ok(Some(envelope))` for a well-formed envelope
/// * `Err(StegError::Format)` for a tagged object with missing or mistyped
///   fields, or an empty recipient list
pub fn parse_envelope(plaintext: &[u8]) -> Result<Option<RecipientsEnvelope>> {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(plaintext) else {
        return Ok(None);
    };
    if value.get("t").and_then(|t| t.as_str()) != Some(ENVELOPE_TAG) {
        return Ok(None);
    }

    let envelope: RecipientsEnvelope = serde_json::from_value(value)
        .map_err(|e| StegError::Format(format!("malformed recipients envelope: {e}")))?;
    if envelope.r.is_empty() {
        return Err(StegError::Format("recipients envelope lists no recipients".into()));
    }
    Ok(Some(envelope))
}

fn open_envelope(envelope: &RecipientsEnvelope, identity: &Identity) -> Result<Vec<u8>> {
    let own_hex = identity.public_hex();
    let entry = envelope
        .r
        .iter()
        .find(|entry| entry.p.trim().eq_ignore_ascii_case(&own_hex))
        .ok_or(StegError::NotARecipient)?;

    let sender = parse_public_key_hex(&envelope.s)?;
    let wrap_key = identity.wrap_key_with(&sender)?;
    let content_key: [u8; KEY_LEN] = decrypt(&wrap_key, &decode_base64(&entry.k)?)?
        .try_into()
        .map_err(|_| StegError::Format("unwrapped content key has the wrong length".into()))?;

    decrypt(&content_key, &decode_base64(&envelope.c)?)
}

/// Opens the plaintext of an outer frame for one identity.
///
/// Plaintext that is not a recipients envelope is returned unchanged (open
/// mode). An envelope that does not list `identity` fails with
/// `StegError::NotARecipient`.
pub fn open(plaintext: &[u8], identity: &Identity) -> Result<Vec<u8>> {
    match parse_envelope(plaintext)? {
        Some(envelope) => open_envelope(&envelope, identity),
        None => Ok(plaintext.to_vec()),
    }
}

/// Tries each identity in order and returns the first success. When every
/// candidate fails, the last failure is returned.
pub fn open_with_any(plaintext: &[u8], identities: &[Identity]) -> Result<Vec<u8>> {
    let Some(envelope) = parse_envelope(plaintext)? else {
        return Ok(plaintext.to_vec());
    };

    let mut last_error = StegError::NotARecipient;
    for identity in identities {
        match open_envelope(&envelope, identity) {
            Ok(bundle) => return Ok(bundle),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}
