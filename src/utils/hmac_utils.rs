use crate::error::{Result, StegError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub type HmacSha256 = Hmac<Sha256>;

pub const WRAP_KEY_LEN: usize = 32;

/// Domain separation label for per-recipient key wrapping.
pub const WRAP_KEY_LABEL: &[u8] = b"stegstr-envelope-wrap-v1";

/// Derives the AES-256 key that wraps a content key for one recipient,
/// as HMAC-SHA256 keyed by the X25519 shared secret over a fixed label.
pub fn derive_wrap_key(shared_secret: &[u8]) -> Result<[u8; WRAP_KEY_LEN]> {
    if shared_secret.is_empty() {
        return Err(StegError::Domain("Shared secret must not be empty".into()));
    }
    if shared_secret.iter().all(|&b| b == 0) {
        // Low-order peer key: the exchange contributed nothing.
        return Err(StegError::Domain("Degenerate shared secret".into()));
    }

    let mut mac = HmacSha256::new_from_slice(shared_secret)
        .map_err(|e| StegError::Domain(format!("HMAC key error: {}", e)))?;
    mac.update(WRAP_KEY_LABEL);
    Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_derive_is_deterministic() {
        let secret = [7u8; 32];
        assert_eq!(derive_wrap_key(&secret).unwrap(), derive_wrap_key(&secret).unwrap());
    }

    #[test]
    fn test_different_secrets_give_different_keys() {
        let a = derive_wrap_key(&[1u8; 32]).unwrap();
        let b = derive_wrap_key(&[2u8; 32]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_and_zero_secret_fail() {
        assert!(derive_wrap_key(b"").is_err());
        assert!(derive_wrap_key(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_wrap_key_known_answer() {
        assert_eq!(
            derive_wrap_key(&[7u8; 32]).unwrap(),
            hex!("268ca5e54fbe33645c2610b04e4168e33a417ba00e295b9d4367f766f6050e36")
        );
    }

    #[test]
    fn test_matches_manual_hmac() {
        let secret = hex!("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
        let mut mac = HmacSha256::new_from_slice(&secret).unwrap();
        mac.update(WRAP_KEY_LABEL);
        let expected = mac.finalize().into_bytes();
        assert_eq!(derive_wrap_key(&secret).unwrap().as_slice(), expected.as_slice());
    }

    //https://datatracker.ietf.org/doc/html/rfc4231#section-4.2
    #[test]
    fn test_rfc4231_case1_known_answer() {
        let key = hex!("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
        let expected = hex!("b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7");

        let mut mac = HmacSha256::new_from_slice(&key).unwrap();
        mac.update(b"Hi There");
        let result = mac.finalize().into_bytes();

        assert_eq!(result.as_slice(), expected);
    }
}
