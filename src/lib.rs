//! Stegstr engine: hides an encrypted bundle inside an ordinary image.
//!
//! Two codecs share one transport and one frame format:
//! - [`Method::Qim`] modulates mid-frequency luma DCT coefficients and survives
//!   the JPEG re-encode social platforms apply to uploads.
//! - [`Method::Dot`] writes pixel LSBs and only survives lossless carriers.
//!
//! Every payload is sealed in a [`frame`] before embedding. Payloads restricted
//! to named recipients are first wrapped in an [`envelope`].

use std::fmt;
use std::str::FromStr;

use image::RgbaImage;
use log::debug;
use x25519_dalek::PublicKey;

pub mod dct;
pub mod dot;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod gf256;
pub mod image_handler;
pub mod platform;
pub mod qim;
pub mod reed_solomon;
pub mod utils;

pub use envelope::Identity;
pub use error::{Result, StegError};
pub use platform::Platform;

/// Embedding codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// DCT-domain quantization index modulation, robust to recompression.
    #[default]
    Qim,
    /// Pixel LSBs, lossless carriers only.
    Dot,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Qim => "qim",
            Method::Dot => "dot",
        })
    }
}

impl FromStr for Method {
    type Err = StegError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qim" | "dct" => Ok(Method::Qim),
            "dot" | "lsb" => Ok(Method::Dot),
            other => Err(StegError::Domain(format!("unknown method '{other}'"))),
        }
    }
}

/// Per-call embedding options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmbedOptions {
    pub method: Method,
    /// Destination platform for QIM pre-resize. `None` means [`Platform::Generic`].
    /// Ignored by the dot codec.
    pub platform: Option<Platform>,
}

impl EmbedOptions {
    fn platform(&self) -> Platform {
        self.platform.unwrap_or(Platform::Generic)
    }
}

/// Result of a successful embed.
#[derive(Debug, Clone)]
pub struct Embedded {
    pub image: RgbaImage,
    /// Whether the in-memory round trip reproduced the payload. When false the
    /// image is still valid but the payload may not be recoverable.
    pub verified: bool,
}

/// Largest plaintext, in bytes, that [`embed`] accepts for this cover.
pub fn capacity(cover: &RgbaImage, options: &EmbedOptions) -> usize {
    let frame_capacity = match options.method {
        Method::Qim => qim::capacity(cover, options.platform()),
        Method::Dot => dot::capacity(cover),
    };
    frame_capacity.saturating_sub(frame::OVERHEAD)
}

/// Seals `payload` in a frame and embeds it into a copy of `cover`.
///
/// # Returns
/// * `Ok(Embedded)` with the stego image; check `verified`
/// * `Err(StegError::CapacityExceeded)` before any pixel work if the payload
///   is larger than [`capacity`]
pub fn embed(cover: &RgbaImage, payload: &[u8], options: &EmbedOptions) -> Result<Embedded> {
    let available = capacity(cover, options);
    if payload.len() > available {
        return Err(StegError::CapacityExceeded {
            needed: payload.len(),
            available,
        });
    }

    let sealed = frame::seal(payload)?;
    match options.method {
        Method::Qim => qim::embed(cover, &sealed, options.platform()),
        Method::Dot => dot::embed(cover, &sealed),
    }
}

/// Recovers and decrypts the payload of a stego image, trying each codec.
///
/// On failure the error from the codec that got furthest is returned:
/// decryption beats format, which beats an uncorrectable transport.
pub fn detect(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut best: Option<StegError> = None;
    for method in [Method::Dot, Method::Qim] {
        let attempt = match method {
            Method::Dot => dot::extract(image),
            Method::Qim => qim::extract(image),
        }
        .and_then(|sealed| frame::open(&sealed));

        match attempt {
            Ok(payload) => {
                debug!("detected {method} payload of {} bytes", payload.len());
                return Ok(payload);
            }
            Err(e) => {
                debug!("{method} detect failed: {e}");
                if best.as_ref().is_none_or(|b| e.detect_stage() > b.detect_stage()) {
                    best = Some(e);
                }
            }
        }
    }
    Err(best.unwrap_or_else(|| StegError::Format("no codec recognised the image".into())))
}

/// Embeds `bundle` readable only by `recipients`.
pub fn embed_for_recipients(
    cover: &RgbaImage,
    bundle: &[u8],
    sender: &Identity,
    recipients: &[PublicKey],
    options: &EmbedOptions,
) -> Result<Embedded> {
    let sealed = envelope::seal_for_recipients(bundle, sender, recipients)?;
    embed(cover, &sealed, options)
}

/// Detects and opens a payload with the caller's identities. Open-mode
/// payloads are returned as they are.
pub fn detect_as(image: &RgbaImage, identities: &[Identity]) -> Result<Vec<u8>> {
    let plaintext = detect(image)?;
    envelope::open_with_any(&plaintext, identities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn flat_cover(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let v = 90 + ((x * 3 + y * 5) % 60) as u8;
            Rgba([v, v + 5, v - 10, 255])
        })
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("QIM".parse::<Method>().unwrap(), Method::Qim);
        assert_eq!("lsb".parse::<Method>().unwrap(), Method::Dot);
        assert!("png".parse::<Method>().is_err());
        assert_eq!(EmbedOptions::default().method, Method::Qim);
    }

    #[test]
    fn test_capacity_subtracts_frame_overhead() {
        let cover = flat_cover(64, 64);
        let options = EmbedOptions {
            method: Method::Dot,
            platform: None,
        };
        assert_eq!(capacity(&cover, &options), dot::capacity(&cover) - frame::OVERHEAD);
        // Too small for any QIM packet.
        assert_eq!(capacity(&cover, &EmbedOptions::default()), 0);
    }

    #[test]
    fn test_dot_round_trip() {
        let cover = flat_cover(48, 48);
        let options = EmbedOptions {
            method: Method::Dot,
            platform: None,
        };
        let payload = b"open mode payload".to_vec();
        let embedded = embed(&cover, &payload, &options).unwrap();
        assert!(embedded.verified);
        assert_eq!(detect(&embedded.image).unwrap(), payload);
    }

    #[test]
    fn test_detect_on_unmarked_image_fails() {
        let cover = flat_cover(64, 64);
        let result = detect(&cover);
        assert!(result.is_err());
        assert!(!matches!(result, Err(StegError::Decryption)));
    }
}
