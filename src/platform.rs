//! Target platforms and the pre-resize policy of the frequency-domain codec.
//!
//! Social platforms downscale uploads to a fixed maximum width before they
//! re-encode. Embedding after the same downscale means the coefficients that
//! carry the payload are the ones the platform's own transform keeps.

use std::fmt;
use std::str::FromStr;

use image::RgbaImage;
use image::imageops::{self, FilterType};
use log::debug;

use crate::error::StegError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Instagram,
    Facebook,
    Twitter,
    WhatsappStandard,
    WhatsappHd,
    TelegramPhoto,
    Imessage,
    /// Unknown destination: assume the most common width.
    Generic,
    /// Embed at the cover's own size.
    NoResize,
}

impl Platform {
    pub const ALL: [Platform; 9] = [
        Platform::Instagram,
        Platform::Facebook,
        Platform::Twitter,
        Platform::WhatsappStandard,
        Platform::WhatsappHd,
        Platform::TelegramPhoto,
        Platform::Imessage,
        Platform::Generic,
        Platform::NoResize,
    ];

    /// Widest image the platform keeps, in pixels.
    pub fn max_width(self) -> Option<u32> {
        match self {
            Platform::Instagram => Some(1080),
            Platform::Facebook => Some(2048),
            Platform::Twitter => Some(1600),
            Platform::WhatsappStandard => Some(1600),
            Platform::WhatsappHd => Some(4096),
            Platform::TelegramPhoto => Some(1920),
            Platform::Imessage => Some(1280),
            Platform::Generic => Some(1080),
            Platform::NoResize => None,
        }
    }

    /// JPEG quality the platform re-encodes uploads at.
    pub fn recompress_quality(self) -> u8 {
        match self {
            Platform::WhatsappStandard => 65,
            Platform::Instagram | Platform::Twitter => 82,
            Platform::Facebook => 77,
            _ => 85,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Twitter => "twitter",
            Platform::WhatsappStandard => "whatsapp_standard",
            Platform::WhatsappHd => "whatsapp_hd",
            Platform::TelegramPhoto => "telegram_photo",
            Platform::Imessage => "imessage",
            Platform::Generic => "generic",
            Platform::NoResize => "none",
        }
    }

    /// Dimensions a `width` x `height` cover will have after [`resize_cover_for_platform`].
    pub fn target_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        match self.max_width() {
            Some(max) if width > max => {
                let scaled = (height as u64 * max as u64 + width as u64 / 2) / width as u64;
                (max, (scaled as u32).max(1))
            }
            _ => (width, height),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = StegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            "twitter" | "x" => Ok(Platform::Twitter),
            "whatsapp" | "whatsapp_standard" => Ok(Platform::WhatsappStandard),
            "whatsapp_hd" => Ok(Platform::WhatsappHd),
            "telegram" | "telegram_photo" => Ok(Platform::TelegramPhoto),
            "imessage" => Ok(Platform::Imessage),
            "generic" | "" => Ok(Platform::Generic),
            "none" => Ok(Platform::NoResize),
            other => Err(StegError::Domain(format!("unknown platform '{other}'"))),
        }
    }
}

/// Downsizes `image` to the platform's maximum width, keeping the aspect
/// ratio. Never upsizes. Returns a new image either way.
pub fn resize_cover_for_platform(image: &RgbaImage, platform: Platform) -> RgbaImage {
    let (width, height) = image.dimensions();
    let (target_w, target_h) = platform.target_dimensions(width, height);
    if (target_w, target_h) == (width, height) {
        return image.clone();
    }
    debug!("resizing cover {width}x{height} -> {target_w}x{target_h} for {platform}");
    imageops::resize(image, target_w, target_h, FilterType::Lanczos3)
}
