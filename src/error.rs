use thiserror::Error;

/// The central error type for all operations in the stegstr_engine.
#[derive(Error, Debug)]
pub enum StegError {
    /// Bad magic, unsupported version or a truncated frame: not our data.
    #[error("Format error: {0}")]
    Format(String),

    /// Field or codeword size violation, or caller misuse.
    #[error("Domain error: {0}")]
    Domain(String),

    /// Reed-Solomon exceeded its correction capacity.
    #[error("Uncorrectable error: {0}")]
    Uncorrectable(String),

    #[error("Decryption failed: authentication tag mismatch or wrong key")]
    Decryption,

    #[error("Caller is not a recipient of this envelope")]
    NotARecipient,

    #[error("Payload needs {needed} bytes but the carrier holds only {available}")]
    CapacityExceeded { needed: usize, available: usize },

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// Manually implement PartialEq for StegError
impl PartialEq for StegError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StegError::Format(s1), StegError::Format(s2)) => s1 == s2,
            (StegError::Domain(s1), StegError::Domain(s2)) => s1 == s2,
            (StegError::Uncorrectable(s1), StegError::Uncorrectable(s2)) => s1 == s2,
            (StegError::Decryption, StegError::Decryption) => true,
            (StegError::NotARecipient, StegError::NotARecipient) => true,
            (
                StegError::CapacityExceeded {
                    needed: n1,
                    available: a1,
                },
                StegError::CapacityExceeded {
                    needed: n2,
                    available: a2,
                },
            ) => n1 == n2 && a1 == a2,
            // Foreign errors only compare by variant.
            (StegError::ImageError(_), StegError::ImageError(_)) => true,
            (StegError::IoError(_), StegError::IoError(_)) => true,
            (StegError::Json(_), StegError::Json(_)) => true,
            _ => false,
        }
    }
}

impl StegError {
    /// How far a detect attempt got before failing. Higher means the data was
    /// recognised further along the pipeline.
    pub(crate) fn detect_stage(&self) -> u8 {
        match self {
            StegError::Decryption | StegError::NotARecipient => 3,
            StegError::Format(_) => 2,
            StegError::Uncorrectable(_) => 1,
            _ => 0,
        }
    }
}

/// A centralized result type for our library.
pub type Result<T> = std::result::Result<T, StegError>;
