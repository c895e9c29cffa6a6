//! Error types for dashframe-media.

use crate::mp4::FourCc;
use thiserror::Error;

/// Result type for dashframe-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for dashframe-media operations.
///
/// Parsing errors are scoped to the smallest structure that failed: a single
/// box walk, a single configuration lookup. Telemetry decoding never produces
/// an error; a unit that cannot be decoded simply yields no record.
#[derive(Debug, Error)]
pub enum Error {
    /// A box walk could not make progress (declared size smaller than its header).
    #[error("Malformed {context} at offset {offset}: {reason}")]
    Malformed {
        /// What was being parsed.
        context: &'static str,
        /// Byte offset of the offending structure.
        offset: usize,
        /// Human-readable description.
        reason: String,
    },

    /// The requested box is not present in the searched range.
    #[error("Box \"{atom}\" not found")]
    NotFound { atom: FourCc },

    /// A box required to configure a decoder is missing.
    ///
    /// Frame-accurate decoding is unavailable for the file; continuous playback
    /// and telemetry extraction are unaffected.
    #[error("Codec configuration incomplete: missing \"{atom}\"")]
    ConfigNotFound { atom: FourCc },

    /// Buffer too small for a read.
    #[error("Buffer underflow: need {need} bytes, have {have}")]
    BufferUnderflow { need: usize, have: usize },
}

impl Error {
    /// Create a malformed-structure error.
    pub fn malformed(context: &'static str, offset: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            context,
            offset,
            reason: reason.into(),
        }
    }

    /// Map a navigator `NotFound` into the configuration-level error.
    ///
    /// Other errors pass through unchanged.
    pub fn into_config_error(self) -> Self {
        match self {
            Self::NotFound { atom } => Self::ConfigNotFound { atom },
            other => other,
        }
    }
}
