//! Error types for dashframe-decode.

use crate::sync::CameraAngle;
use thiserror::Error;

/// Result type for decode engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors reported by a [`FrameEngine`](crate::FrameEngine).
///
/// A decode that is torn down on purpose (superseded by a newer target, or the
/// engine disposed) is not an error; it resolves to
/// [`FrameOutcome::Cancelled`](crate::FrameOutcome::Cancelled).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Frame {index} out of range (timeline has {len} frames)")]
    FrameOutOfRange { index: usize, len: usize },

    #[error("No keyframe at or before frame {index}")]
    NoKeyframe { index: usize },

    /// The decoder rejected a frame.
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// The backend could not open or drive a session.
    #[error("Decoder backend error: {0}")]
    Backend(String),
}

/// Errors from the multi-angle coordinator.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No engine attached for angle {0}")]
    UnknownAngle(CameraAngle),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A follower task panicked or was aborted.
    #[error("Follower task for {angle} failed: {reason}")]
    Join { angle: CameraAngle, reason: String },
}
