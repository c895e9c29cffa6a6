//! # dashframe-decode
//!
//! Frame-accurate decoding of dashcam timelines.
//!
//! A [`FrameEngine`] renders any frame of one camera angle through a pluggable
//! [`DecoderBackend`], caching a window of decoded frames around the scrub
//! position. A [`SyncCoordinator`] keeps several angles on the same moment.
//!
//! ## Example
//!
//! ```ignore
//! use dashframe_decode::{EngineOptions, FrameEngine};
//!
//! let engine = FrameEngine::new(timeline, backend, sink, EngineOptions::default());
//! let index = engine.frame_index_at_time(1500.0);
//! engine.show_frame(index).await?;
//! if let Some(record) = engine.current_telemetry() {
//!     println!("{:?}", record.vehicle_speed_mps);
//! }
//! ```

pub mod cache;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod sync;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cache::FrameCache;
pub use decoder::{
    DecodedFrame, DecoderBackend, DecoderEvent, DecoderOutput, DecoderSession, EncodedChunk,
    FrameSink,
};
pub use engine::{EngineOptions, FrameEngine, FrameOutcome};
pub use error::{EngineError, Result, SyncError};
pub use sync::{CameraAngle, SyncCoordinator, SyncOutcome};
