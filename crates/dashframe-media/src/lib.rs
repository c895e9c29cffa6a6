//! # dashframe-media
//!
//! Parsing for dashcam MP4 recordings: box navigation, video codec
//! configuration, H.264 unit scanning, embedded telemetry and the per-file
//! frame timeline the decode engine works from.
//!
//! Everything operates on a fully loaded, immutable buffer. Parsed payloads are
//! zero-copy slices of that buffer.
//!
//! ## Example
//!
//! ```no_run
//! use dashframe_media::{Timeline, TelemetrySchema};
//!
//! let data = bytes::Bytes::from(std::fs::read("front.mp4").unwrap());
//! let timeline = Timeline::build(data, &TelemetrySchema::dashcam()).unwrap();
//! println!("{} frames, {:.1} ms", timeline.len(), timeline.duration_ms());
//! ```

pub mod error;
pub mod mp4;
pub mod nal;
pub mod sei;
pub mod timeline;

#[cfg(any(test, feature = "test-util"))]
pub mod fixture;

pub use error::{Error, Result};
pub use mp4::{find_box, BoxRange, CodecConfig, FourCc, ParameterSets};
pub use nal::{NalKind, NalScanner, ScanItem, ScanStats};
pub use sei::{
    extract_telemetry, strip_emulation_prevention, AutopilotState, Gear, TelemetryRecord,
    TelemetrySample, TelemetrySchema,
};
pub use timeline::{FrameDescriptor, Timeline};
