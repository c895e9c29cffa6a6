use dashframe_decode::EngineOptions;
use dashframe_media::TelemetrySchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Decode engine settings.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            cache_capacity: self.engine.cache_capacity,
            lookahead: self.engine.lookahead,
        }
    }

    /// Telemetry framing shared by every camera angle.
    pub fn telemetry_schema(&self) -> TelemetrySchema {
        TelemetrySchema::with_markers(
            self.telemetry.padding_marker,
            self.telemetry.payload_marker,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Decoded frames kept in memory per angle
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Frames decoded past the requested one
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,
}

fn default_cache_capacity() -> usize {
    EngineOptions::DEFAULT_CACHE_CAPACITY
}
fn default_lookahead() -> usize {
    EngineOptions::DEFAULT_LOOKAHEAD
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            lookahead: default_lookahead(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Byte repeated between the SEI header and the payload marker
    #[serde(default = "default_padding_marker")]
    pub padding_marker: u8,

    /// Byte that opens the protobuf payload
    #[serde(default = "default_payload_marker")]
    pub payload_marker: u8,
}

fn default_padding_marker() -> u8 {
    TelemetrySchema::DASHCAM_PADDING
}
fn default_payload_marker() -> u8 {
    TelemetrySchema::DASHCAM_PAYLOAD_START
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            padding_marker: default_padding_marker(),
            payload_marker: default_payload_marker(),
        }
    }
}
