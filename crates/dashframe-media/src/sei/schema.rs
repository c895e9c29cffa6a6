//! Framing of telemetry payloads inside user-data SEI units.

use super::{strip_emulation_prevention, TelemetryRecord};
use prost::Message;

/// Unit header byte, payloadType byte and payload size byte.
const FIXED_PREFIX_LEN: usize = 3;

/// How telemetry is framed and decoded.
///
/// The recorder pads the start of each payload with a run of a fixed marker
/// byte and then writes a single payload-start byte before the protobuf
/// message. This is a vendor convention, not the H.264 `payloadSize` coding.
///
/// A schema is built once and shared read-only across every camera angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySchema {
    padding_marker: u8,
    payload_marker: u8,
}

impl TelemetrySchema {
    /// Padding byte written by the recorder.
    pub const DASHCAM_PADDING: u8 = 0x42;
    /// Payload-start byte written by the recorder.
    pub const DASHCAM_PAYLOAD_START: u8 = 0x69;

    /// Framing used by the vehicle's recorder.
    pub const fn dashcam() -> Self {
        Self {
            padding_marker: Self::DASHCAM_PADDING,
            payload_marker: Self::DASHCAM_PAYLOAD_START,
        }
    }

    /// Schema with custom marker bytes.
    pub const fn with_markers(padding_marker: u8, payload_marker: u8) -> Self {
        Self {
            padding_marker,
            payload_marker,
        }
    }

    pub fn padding_marker(&self) -> u8 {
        self.padding_marker
    }

    pub fn payload_marker(&self) -> u8 {
        self.payload_marker
    }

    /// Decode one user-data SEI unit (without its length prefix).
    ///
    /// Returns `None` for anything that does not carry a well-formed record;
    /// a corrupt payload must never interrupt a scan.
    pub fn decode_unit(&self, unit: &[u8]) -> Option<TelemetryRecord> {
        if unit.len() < FIXED_PREFIX_LEN + 1 {
            return None;
        }

        let mut i = FIXED_PREFIX_LEN;
        while i < unit.len() && unit[i] == self.padding_marker {
            i += 1;
        }

        if i == FIXED_PREFIX_LEN || i + 1 >= unit.len() || unit[i] != self.payload_marker {
            tracing::trace!(len = unit.len(), "SEI unit has no telemetry framing");
            return None;
        }

        // The last byte is the RBSP stop bit
        let payload = strip_emulation_prevention(&unit[i + 1..unit.len() - 1]);
        match TelemetryRecord::decode(payload.as_slice()) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, len = payload.len(), "Telemetry payload did not decode");
                None
            }
        }
    }
}

impl Default for TelemetrySchema {
    fn default() -> Self {
        Self::dashcam()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::sei_unit;

    fn record(speed: f32) -> TelemetryRecord {
        TelemetryRecord {
            vehicle_speed_mps: Some(speed),
            gear_state: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_framed_unit() {
        let unit = sei_unit(&record(12.5));
        let decoded = TelemetrySchema::dashcam().decode_unit(&unit).unwrap();
        assert_eq!(decoded.vehicle_speed_mps, Some(12.5));
        assert_eq!(decoded.gear_state, Some(1));
    }

    #[test]
    fn test_missing_padding_yields_none() {
        let mut unit = vec![0x06, 0x05, 0x10, 0x69];
        unit.extend(prost::Message::encode_to_vec(&record(1.0)));
        unit.push(0x80);
        assert!(TelemetrySchema::dashcam().decode_unit(&unit).is_none());
    }

    #[test]
    fn test_wrong_payload_marker_yields_none() {
        let unit = vec![0x06, 0x05, 0x10, 0x42, 0x42, 0x70, 0x25, 0x00, 0x80];
        assert!(TelemetrySchema::dashcam().decode_unit(&unit).is_none());
    }

    #[test]
    fn test_corrupt_payload_yields_none() {
        // Field 4 fixed32 with only two bytes of value
        let unit = vec![0x06, 0x05, 0x10, 0x42, 0x69, 0x25, 0x01, 0x02, 0x80];
        assert!(TelemetrySchema::dashcam().decode_unit(&unit).is_none());
    }

    #[test]
    fn test_short_unit_yields_none() {
        assert!(TelemetrySchema::dashcam().decode_unit(&[0x06, 0x05]).is_none());
    }

    #[test]
    fn test_custom_markers() {
        let schema = TelemetrySchema::with_markers(0x11, 0x22);
        let mut unit = vec![0x06, 0x05, 0x10, 0x11, 0x11, 0x22];
        unit.extend(prost::Message::encode_to_vec(&record(3.0)));
        unit.push(0x80);
        assert_eq!(schema.decode_unit(&unit).unwrap().vehicle_speed_mps, Some(3.0));
        assert!(TelemetrySchema::dashcam().decode_unit(&unit).is_none());
    }
}
