//! Telemetry record carried in dashcam SEI payloads.
//!
//! Mirrors the recorder's `SeiMetadata` protobuf message. Every field is
//! optional: proto3 omits default values on the wire, so a missing field means
//! "zero or not reported".

/// Vehicle signals at one point in time.
#[derive(Clone, PartialEq, prost::Message)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct TelemetryRecord {
    #[prost(uint32, optional, tag = "1")]
    pub version: Option<u32>,
    #[prost(enumeration = "Gear", optional, tag = "2")]
    pub gear_state: Option<i32>,
    #[prost(uint64, optional, tag = "3")]
    pub frame_seq_no: Option<u64>,
    #[prost(float, optional, tag = "4")]
    pub vehicle_speed_mps: Option<f32>,
    #[prost(float, optional, tag = "5")]
    pub accelerator_pedal_position: Option<f32>,
    #[prost(float, optional, tag = "6")]
    pub steering_wheel_angle: Option<f32>,
    #[prost(bool, optional, tag = "7")]
    pub blinker_on_left: Option<bool>,
    #[prost(bool, optional, tag = "8")]
    pub blinker_on_right: Option<bool>,
    #[prost(bool, optional, tag = "9")]
    pub brake_applied: Option<bool>,
    #[prost(enumeration = "AutopilotState", optional, tag = "10")]
    pub autopilot_state: Option<i32>,
    #[prost(double, optional, tag = "11")]
    pub latitude_deg: Option<f64>,
    #[prost(double, optional, tag = "12")]
    pub longitude_deg: Option<f64>,
    #[prost(double, optional, tag = "13")]
    pub heading_deg: Option<f64>,
    #[prost(double, optional, tag = "14")]
    pub linear_acceleration_mps2_x: Option<f64>,
    #[prost(double, optional, tag = "15")]
    pub linear_acceleration_mps2_y: Option<f64>,
    #[prost(double, optional, tag = "16")]
    pub linear_acceleration_mps2_z: Option<f64>,
}

/// Transmission state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[repr(i32)]
pub enum Gear {
    Park = 0,
    Drive = 1,
    Reverse = 2,
    Neutral = 3,
}

impl Gear {
    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Park => "Park",
            Self::Drive => "Drive",
            Self::Reverse => "Reverse",
            Self::Neutral => "Neutral",
        }
    }
}

/// Driver-assistance state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[repr(i32)]
pub enum AutopilotState {
    None = 0,
    SelfDriving = 1,
    Autosteer = 2,
    Tacc = 3,
}

impl AutopilotState {
    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::SelfDriving => "Self-Driving",
            Self::Autosteer => "Autosteer",
            Self::Tacc => "TACC",
        }
    }
}

impl TelemetryRecord {
    /// Gear as a typed value; `None` when absent or unknown to this build.
    pub fn gear(&self) -> Option<Gear> {
        self.gear_state.and_then(|g| Gear::try_from(g).ok())
    }

    /// Assistance state as a typed value; `None` when absent or unknown.
    pub fn assist_state(&self) -> Option<AutopilotState> {
        self.autopilot_state
            .and_then(|s| AutopilotState::try_from(s).ok())
    }

    /// GPS position as `(latitude, longitude)` when both are present.
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.latitude_deg?, self.longitude_deg?))
    }

    /// Linear acceleration `(x, y, z)` with absent axes reported as zero.
    pub fn acceleration(&self) -> [f64; 3] {
        [
            self.linear_acceleration_mps2_x.unwrap_or_default(),
            self.linear_acceleration_mps2_y.unwrap_or_default(),
            self.linear_acceleration_mps2_z.unwrap_or_default(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_typed_accessors() {
        let record = TelemetryRecord {
            gear_state: Some(Gear::Reverse as i32),
            autopilot_state: Some(42),
            latitude_deg: Some(37.4),
            linear_acceleration_mps2_y: Some(-1.5),
            ..Default::default()
        };
        assert_eq!(record.gear(), Some(Gear::Reverse));
        assert_eq!(record.assist_state(), None);
        assert_eq!(record.position(), None);
        assert_eq!(record.acceleration(), [0.0, -1.5, 0.0]);
    }

    #[test]
    fn test_wire_format_matches_field_tags() {
        let record = TelemetryRecord {
            vehicle_speed_mps: Some(10.0),
            brake_applied: Some(true),
            ..Default::default()
        };
        let bytes = record.encode_to_vec();
        // field 4, wire type 5 (fixed32)
        assert_eq!(bytes[0], 0x25);
        assert_eq!(TelemetryRecord::decode(bytes.as_slice()).unwrap(), record);
    }
}
