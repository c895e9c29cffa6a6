//! Human-readable rendering of timelines and telemetry.

use dashframe_media::{ScanStats, TelemetryRecord, Timeline};
use serde::Serialize;

/// Summary printed by `dashframe probe`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeSummary {
    pub codec: String,
    pub width: u16,
    pub height: u16,
    pub timescale: u32,
    pub frames: usize,
    pub keyframes: usize,
    pub max_keyframe_interval_ms: Option<f64>,
    pub duration_ms: f64,
    pub nominal_fps: Option<f64>,
    pub telemetry_samples: usize,
    pub scan: ScanStats,
}

impl ProbeSummary {
    pub fn new(timeline: &Timeline, telemetry_samples: usize) -> Self {
        let config = &timeline.config;
        Self {
            codec: config.codec.clone(),
            width: config.width,
            height: config.height,
            timescale: config.timescale,
            frames: timeline.len(),
            keyframes: timeline.keyframe_indices().len(),
            max_keyframe_interval_ms: timeline.max_keyframe_interval_ms(),
            duration_ms: timeline.duration_ms(),
            nominal_fps: config.nominal_fps(),
            telemetry_samples,
            scan: timeline.scan,
        }
    }
}

/// `12.3 km/h (7.6 mph)` from metres per second.
pub fn format_speed(mps: f32) -> String {
    let mps = f64::from(mps);
    format!("{:.1} km/h ({:.1} mph)", mps * 3.6, mps * 2.237)
}

pub fn format_degrees(value: f64) -> String {
    format!("{:.1}°", value)
}

/// Pedal position reported as a 0..1 fraction.
pub fn format_percent(fraction: f32) -> String {
    format!("{:.0}%", f64::from(fraction) * 100.0)
}

pub fn format_coordinate(value: f64) -> String {
    format!("{:.6}", value)
}

pub fn format_acceleration(value: f64) -> String {
    format!("{:.2} m/s²", value)
}

pub fn format_flag(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// Labelled display values for every field present in `record`.
///
/// Enumerations the build does not know are shown as their raw number.
pub fn telemetry_fields(record: &TelemetryRecord) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();

    if let Some(version) = record.version {
        fields.push(("Version", version.to_string()));
    }
    if let Some(raw) = record.gear_state {
        let label = record
            .gear()
            .map(|gear| gear.label().to_string())
            .unwrap_or_else(|| raw.to_string());
        fields.push(("Gear", label));
    }
    if let Some(seq) = record.frame_seq_no {
        fields.push(("Frame #", seq.to_string()));
    }
    if let Some(speed) = record.vehicle_speed_mps {
        fields.push(("Speed", format_speed(speed)));
    }
    if let Some(pedal) = record.accelerator_pedal_position {
        fields.push(("Accelerator", format_percent(pedal)));
    }
    if let Some(angle) = record.steering_wheel_angle {
        fields.push(("Steering Angle", format_degrees(f64::from(angle))));
    }
    if let Some(on) = record.blinker_on_left {
        fields.push(("Left Blinker", format_flag(on).to_string()));
    }
    if let Some(on) = record.blinker_on_right {
        fields.push(("Right Blinker", format_flag(on).to_string()));
    }
    if let Some(on) = record.brake_applied {
        fields.push(("Brake", format_flag(on).to_string()));
    }
    if let Some(raw) = record.autopilot_state {
        let label = record
            .assist_state()
            .map(|state| state.label().to_string())
            .unwrap_or_else(|| raw.to_string());
        fields.push(("Autopilot", label));
    }
    if let Some(lat) = record.latitude_deg {
        fields.push(("Latitude", format_coordinate(lat)));
    }
    if let Some(lon) = record.longitude_deg {
        fields.push(("Longitude", format_coordinate(lon)));
    }
    if let Some(heading) = record.heading_deg {
        fields.push(("Heading", format_degrees(heading)));
    }
    for (label, axis) in [
        ("Accel X", record.linear_acceleration_mps2_x),
        ("Accel Y", record.linear_acceleration_mps2_y),
        ("Accel Z", record.linear_acceleration_mps2_z),
    ] {
        if let Some(value) = axis {
            fields.push((label, format_acceleration(value)));
        }
    }

    fields
}

/// `1:02.345` style position for a millisecond offset.
pub fn format_position(ms: f64) -> String {
    let total = ms.max(0.0).round() as u64;
    let minutes = total / 60_000;
    let seconds = (total % 60_000) / 1000;
    let millis = total % 1000;
    format!("{}:{:02}.{:03}", minutes, seconds, millis)
}
