//! Embedded telemetry decoding.
//!
//! Dashcam recordings carry vehicle telemetry as protobuf messages inside
//! user-data-unregistered SEI units, interleaved with the picture units.

mod record;
mod schema;

pub use record::{AutopilotState, Gear, TelemetryRecord};
pub use schema::TelemetrySchema;

use crate::mp4::locate_media_data;
use crate::nal::{NalScanner, ScanItem};
use crate::Result;
use bytes::Bytes;

/// A decoded record and the frame it arrived with.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct TelemetrySample {
    /// Index of the first frame this record applies to.
    pub frame_index: usize,
    /// The decoded record.
    pub record: TelemetryRecord,
}

/// Remove H.264 emulation-prevention bytes.
///
/// A `0x03` that follows two consecutive `0x00` bytes is dropped.
pub fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0usize;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        out.push(byte);
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }
    out
}

/// Extract every telemetry record from a dashcam file.
///
/// Needs only the `mdat` box, so it works on files whose codec configuration
/// cannot be extracted. Units that fail to decode are skipped.
pub fn extract_telemetry(buf: &Bytes, schema: &TelemetrySchema) -> Result<Vec<TelemetrySample>> {
    let mdat = locate_media_data(buf)?;
    let samples: Vec<TelemetrySample> =
        NalScanner::new(buf.clone(), mdat.content_start, mdat.content_end)
            .filter_map(|item| match item {
                ScanItem::Metadata { frame_index, unit } => {
                    schema.decode_unit(&unit).map(|record| TelemetrySample {
                        frame_index,
                        record,
                    })
                }
                ScanItem::Frame { .. } => None,
            })
            .collect();

    tracing::debug!(records = samples.len(), "Telemetry extraction complete");
    Ok(samples)
}
