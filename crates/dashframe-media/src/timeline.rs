//! Frame timeline construction.
//!
//! A timeline is the ordered list of pictures in one camera file with their
//! presentation times and the telemetry in effect at each of them. It is built
//! once per loaded file and never mutated; a reload builds a new one.
//!
//! Decode order is assumed to equal presentation order. The recorder's
//! encoder profile emits no B-frames, so timestamps are a running sum of the
//! `stts` durations. The sum is kept in timescale ticks so that frame times
//! land exactly on the millisecond values a constant frame rate implies.

use crate::mp4::{locate_media_data, CodecConfig, ParameterSets};
use crate::nal::{NalScanner, ScanItem, ScanStats};
use crate::sei::{TelemetryRecord, TelemetrySchema};
use crate::Result;
use bytes::Bytes;
use std::sync::Arc;

/// One picture of the timeline.
#[derive(Debug, Clone)]
pub struct FrameDescriptor {
    /// Position in presentation order (contiguous from 0).
    pub index: usize,
    /// Presentation time in milliseconds from the start of the file.
    pub timestamp_ms: f64,
    /// Display duration in milliseconds.
    pub duration_ms: f64,
    /// Whether this picture is an IDR keyframe.
    pub is_keyframe: bool,
    /// The picture's NAL unit, without its length prefix.
    pub payload: Bytes,
    /// Parameter sets to send ahead of this picture (keyframes only).
    pub parameter_sets: Option<Arc<ParameterSets>>,
    /// Telemetry in effect at this picture.
    pub telemetry: Option<Arc<TelemetryRecord>>,
}

/// Immutable per-file frame timeline.
#[derive(Debug, Clone)]
pub struct Timeline {
    /// Codec configuration of the video track.
    pub config: Arc<CodecConfig>,
    /// All pictures in presentation order.
    pub frames: Vec<FrameDescriptor>,
    /// What the scanner saw while building.
    pub scan: ScanStats,
}

impl Timeline {
    /// Parse a dashcam file into a timeline.
    pub fn build(buf: Bytes, schema: &TelemetrySchema) -> Result<Self> {
        let config = CodecConfig::extract(&buf)?;
        Self::from_parts(Arc::new(config), buf, schema)
    }

    /// Build a timeline from an already extracted codec configuration.
    pub fn from_parts(config: Arc<CodecConfig>, buf: Bytes, schema: &TelemetrySchema) -> Result<Self> {
        let mdat = locate_media_data(&buf)?;
        let mut scanner = NalScanner::new(buf, mdat.content_start, mdat.content_end);

        let mut frames = Vec::with_capacity(config.sample_durations_ms.len());
        let mut elapsed_ticks = 0u64;
        let mut current_telemetry: Option<Arc<TelemetryRecord>> = None;

        for item in scanner.by_ref() {
            match item {
                ScanItem::Metadata { unit, .. } => {
                    if let Some(record) = schema.decode_unit(&unit) {
                        current_telemetry = Some(Arc::new(record));
                    }
                }
                ScanItem::Frame {
                    index,
                    keyframe,
                    payload,
                } => {
                    let ticks = config.sample_ticks(index);
                    frames.push(FrameDescriptor {
                        index,
                        timestamp_ms: config.ticks_to_ms(elapsed_ticks),
                        duration_ms: config.ticks_to_ms(ticks),
                        is_keyframe: keyframe,
                        payload,
                        parameter_sets: keyframe.then(|| Arc::clone(&config.parameter_sets)),
                        telemetry: current_telemetry.clone(),
                    });
                    elapsed_ticks += ticks;
                }
            }
        }

        let scan = scanner.stats();
        if scan.frames != config.sample_durations_ms.len() {
            tracing::warn!(
                frames = scan.frames,
                samples = config.sample_durations_ms.len(),
                "Bitstream frame count differs from stts sample count"
            );
        }

        tracing::debug!(
            frames = frames.len(),
            keyframes = scan.keyframes,
            telemetry_units = scan.metadata_units,
            duration_ms = config.ticks_to_ms(elapsed_ticks),
            "Built timeline"
        );

        Ok(Self {
            config,
            frames,
            scan,
        })
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the timeline has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Get a frame by index.
    pub fn get(&self, index: usize) -> Option<&FrameDescriptor> {
        self.frames.get(index)
    }

    /// Total duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.frames
            .last()
            .map(|f| f.timestamp_ms + f.duration_ms)
            .unwrap_or(0.0)
    }

    /// Index of the frame shown at `time_ms`.
    ///
    /// That is the last frame whose timestamp is at or before `time_ms`; times
    /// before the first frame map to 0, as does an empty timeline.
    pub fn frame_index_at(&self, time_ms: f64) -> usize {
        self.frames
            .partition_point(|f| f.timestamp_ms <= time_ms)
            .saturating_sub(1)
    }

    /// The keyframe a decode of `index` must start from.
    pub fn governing_keyframe(&self, index: usize) -> Option<usize> {
        let last = index.min(self.frames.len().checked_sub(1)?);
        self.frames[..=last].iter().rposition(|f| f.is_keyframe)
    }

    /// Telemetry in effect at `index`.
    pub fn telemetry_at(&self, index: usize) -> Option<&Arc<TelemetryRecord>> {
        self.frames.get(index)?.telemetry.as_ref()
    }

    /// Indices of all keyframes.
    pub fn keyframe_indices(&self) -> Vec<usize> {
        self.frames
            .iter()
            .filter(|f| f.is_keyframe)
            .map(|f| f.index)
            .collect()
    }

    /// Largest gap between consecutive keyframes, in milliseconds.
    ///
    /// Returns `None` with fewer than two keyframes.
    pub fn max_keyframe_interval_ms(&self) -> Option<f64> {
        let keyframe_times: Vec<f64> = self
            .frames
            .iter()
            .filter(|f| f.is_keyframe)
            .map(|f| f.timestamp_ms)
            .collect();

        keyframe_times
            .windows(2)
            .map(|w| w[1] - w[0])
            .max_by(|a, b| a.total_cmp(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::DashcamFileBuilder;

    fn speed(v: f32) -> TelemetryRecord {
        TelemetryRecord {
            vehicle_speed_mps: Some(v),
            ..Default::default()
        }
    }

    fn scenario() -> Timeline {
        let file = DashcamFileBuilder::new()
            .frames(90)
            .keyframe_interval(30)
            .timescale(30000)
            .frame_duration(1000)
            .telemetry_at(0, speed(10.0))
            .telemetry_at(45, speed(20.0))
            .build();
        Timeline::build(file, &TelemetrySchema::dashcam()).unwrap()
    }

    #[test]
    fn test_frame_count_and_timestamps() {
        let timeline = scenario();
        assert_eq!(timeline.len(), 90);
        assert_eq!(timeline.scan.frames, 90);

        let mut expected = 0.0;
        for (i, frame) in timeline.frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert!((frame.timestamp_ms - expected).abs() < 1e-6);
            expected += timeline.config.sample_durations_ms[i];
        }
        assert!((timeline.duration_ms() - 3000.0).abs() < 1e-6);
    }

    #[test]
    fn test_frame_index_at_round_trip() {
        let timeline = scenario();
        for frame in &timeline.frames {
            assert_eq!(timeline.frame_index_at(frame.timestamp_ms), frame.index);
        }
        assert_eq!(timeline.frame_index_at(1500.0), 45);
        assert_eq!(timeline.frame_index_at(-5.0), 0);
        assert_eq!(timeline.frame_index_at(1e9), 89);
    }

    #[test]
    fn test_keyframes_and_parameter_sets() {
        let timeline = scenario();
        assert_eq!(timeline.keyframe_indices(), vec![0, 30, 60]);
        assert!(timeline.frames[30].parameter_sets.is_some());
        assert!(timeline.frames[31].parameter_sets.is_none());
        assert_eq!(timeline.governing_keyframe(29), Some(0));
        assert_eq!(timeline.governing_keyframe(30), Some(30));
        assert_eq!(timeline.governing_keyframe(80), Some(60));
        assert_eq!(timeline.governing_keyframe(500), Some(60));
        assert!((timeline.max_keyframe_interval_ms().unwrap() - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_telemetry_is_sticky_forward() {
        let timeline = scenario();
        for i in 0..45 {
            assert_eq!(timeline.telemetry_at(i).unwrap().vehicle_speed_mps, Some(10.0));
        }
        for i in 45..90 {
            assert_eq!(timeline.telemetry_at(i).unwrap().vehicle_speed_mps, Some(20.0));
        }
    }

    #[test]
    fn test_telemetry_absent_until_first_record() {
        let file = DashcamFileBuilder::new()
            .frames(10)
            .telemetry_at(4, speed(5.0))
            .build();
        let timeline = Timeline::build(file, &TelemetrySchema::dashcam()).unwrap();
        assert!(timeline.telemetry_at(3).is_none());
        assert!(timeline.telemetry_at(4).is_some());
        assert!(timeline.telemetry_at(9).is_some());
    }

    #[test]
    fn test_corrupt_telemetry_keeps_previous_record() {
        let file = DashcamFileBuilder::new()
            .frames(10)
            .telemetry_at(0, speed(5.0))
            .raw_unit_at(5, vec![0x06, 0x05, 0x04, 0x42, 0x69, 0x25, 0x01, 0x80])
            .build();
        let timeline = Timeline::build(file, &TelemetrySchema::dashcam()).unwrap();
        assert_eq!(timeline.scan.metadata_units, 2);
        assert_eq!(timeline.telemetry_at(7).unwrap().vehicle_speed_mps, Some(5.0));
    }

    #[test]
    fn test_malformed_length_recovers_following_frames() {
        let file = DashcamFileBuilder::new()
            .frames(12)
            .keyframe_interval(6)
            .degenerate_prefix_at(4)
            .build();
        let timeline = Timeline::build(file, &TelemetrySchema::dashcam()).unwrap();
        assert_eq!(timeline.len(), 12);
        assert_eq!(timeline.scan.skipped, 1);
        assert_eq!(timeline.keyframe_indices(), vec![0, 6]);
    }

    #[test]
    fn test_empty_timeline_lookups() {
        let file = DashcamFileBuilder::new().frames(0).build();
        let timeline = Timeline::build(file, &TelemetrySchema::dashcam()).unwrap();
        assert!(timeline.is_empty());
        assert_eq!(timeline.frame_index_at(100.0), 0);
        assert_eq!(timeline.governing_keyframe(0), None);
        assert_eq!(timeline.duration_ms(), 0.0);
        assert!(timeline.max_keyframe_interval_ms().is_none());
    }
}
