//! Video codec configuration extraction.
//!
//! Walks `moov` down to the video track's sample table and pulls out everything
//! a decoder session needs: the codec string, coded dimensions, SPS/PPS lists,
//! the media timescale and per-sample durations from `stts`.

use super::atoms::{be_u16, be_u32, byte_at, find_box, BoxRange, Boxes, FourCc};
use crate::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;

/// Size of the fixed VisualSampleEntry header that precedes child boxes.
///
/// reserved(6) + data_reference_index(2) + pre_defined/reserved(16) +
/// width(2) + height(2) + resolutions(8) + reserved(4) + frame_count(2) +
/// compressor_name(32) + depth(2) + pre_defined(2).
const VISUAL_SAMPLE_ENTRY_SIZE: usize = 78;

/// Offset of the width field within the VisualSampleEntry content.
const WIDTH_OFFSET: usize = 24;

/// Upper bound on an avcC box found by raw tag scan.
const MAX_SCANNED_AVCC_SIZE: usize = 1000;

/// Decoder parameter sets carried in `avcC`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSets {
    /// Sequence parameter sets.
    pub sps: Vec<Bytes>,
    /// Picture parameter sets.
    pub pps: Vec<Bytes>,
}

impl ParameterSets {
    /// Whether at least one of each kind is present.
    pub fn is_complete(&self) -> bool {
        !self.sps.is_empty() && !self.pps.is_empty()
    }
}

/// Video codec configuration for one camera file.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// RFC 6381 codec string, e.g. `avc1.640028`.
    pub codec: String,
    /// Coded width in pixels.
    pub width: u16,
    /// Coded height in pixels.
    pub height: u16,
    /// SPS and PPS lists from `avcC`.
    pub parameter_sets: Arc<ParameterSets>,
    /// Media timescale (ticks per second).
    pub timescale: u32,
    /// Duration of every sample in timescale ticks, expanded from `stts`.
    pub sample_deltas: Vec<u32>,
    /// Duration of every sample in milliseconds.
    pub sample_durations_ms: Vec<f64>,
}

impl CodecConfig {
    /// Extract the video codec configuration from a complete MP4 buffer.
    ///
    /// Any missing box is reported as [`Error::ConfigNotFound`].
    pub fn extract(buf: &Bytes) -> Result<Self> {
        extract(buf).map_err(Error::into_config_error)
    }

    /// Duration used for samples past the end of the `stts` table.
    pub fn fallback_duration_ms(&self) -> f64 {
        1000.0 / self.timescale.max(1) as f64
    }

    /// Duration of sample `index` in ticks; one tick past the end of `stts`.
    pub fn sample_ticks(&self, index: usize) -> u64 {
        self.sample_deltas
            .get(index)
            .copied()
            .filter(|d| *d > 0)
            .unwrap_or(1) as u64
    }

    /// Duration of sample `index` in milliseconds.
    pub fn duration_ms(&self, index: usize) -> f64 {
        self.ticks_to_ms(self.sample_ticks(index))
    }

    /// Convert timescale ticks to milliseconds.
    pub fn ticks_to_ms(&self, ticks: u64) -> f64 {
        ticks as f64 * 1000.0 / self.timescale.max(1) as f64
    }

    /// Nominal frame rate derived from the first sample duration.
    pub fn nominal_fps(&self) -> Option<f64> {
        let first = *self.sample_durations_ms.first()?;
        (first > 0.0).then(|| 1000.0 / first)
    }
}

fn extract(buf: &Bytes) -> Result<CodecConfig> {
    let data: &[u8] = buf;
    let moov = find_box(data, 0, data.len(), FourCc::MOOV)?;
    let trak = find_video_track(data, &moov)?;
    let mdia = trak.find(data, FourCc::MDIA)?;
    let minf = mdia.find(data, FourCc::MINF)?;
    let stbl = minf.find(data, FourCc::STBL)?;

    let mdhd = mdia.find(data, FourCc::MDHD)?;
    let timescale = parse_timescale(data, &mdhd)?;

    let stsd = stbl.find(data, FourCc::STSD)?;
    // Skip version/flags (4) and entry count (4)
    let entry = match find_box(data, stsd.content_start + 8, stsd.content_end, FourCc::AVC1) {
        Ok(entry) => entry,
        Err(Error::NotFound { .. }) => {
            find_box(data, stsd.content_start + 8, stsd.content_end, FourCc::AVC3)?
        }
        Err(e) => return Err(e),
    };

    let width = be_u16(data, entry.content_start + WIDTH_OFFSET)?;
    let height = be_u16(data, entry.content_start + WIDTH_OFFSET + 2)?;

    let avcc = locate_avcc(data, &entry)?;
    let (parameter_sets, codec) = parse_avcc(buf, &avcc)?;

    let stts = stbl.find(data, FourCc::STTS)?;
    let sample_deltas = parse_stts(data, &stts)?;
    let sample_durations_ms = sample_deltas
        .iter()
        .map(|&delta| delta as f64 / timescale as f64 * 1000.0)
        .collect::<Vec<_>>();

    tracing::debug!(
        codec = %codec,
        width,
        height,
        timescale,
        samples = sample_deltas.len(),
        sps = parameter_sets.sps.len(),
        pps = parameter_sets.pps.len(),
        "Extracted codec configuration"
    );

    Ok(CodecConfig {
        codec,
        width,
        height,
        parameter_sets: Arc::new(parameter_sets),
        timescale,
        sample_deltas,
        sample_durations_ms,
    })
}

/// Find the first `trak` whose media info carries a video media header.
fn find_video_track(data: &[u8], moov: &BoxRange) -> Result<BoxRange> {
    for child in moov.children(data, 0) {
        let child = child?;
        if child.box_type != FourCc::TRAK {
            continue;
        }
        let is_video = child
            .find(data, FourCc::MDIA)
            .and_then(|mdia| mdia.find(data, FourCc::MINF))
            .and_then(|minf| minf.find(data, FourCc::VMHD))
            .is_ok();
        if is_video {
            return Ok(child);
        }
    }
    Err(Error::NotFound {
        atom: FourCc::TRAK,
    })
}

fn parse_timescale(data: &[u8], mdhd: &BoxRange) -> Result<u32> {
    let version = byte_at(data, mdhd.content_start)?;
    let timescale = if version == 1 {
        // 64-bit creation/modification times
        be_u32(data, mdhd.content_start + 20)?
    } else {
        be_u32(data, mdhd.content_start + 12)?
    };
    if timescale == 0 {
        return Err(Error::malformed("mdhd", mdhd.offset, "timescale is zero"));
    }
    Ok(timescale)
}

/// Locate `avcC` inside a sample entry.
///
/// Tries the conforming position first, then the whole entry, then a raw tag
/// scan for encoders that write non-conforming sample entries.
fn locate_avcc(data: &[u8], entry: &BoxRange) -> Result<BoxRange> {
    let extension_start = entry.content_start + VISUAL_SAMPLE_ENTRY_SIZE;
    if let Ok(avcc) = find_box(data, extension_start, entry.content_end, FourCc::AVCC) {
        return Ok(avcc);
    }

    if let Some(avcc) = Boxes::new(data, entry.content_start, entry.content_end)
        .map_while(|b| b.ok())
        .find(|b| b.box_type == FourCc::AVCC)
    {
        tracing::debug!(offset = avcc.offset, "avcC found outside the expected position");
        return Ok(avcc);
    }

    let mut pos = entry.content_start;
    while pos + 8 <= entry.content_end {
        if data[pos + 4..pos + 8] == FourCc::AVCC.0 {
            let size = be_u32(data, pos)? as usize;
            if size > 8 && size < MAX_SCANNED_AVCC_SIZE && pos + size <= entry.content_end {
                tracing::warn!(offset = pos, size, "avcC recovered by raw tag scan");
                return Ok(BoxRange {
                    box_type: FourCc::AVCC,
                    offset: pos,
                    header_size: 8,
                    content_start: pos + 8,
                    content_end: pos + size,
                });
            }
        }
        pos += 1;
    }

    Err(Error::NotFound {
        atom: FourCc::AVCC,
    })
}

/// Parse an AVCDecoderConfigurationRecord into parameter sets and a codec string.
fn parse_avcc(buf: &Bytes, avcc: &BoxRange) -> Result<(ParameterSets, String)> {
    let data: &[u8] = buf;
    let end = avcc.content_end;
    let truncated = || Error::malformed("avcC", avcc.offset, "record truncated");

    if avcc.content_len() < 7 {
        return Err(truncated());
    }

    let profile = data[avcc.content_start + 1];
    let compatibility = data[avcc.content_start + 2];
    let level = data[avcc.content_start + 3];
    let codec = format!("avc1.{profile:02x}{compatibility:02x}{level:02x}");

    // Skip configurationVersion, profile, compatibility, level, lengthSizeMinusOne
    let mut pos = avcc.content_start + 5;
    let mut sets = ParameterSets::default();

    let num_sps = (data[pos] & 0x1F) as usize;
    pos += 1;
    for _ in 0..num_sps {
        let len = be_u16(data, pos).map_err(|_| truncated())? as usize;
        pos += 2;
        if pos + len > end {
            return Err(truncated());
        }
        sets.sps.push(buf.slice(pos..pos + len));
        pos += len;
    }

    let num_pps = byte_at(data, pos).map_err(|_| truncated())? as usize;
    pos += 1;
    for _ in 0..num_pps {
        let len = be_u16(data, pos).map_err(|_| truncated())? as usize;
        pos += 2;
        if pos + len > end {
            return Err(truncated());
        }
        sets.pps.push(buf.slice(pos..pos + len));
        pos += len;
    }

    Ok((sets, codec))
}

/// Smallest sample a file can hold: a 4-byte length prefix and a 2-byte unit.
const MIN_SAMPLE_BYTES: usize = 6;

/// Expand `stts` run-length `(count, delta)` pairs into per-sample deltas.
///
/// The expanded count may not exceed what the file could possibly store.
fn parse_stts(data: &[u8], stts: &BoxRange) -> Result<Vec<u32>> {
    let entry_count = be_u32(data, stts.content_start + 4)? as usize;
    let max_samples = data.len() / MIN_SAMPLE_BYTES;
    let mut deltas = Vec::new();
    let mut total = 0usize;

    for i in 0..entry_count {
        let offset = stts.content_start + 8 + i * 8;
        if offset + 8 > stts.content_end {
            tracing::warn!(entry = i, entry_count, "stts table truncated");
            break;
        }
        let count = be_u32(data, offset)? as usize;
        let delta = be_u32(data, offset + 4)?;
        total = total.saturating_add(count);
        if total > max_samples {
            return Err(Error::malformed(
                "stts",
                offset,
                format!("{total} samples declared, file holds at most {max_samples}"),
            ));
        }
        deltas.extend(std::iter::repeat(delta).take(count));
    }

    Ok(deltas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::DashcamFileBuilder;
    use assert_matches::assert_matches;

    #[test]
    fn test_extract_basic_config() {
        let file = DashcamFileBuilder::new()
            .dimensions(1280, 960)
            .timescale(30000)
            .frame_duration(1000)
            .frames(10)
            .build();

        let config = CodecConfig::extract(&file).unwrap();
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 960);
        assert_eq!(config.timescale, 30000);
        assert_eq!(config.codec, "avc1.640028");
        assert_eq!(config.sample_durations_ms.len(), 10);
        assert!((config.sample_durations_ms[0] - 33.333).abs() < 0.001);
        assert!((config.nominal_fps().unwrap() - 30.0).abs() < 0.001);
        assert!(config.parameter_sets.is_complete());
        assert_eq!(config.parameter_sets.sps[0].as_ref(), DashcamFileBuilder::SPS);
        assert_eq!(config.parameter_sets.pps[0].as_ref(), DashcamFileBuilder::PPS);
    }

    #[test]
    fn test_extract_version1_mdhd() {
        let file = DashcamFileBuilder::new()
            .mdhd_version(1)
            .timescale(90000)
            .frame_duration(3000)
            .frames(4)
            .build();

        let config = CodecConfig::extract(&file).unwrap();
        assert_eq!(config.timescale, 90000);
        assert!((config.sample_durations_ms[3] - 33.333).abs() < 0.001);
    }

    #[test]
    fn test_extract_avc3_entry() {
        let file = DashcamFileBuilder::new().sample_entry(FourCc::AVC3).frames(2).build();
        let config = CodecConfig::extract(&file).unwrap();
        assert_eq!(config.width, 1448);
    }

    #[test]
    fn test_video_track_selected_after_audio_track() {
        let file = DashcamFileBuilder::new().leading_audio_track().frames(3).build();
        let config = CodecConfig::extract(&file).unwrap();
        assert_eq!(config.sample_durations_ms.len(), 3);
    }

    #[test]
    fn test_avcc_recovered_from_misplaced_position() {
        // Two stray bytes before avcC break the conforming box walk
        let file = DashcamFileBuilder::new().avcc_padding(2).frames(2).build();
        let config = CodecConfig::extract(&file).unwrap();
        assert!(config.parameter_sets.is_complete());
    }

    #[test]
    fn test_missing_moov_is_config_not_found() {
        let file = DashcamFileBuilder::new().without_moov().frames(2).build();
        let err = CodecConfig::extract(&file).unwrap_err();
        assert_matches!(err, Error::ConfigNotFound { atom } if atom == FourCc::MOOV);
    }

    #[test]
    fn test_missing_avcc_is_config_not_found() {
        let file = DashcamFileBuilder::new().without_avcc().frames(2).build();
        let err = CodecConfig::extract(&file).unwrap_err();
        assert_matches!(err, Error::ConfigNotFound { atom } if atom == FourCc::AVCC);
    }

    #[test]
    fn test_oversized_stts_count_is_malformed() {
        let file = DashcamFileBuilder::new().frames(4).build();
        let tag = file.windows(4).position(|w| w == b"stts").unwrap();
        // size, type, version/flags, entry_count, then the first sample_count
        let count_at = tag + 4 + 4 + 4;
        let mut patched = file.to_vec();
        patched[count_at..count_at + 4].copy_from_slice(&u32::MAX.to_be_bytes());

        let err = CodecConfig::extract(&Bytes::from(patched)).unwrap_err();
        assert_matches!(err, Error::Malformed { context: "stts", .. });
    }

    #[test]
    fn test_fallback_duration() {
        let file = DashcamFileBuilder::new().timescale(1000).frames(1).build();
        let config = CodecConfig::extract(&file).unwrap();
        assert_eq!(config.sample_ticks(5), 1);
        assert_eq!(config.duration_ms(5), 1.0);
    }
}
