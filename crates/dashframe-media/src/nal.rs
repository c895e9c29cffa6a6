//! H.264 bitstream unit scanning.
//!
//! The `mdat` of a dashcam file is a run of AVCC-style units: a 4-byte
//! big-endian length followed by the unit itself. The scanner classifies each
//! unit and counts pictures so that embedded telemetry can be pinned to the
//! frame it arrived with.

use crate::mp4::be_u32;
use bytes::Bytes;

/// `payloadType` of a user-data-unregistered SEI message.
pub const SEI_USER_DATA_UNREGISTERED: u8 = 5;

/// NAL unit classification from the low five bits of the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalKind {
    /// Coded slice of an IDR picture (type 5).
    Idr,
    /// Coded slice of a non-IDR picture (type 1).
    NonIdr,
    /// Supplemental enhancement information (type 6).
    Sei,
    /// Anything else (parameter sets, delimiters, filler).
    Other(u8),
}

impl NalKind {
    /// Classify a unit by its header byte.
    pub fn from_header(byte: u8) -> Self {
        match byte & 0x1F {
            5 => Self::Idr,
            1 => Self::NonIdr,
            6 => Self::Sei,
            other => Self::Other(other),
        }
    }

    /// Whether this unit carries a picture.
    pub fn is_frame(&self) -> bool {
        matches!(self, Self::Idr | Self::NonIdr)
    }
}

/// One item emitted while scanning.
#[derive(Debug, Clone)]
pub enum ScanItem {
    /// A picture unit.
    Frame {
        /// Presentation index of this picture.
        index: usize,
        /// Whether this is an IDR picture.
        keyframe: bool,
        /// The unit bytes without the length prefix.
        payload: Bytes,
    },
    /// A user-data SEI unit.
    Metadata {
        /// Number of pictures seen before this unit; the frame it belongs to.
        frame_index: usize,
        /// The unit bytes without the length prefix.
        unit: Bytes,
    },
}

/// Counters describing what the scanner saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ScanStats {
    /// Units with a usable length prefix.
    pub units: usize,
    /// Picture units.
    pub frames: usize,
    /// IDR picture units.
    pub keyframes: usize,
    /// User-data SEI units.
    pub metadata_units: usize,
    /// Length prefixes below the minimum unit size that were skipped.
    pub skipped: usize,
    /// Whether the scan ended early on a length running past the partition.
    pub truncated: bool,
}

/// Iterator over the units of a media-data partition.
pub struct NalScanner {
    buf: Bytes,
    cursor: usize,
    end: usize,
    frame_index: usize,
    stats: ScanStats,
}

impl NalScanner {
    /// Scan `buf[start..end]`.
    pub fn new(buf: Bytes, start: usize, end: usize) -> Self {
        let end = end.min(buf.len());
        Self {
            buf,
            cursor: start,
            end,
            frame_index: 0,
            stats: ScanStats::default(),
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> ScanStats {
        self.stats
    }
}

impl Iterator for NalScanner {
    type Item = ScanItem;

    fn next(&mut self) -> Option<ScanItem> {
        while self.cursor + 4 <= self.end {
            let prefix_at = self.cursor;
            let len = be_u32(&self.buf, self.cursor).ok()? as usize;
            self.cursor += 4;

            if len < 2 {
                tracing::debug!(offset = prefix_at, len, "Skipping degenerate unit length");
                self.stats.skipped += 1;
                self.cursor += len;
                continue;
            }

            if self.cursor + len > self.end {
                tracing::warn!(
                    offset = prefix_at,
                    len,
                    remaining = self.end - self.cursor,
                    "Unit length runs past media data, ending scan"
                );
                self.stats.truncated = true;
                self.cursor = self.end;
                return None;
            }

            let start = self.cursor;
            self.cursor += len;
            self.stats.units += 1;

            match NalKind::from_header(self.buf[start]) {
                kind @ (NalKind::Idr | NalKind::NonIdr) => {
                    let index = self.frame_index;
                    self.frame_index += 1;
                    self.stats.frames += 1;
                    let keyframe = kind == NalKind::Idr;
                    if keyframe {
                        self.stats.keyframes += 1;
                    }
                    return Some(ScanItem::Frame {
                        index,
                        keyframe,
                        payload: self.buf.slice(start..start + len),
                    });
                }
                NalKind::Sei if self.buf[start + 1] == SEI_USER_DATA_UNREGISTERED => {
                    self.stats.metadata_units += 1;
                    return Some(ScanItem::Metadata {
                        frame_index: self.frame_index,
                        unit: self.buf.slice(start..start + len),
                    });
                }
                _ => {}
            }
        }
        None
    }
}
