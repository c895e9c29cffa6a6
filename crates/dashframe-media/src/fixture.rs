//! Synthetic dashcam recordings for tests.
//!
//! [`DashcamFileBuilder`] writes a complete, non-fragmented MP4 with one H.264
//! video track: `ftyp`, `moov` and an `mdat` of length-prefixed units. Picture
//! units are stand-ins (a slice header byte followed by the frame index) so a
//! decoder double can tell which frame it was handed.

use crate::mp4::FourCc;
use crate::sei::{TelemetryRecord, TelemetrySchema};
use bytes::{BufMut, Bytes, BytesMut};
use prost::Message;
use std::collections::BTreeMap;

/// Padding bytes written ahead of the payload-start marker.
const SEI_PADDING_RUN: usize = 3;

/// Build a user-data SEI unit (no length prefix) carrying `record`.
pub fn sei_unit(record: &TelemetryRecord) -> Vec<u8> {
    let payload = insert_emulation_prevention(&record.encode_to_vec());

    let mut unit = Vec::with_capacity(payload.len() + 8);
    unit.push(0x06);
    unit.push(crate::nal::SEI_USER_DATA_UNREGISTERED);
    unit.push(payload.len().min(0xFF) as u8);
    unit.extend(std::iter::repeat(TelemetrySchema::DASHCAM_PADDING).take(SEI_PADDING_RUN));
    unit.push(TelemetrySchema::DASHCAM_PAYLOAD_START);
    unit.extend_from_slice(&payload);
    // rbsp_stop_one_bit
    unit.push(0x80);
    unit
}

/// Escape `00 00 0x` (x <= 3) runs the way an encoder does.
pub fn insert_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 2);
    let mut zeros = 0usize;
    for &byte in data {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(byte);
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }
    out
}

/// The picture unit written for frame `index`.
pub fn frame_unit(index: usize, keyframe: bool) -> Vec<u8> {
    let mut unit = Vec::with_capacity(5);
    unit.push(if keyframe { 0x65 } else { 0x41 });
    unit.extend_from_slice(&(index as u32).to_be_bytes());
    unit
}

/// Frame index encoded in a unit written by [`frame_unit`].
pub fn frame_index_of(unit: &[u8]) -> Option<usize> {
    let bytes: [u8; 4] = unit.get(1..5)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes) as usize)
}

/// Builder for synthetic dashcam files.
#[derive(Debug, Clone)]
pub struct DashcamFileBuilder {
    frames: usize,
    keyframe_interval: usize,
    timescale: u32,
    frame_duration: u32,
    width: u16,
    height: u16,
    mdhd_version: u8,
    sample_entry: FourCc,
    leading_audio_track: bool,
    avcc_padding: usize,
    write_moov: bool,
    write_avcc: bool,
    units_before: BTreeMap<usize, Vec<Vec<u8>>>,
    degenerate_before: BTreeMap<usize, usize>,
}

impl DashcamFileBuilder {
    /// Sequence parameter set: High profile, level 4.0.
    pub const SPS: &'static [u8] = &[
        0x67, 0x64, 0x00, 0x28, 0xAC, 0xD9, 0x40, 0x5A, 0x05, 0xBB, 0x01, 0x10,
    ];
    /// Picture parameter set.
    pub const PPS: &'static [u8] = &[0x68, 0xEB, 0xE3, 0xCB, 0x22, 0xC0];

    /// A 30 fps front camera layout with no frames.
    pub fn new() -> Self {
        Self {
            frames: 0,
            keyframe_interval: 30,
            timescale: 30000,
            frame_duration: 1000,
            width: 1448,
            height: 938,
            mdhd_version: 0,
            sample_entry: FourCc::AVC1,
            leading_audio_track: false,
            avcc_padding: 0,
            write_moov: true,
            write_avcc: true,
            units_before: BTreeMap::new(),
            degenerate_before: BTreeMap::new(),
        }
    }

    /// Number of pictures.
    pub fn frames(mut self, count: usize) -> Self {
        self.frames = count;
        self
    }

    /// Distance between IDR pictures.
    pub fn keyframe_interval(mut self, interval: usize) -> Self {
        self.keyframe_interval = interval.max(1);
        self
    }

    /// Media timescale written to `mdhd`.
    pub fn timescale(mut self, timescale: u32) -> Self {
        self.timescale = timescale;
        self
    }

    /// Per-sample duration in timescale ticks.
    pub fn frame_duration(mut self, ticks: u32) -> Self {
        self.frame_duration = ticks;
        self
    }

    /// Coded dimensions.
    pub fn dimensions(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Write `mdhd` as version 0 or 1.
    pub fn mdhd_version(mut self, version: u8) -> Self {
        self.mdhd_version = version;
        self
    }

    /// Sample entry type (`avc1` or `avc3`).
    pub fn sample_entry(mut self, entry: FourCc) -> Self {
        self.sample_entry = entry;
        self
    }

    /// Put an audio track ahead of the video track.
    pub fn leading_audio_track(mut self) -> Self {
        self.leading_audio_track = true;
        self
    }

    /// Stray zero bytes between the visual sample entry fields and `avcC`.
    pub fn avcc_padding(mut self, bytes: usize) -> Self {
        self.avcc_padding = bytes;
        self
    }

    /// Omit the `moov` box entirely.
    pub fn without_moov(mut self) -> Self {
        self.write_moov = false;
        self
    }

    /// Omit `avcC` from the sample entry.
    pub fn without_avcc(mut self) -> Self {
        self.write_avcc = false;
        self
    }

    /// Write a telemetry unit ahead of picture `index`.
    pub fn telemetry_at(self, index: usize, record: TelemetryRecord) -> Self {
        self.raw_unit_at(index, sei_unit(&record))
    }

    /// Write an arbitrary unit ahead of picture `index`.
    pub fn raw_unit_at(mut self, index: usize, unit: Vec<u8>) -> Self {
        self.units_before.entry(index).or_default().push(unit);
        self
    }

    /// Write a zero length prefix ahead of picture `index`.
    pub fn degenerate_prefix_at(mut self, index: usize) -> Self {
        *self.degenerate_before.entry(index).or_default() += 1;
        self
    }

    /// Serialize the file.
    pub fn build(self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1024 + self.frames * 16);
        self.write_ftyp(&mut buf);
        if self.write_moov {
            self.write_moov(&mut buf);
        }
        self.write_mdat(&mut buf);
        buf.freeze()
    }

    fn write_ftyp(&self, buf: &mut BytesMut) {
        let brands = [b"isom", b"iso2", b"avc1", b"mp41"];
        buf.put_u32((8 + 4 + 4 + brands.len() * 4) as u32);
        buf.put_slice(&FourCc::FTYP.0);
        buf.put_slice(b"mp42");
        buf.put_u32(0);
        for brand in &brands {
            buf.put_slice(*brand);
        }
    }

    fn write_moov(&self, buf: &mut BytesMut) {
        let moov = begin_box(buf, FourCc::MOOV);

        let mvhd = begin_box(buf, FourCc::MVHD);
        buf.put_u32(0); // version + flags
        buf.put_u32(0); // creation_time
        buf.put_u32(0); // modification_time
        buf.put_u32(1000);
        buf.put_u32(self.duration_ticks() as u32);
        buf.put_u32(0x0001_0000); // rate
        buf.put_u16(0x0100); // volume
        buf.put_slice(&[0u8; 10]);
        put_identity_matrix(buf);
        buf.put_slice(&[0u8; 24]);
        buf.put_u32(3); // next_track_ID
        end_box(buf, mvhd);

        if self.leading_audio_track {
            self.write_audio_trak(buf);
        }
        self.write_video_trak(buf);

        end_box(buf, moov);
    }

    fn write_audio_trak(&self, buf: &mut BytesMut) {
        let trak = begin_box(buf, FourCc::TRAK);
        let mdia = begin_box(buf, FourCc::MDIA);
        write_mdhd(buf, 0, 48000, 0);
        write_hdlr(buf, b"soun");
        let minf = begin_box(buf, FourCc::MINF);
        let smhd = begin_box(buf, FourCc::SMHD);
        buf.put_u32(0);
        buf.put_u32(0); // balance + reserved
        end_box(buf, smhd);
        end_box(buf, minf);
        end_box(buf, mdia);
        end_box(buf, trak);
    }

    fn write_video_trak(&self, buf: &mut BytesMut) {
        let trak = begin_box(buf, FourCc::TRAK);

        let tkhd = begin_box(buf, FourCc::TKHD);
        buf.put_u32(0x0000_0003); // enabled, in movie
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_u32(1); // track_ID
        buf.put_u32(0);
        buf.put_u32(self.duration_ticks() as u32);
        buf.put_slice(&[0u8; 8]);
        buf.put_u16(0); // layer
        buf.put_u16(0); // alternate_group
        buf.put_u16(0); // volume
        buf.put_u16(0);
        put_identity_matrix(buf);
        buf.put_u32((self.width as u32) << 16);
        buf.put_u32((self.height as u32) << 16);
        end_box(buf, tkhd);

        let mdia = begin_box(buf, FourCc::MDIA);
        write_mdhd(buf, self.mdhd_version, self.timescale, self.duration_ticks());
        write_hdlr(buf, b"vide");

        let minf = begin_box(buf, FourCc::MINF);
        let vmhd = begin_box(buf, FourCc::VMHD);
        buf.put_u32(0x0000_0001);
        buf.put_slice(&[0u8; 8]); // graphicsmode + opcolor
        end_box(buf, vmhd);

        let stbl = begin_box(buf, FourCc::STBL);
        self.write_stsd(buf);

        let stts = begin_box(buf, FourCc::STTS);
        buf.put_u32(0);
        if self.frames > 0 {
            buf.put_u32(1);
            buf.put_u32(self.frames as u32);
            buf.put_u32(self.frame_duration);
        } else {
            buf.put_u32(0);
        }
        end_box(buf, stts);

        end_box(buf, stbl);
        end_box(buf, minf);
        end_box(buf, mdia);
        end_box(buf, trak);
    }

    fn write_stsd(&self, buf: &mut BytesMut) {
        let stsd = begin_box(buf, FourCc::STSD);
        buf.put_u32(0);
        buf.put_u32(1); // entry_count

        let entry = begin_box(buf, self.sample_entry);
        buf.put_slice(&[0u8; 6]);
        buf.put_u16(1); // data_reference_index
        buf.put_slice(&[0u8; 16]);
        buf.put_u16(self.width);
        buf.put_u16(self.height);
        buf.put_u32(0x0048_0000);
        buf.put_u32(0x0048_0000);
        buf.put_u32(0);
        buf.put_u16(1); // frame_count
        buf.put_slice(&[0u8; 32]);
        buf.put_u16(0x0018);
        buf.put_i16(-1);

        buf.put_bytes(0, self.avcc_padding);
        if self.write_avcc {
            let avcc = begin_box(buf, FourCc::AVCC);
            buf.put_u8(1); // configurationVersion
            buf.put_u8(Self::SPS[1]);
            buf.put_u8(Self::SPS[2]);
            buf.put_u8(Self::SPS[3]);
            buf.put_u8(0xFF); // lengthSizeMinusOne = 3
            buf.put_u8(0xE1); // one SPS
            buf.put_u16(Self::SPS.len() as u16);
            buf.put_slice(Self::SPS);
            buf.put_u8(1);
            buf.put_u16(Self::PPS.len() as u16);
            buf.put_slice(Self::PPS);
            end_box(buf, avcc);
        }

        end_box(buf, entry);
        end_box(buf, stsd);
    }

    fn write_mdat(&self, buf: &mut BytesMut) {
        let mdat = begin_box(buf, FourCc::MDAT);
        for index in 0..self.frames {
            self.write_units_before(buf, index);
            let keyframe = index % self.keyframe_interval == 0;
            put_unit(buf, &frame_unit(index, keyframe));
        }
        // Units pinned past the last picture
        for (_, units) in self.units_before.range(self.frames..) {
            for unit in units {
                put_unit(buf, unit);
            }
        }
        end_box(buf, mdat);
    }

    fn write_units_before(&self, buf: &mut BytesMut, index: usize) {
        for _ in 0..self.degenerate_before.get(&index).copied().unwrap_or(0) {
            buf.put_u32(0);
        }
        if let Some(units) = self.units_before.get(&index) {
            for unit in units {
                put_unit(buf, unit);
            }
        }
    }

    fn duration_ticks(&self) -> u64 {
        self.frames as u64 * self.frame_duration as u64
    }
}

impl Default for DashcamFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn begin_box(buf: &mut BytesMut, box_type: FourCc) -> usize {
    let start = buf.len();
    buf.put_u32(0); // placeholder size
    buf.put_slice(&box_type.0);
    start
}

fn end_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

fn put_unit(buf: &mut BytesMut, unit: &[u8]) {
    buf.put_u32(unit.len() as u32);
    buf.put_slice(unit);
}

fn put_identity_matrix(buf: &mut BytesMut) {
    for value in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        buf.put_u32(value);
    }
}

fn write_mdhd(buf: &mut BytesMut, version: u8, timescale: u32, duration: u64) {
    let mdhd = begin_box(buf, FourCc::MDHD);
    buf.put_u32((version as u32) << 24);
    if version == 1 {
        buf.put_u64(0);
        buf.put_u64(0);
        buf.put_u32(timescale);
        buf.put_u64(duration);
    } else {
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_u32(timescale);
        buf.put_u32(duration as u32);
    }
    buf.put_u16(0x55C4); // language "und"
    buf.put_u16(0);
    end_box(buf, mdhd);
}

fn write_hdlr(buf: &mut BytesMut, handler: &[u8; 4]) {
    let hdlr = begin_box(buf, FourCc::HDLR);
    buf.put_u32(0);
    buf.put_u32(0); // pre_defined
    buf.put_slice(handler);
    buf.put_slice(&[0u8; 12]);
    buf.put_u8(0); // empty name
    end_box(buf, hdlr);
}
