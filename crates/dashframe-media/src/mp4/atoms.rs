//! MP4 box definitions and navigation.

use crate::{Error, Result};

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const VMHD: Self = Self(*b"vmhd");
    pub const SMHD: Self = Self(*b"smhd");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const AVC1: Self = Self(*b"avc1");
    pub const AVC3: Self = Self(*b"avc3");
    pub const AVCC: Self = Self(*b"avcC");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(feature = "serialize")]
impl serde::Serialize for FourCc {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Location of one box inside a buffer.
///
/// Only valid for the buffer it was produced from; boxes are never stored
/// beyond the navigation call that found them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxRange {
    /// Box type code.
    pub box_type: FourCc,
    /// Offset of the box header.
    pub offset: usize,
    /// Size of the header (8 or 16 bytes).
    pub header_size: usize,
    /// Offset where box content starts (after header).
    pub content_start: usize,
    /// Offset one past the last content byte, clamped to the searched range.
    pub content_end: usize,
}

impl BoxRange {
    /// Content length (header-adjusted).
    pub fn content_len(&self) -> usize {
        self.content_end - self.content_start
    }

    /// Content bytes of this box.
    pub fn content<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.content_start..self.content_end]
    }

    /// Iterate the child boxes of this box, starting `skip` bytes into the content.
    pub fn children<'a>(&self, buf: &'a [u8], skip: usize) -> Boxes<'a> {
        Boxes::new(buf, self.content_start + skip, self.content_end)
    }

    /// Find the first child box of the given type.
    pub fn find(&self, buf: &[u8], box_type: FourCc) -> Result<BoxRange> {
        find_box(buf, self.content_start, self.content_end, box_type)
    }
}

/// Sequential walk over the boxes of `buf[start..end]`.
///
/// Yields an error and stops when a declared size cannot make progress.
pub struct Boxes<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
    done: bool,
}

impl<'a> Boxes<'a> {
    /// Walk the boxes in `buf[start..end]`. `end` is clamped to the buffer length.
    pub fn new(buf: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            buf,
            pos: start,
            end: end.min(buf.len()),
            done: false,
        }
    }

    fn fail(&mut self, reason: String) -> Option<Result<BoxRange>> {
        self.done = true;
        Some(Err(Error::malformed("box header", self.pos, reason)))
    }
}

impl Iterator for Boxes<'_> {
    type Item = Result<BoxRange>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos.saturating_add(8) > self.end {
            return None;
        }

        let pos = self.pos;
        let declared = be_u32(self.buf, pos).ok()? as u64;
        let box_type = FourCc::from_bytes([
            self.buf[pos + 4],
            self.buf[pos + 5],
            self.buf[pos + 6],
            self.buf[pos + 7],
        ]);

        let (size, header_size) = match declared {
            1 => {
                // 64-bit extended size
                if pos + 16 > self.end {
                    return self.fail(format!("{box_type} truncated extended size"));
                }
                (be_u64(self.buf, pos + 8).ok()?, 16usize)
            }
            // Box extends to end of range
            0 => ((self.end - pos) as u64, 8usize),
            n => (n, 8usize),
        };

        if size < header_size as u64 {
            return self.fail(format!(
                "{box_type} declares size {size}, smaller than its {header_size}-byte header"
            ));
        }

        let declared_end = (pos as u64).saturating_add(size);
        let content_end = if declared_end > self.end as u64 {
            tracing::debug!(
                box_type = %box_type,
                offset = pos,
                declared_end,
                range_end = self.end,
                "Box runs past its range, clamping"
            );
            self.done = true;
            self.end
        } else {
            declared_end as usize
        };

        self.pos = content_end;

        Some(Ok(BoxRange {
            box_type,
            offset: pos,
            header_size,
            content_start: pos + header_size,
            content_end,
        }))
    }
}

/// Find the first box of `box_type` within `buf[start..end]`.
///
/// Fails with [`Error::NotFound`] when the range is exhausted and with
/// [`Error::Malformed`] when the walk cannot make progress.
pub fn find_box(buf: &[u8], start: usize, end: usize, box_type: FourCc) -> Result<BoxRange> {
    for entry in Boxes::new(buf, start, end) {
        let entry = entry?;
        if entry.box_type == box_type {
            return Ok(entry);
        }
    }
    Err(Error::NotFound { atom: box_type })
}

pub(crate) fn be_u16(buf: &[u8], pos: usize) -> Result<u16> {
    let bytes = buf.get(pos..pos + 2).ok_or(Error::BufferUnderflow {
        need: pos + 2,
        have: buf.len(),
    })?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn be_u32(buf: &[u8], pos: usize) -> Result<u32> {
    let bytes = buf.get(pos..pos + 4).ok_or(Error::BufferUnderflow {
        need: pos + 4,
        have: buf.len(),
    })?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn be_u64(buf: &[u8], pos: usize) -> Result<u64> {
    let bytes = buf.get(pos..pos + 8).ok_or(Error::BufferUnderflow {
        need: pos + 8,
        have: buf.len(),
    })?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(arr))
}

pub(crate) fn byte_at(buf: &[u8], pos: usize) -> Result<u8> {
    buf.get(pos).copied().ok_or(Error::BufferUnderflow {
        need: pos + 1,
        have: buf.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn push_box(buf: &mut Vec<u8>, box_type: &[u8; 4], content: &[u8]) {
        buf.extend_from_slice(&((8 + content.len()) as u32).to_be_bytes());
        buf.extend_from_slice(box_type);
        buf.extend_from_slice(content);
    }

    #[test]
    fn test_find_box_standard_header() {
        let mut buf = Vec::new();
        push_box(&mut buf, b"ftyp", b"isom");
        push_box(&mut buf, b"free", &[0; 4]);
        push_box(&mut buf, b"moov", &[1, 2, 3]);

        let moov = find_box(&buf, 0, buf.len(), FourCc::MOOV).unwrap();
        assert_eq!(moov.offset, 24);
        assert_eq!(moov.header_size, 8);
        assert_eq!(moov.content(&buf), &[1, 2, 3]);
        assert_eq!(moov.content_len(), 3);
    }

    #[test]
    fn test_find_box_extended_size() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(b"mdat");
        buf.extend_from_slice(&20u64.to_be_bytes());
        buf.extend_from_slice(&[9, 9, 9, 9]);
        push_box(&mut buf, b"moov", &[]);

        let mdat = find_box(&buf, 0, buf.len(), FourCc::MDAT).unwrap();
        assert_eq!(mdat.header_size, 16);
        assert_eq!(mdat.content(&buf), &[9, 9, 9, 9]);

        let moov = find_box(&buf, 0, buf.len(), FourCc::MOOV).unwrap();
        assert_eq!(moov.offset, 20);
    }

    #[test]
    fn test_find_box_size_zero_extends_to_range_end() {
        let mut buf = Vec::new();
        push_box(&mut buf, b"ftyp", b"isom");
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(b"mdat");
        buf.extend_from_slice(&[7; 10]);

        let mdat = find_box(&buf, 0, buf.len(), FourCc::MDAT).unwrap();
        assert_eq!(mdat.content_end, buf.len());
        assert_eq!(mdat.content_len(), 10);
    }

    #[test]
    fn test_find_box_not_found() {
        let mut buf = Vec::new();
        push_box(&mut buf, b"ftyp", b"isom");

        let err = find_box(&buf, 0, buf.len(), FourCc::MOOV).unwrap_err();
        assert_matches!(err, Error::NotFound { atom } if atom == FourCc::MOOV);
    }

    #[test]
    fn test_undersized_box_is_malformed_not_infinite() {
        let mut buf = Vec::new();
        push_box(&mut buf, b"ftyp", b"isom");
        // Declared size 4 cannot even cover its own header
        buf.extend_from_slice(&4u32.to_be_bytes());
        buf.extend_from_slice(b"junk");
        push_box(&mut buf, b"moov", &[]);

        let err = find_box(&buf, 0, buf.len(), FourCc::MOOV).unwrap_err();
        assert_matches!(err, Error::Malformed { offset: 12, .. });
    }

    #[test]
    fn test_box_past_range_is_clamped() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&100u32.to_be_bytes());
        buf.extend_from_slice(b"mdat");
        buf.extend_from_slice(&[1; 12]);

        let mdat = find_box(&buf, 0, buf.len(), FourCc::MDAT).unwrap();
        assert_eq!(mdat.content_end, buf.len());
    }

    #[test]
    fn test_children_and_nested_find() {
        let mut inner = Vec::new();
        push_box(&mut inner, b"mdhd", &[0; 4]);
        push_box(&mut inner, b"minf", &[]);
        let mut buf = Vec::new();
        push_box(&mut buf, b"mdia", &inner);

        let mdia = find_box(&buf, 0, buf.len(), FourCc::MDIA).unwrap();
        let types: Vec<FourCc> = mdia
            .children(&buf, 0)
            .map(|b| b.unwrap().box_type)
            .collect();
        assert_eq!(types, vec![FourCc::MDHD, FourCc::MINF]);
        assert!(mdia.find(&buf, FourCc::MINF).is_ok());
    }

    #[test]
    fn test_fourcc_display() {
        assert_eq!(FourCc::AVCC.to_string(), "avcC");
        assert_eq!(FourCc::from_bytes([0xFF, 0, 0, 0]).as_str(), "????");
    }
}
