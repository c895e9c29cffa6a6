//! MP4 container navigation.
//!
//! Dashcam files are plain (non-fragmented) MP4 with one H.264 video track.
//! Everything here works on an in-memory buffer; nothing is read lazily.

mod atoms;
mod codec;

pub use atoms::{find_box, BoxRange, Boxes, FourCc};
pub use codec::{CodecConfig, ParameterSets};

pub(crate) use atoms::be_u32;

use crate::Result;

/// Locate the content of the top-level `mdat` box.
pub fn locate_media_data(buf: &[u8]) -> Result<BoxRange> {
    find_box(buf, 0, buf.len(), FourCc::MDAT)
}
