//! Decoder backend seam.
//!
//! A backend wraps whatever actually turns H.264 into pictures (a platform
//! codec, a software decoder). Sessions accept chunks synchronously and report
//! results asynchronously through a [`DecoderOutput`]. Every event carries the
//! generation of the session that produced it so the engine can drop events
//! from sessions it has already torn down.

use crate::Result;
use bytes::{BufMut, Bytes, BytesMut};
use dashframe_media::{CodecConfig, FrameDescriptor};
use tokio::sync::mpsc;

/// Annex-B start code.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// One picture in the form a decoder consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Timeline index of the picture.
    pub index: usize,
    /// Whether the chunk starts a new group of pictures.
    pub key: bool,
    /// Presentation time in microseconds.
    pub timestamp_us: i64,
    /// Annex-B byte stream: parameter sets (keyframes only) then the picture.
    pub data: Bytes,
}

impl EncodedChunk {
    /// Convert a timeline frame to an Annex-B chunk.
    ///
    /// Keyframes carry every SPS and PPS ahead of the picture so a fresh
    /// session can start on them.
    pub fn from_frame(frame: &FrameDescriptor) -> Self {
        let mut capacity = START_CODE.len() + frame.payload.len();
        if let Some(sets) = &frame.parameter_sets {
            capacity += sets
                .sps
                .iter()
                .chain(sets.pps.iter())
                .map(|s| START_CODE.len() + s.len())
                .sum::<usize>();
        }

        let mut data = BytesMut::with_capacity(capacity);
        if frame.is_keyframe {
            if let Some(sets) = &frame.parameter_sets {
                for unit in sets.sps.iter().chain(sets.pps.iter()) {
                    data.put_slice(&START_CODE);
                    data.put_slice(unit);
                }
            }
        }
        data.put_slice(&START_CODE);
        data.put_slice(&frame.payload);

        Self {
            index: frame.index,
            key: frame.is_keyframe,
            timestamp_us: (frame.timestamp_ms * 1000.0).round() as i64,
            data: data.freeze(),
        }
    }
}

/// A decoded picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub width: u16,
    pub height: u16,
    /// Presentation time in microseconds, copied from the chunk.
    pub timestamp_us: i64,
    /// Backend-specific pixel data.
    pub data: Bytes,
}

/// What a session reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    /// A picture, in submission order.
    Output(DecodedFrame),
    /// Every chunk submitted before the matching flush has been output.
    Flushed,
    /// The decoder rejected input; the session is unusable afterwards.
    Error(String),
    /// The session was torn down with work outstanding.
    Aborted,
}

/// Event sink handed to a session when it is opened.
#[derive(Debug, Clone)]
pub struct DecoderOutput {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, DecoderEvent)>,
}

impl DecoderOutput {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, DecoderEvent)>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the session this output belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event. Events sent after the engine is gone are dropped.
    pub fn emit(&self, event: DecoderEvent) {
        let _ = self.tx.send((self.generation, event));
    }
}

/// A decoder implementation.
pub trait DecoderBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Open a session configured for `config`.
    fn open(&self, config: &CodecConfig, output: DecoderOutput) -> Result<Box<dyn DecoderSession>>;
}

/// One configured decoder instance.
///
/// Chunks must be submitted in decode order starting at a keyframe. Outputs
/// arrive in the same order.
pub trait DecoderSession: Send {
    /// Queue a chunk for decoding.
    fn decode(&mut self, chunk: EncodedChunk) -> Result<()>;

    /// Ask for every queued chunk to be output, followed by
    /// [`DecoderEvent::Flushed`]. Reference state is kept, so decoding may
    /// continue with the next picture of the same group.
    fn flush(&mut self) -> Result<()>;

    /// Tear the session down. Outstanding work is discarded.
    fn close(&mut self);
}

/// Output surface for rendered frames.
pub trait FrameSink: Send + Sync {
    fn render(&self, index: usize, frame: &DecodedFrame);
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashframe_media::fixture::DashcamFileBuilder;
    use dashframe_media::{TelemetrySchema, Timeline};

    fn timeline() -> Timeline {
        let file = DashcamFileBuilder::new().frames(4).keyframe_interval(2).build();
        Timeline::build(file, &TelemetrySchema::dashcam()).unwrap()
    }

    #[test]
    fn test_keyframe_chunk_carries_parameter_sets() {
        let timeline = timeline();
        let chunk = EncodedChunk::from_frame(&timeline.frames[2]);

        let mut expected = Vec::new();
        expected.extend_from_slice(&START_CODE);
        expected.extend_from_slice(DashcamFileBuilder::SPS);
        expected.extend_from_slice(&START_CODE);
        expected.extend_from_slice(DashcamFileBuilder::PPS);
        expected.extend_from_slice(&START_CODE);
        expected.extend_from_slice(&timeline.frames[2].payload);

        assert!(chunk.key);
        assert_eq!(chunk.index, 2);
        assert_eq!(chunk.data.as_ref(), expected.as_slice());
        assert_eq!(chunk.timestamp_us, 66_667);
    }

    #[test]
    fn test_delta_chunk_is_single_unit() {
        let timeline = timeline();
        let chunk = EncodedChunk::from_frame(&timeline.frames[1]);
        assert!(!chunk.key);
        assert_eq!(&chunk.data[..4], &START_CODE);
        assert_eq!(&chunk.data[4..], timeline.frames[1].payload.as_ref());
        assert_eq!(chunk.timestamp_us, 33_333);
    }

    #[tokio::test]
    async fn test_output_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let output = DecoderOutput::new(7, tx);
        output.emit(DecoderEvent::Flushed);
        assert_eq!(rx.recv().await, Some((7, DecoderEvent::Flushed)));
    }
}
