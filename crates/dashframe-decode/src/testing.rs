//! Test doubles for the decoder seam.
//!
//! [`ReferenceDecoder`] behaves like a strict hardware decoder: a predicted
//! picture is only accepted directly after its predecessor, so any gap in the
//! submitted sequence surfaces as a decode error. Output pixels are the chunk
//! bytes themselves.

use crate::decoder::{
    DecodedFrame, DecoderBackend, DecoderEvent, DecoderOutput, DecoderSession, EncodedChunk,
    FrameSink,
};
use crate::{EngineError, Result};
use bytes::Bytes;
use dashframe_media::CodecConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Software stand-in for a platform decoder.
#[derive(Debug, Default)]
pub struct ReferenceDecoder {
    latency: Duration,
    fail_at: Option<usize>,
    sessions_opened: AtomicUsize,
    chunks_submitted: Arc<AtomicUsize>,
}

impl ReferenceDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every output by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject the chunk for frame `index`.
    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Sessions opened so far.
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    /// Chunks submitted across all sessions.
    pub fn chunks_submitted(&self) -> usize {
        self.chunks_submitted.load(Ordering::SeqCst)
    }
}

impl DecoderBackend for ReferenceDecoder {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn open(&self, config: &CodecConfig, output: DecoderOutput) -> Result<Box<dyn DecoderSession>> {
        if !config.parameter_sets.is_complete() {
            return Err(EngineError::Backend(
                "codec configuration has no parameter sets".to_string(),
            ));
        }
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            output,
            latency: self.latency,
            fail_at: self.fail_at,
            width: config.width,
            height: config.height,
            closed: Arc::clone(&closed),
            last_index: None,
        };
        tokio::spawn(worker.run(rx));

        Ok(Box::new(ReferenceSession {
            tx,
            closed,
            submitted: Arc::clone(&self.chunks_submitted),
        }))
    }
}

enum Command {
    Decode(EncodedChunk),
    Flush,
}

struct ReferenceSession {
    tx: mpsc::UnboundedSender<Command>,
    closed: Arc<AtomicBool>,
    submitted: Arc<AtomicUsize>,
}

impl ReferenceSession {
    fn send(&self, command: Command) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Backend("session is closed".to_string()));
        }
        self.tx
            .send(command)
            .map_err(|_| EngineError::Backend("decoder worker stopped".to_string()))
    }
}

impl DecoderSession for ReferenceSession {
    fn decode(&mut self, chunk: EncodedChunk) -> Result<()> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.send(Command::Decode(chunk))
    }

    fn flush(&mut self) -> Result<()> {
        self.send(Command::Flush)
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct Worker {
    output: DecoderOutput,
    latency: Duration,
    fail_at: Option<usize>,
    width: u16,
    height: u16,
    closed: Arc<AtomicBool>,
    last_index: Option<usize>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            if self.is_closed() {
                break;
            }
            match command {
                Command::Decode(chunk) => {
                    if !self.latency.is_zero() {
                        tokio::time::sleep(self.latency).await;
                        if self.is_closed() {
                            break;
                        }
                    }
                    if let Err(reason) = self.decode(&chunk) {
                        self.output.emit(DecoderEvent::Error(reason));
                        break;
                    }
                    self.output.emit(DecoderEvent::Output(DecodedFrame {
                        width: self.width,
                        height: self.height,
                        timestamp_us: chunk.timestamp_us,
                        data: chunk.data,
                    }));
                }
                Command::Flush => self.output.emit(DecoderEvent::Flushed),
            }
        }
    }

    fn decode(&mut self, chunk: &EncodedChunk) -> std::result::Result<(), String> {
        if self.fail_at == Some(chunk.index) {
            return Err(format!("injected failure at frame {}", chunk.index));
        }
        let chained = chunk.key
            || chunk
                .index
                .checked_sub(1)
                .is_some_and(|previous| self.last_index == Some(previous));
        if !chained {
            return Err(format!(
                "frame {} submitted without its reference (last decoded {:?})",
                chunk.index, self.last_index
            ));
        }
        self.last_index = Some(chunk.index);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Sink that records every render.
#[derive(Debug, Default)]
pub struct RecordingSink {
    renders: Mutex<Vec<(usize, DecodedFrame)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered indices in order.
    pub fn rendered(&self) -> Vec<usize> {
        self.renders.lock().iter().map(|(index, _)| *index).collect()
    }

    /// Pixel data of every render in order.
    pub fn rendered_data(&self) -> Vec<Bytes> {
        self.renders
            .lock()
            .iter()
            .map(|(_, frame)| frame.data.clone())
            .collect()
    }

    /// The most recent render.
    pub fn last(&self) -> Option<(usize, DecodedFrame)> {
        self.renders.lock().last().cloned()
    }
}

impl FrameSink for RecordingSink {
    fn render(&self, index: usize, frame: &DecodedFrame) {
        self.renders.lock().push((index, frame.clone()));
    }
}
