//! Frame-accurate decode engine.
//!
//! One engine serves one camera angle. It renders an arbitrary frame of a
//! [`Timeline`] by decoding sequentially from the frame's governing keyframe,
//! keeping a bounded window of decoded frames around the scrub position so
//! small steps are served without touching the decoder.
//!
//! Requests are served latest-wins: a request that arrives while a decode is
//! in flight takes the single pending slot (replacing whatever was there) and
//! interrupts the in-flight decode, whose target is then never rendered.

use crate::cache::FrameCache;
use crate::decoder::{
    DecoderBackend, DecoderEvent, DecoderOutput, DecoderSession, EncodedChunk, FrameSink,
};
use crate::{EngineError, Result};
use dashframe_media::{FrameDescriptor, TelemetryRecord, Timeline};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum number of decoded frames kept.
    pub cache_capacity: usize,
    /// Frames decoded past the target; frames this close to the target are cached.
    pub lookahead: usize,
}

impl EngineOptions {
    /// About two seconds at 30 fps.
    pub const DEFAULT_CACHE_CAPACITY: usize = 60;
    pub const DEFAULT_LOOKAHEAD: usize = 5;
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
            lookahead: Self::DEFAULT_LOOKAHEAD,
        }
    }
}

/// How a [`FrameEngine::show_frame`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was rendered to the sink.
    Rendered { index: usize, from_cache: bool },
    /// A decode was in flight; the target was queued behind it.
    Queued,
    /// The work was abandoned (superseded, reloaded or disposed).
    Cancelled,
}

struct ActiveSession {
    generation: u64,
    session: Box<dyn DecoderSession>,
    keyframe: usize,
    next_submit: usize,
    next_output: usize,
}

struct EngineState {
    timeline: Arc<Timeline>,
    current_index: usize,
    cache: FrameCache,
    session: Option<ActiveSession>,
    session_keyframe: Option<usize>,
    session_last_index: Option<usize>,
    busy: bool,
    pending: Option<usize>,
    disposed: bool,
}

impl EngineState {
    fn close_session(&mut self) {
        if let Some(mut active) = self.session.take() {
            tracing::trace!(generation = active.generation, "Closing decoder session");
            active.session.close();
        }
    }

    fn check_range(&self, index: usize) -> Result<()> {
        let len = self.timeline.len();
        if index >= len {
            return Err(EngineError::FrameOutOfRange { index, len });
        }
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }
}

struct Inner {
    state: Mutex<EngineState>,
    events_tx: mpsc::UnboundedSender<(u64, DecoderEvent)>,
    events_rx: AsyncMutex<mpsc::UnboundedReceiver<(u64, DecoderEvent)>>,
    generation: AtomicU64,
    interrupt: Notify,
    backend: Arc<dyn DecoderBackend>,
    sink: Arc<dyn FrameSink>,
    options: EngineOptions,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state.get_mut().close_session();
    }
}

/// Resets the engine if a serving call is dropped mid-decode.
///
/// The abandoned session still has outputs and a flush marker queued, so it
/// is closed and the next request starts from a fresh one.
struct BusyGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.inner.state.lock();
            state.busy = false;
            state.pending = None;
            state.close_session();
            state.session_keyframe = None;
            state.session_last_index = None;
            tracing::debug!("Serving call dropped, decoder session closed");
        }
    }
}

/// Decode engine handle. Clones share the same engine.
#[derive(Clone)]
pub struct FrameEngine {
    inner: Arc<Inner>,
}

impl FrameEngine {
    pub fn new(
        timeline: Arc<Timeline>,
        backend: Arc<dyn DecoderBackend>,
        sink: Arc<dyn FrameSink>,
        options: EngineOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = EngineState {
            timeline,
            current_index: 0,
            cache: FrameCache::new(options.cache_capacity),
            session: None,
            session_keyframe: None,
            session_last_index: None,
            busy: false,
            pending: None,
            disposed: false,
        };

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                events_tx,
                events_rx: AsyncMutex::new(events_rx),
                generation: AtomicU64::new(0),
                interrupt: Notify::new(),
                backend,
                sink,
                options,
            }),
        }
    }

    pub fn options(&self) -> EngineOptions {
        self.inner.options
    }

    /// Render frame `index`.
    ///
    /// Returns [`FrameOutcome::Queued`] when another call is already decoding;
    /// that call picks the target up once its own work is done or interrupted.
    /// Otherwise returns the outcome of the last target this call serviced,
    /// which is a later queued target when the original one was superseded.
    pub async fn show_frame(&self, index: usize) -> Result<FrameOutcome> {
        {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Ok(FrameOutcome::Cancelled);
            }
            state.check_range(index)?;
            if state.busy {
                tracing::trace!(index, replaced = ?state.pending, "Decode in flight, queueing target");
                state.pending = Some(index);
                drop(state);
                self.inner.interrupt.notify_one();
                return Ok(FrameOutcome::Queued);
            }
            state.busy = true;
        }

        let mut guard = BusyGuard {
            inner: &self.inner,
            armed: true,
        };
        let mut outcome = self.serve(index).await;

        loop {
            let next = {
                let mut state = self.inner.state.lock();
                match state.pending.take() {
                    Some(next) if !state.disposed => next,
                    _ => {
                        state.busy = false;
                        guard.armed = false;
                        break;
                    }
                }
            };
            if let Err(e) = &outcome {
                tracing::warn!(error = %e, next, "Superseded target had failed");
            }
            outcome = self.serve(next).await;
        }

        outcome
    }

    async fn serve(&self, index: usize) -> Result<FrameOutcome> {
        let cached = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Ok(FrameOutcome::Cancelled);
            }
            state.check_range(index)?;
            let hit = state.cache.get(index).cloned();
            if hit.is_some() {
                state.current_index = index;
            }
            hit
        };

        if let Some(frame) = cached {
            tracing::trace!(index, "Rendering cached frame");
            self.inner.sink.render(index, &frame);
            return Ok(FrameOutcome::Rendered {
                index,
                from_cache: true,
            });
        }

        let generation = {
            let mut state = self.inner.state.lock();
            self.start_decode(&mut state, index)?
        };
        self.await_target(generation, index).await
    }

    /// Prepare a session and submit everything up to the end of the window.
    fn start_decode(&self, state: &mut EngineState, target: usize) -> Result<u64> {
        let timeline = Arc::clone(&state.timeline);
        let keyframe = timeline
            .governing_keyframe(target)
            .ok_or(EngineError::NoKeyframe { index: target })?;

        let capacity = self.inner.options.cache_capacity;
        let same_group = state.session_keyframe == Some(keyframe);
        let small_jump = state
            .session_last_index
            .is_some_and(|last| last.abs_diff(target) <= capacity);
        if !same_group || !small_jump {
            state.cache.clear();
        }

        let reuse = same_group
            && small_jump
            && state
                .session
                .as_ref()
                .is_some_and(|active| active.keyframe == keyframe && active.next_submit <= target);

        if !reuse {
            state.close_session();
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let output = DecoderOutput::new(generation, self.inner.events_tx.clone());
            let session = self.inner.backend.open(&timeline.config, output)?;
            state.session = Some(ActiveSession {
                generation,
                session,
                keyframe,
                next_submit: keyframe,
                next_output: keyframe,
            });
        }

        let last = (target + self.inner.options.lookahead).min(timeline.len() - 1);
        state.current_index = target;
        state.session_keyframe = Some(keyframe);
        state.session_last_index = Some(last);

        let Some(active) = state.session.as_mut() else {
            return Err(EngineError::Backend("no decoder session".to_string()));
        };
        let first = active.next_submit;
        let generation = active.generation;
        let submitted = submit(&mut *active.session, &timeline.frames[first..=last]);
        active.next_submit = last + 1;

        if let Err(e) = submitted {
            tracing::error!(error = %e, frame = target, generation, "Failed to submit frames");
            state.close_session();
            return Err(e);
        }

        tracing::debug!(
            frame = target,
            keyframe,
            first,
            last,
            reuse,
            generation,
            backend = self.inner.backend.name(),
            "Decoding"
        );
        Ok(generation)
    }

    async fn await_target(&self, generation: u64, target: usize) -> Result<FrameOutcome> {
        let mut events = self.inner.events_rx.lock().await;
        let mut rendered = false;

        loop {
            let step = tokio::select! {
                biased;
                _ = self.inner.interrupt.notified() => self.on_interrupt(generation, target),
                event = events.recv() => self.on_event(generation, target, event, &mut rendered),
            };
            if let Some(outcome) = step {
                return outcome;
            }
        }
    }

    fn on_interrupt(&self, generation: u64, target: usize) -> Option<Result<FrameOutcome>> {
        let mut state = self.inner.state.lock();
        let current = state.is_current(generation);
        if current && !state.disposed && state.pending.is_none() {
            return None;
        }
        if current {
            state.close_session();
        }
        tracing::debug!(frame = target, generation, pending = ?state.pending, "Decode interrupted");
        Some(Ok(FrameOutcome::Cancelled))
    }

    fn on_event(
        &self,
        generation: u64,
        target: usize,
        event: Option<(u64, DecoderEvent)>,
        rendered: &mut bool,
    ) -> Option<Result<FrameOutcome>> {
        let Some((event_generation, event)) = event else {
            return Some(Err(EngineError::Backend(
                "decoder event channel closed".to_string(),
            )));
        };
        if event_generation != generation {
            tracing::trace!(event_generation, generation, "Dropping event from superseded session");
            return None;
        }

        match event {
            DecoderEvent::Output(frame) => {
                let mut state = self.inner.state.lock();
                let index = match state.session.as_mut() {
                    Some(active) if active.generation == generation => {
                        active.next_output += 1;
                        active.next_output - 1
                    }
                    _ => return None,
                };

                if index.abs_diff(target) <= self.inner.options.lookahead {
                    state.cache.insert(index, frame.clone());
                }

                if index == target && !*rendered && state.pending.is_none() && !state.disposed {
                    drop(state);
                    self.inner.sink.render(index, &frame);
                    *rendered = true;
                    tracing::trace!(index, "Rendered target frame");
                }
                None
            }
            DecoderEvent::Flushed => {
                if *rendered {
                    return Some(Ok(FrameOutcome::Rendered {
                        index: target,
                        from_cache: false,
                    }));
                }
                let mut state = self.inner.state.lock();
                if state.disposed || state.pending.is_some() {
                    state.close_session();
                    return Some(Ok(FrameOutcome::Cancelled));
                }
                state.close_session();
                let message = format!("decoder flushed without producing frame {target}");
                tracing::error!(frame = target, generation, "{message}");
                Some(Err(EngineError::DecodeFailed(message)))
            }
            DecoderEvent::Error(message) => {
                tracing::error!(frame = target, generation, error = %message, "Decode failed");
                self.inner.state.lock().close_session();
                Some(Err(EngineError::DecodeFailed(message)))
            }
            DecoderEvent::Aborted => {
                tracing::debug!(frame = target, generation, "Decoder session aborted");
                self.inner.state.lock().close_session();
                Some(Ok(FrameOutcome::Cancelled))
            }
        }
    }

    /// Index of the frame most recently requested for display.
    pub fn current_index(&self) -> usize {
        self.inner.state.lock().current_index
    }

    /// Telemetry in effect at the current frame.
    pub fn current_telemetry(&self) -> Option<Arc<TelemetryRecord>> {
        let state = self.inner.state.lock();
        state.timeline.telemetry_at(state.current_index).cloned()
    }

    /// Index of the frame shown at `time_ms`.
    pub fn frame_index_at_time(&self, time_ms: f64) -> usize {
        self.inner.state.lock().timeline.frame_index_at(time_ms)
    }

    /// A frame of the loaded timeline.
    pub fn frame(&self, index: usize) -> Option<FrameDescriptor> {
        self.inner.state.lock().timeline.get(index).cloned()
    }

    /// The loaded timeline.
    pub fn timeline(&self) -> Arc<Timeline> {
        Arc::clone(&self.inner.state.lock().timeline)
    }

    /// Replace the timeline wholesale.
    ///
    /// Any in-flight decode is cancelled, the session is torn down and the
    /// cache emptied. A disposed engine becomes usable again.
    pub fn load(&self, timeline: Arc<Timeline>) {
        {
            let mut state = self.inner.state.lock();
            state.close_session();
            state.cache.clear();
            state.timeline = timeline;
            state.current_index = 0;
            state.session_keyframe = None;
            state.session_last_index = None;
            state.pending = None;
            state.disposed = false;
            tracing::debug!(frames = state.timeline.len(), "Loaded timeline");
        }
        self.inner.interrupt.notify_one();
    }

    /// Tear down the session and release every cached frame.
    ///
    /// In-flight and later requests resolve to [`FrameOutcome::Cancelled`].
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.lock();
            state.disposed = true;
            state.pending = None;
            state.close_session();
            state.cache.clear();
            state.session_keyframe = None;
            state.session_last_index = None;
        }
        self.inner.interrupt.notify_one();
        tracing::debug!("Engine disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    pub fn cache_len(&self) -> usize {
        self.inner.state.lock().cache.len()
    }

    pub fn cached_indices(&self) -> Vec<usize> {
        self.inner.state.lock().cache.indices()
    }
}

fn submit(session: &mut dyn DecoderSession, frames: &[FrameDescriptor]) -> Result<()> {
    for frame in frames {
        session.decode(EncodedChunk::from_frame(frame))?;
    }
    session.flush()
}
