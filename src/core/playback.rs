//! Gap-free playback scheduling against a monotonic output clock.
//!
//! Model audio arrives in chunks. Each decoded chunk is scheduled to start at
//! `max(cursor, clock.now())`, and the cursor then advances by the chunk's
//! duration, so chunks play back to back in the order `schedule` was called.
//! The session calls `schedule` from its serialized event handler with decoding
//! done synchronously beforehand, so call order is arrival order.
//!
//! End-of-playback callbacks come from the audio thread, so the cursor and the
//! active set sit behind a `parking_lot::Mutex`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::codec::DecodedBuffer;
use crate::core::realtime::RealtimeResult;

/// Identifier of one scheduled source.
pub type SourceId = u64;

/// Invoked by the clock once a source finished playing.
pub type PlaybackEnded = Box<dyn FnOnce() + Send + 'static>;

/// The output device as seen by the scheduler.
///
/// `now` must be monotonic. `start` renders `buffer` beginning at `at` on the
/// same timeline and calls `on_ended` when it is done; `stop` silences a source
/// immediately, after which `on_ended` may or may not fire.
pub trait OutputClock: Send + Sync {
    fn now(&self) -> Duration;

    fn start(
        &self,
        id: SourceId,
        buffer: Arc<DecodedBuffer>,
        at: Duration,
        on_ended: PlaybackEnded,
    ) -> RealtimeResult<()>;

    fn stop(&self, id: SourceId);
}

/// A scheduled buffer and its slot on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSource {
    pub id: SourceId,
    pub start_at: Duration,
    pub duration: Duration,
}

impl PlaybackSource {
    pub fn end(&self) -> Duration {
        self.start_at + self.duration
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    next_start: Duration,
    next_id: SourceId,
    active: HashMap<SourceId, PlaybackSource>,
}

/// Sequential playback of decoded chunks.
pub struct PlaybackScheduler {
    clock: Arc<dyn OutputClock>,
    state: Arc<Mutex<SchedulerState>>,
}

impl PlaybackScheduler {
    pub fn new(clock: Arc<dyn OutputClock>) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(SchedulerState::default())),
        }
    }

    /// Schedule a buffer right after everything scheduled before it.
    pub fn schedule(&self, buffer: DecodedBuffer) -> RealtimeResult<PlaybackSource> {
        let duration = buffer.duration();
        let now = self.clock.now();

        let source = {
            let mut state = self.state.lock();
            let start_at = state.next_start.max(now);
            let id = state.next_id;
            state.next_id += 1;
            state.next_start = start_at + duration;

            let source = PlaybackSource {
                id,
                start_at,
                duration,
            };
            state.active.insert(id, source);
            source
        };

        let weak: Weak<Mutex<SchedulerState>> = Arc::downgrade(&self.state);
        let on_ended: PlaybackEnded = Box::new(move || {
            if let Some(state) = weak.upgrade() {
                state.lock().active.remove(&source.id);
            }
        });

        if let Err(e) = self
            .clock
            .start(source.id, Arc::new(buffer), source.start_at, on_ended)
        {
            tracing::warn!(source_id = source.id, error = %e, "Failed to start playback source");
            let mut state = self.state.lock();
            state.active.remove(&source.id);
            // Give the slot back unless a later schedule or stop_all moved the cursor.
            if state.next_start == source.end() {
                state.next_start = source.start_at;
            }
            return Err(e);
        }

        tracing::trace!(
            source_id = source.id,
            start_ms = source.start_at.as_millis() as u64,
            duration_ms = source.duration.as_millis() as u64,
            "Scheduled playback"
        );
        Ok(source)
    }

    /// Stop every active source and reset the cursor to zero.
    pub fn stop_all(&self) -> usize {
        let mut stopped: Vec<SourceId> = {
            let mut state = self.state.lock();
            state.next_start = Duration::ZERO;
            state.active.drain().map(|(id, _)| id).collect()
        };
        stopped.sort_unstable();

        for id in &stopped {
            self.clock.stop(*id);
        }
        if !stopped.is_empty() {
            tracing::debug!(count = stopped.len(), "Stopped active playback");
        }
        stopped.len()
    }

    /// Number of sources that have not finished yet.
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Where the next buffer would start if the clock were behind it.
    pub fn next_start(&self) -> Duration {
        self.state.lock().next_start
    }

    pub fn clock(&self) -> &Arc<dyn OutputClock> {
        &self.clock
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}
