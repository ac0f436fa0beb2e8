//! In-memory audio devices for session tests
//!
//! - `FakeMicrophone`: pushes frames into the bound tap on demand
//! - `ManualClock`: output clock advanced by hand, fires end callbacks
//! - `FakeAudioBackend`: hands out the two above and counts acquisitions

// Not every test binary uses every helper
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use astric_voice::core::capture::{AudioBackend, FrameTap, MicrophoneStream};
use astric_voice::core::codec::{AudioFormat, DecodedBuffer};
use astric_voice::core::playback::{OutputClock, PlaybackEnded, SourceId};
use astric_voice::core::realtime::{RealtimeError, RealtimeResult};

// =============================================================================
// Microphone
// =============================================================================

/// State shared between a `FakeMicrophone` and the test driving it.
#[derive(Default)]
pub struct MicrophoneState {
    tap: Mutex<Option<FrameTap>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl MicrophoneState {
    /// Deliver one frame as the audio thread would. Returns false when no
    /// tap is bound.
    pub fn push_frame(&self, samples: &[f32]) -> bool {
        let tap = self.tap.lock().clone();
        match tap {
            Some(tap) => {
                tap(samples);
                true
            }
            None => false,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.tap.lock().is_some()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

pub struct FakeMicrophone {
    state: Arc<MicrophoneState>,
}

impl MicrophoneStream for FakeMicrophone {
    fn start(&mut self, tap: FrameTap) -> RealtimeResult<()> {
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        *self.state.tap.lock() = Some(tap);
        Ok(())
    }

    fn stop(&mut self) {
        if self.state.tap.lock().take().is_some() {
            self.state.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Output Clock
// =============================================================================

/// One `start` call seen by the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedSource {
    pub id: SourceId,
    pub at: Duration,
    pub duration: Duration,
}

struct PendingEnd {
    id: SourceId,
    end: Duration,
    on_ended: PlaybackEnded,
}

/// Output clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    started: Mutex<Vec<StartedSource>>,
    pending: Mutex<Vec<PendingEnd>>,
    stopped: Mutex<Vec<SourceId>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_now(&self, now: Duration) {
        *self.now.lock() = now;
    }

    /// Move time forward and fire end callbacks of sources that finished.
    pub fn advance(&self, by: Duration) {
        let now = {
            let mut guard = self.now.lock();
            *guard += by;
            *guard
        };

        let finished: Vec<PendingEnd> = {
            let mut pending = self.pending.lock();
            let (done, rest): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|p| p.end <= now);
            *pending = rest;
            done
        };
        for end in finished {
            (end.on_ended)();
        }
    }

    pub fn started(&self) -> Vec<StartedSource> {
        self.started.lock().clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.stopped.lock().clone()
    }
}

impl OutputClock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn start(
        &self,
        id: SourceId,
        buffer: Arc<DecodedBuffer>,
        at: Duration,
        on_ended: PlaybackEnded,
    ) -> RealtimeResult<()> {
        let duration = buffer.duration();
        self.started.lock().push(StartedSource { id, at, duration });
        self.pending.lock().push(PendingEnd {
            id,
            end: at + duration,
            on_ended,
        });
        Ok(())
    }

    fn stop(&self, id: SourceId) {
        self.stopped.lock().push(id);
        self.pending.lock().retain(|p| p.id != id);
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Audio backend with scripted permission behavior.
pub struct FakeAudioBackend {
    pub microphone: Arc<MicrophoneState>,
    pub clock: Arc<ManualClock>,
    deny: AtomicBool,
    acquisitions: AtomicUsize,
    outputs_opened: AtomicUsize,
    requested: Mutex<Vec<(AudioFormat, usize)>>,
}

impl FakeAudioBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            microphone: Arc::new(MicrophoneState::default()),
            clock: ManualClock::new(),
            deny: AtomicBool::new(false),
            acquisitions: AtomicUsize::new(0),
            outputs_opened: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        })
    }

    /// Backend whose microphone access is always refused.
    pub fn denying() -> Arc<Self> {
        let backend = Self::new();
        backend.deny.store(true, Ordering::SeqCst);
        backend
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn outputs_opened(&self) -> usize {
        self.outputs_opened.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<(AudioFormat, usize)> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl AudioBackend for FakeAudioBackend {
    async fn acquire_microphone(
        &self,
        format: AudioFormat,
        frame_size: usize,
    ) -> RealtimeResult<Box<dyn MicrophoneStream>> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push((format, frame_size));
        if self.deny.load(Ordering::SeqCst) {
            return Err(RealtimeError::PermissionDenied(
                "microphone access refused".to_string(),
            ));
        }
        Ok(Box::new(FakeMicrophone {
            state: self.microphone.clone(),
        }))
    }

    async fn open_output(&self, _sample_rate: u32) -> RealtimeResult<Arc<dyn OutputClock>> {
        self.outputs_opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.clock.clone())
    }
}
