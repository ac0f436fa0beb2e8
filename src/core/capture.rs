//! Microphone capture pipeline.
//!
//! The microphone calls a synchronous tap from its audio thread with fixed-size
//! frames. The tap quantizes the frame and pushes it into a bounded
//! [`FrameQueue`]; a forwarder task drains the queue, base64-encodes each frame
//! and hands it to the transport as realtime input.
//!
//! # Backpressure
//!
//! The queue holds at most `queue_capacity` frames. When the transport falls
//! behind, the oldest queued frame is discarded to make room for the newest
//! one, so the tap never waits and the backlog stays bounded. Dropped frames
//! are counted and logged.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::codec::{AudioFormat, AudioFrame};
use crate::core::playback::OutputClock;
use crate::core::realtime::{OutboundSender, RealtimeResult};

/// Default samples per capture frame.
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// Default number of frames buffered between tap and transport.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Called from the audio thread with one frame of normalized samples.
pub type FrameTap = Arc<dyn Fn(&[f32]) + Send + Sync>;

// =============================================================================
// Device Traits
// =============================================================================

/// An acquired microphone.
///
/// `start` binds the tap; the stream then calls it with frames of the size
/// requested at acquisition. `stop` unbinds the tap and releases the device.
/// Both must be safe to call more than once.
pub trait MicrophoneStream: Send {
    fn start(&mut self, tap: FrameTap) -> RealtimeResult<()>;

    fn stop(&mut self);
}

/// Access to the host's audio devices.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Acquire exclusive microphone capture.
    ///
    /// Fails with `RealtimeError::PermissionDenied` when access is refused or
    /// no input device exists.
    async fn acquire_microphone(
        &self,
        format: AudioFormat,
        frame_size: usize,
    ) -> RealtimeResult<Box<dyn MicrophoneStream>>;

    /// Open the output device and return its clock.
    async fn open_output(&self, sample_rate: u32) -> RealtimeResult<Arc<dyn OutputClock>>;
}

// =============================================================================
// Frame Queue
// =============================================================================

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<AudioFrame>,
    closed: bool,
}

/// Bounded drop-oldest queue between the audio thread and the forwarder.
#[derive(Debug)]
pub struct FrameQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push a frame without waiting. Returns false once the queue is closed.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let evicted = {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            let evicted = if state.frames.len() >= self.capacity {
                state.frames.pop_front().is_some()
            } else {
                false
            };
            state.frames.push_back(frame);
            evicted
        };

        if evicted {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if total == 1 || total % 50 == 0 {
                tracing::warn!(dropped = total, "Capture queue full, dropping oldest frame");
            }
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the next frame. Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<AudioFrame> {
        loop {
            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue and discard anything still buffered.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.frames.clear();
        }
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Capture Pipeline
// =============================================================================

/// Capture parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub format: AudioFormat,
    pub frame_size: usize,
    pub queue_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::mono(16_000),
            frame_size: DEFAULT_FRAME_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Frame counters for one capture run.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub captured: AtomicU64,
    pub sent: AtomicU64,
}

/// A running capture: the queue, the forwarder task and its stop signal.
pub struct CaptureHandle {
    queue: Arc<FrameQueue>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    stats: Arc<CaptureStats>,
}

impl CaptureHandle {
    /// Stop forwarding. Frames still queued are discarded and frames tapped
    /// afterwards are ignored.
    pub async fn stop(&mut self) {
        self.queue.close();
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await
                && e.is_panic()
            {
                tracing::error!("Capture forwarder panicked: {}", e);
            }
            tracing::info!(
                captured = self.stats.captured.load(Ordering::Relaxed),
                sent = self.stats.sent.load(Ordering::Relaxed),
                dropped = self.queue.dropped(),
                "Capture stopped"
            );
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.stats.sent.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.queue.close();
        self.cancel.cancel();
    }
}

/// Bind a tap to the microphone and start forwarding frames to the transport.
pub fn start_capture(
    microphone: &mut dyn MicrophoneStream,
    outbound: OutboundSender,
    config: &CaptureConfig,
) -> RealtimeResult<CaptureHandle> {
    let queue = Arc::new(FrameQueue::new(config.queue_capacity));
    let stats = Arc::new(CaptureStats::default());
    let cancel = CancellationToken::new();

    let tap: FrameTap = {
        let queue = queue.clone();
        let stats = stats.clone();
        let format = config.format;
        Arc::new(move |samples: &[f32]| {
            if queue.push(AudioFrame::from_float(samples, format)) {
                stats.captured.fetch_add(1, Ordering::Relaxed);
            }
        })
    };

    let task = tokio::spawn(forward_frames(
        queue.clone(),
        outbound,
        cancel.clone(),
        stats.clone(),
    ));

    if let Err(e) = microphone.start(tap) {
        queue.close();
        cancel.cancel();
        return Err(e);
    }

    tracing::info!(
        format = %config.format,
        frame_size = config.frame_size,
        queue_capacity = config.queue_capacity,
        "Capture started"
    );

    Ok(CaptureHandle {
        queue,
        cancel,
        task: Some(task),
        stats,
    })
}

async fn forward_frames(
    queue: Arc<FrameQueue>,
    outbound: OutboundSender,
    cancel: CancellationToken,
    stats: Arc<CaptureStats>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = queue.pop() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let chunk = frame.encode();
        let bytes = chunk.data.len();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = outbound.send_audio(chunk) => {
                if result.is_err() {
                    tracing::debug!("Transport closed, stopping capture forwarder");
                    break;
                }
            }
        }

        let sent = stats.sent.fetch_add(1, Ordering::Relaxed) + 1;
        if sent == 1 || sent % 100 == 0 {
            tracing::debug!(chunk = sent, pcm_bytes = bytes, "Forwarded audio chunk");
        }
    }
}
