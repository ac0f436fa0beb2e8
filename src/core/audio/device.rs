//! Host audio devices through CPAL.
//!
//! CPAL streams are not `Send` on every platform, so each stream is built and
//! held on its own thread and stopped through a channel.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use parking_lot::Mutex;
use tokio::runtime::RuntimeFlavor;

use crate::core::capture::{AudioBackend, FrameTap, MicrophoneStream};
use crate::core::codec::{AudioFormat, DecodedBuffer};
use crate::core::playback::{OutputClock, PlaybackEnded, SourceId};
use crate::core::realtime::{RealtimeError, RealtimeResult};

/// Audio backend on the host's default input and output devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    /// Names of the available input devices.
    pub fn list_input_devices() -> RealtimeResult<Vec<String>> {
        let devices = cpal::default_host()
            .input_devices()
            .map_err(|e| RealtimeError::AudioDevice(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

#[async_trait]
impl AudioBackend for CpalBackend {
    async fn acquire_microphone(
        &self,
        format: AudioFormat,
        frame_size: usize,
    ) -> RealtimeResult<Box<dyn MicrophoneStream>> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| RealtimeError::PermissionDenied("no input device available".into()))?;
        let supported = device
            .default_input_config()
            .map_err(|e| RealtimeError::PermissionDenied(e.to_string()))?;

        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            device_rate = supported.sample_rate().0,
            device_channels = supported.channels(),
            target = %format,
            "Acquired microphone"
        );

        Ok(Box::new(CpalMicrophone {
            format,
            frame_size,
            worker: None,
        }))
    }

    async fn open_output(&self, sample_rate: u32) -> RealtimeResult<Arc<dyn OutputClock>> {
        let output = CpalOutput::open(sample_rate)?;
        Ok(Arc::new(output))
    }
}

// =============================================================================
// Microphone
// =============================================================================

struct StreamWorker {
    stop: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl StreamWorker {
    /// Spawn a thread that builds a stream with `build` and holds it until
    /// stopped.
    fn spawn<T, F>(name: &str, build: F) -> RealtimeResult<(Self, T)>
    where
        T: Send + 'static,
        F: FnOnce() -> RealtimeResult<(cpal::Stream, T)> + Send + 'static,
    {
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<RealtimeResult<T>>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok((stream, info)) => {
                        let _ = ready_tx.send(Ok(info));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Returns on stop or when the owner is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| RealtimeError::AudioDevice(e.to_string()))?;

        match block_outside_runtime(|| ready_rx.recv()) {
            Ok(Ok(info)) => Ok((
                Self {
                    stop: stop_tx,
                    handle,
                },
                info,
            )),
            Ok(Err(e)) => {
                let _ = block_outside_runtime(move || handle.join());
                Err(e)
            }
            Err(_) => Err(RealtimeError::AudioDevice(format!(
                "{} thread exited during startup",
                name
            ))),
        }
    }

    fn shutdown(self) {
        let _ = self.stop.send(());
        let handle = self.handle;
        if block_outside_runtime(move || handle.join()).is_err() {
            tracing::error!("Audio stream thread panicked");
        }
    }
}

/// Run a blocking wait on an audio thread without stalling async tasks.
///
/// On a multi-thread runtime the worker hands its other tasks off first. A
/// current-thread runtime cannot do that, so the wait runs in place there, as
/// it does outside any runtime.
fn block_outside_runtime<R>(wait: impl FnOnce() -> R) -> R {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(wait)
        }
        _ => wait(),
    }
}

/// Default input device, mixed down to mono and resampled to the target rate.
pub struct CpalMicrophone {
    format: AudioFormat,
    frame_size: usize,
    worker: Option<StreamWorker>,
}

impl MicrophoneStream for CpalMicrophone {
    fn start(&mut self, tap: FrameTap) -> RealtimeResult<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let format = self.format;
        let frame_size = self.frame_size;
        let (worker, ()) = StreamWorker::spawn("astric-mic", move || {
            let stream = open_input_stream(format, frame_size, tap)?;
            Ok((stream, ()))
        })?;
        self.worker = Some(worker);
        tracing::info!(format = %self.format, frame_size, "Microphone started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
            tracing::info!("Microphone stopped");
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_input_stream(
    format: AudioFormat,
    frame_size: usize,
    tap: FrameTap,
) -> RealtimeResult<cpal::Stream> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| RealtimeError::PermissionDenied("no input device available".into()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| RealtimeError::PermissionDenied(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    let assembler = FrameAssembler::new(
        config.sample_rate.0,
        format.sample_rate,
        config.channels as usize,
        frame_size,
        tap,
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_input::<f32>(&device, &config, assembler),
        SampleFormat::I16 => build_input::<i16>(&device, &config, assembler),
        SampleFormat::U16 => build_input::<u16>(&device, &config, assembler),
        other => Err(RealtimeError::AudioDevice(format!(
            "unsupported input sample format {:?}",
            other
        ))),
    }?;

    stream
        .play()
        .map_err(|e| RealtimeError::AudioDevice(e.to_string()))?;
    Ok(stream)
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut assembler: FrameAssembler,
) -> RealtimeResult<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| assembler.push_interleaved(data),
            |err| tracing::warn!("Input stream error: {}", err),
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                RealtimeError::PermissionDenied(e.to_string())
            }
            other => RealtimeError::AudioDevice(other.to_string()),
        })
}

/// Turns device callbacks into fixed-size mono frames at the target rate.
///
/// Channels are averaged; rate conversion picks the nearest preceding sample.
struct FrameAssembler {
    ratio: f64,
    phase: f64,
    channels: usize,
    frame: Vec<f32>,
    frame_size: usize,
    tap: FrameTap,
}

impl FrameAssembler {
    fn new(
        source_rate: u32,
        target_rate: u32,
        channels: usize,
        frame_size: usize,
        tap: FrameTap,
    ) -> Self {
        Self {
            ratio: source_rate as f64 / target_rate.max(1) as f64,
            phase: 0.0,
            channels: channels.max(1),
            frame: Vec::with_capacity(frame_size),
            frame_size: frame_size.max(1),
            tap,
        }
    }

    fn push_interleaved<T>(&mut self, data: &[T])
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        for frame in data.chunks(self.channels) {
            let sum: f32 = frame.iter().map(|s| s.to_sample::<f32>()).sum();
            self.push_mono(sum / frame.len() as f32);
        }
    }

    fn push_mono(&mut self, sample: f32) {
        while self.phase < 1.0 {
            self.frame.push(sample);
            if self.frame.len() == self.frame_size {
                (self.tap)(&self.frame);
                self.frame.clear();
            }
            self.phase += self.ratio;
        }
        self.phase -= 1.0;
    }
}

// =============================================================================
// Output
// =============================================================================

struct ActiveSource {
    id: SourceId,
    buffer: Arc<DecodedBuffer>,
    start_frame: u64,
    on_ended: Option<PlaybackEnded>,
}

/// Sources waiting for or in playback, plus the device frame counter.
#[derive(Default)]
struct Mixer {
    sources: Vec<ActiveSource>,
    frames_played: u64,
}

impl Mixer {
    /// Render the next `out.len() / channels` frames. Returns the end callbacks
    /// of sources that finished, to be run after the lock is released.
    fn render(&mut self, out: &mut [f32], channels: usize, device_rate: u32) -> Vec<PlaybackEnded> {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        let first = self.frames_played;

        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let position = first + i as u64;
            let mut value = 0.0f32;
            for source in &self.sources {
                if position < source.start_frame {
                    continue;
                }
                let offset = position - source.start_frame;
                let index = (offset * source.buffer.sample_rate as u64 / device_rate as u64) as usize;
                if let Some(sample) = source.buffer.channels.first().and_then(|c| c.get(index)) {
                    value += *sample;
                }
            }
            frame.fill(value.clamp(-1.0, 1.0));
        }
        self.frames_played += frames as u64;

        let now = self.frames_played;
        let mut ended = Vec::new();
        self.sources.retain_mut(|source| {
            let length = source.buffer.frames() as u64 * device_rate as u64
                / source.buffer.sample_rate.max(1) as u64;
            if source.start_frame + length <= now {
                ended.extend(source.on_ended.take());
                false
            } else {
                true
            }
        });
        ended
    }
}

/// Default output device driven by a mixer whose frame counter is the clock.
pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    device_rate: u32,
    worker: Mutex<Option<StreamWorker>>,
}

impl CpalOutput {
    fn open(requested_rate: u32) -> RealtimeResult<Self> {
        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let stream_mixer = mixer.clone();

        let (worker, device_rate) = StreamWorker::spawn("astric-speaker", move || {
            open_output_stream(stream_mixer)
        })?;

        tracing::info!(requested_rate, device_rate, "Speaker opened");
        Ok(Self {
            mixer,
            device_rate,
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl OutputClock for CpalOutput {
    fn now(&self) -> Duration {
        let frames = self.mixer.lock().frames_played;
        Duration::from_nanos(
            (frames as u128 * 1_000_000_000 / self.device_rate.max(1) as u128) as u64,
        )
    }

    fn start(
        &self,
        id: SourceId,
        buffer: Arc<DecodedBuffer>,
        at: Duration,
        on_ended: PlaybackEnded,
    ) -> RealtimeResult<()> {
        let start_frame = (at.as_nanos() * self.device_rate as u128 / 1_000_000_000) as u64;
        self.mixer.lock().sources.push(ActiveSource {
            id,
            buffer,
            start_frame,
            on_ended: Some(on_ended),
        });
        Ok(())
    }

    fn stop(&self, id: SourceId) {
        self.mixer.lock().sources.retain(|s| s.id != id);
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.shutdown();
            tracing::info!("Speaker closed");
        }
    }
}

fn open_output_stream(mixer: Arc<Mutex<Mixer>>) -> RealtimeResult<(cpal::Stream, u32)> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| RealtimeError::AudioDevice("no output device available".into()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| RealtimeError::AudioDevice(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let device_rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::F32 => build_output::<f32>(&device, &config, mixer),
        SampleFormat::I16 => build_output::<i16>(&device, &config, mixer),
        SampleFormat::U16 => build_output::<u16>(&device, &config, mixer),
        other => Err(RealtimeError::AudioDevice(format!(
            "unsupported output sample format {:?}",
            other
        ))),
    }?;

    stream
        .play()
        .map_err(|e| RealtimeError::AudioDevice(e.to_string()))?;
    Ok((stream, device_rate))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> RealtimeResult<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let device_rate = config.sample_rate.0;
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                let ended = mixer.lock().render(&mut scratch, channels, device_rate);
                for (out, value) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(*value);
                }
                for on_ended in ended {
                    on_ended();
                }
            },
            |err| tracing::warn!("Output stream error: {}", err),
            None,
        )
        .map_err(|e| RealtimeError::AudioDevice(e.to_string()))
}
