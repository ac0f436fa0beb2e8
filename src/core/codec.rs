//! PCM codec for realtime audio.
//!
//! Converts between floating-point samples and 16-bit signed little-endian PCM,
//! and between raw bytes and the base64 text the realtime transport carries.
//!
//! # Quantization
//!
//! `samples_to_bytes` scales each sample by 32768 and truncates toward zero,
//! then narrows to `i16` with two's-complement wraparound. No clamping is
//! applied: a sample of exactly `1.0` becomes `-32768`, and anything outside
//! `[-1.0, 1.0)` wraps the same way. Capture devices deliver samples in range,
//! so the wraparound only shows up on malformed input.

use std::fmt;
use std::time::Duration;

use base64::prelude::*;
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Scale between normalized float samples and i16 PCM.
pub const PCM_SCALE: f32 = 32768.0;

/// MIME prefix used for raw PCM on the wire.
pub const PCM_MIME_PREFIX: &str = "audio/pcm";

// =============================================================================
// Error Types
// =============================================================================

/// Errors produced while decoding audio payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Transport text was not valid base64
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// PCM16 payloads must contain whole samples
    #[error("PCM payload has odd length {0}")]
    OddLength(usize),

    /// Channel count of zero
    #[error("channel count must be at least 1")]
    ZeroChannels,

    /// Sample rate of zero
    #[error("sample rate must be positive")]
    ZeroSampleRate,
}

// =============================================================================
// Formats and Frames
// =============================================================================

/// Sample rate and channel layout of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// Mono PCM at the given rate.
    pub const fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }

    /// MIME tag for this format, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        format!("{};rate={}", PCM_MIME_PREFIX, self.sample_rate)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz/{}ch", self.sample_rate, self.channels)
    }
}

/// Extract the sample rate from a PCM MIME tag such as `audio/pcm;rate=24000`.
///
/// Returns `None` for non-PCM types or a missing/unparseable rate parameter.
pub fn parse_pcm_rate(mime_type: &str) -> Option<u32> {
    let mut parts = mime_type.split(';');
    let essence = parts.next()?.trim();
    if !essence.eq_ignore_ascii_case(PCM_MIME_PREFIX) {
        return None;
    }
    parts.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("rate") {
            value.trim().parse().ok().filter(|rate| *rate > 0)
        } else {
            None
        }
    })
}

/// One capture tick of 16-bit samples.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub format: AudioFormat,
}

impl AudioFrame {
    /// Quantize float samples into a frame.
    pub fn from_float(samples: &[f32], format: AudioFormat) -> Self {
        Self {
            samples: samples.iter().copied().map(quantize).collect(),
            format,
        }
    }

    /// Little-endian byte encoding of the frame.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            buf.put_i16_le(*sample);
        }
        buf.freeze()
    }

    /// Package the frame as a wire chunk.
    pub fn encode(&self) -> EncodedChunk {
        EncodedChunk {
            data: self.to_bytes(),
            mime_type: self.format.mime_type(),
        }
    }
}

/// Wire unit exchanged with the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub data: Bytes,
    pub mime_type: String,
}

impl EncodedChunk {
    /// Base64 text for the transport.
    pub fn to_transport_text(&self) -> String {
        encode_transport(&self.data)
    }
}

/// Decoded, de-interleaved audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl DecodedBuffer {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback length at the buffer's sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.frames() as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}

// =============================================================================
// Conversions
// =============================================================================

/// Quantize one normalized sample to i16 (truncating, wrapping on overflow).
#[inline]
pub fn quantize(sample: f32) -> i16 {
    (sample * PCM_SCALE) as i32 as i16
}

/// Convert float samples to 16-bit little-endian PCM bytes (`2 * N` bytes).
pub fn samples_to_bytes(samples: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for sample in samples {
        buf.put_i16_le(quantize(*sample));
    }
    buf.freeze()
}

/// Interpret interleaved 16-bit PCM and split it into per-channel float sequences.
///
/// Each channel holds `len / 2 / channels` samples; a trailing partial frame is dropped.
pub fn bytes_to_samples(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<DecodedBuffer, CodecError> {
    if channels == 0 {
        return Err(CodecError::ZeroChannels);
    }
    if sample_rate == 0 {
        return Err(CodecError::ZeroSampleRate);
    }
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddLength(bytes.len()));
    }

    let channel_count = channels as usize;
    let frames = bytes.len() / 2 / channel_count;
    let mut out = vec![Vec::with_capacity(frames); channel_count];

    for (index, pair) in bytes
        .chunks_exact(2)
        .take(frames * channel_count)
        .enumerate()
    {
        let value = i16::from_le_bytes([pair[0], pair[1]]);
        out[index % channel_count].push(value as f32 / PCM_SCALE);
    }

    Ok(DecodedBuffer {
        sample_rate,
        channels: out,
    })
}

/// Encode bytes as standard (padded) base64 for the transport.
pub fn encode_transport(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

/// Decode transport text back into bytes.
pub fn decode_transport(text: &str) -> Result<Bytes, CodecError> {
    Ok(Bytes::from(BASE64_STANDARD.decode(text.trim())?))
}
