//! Gemini Live transport.
//!
//! Streams microphone audio to a Gemini native-audio model over one WebSocket
//! and receives spoken audio, transcriptions and function calls back.
//!
//! # Audio Format
//!
//! Input is PCM 16-bit signed little-endian mono at 16kHz, tagged
//! `audio/pcm;rate=16000`. Output arrives as inline data tagged
//! `audio/pcm;rate=24000`.
//!
//! # Example
//!
//! ```rust,ignore
//! use astric_voice::core::realtime::{GeminiLiveConfig, GeminiLiveTransport, RealtimeTransport};
//!
//! let transport = GeminiLiveTransport::new(GeminiLiveConfig::new(api_key))?;
//! let mut link = transport.connect(setup).await?;
//! while let Some(event) = link.events.recv().await {
//!     // ...
//! }
//! ```

mod client;
mod config;
mod messages;

pub use client::GeminiLiveTransport;
pub use config::{
    DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_VOICE, GEMINI_INPUT_SAMPLE_RATE, GEMINI_LIVE_URL,
    GEMINI_OUTPUT_SAMPLE_RATE, GEMINI_PREBUILT_VOICES, GeminiLiveConfig, is_prebuilt_voice,
    model_resource,
};
pub use messages::{ClientMessage, ServerMessage};
