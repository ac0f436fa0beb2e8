//! Realtime audio-to-audio transport module.
//!
//! The session talks to the remote model only through [`RealtimeTransport`]:
//! `connect` declares the session and yields a [`TransportLink`] with an
//! outbound sender and an inbound event stream.
//!
//! # Supported Providers
//!
//! - **Gemini Live** - native-audio models over the bidirectional streaming API

pub mod base;
pub mod gemini;

pub use base::{
    CONNECTION_NOTICE, EVENT_CHANNEL_CAPACITY, FunctionDeclaration, InboundMessage, InlineAudio,
    NoticeCallback, NoticeLevel, OutboundMessage, OutboundSender, PERMISSION_NOTICE, QUOTA_NOTICE,
    RealtimeError, RealtimeResult, RealtimeTransport, ResponseModality, SessionNotice,
    SessionSetup, SessionState, StateChangeCallback, ToolCallRequest, ToolCallResult,
    TranscriptCallback, TranscriptRole, TranscriptUpdate, TransportEvent, TransportLink,
    WS_CHANNEL_CAPACITY, classify_provider_error, is_quota_message,
};
pub use gemini::{GeminiLiveConfig, GeminiLiveTransport};
