//! Base traits and types for realtime voice transports.
//!
//! This module defines the provider-neutral surface the session state machine
//! talks to: the error kinds, the session lifecycle state, the messages that
//! flow in each direction, and the `RealtimeTransport` trait that a concrete
//! provider (Gemini Live) implements.
//!
//! # Audio Format
//!
//! Input audio is PCM 16-bit signed little-endian mono at 16kHz; the model
//! answers with the same encoding at 24kHz.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::codec::{AudioFormat, CodecError, EncodedChunk};

/// Channel capacity for outbound transport messages.
pub const WS_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for inbound transport events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Shown when the remote side is rate limiting us.
pub const QUOTA_NOTICE: &str =
    "The assistant is handling a lot of conversations right now. Please try again in a moment.";

/// Shown for any failure that ends the voice session.
pub const CONNECTION_NOTICE: &str =
    "The voice connection was interrupted. Please start the conversation again.";

/// Shown when the microphone cannot be used.
pub const PERMISSION_NOTICE: &str = "Please allow microphone access to talk to the assistant.";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    /// Microphone access refused or unavailable
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Transport could not be opened or failed while open
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Malformed inbound audio
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// A tool handler failed or could not be found
    #[error("Tool dispatch error: {0}")]
    ToolDispatchError(String),

    /// Remote rate limiting
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// A session is already connecting or open
    #[error("Session already active (state: {0})")]
    SessionActive(SessionState),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Audio device failure after the device was acquired
    #[error("Audio device error: {0}")]
    AudioDevice(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

impl RealtimeError {
    /// Whether this error is transient rate limiting.
    pub fn is_quota(&self) -> bool {
        matches!(self, RealtimeError::QuotaExceeded(_))
    }

    /// Text suitable for showing to the person using the widget.
    pub fn user_notice(&self) -> &'static str {
        match self {
            RealtimeError::PermissionDenied(_) => PERMISSION_NOTICE,
            RealtimeError::QuotaExceeded(_) => QUOTA_NOTICE,
            _ => CONNECTION_NOTICE,
        }
    }
}

impl From<CodecError> for RealtimeError {
    fn from(err: CodecError) -> Self {
        RealtimeError::DecodeError(err.to_string())
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        RealtimeError::SerializationError(err.to_string())
    }
}

/// Returns true when a provider message indicates rate limiting.
pub fn is_quota_message(message: &str) -> bool {
    message.contains("429") || message.to_ascii_uppercase().contains("RESOURCE_EXHAUSTED")
}

/// Map a provider error message onto an error kind.
pub fn classify_provider_error(message: impl Into<String>) -> RealtimeError {
    let message = message.into();
    if is_quota_message(&message) {
        RealtimeError::QuotaExceeded(message)
    } else {
        RealtimeError::ConnectionError(message)
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of the single realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session
    #[default]
    Idle,
    /// Microphone acquired, waiting for the remote side to accept the setup
    Connecting,
    /// Streaming in both directions
    Open,
    /// Tearing down after stop or a remote close
    Closing,
    /// Tearing down after a failure
    Error,
}

impl SessionState {
    /// Connecting or Open.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Open)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Open => write!(f, "Open"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Error => write!(f, "Error"),
        }
    }
}

// =============================================================================
// Tool Calls
// =============================================================================

/// A function the remote model may invoke during the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parameter schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Inbound request to invoke a named function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id echoed back in the result
    pub id: String,
    /// Function name
    pub name: String,
    /// Argument mapping
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of one tool call, paired with its request by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    pub name: String,
    pub response: serde_json::Value,
}

// =============================================================================
// Inbound / Outbound Messages
// =============================================================================

/// Role of the speaker in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// User speech transcript
    User,
    /// Model speech transcript
    Model,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Model => write!(f, "model"),
        }
    }
}

/// Base64 audio carried inline in a model message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAudio {
    /// Base64 PCM payload
    pub data: String,
    /// MIME tag, e.g. `audio/pcm;rate=24000`
    pub mime_type: String,
}

/// One decoded `message` event from the transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundMessage {
    pub tool_calls: Vec<ToolCallRequest>,
    pub audio: Vec<InlineAudio>,
    pub output_transcript: Option<String>,
    pub input_transcript: Option<String>,
    pub turn_complete: bool,
    pub interrupted: bool,
}

impl InboundMessage {
    /// True when the message carries nothing the session acts on.
    pub fn is_empty(&self) -> bool {
        self.tool_calls.is_empty()
            && self.audio.is_empty()
            && self.output_transcript.is_none()
            && self.input_transcript.is_none()
            && !self.turn_complete
            && !self.interrupted
    }
}

/// Events delivered from the transport to the session.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The remote side accepted the session configuration
    Open,
    /// Model output, transcription, or tool calls
    Message(InboundMessage),
    /// The connection closed
    Closed { reason: Option<String> },
    /// The transport reported a failure
    Error(RealtimeError),
}

/// Messages the session sends to the transport.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Realtime microphone input
    Audio(EncodedChunk),
    /// Results for one tool-call batch
    ToolResults(Vec<ToolCallResult>),
    /// Close the connection
    Close,
}

/// Requested output modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    #[default]
    Audio,
    Text,
}

/// Session configuration declared when connecting.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    /// Model identifier
    pub model: String,
    /// Prebuilt voice name
    pub voice: String,
    /// System instruction text
    pub system_instruction: String,
    /// Functions the model may call
    pub tools: Vec<FunctionDeclaration>,
    pub response_modality: ResponseModality,
    /// Ask the model to transcribe its spoken output
    pub output_transcription: bool,
    /// Ask the model to transcribe the microphone input
    pub input_transcription: bool,
    /// Format of the microphone stream
    pub input_format: AudioFormat,
}

/// Cloneable handle for sending to the transport.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::Sender<OutboundMessage>,
}

impl OutboundSender {
    pub fn new(tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self { tx }
    }

    /// Queue a realtime audio chunk.
    pub async fn send_audio(&self, chunk: EncodedChunk) -> RealtimeResult<()> {
        self.tx
            .send(OutboundMessage::Audio(chunk))
            .await
            .map_err(|_| RealtimeError::NotConnected)
    }

    /// Queue the results of a tool-call batch.
    pub async fn send_tool_results(&self, results: Vec<ToolCallResult>) -> RealtimeResult<()> {
        self.tx
            .send(OutboundMessage::ToolResults(results))
            .await
            .map_err(|_| RealtimeError::NotConnected)
    }

    /// Ask the transport to close. Never waits.
    pub fn close(&self) {
        if self.tx.try_send(OutboundMessage::Close).is_err() {
            tracing::debug!("Transport already closed or backed up; dropping close request");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A live connection: the session's handle to the remote side.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: OutboundSender,
    pub events: mpsc::Receiver<TransportEvent>,
}

// =============================================================================
// Callback Types
// =============================================================================

/// Transcript text surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptUpdate {
    /// Speaker
    pub role: TranscriptRole,
    /// Full text of the entry so far
    pub text: String,
    /// Whether the entry was flushed
    pub is_final: bool,
}

/// Severity of a session notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-visible notice raised by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionNotice {
    pub level: NoticeLevel,
    pub message: String,
}

impl SessionNotice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Callback type for transcript updates.
pub type TranscriptCallback =
    Arc<dyn Fn(TranscriptUpdate) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for session state changes.
pub type StateChangeCallback =
    Arc<dyn Fn(SessionState) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for user-visible notices.
pub type NoticeCallback =
    Arc<dyn Fn(SessionNotice) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

// =============================================================================
// Transport Trait
// =============================================================================

/// A duplex realtime connection to a hosted model.
///
/// `connect` performs the handshake and sends the session setup. The returned
/// link emits `TransportEvent::Open` once the remote side accepts the setup,
/// then `Message` events until `Closed` or `Error`.
///
/// # Example
///
/// ```rust,ignore
/// let link = transport.connect(setup).await?;
/// while let Some(event) = link.events.recv().await {
///     match event {
///         TransportEvent::Open => { /* start capture */ }
///         TransportEvent::Message(msg) => { /* play, transcribe, answer tools */ }
///         TransportEvent::Closed { .. } | TransportEvent::Error(_) => break,
///     }
/// }
/// ```
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open a connection and declare the session configuration.
    async fn connect(&self, setup: SessionSetup) -> RealtimeResult<TransportLink>;

    /// Short provider name for logs.
    fn provider_name(&self) -> &'static str;
}
