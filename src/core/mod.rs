pub mod audio;
pub mod capture;
pub mod codec;
pub mod instructions;
pub mod playback;
pub mod realtime;
pub mod session;
pub mod tools;
pub mod transcript;

// Re-export commonly used types for convenience
pub use capture::{AudioBackend, CaptureConfig, CaptureHandle, FrameTap, MicrophoneStream};
pub use codec::{AudioFormat, AudioFrame, CodecError, DecodedBuffer, EncodedChunk};
pub use playback::{OutputClock, PlaybackScheduler, PlaybackSource};
pub use realtime::{
    GeminiLiveConfig, GeminiLiveTransport, RealtimeError, RealtimeResult, RealtimeTransport,
    SessionState, TransportEvent,
};
pub use session::{SessionContext, SessionMachine, SessionSettings};
pub use tools::{ToolCallBridge, ToolError, ToolHandler, ToolRegistry};
pub use transcript::{TranscriptAccumulator, TranscriptEntry};
