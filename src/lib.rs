pub mod config;
pub mod core;
pub mod leads;

// Re-export commonly used items for convenience
pub use config::VoiceConfig;
pub use core::*;
pub use leads::{LeadDetails, LeadError, LeadSink, LogLeadSink, SubmitOrderTool, WebhookLeadSink};
