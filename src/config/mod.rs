//! Configuration for the voice assistant
//!
//! This module loads settings from `.env` files, environment variables and an
//! optional YAML file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use astric_voice::config::VoiceConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = VoiceConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = VoiceConfig::from_file(&config_path)?;
//!
//! println!("Using voice {}", config.voice);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::core::capture::{DEFAULT_FRAME_SIZE, DEFAULT_QUEUE_CAPACITY};
use crate::core::instructions::{build_system_instruction, load_knowledge};
use crate::core::realtime::gemini::{
    DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_VOICE, GEMINI_INPUT_SAMPLE_RATE, GEMINI_LIVE_URL,
    GEMINI_OUTPUT_SAMPLE_RATE, GeminiLiveConfig,
};
use crate::core::session::{DEFAULT_CONNECT_TIMEOUT, SessionSettings};
use crate::core::tools::DEFAULT_TOOL_TIMEOUT;
use crate::leads::{DEFAULT_LEAD_TIMEOUT, LeadSink, LogLeadSink, WebhookLeadSink};

mod env;
mod merge;
mod validation;
mod yaml;

pub use env::EnvConfig;
pub use yaml::YamlConfig;

/// Voice assistant configuration
#[derive(Clone)]
pub struct VoiceConfig {
    // Gemini Live
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub endpoint: String,

    // Audio
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub frame_size: usize,
    pub capture_queue_capacity: usize,
    pub speaker_enabled: bool,

    // Session
    pub connect_timeout_ms: u64,
    pub tool_timeout_ms: u64,
    /// Company knowledge file; the built-in text is used when unset
    pub knowledge_path: Option<PathBuf>,
    /// Administrator instructions appended to the system prompt
    pub admin_instructions: String,

    // Leads
    pub lead_webhook_url: Option<String>,
    pub lead_timeout_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            voice: DEFAULT_GEMINI_VOICE.to_string(),
            endpoint: GEMINI_LIVE_URL.to_string(),
            input_sample_rate: GEMINI_INPUT_SAMPLE_RATE,
            output_sample_rate: GEMINI_OUTPUT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            capture_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            speaker_enabled: true,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT.as_millis() as u64,
            knowledge_path: None,
            admin_instructions: String::new(),
            lead_webhook_url: None,
            lead_timeout_ms: DEFAULT_LEAD_TIMEOUT.as_millis() as u64,
        }
    }
}

impl std::fmt::Debug for VoiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("endpoint", &self.endpoint)
            .field("input_sample_rate", &self.input_sample_rate)
            .field("output_sample_rate", &self.output_sample_rate)
            .field("frame_size", &self.frame_size)
            .field("capture_queue_capacity", &self.capture_queue_capacity)
            .field("speaker_enabled", &self.speaker_enabled)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("tool_timeout_ms", &self.tool_timeout_ms)
            .field("knowledge_path", &self.knowledge_path)
            .field("admin_instructions", &self.admin_instructions)
            .field(
                "lead_webhook_url",
                &self.lead_webhook_url.as_ref().map(|_| "<redacted>"),
            )
            .field("lead_timeout_ms", &self.lead_timeout_ms)
            .finish()
    }
}

/// Zeroize the API key and webhook URL when the config is dropped.
/// Webhook URLs for script endpoints embed their own access token.
impl Drop for VoiceConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
        if let Some(ref mut url) = self.lead_webhook_url {
            url.zeroize();
        }
    }
}

impl VoiceConfig {
    /// Load configuration from environment variables
    ///
    /// `.env` is loaded by `main.rs` before this is called.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let env = EnvConfig::from_env()?;
        let config = merge::merge_config(env, None);
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file, with environment variables
    /// filling anything the file leaves out
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;
        let env = EnvConfig::from_env()?;
        let config = merge::merge_config(env, Some(yaml_config));
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// The API key, or an error naming the variable to set
    pub fn require_api_key(&self) -> Result<&str, Box<dyn std::error::Error>> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                "Missing Gemini API key: set GEMINI_API_KEY or gemini.api_key in the config file"
                    .into()
            })
    }

    /// Connection settings for the Gemini Live transport
    pub fn gemini_config(&self) -> Result<GeminiLiveConfig, Box<dyn std::error::Error>> {
        let key = self.require_api_key()?;
        Ok(GeminiLiveConfig::new(key).with_endpoint(self.endpoint.clone()))
    }

    /// Session settings, with the system instruction assembled from the
    /// knowledge file and administrator instructions
    pub fn session_settings(&self) -> Result<SessionSettings, Box<dyn std::error::Error>> {
        let knowledge = load_knowledge(self.knowledge_path.as_deref()).map_err(|e| {
            format!(
                "Failed to read knowledge file {}: {e}",
                self.knowledge_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            )
        })?;

        Ok(SessionSettings {
            model: self.model.clone(),
            voice: self.voice.clone(),
            system_instruction: build_system_instruction(&knowledge, &self.admin_instructions),
            input_sample_rate: self.input_sample_rate,
            output_sample_rate: self.output_sample_rate,
            frame_size: self.frame_size,
            capture_queue_capacity: self.capture_queue_capacity,
            speaker_enabled: self.speaker_enabled,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            tool_timeout: Duration::from_millis(self.tool_timeout_ms),
        })
    }

    /// Where captured leads go: the webhook when configured, the log otherwise
    pub fn lead_sink(&self) -> Result<Arc<dyn LeadSink>, Box<dyn std::error::Error>> {
        match &self.lead_webhook_url {
            Some(raw) => {
                let url = Url::parse(raw).map_err(|e| format!("Invalid lead webhook URL: {e}"))?;
                Ok(Arc::new(
                    WebhookLeadSink::new(url)
                        .with_timeout(Duration::from_millis(self.lead_timeout_ms)),
                ))
            }
            None => Ok(Arc::new(LogLeadSink)),
        }
    }
}
