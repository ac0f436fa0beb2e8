//! Gemini Live connection settings.

use std::fmt;

use url::Url;
use zeroize::Zeroize;

use crate::core::realtime::{RealtimeError, RealtimeResult};

/// Gemini Live bidirectional streaming endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Native-audio model used when none is configured.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// Prebuilt voice used when none is configured.
pub const DEFAULT_GEMINI_VOICE: &str = "Puck";

/// Sample rate the model expects for realtime input.
pub const GEMINI_INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of the audio the model produces.
pub const GEMINI_OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Prebuilt voices known to work with the native-audio models.
pub const GEMINI_PREBUILT_VOICES: &[&str] = &[
    "Puck", "Charon", "Kore", "Fenrir", "Aoede", "Leda", "Orus", "Zephyr",
];

/// Whether `voice` names one of [`GEMINI_PREBUILT_VOICES`].
pub fn is_prebuilt_voice(voice: &str) -> bool {
    GEMINI_PREBUILT_VOICES.contains(&voice)
}

/// Where and how to reach Gemini Live.
#[derive(Clone)]
pub struct GeminiLiveConfig {
    /// API key passed as the `key` query parameter
    pub api_key: String,
    /// WebSocket endpoint, overridable for tests and proxies
    pub endpoint: String,
}

impl GeminiLiveConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: GEMINI_LIVE_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Endpoint URL with the API key attached.
    pub fn ws_url(&self) -> RealtimeResult<Url> {
        if self.api_key.trim().is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "Gemini API key is required".to_string(),
            ));
        }

        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            RealtimeError::InvalidConfiguration(format!(
                "invalid Gemini Live endpoint '{}': {}",
                self.endpoint, e
            ))
        })?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(RealtimeError::InvalidConfiguration(format!(
                    "Gemini Live endpoint must use ws or wss, got '{}'",
                    other
                )));
            }
        }

        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

/// Qualified model resource name, e.g. `models/gemini-2.5-flash`.
pub fn model_resource(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

impl fmt::Debug for GeminiLiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiLiveConfig")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Drop for GeminiLiveConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}
