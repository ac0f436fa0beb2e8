use url::Url;

use super::VoiceConfig;
use crate::core::realtime::gemini::is_prebuilt_voice;

/// Check a merged configuration for values the session cannot run with.
///
/// The API key is not checked here; `check-config` must work without one.
pub fn validate_config(config: &VoiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_audio(config)?;
    validate_timeouts(config)?;
    validate_urls(config)?;
    Ok(())
}

fn validate_audio(config: &VoiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.input_sample_rate == 0 {
        return Err("input_sample_rate must be greater than zero".into());
    }
    if config.output_sample_rate == 0 {
        return Err("output_sample_rate must be greater than zero".into());
    }
    if config.frame_size == 0 {
        return Err("frame_size must be greater than zero".into());
    }
    if config.capture_queue_capacity == 0 {
        return Err("capture_queue_capacity must be greater than zero".into());
    }
    if config.model.trim().is_empty() {
        return Err("model must not be empty".into());
    }
    if config.voice.trim().is_empty() {
        return Err("voice must not be empty".into());
    }
    if !is_prebuilt_voice(&config.voice) {
        tracing::warn!(voice = %config.voice, "Voice is not a known prebuilt voice");
    }
    Ok(())
}

fn validate_timeouts(config: &VoiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    for (name, value) in [
        ("connect_timeout_ms", config.connect_timeout_ms),
        ("tool_timeout_ms", config.tool_timeout_ms),
        ("lead_timeout_ms", config.lead_timeout_ms),
    ] {
        if value == 0 {
            return Err(format!("{name} must be greater than zero").into());
        }
    }
    Ok(())
}

fn validate_urls(config: &VoiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = Url::parse(&config.endpoint)
        .map_err(|e| format!("Invalid endpoint URL {:?}: {e}", config.endpoint))?;
    if !matches!(endpoint.scheme(), "ws" | "wss") {
        return Err(format!(
            "endpoint must use ws:// or wss://, got {}://",
            endpoint.scheme()
        )
        .into());
    }

    if let Some(webhook) = &config.lead_webhook_url {
        let url = Url::parse(webhook).map_err(|e| format!("Invalid lead webhook URL: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "lead webhook must use http:// or https://, got {}://",
                url.scheme()
            )
            .into());
        }
    }
    Ok(())
}
