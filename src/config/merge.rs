//! Layering of configuration sources.
//!
//! Priority: YAML file > environment (including `.env`) > defaults.

use std::path::PathBuf;

use super::VoiceConfig;
use super::env::EnvConfig;
use super::yaml::YamlConfig;

/// Combine environment values and an optional YAML file into a [`VoiceConfig`].
pub fn merge_config(env: EnvConfig, yaml: Option<YamlConfig>) -> VoiceConfig {
    let yaml = yaml.unwrap_or_default();
    let gemini = yaml.gemini.unwrap_or_default();
    let audio = yaml.audio.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();
    let leads = yaml.leads.unwrap_or_default();

    let mut config = VoiceConfig::default();

    config.api_key = gemini.api_key.or(env.api_key);
    if let Some(model) = gemini.model.or(env.model) {
        config.model = model;
    }
    if let Some(voice) = gemini.voice.or(env.voice) {
        config.voice = voice;
    }
    if let Some(endpoint) = gemini.endpoint.or(env.endpoint) {
        config.endpoint = endpoint;
    }

    if let Some(rate) = audio.input_sample_rate.or(env.input_sample_rate) {
        config.input_sample_rate = rate;
    }
    if let Some(rate) = audio.output_sample_rate.or(env.output_sample_rate) {
        config.output_sample_rate = rate;
    }
    if let Some(size) = audio.frame_size.or(env.frame_size) {
        config.frame_size = size;
    }
    if let Some(capacity) = audio.capture_queue_capacity.or(env.capture_queue_capacity) {
        config.capture_queue_capacity = capacity;
    }
    if let Some(enabled) = audio.speaker_enabled.or(env.speaker_enabled) {
        config.speaker_enabled = enabled;
    }

    if let Some(ms) = session.connect_timeout_ms.or(env.connect_timeout_ms) {
        config.connect_timeout_ms = ms;
    }
    if let Some(ms) = session.tool_timeout_ms.or(env.tool_timeout_ms) {
        config.tool_timeout_ms = ms;
    }
    config.knowledge_path = session
        .knowledge_path
        .or(env.knowledge_path)
        .map(PathBuf::from);
    if let Some(text) = session.admin_instructions.or(env.admin_instructions) {
        config.admin_instructions = text;
    }

    config.lead_webhook_url = leads
        .webhook_url
        .or(env.lead_webhook_url)
        .filter(|url| !url.trim().is_empty());
    if let Some(ms) = leads.timeout_ms.or(env.lead_timeout_ms) {
        config.lead_timeout_ms = ms;
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::{AudioYaml, GeminiYaml, LeadsYaml};

    #[test]
    fn test_defaults_when_empty() {
        let config = merge_config(EnvConfig::default(), None);
        let defaults = VoiceConfig::default();

        assert!(config.api_key.is_none());
        assert_eq!(config.model, defaults.model);
        assert_eq!(config.input_sample_rate, 16000);
        assert_eq!(config.output_sample_rate, 24000);
        assert_eq!(config.frame_size, 4096);
        assert!(config.speaker_enabled);
    }

    #[test]
    fn test_yaml_overrides_env() {
        let env = EnvConfig {
            api_key: Some("env-key".to_string()),
            voice: Some("Kore".to_string()),
            frame_size: Some(1024),
            ..Default::default()
        };
        let yaml = YamlConfig {
            gemini: Some(GeminiYaml {
                api_key: Some("yaml-key".to_string()),
                ..Default::default()
            }),
            audio: Some(AudioYaml {
                frame_size: Some(2048),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(env, Some(yaml));
        assert_eq!(config.api_key.as_deref(), Some("yaml-key"));
        assert_eq!(config.frame_size, 2048);
        // Env fills what YAML leaves out
        assert_eq!(config.voice, "Kore");
    }

    #[test]
    fn test_blank_webhook_is_none() {
        let yaml = YamlConfig {
            leads: Some(LeadsYaml {
                webhook_url: Some("   ".to_string()),
                timeout_ms: Some(500),
            }),
            ..Default::default()
        };
        let config = merge_config(EnvConfig::default(), Some(yaml));
        assert!(config.lead_webhook_url.is_none());
        assert_eq!(config.lead_timeout_ms, 500);
    }
}
