use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// gemini:
///   api_key: "your-gemini-key"
///   model: "gemini-2.5-flash-native-audio-preview-12-2025"
///   voice: "Puck"
///
/// audio:
///   input_sample_rate: 16000
///   output_sample_rate: 24000
///   frame_size: 4096
///   capture_queue_capacity: 32
///   speaker_enabled: true
///
/// session:
///   connect_timeout_ms: 10000
///   tool_timeout_ms: 15000
///   knowledge_path: "/etc/astric/knowledge.txt"
///   admin_instructions: "Mention the ramadan discount."
///
/// leads:
///   webhook_url: "https://script.google.com/macros/s/.../exec"
///   timeout_ms: 10000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub gemini: Option<GeminiYaml>,
    pub audio: Option<AudioYaml>,
    pub session: Option<SessionYaml>,
    pub leads: Option<LeadsYaml>,
}

/// Gemini Live settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeminiYaml {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    /// WebSocket endpoint override (tests, proxies)
    pub endpoint: Option<String>,
}

/// Audio settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub input_sample_rate: Option<u32>,
    pub output_sample_rate: Option<u32>,
    pub frame_size: Option<usize>,
    pub capture_queue_capacity: Option<usize>,
    pub speaker_enabled: Option<bool>,
}

/// Session settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub connect_timeout_ms: Option<u64>,
    pub tool_timeout_ms: Option<u64>,
    pub knowledge_path: Option<String>,
    pub admin_instructions: Option<String>,
}

/// Lead delivery settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LeadsYaml {
    pub webhook_url: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
gemini:
  api_key: "yaml-key"
  model: "gemini-live-test"
  voice: "Kore"
  endpoint: "ws://127.0.0.1:9000/live"
audio:
  input_sample_rate: 16000
  output_sample_rate: 24000
  frame_size: 2048
  capture_queue_capacity: 8
  speaker_enabled: false
session:
  connect_timeout_ms: 5000
  tool_timeout_ms: 2000
  knowledge_path: "/tmp/knowledge.txt"
  admin_instructions: "Be brief."
leads:
  webhook_url: "https://hooks.example.com/lead"
  timeout_ms: 3000
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let gemini = config.gemini.unwrap();
        assert_eq!(gemini.api_key.as_deref(), Some("yaml-key"));
        assert_eq!(gemini.voice.as_deref(), Some("Kore"));

        let audio = config.audio.unwrap();
        assert_eq!(audio.frame_size, Some(2048));
        assert_eq!(audio.speaker_enabled, Some(false));

        let session = config.session.unwrap();
        assert_eq!(session.tool_timeout_ms, Some(2000));
        assert_eq!(session.admin_instructions.as_deref(), Some("Be brief."));

        let leads = config.leads.unwrap();
        assert_eq!(leads.timeout_ms, Some(3000));
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
audio:
  frame_size: 1024
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.gemini.is_none());
        let audio = config.audio.unwrap();
        assert_eq!(audio.frame_size, Some(1024));
        assert!(audio.input_sample_rate.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.gemini.is_none());
        assert!(config.audio.is_none());
        assert!(config.session.is_none());
        assert!(config.leads.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "gemini:\n  voice: \"Charon\"\n").unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        assert_eq!(config.gemini.unwrap().voice.as_deref(), Some("Charon"));
    }

    #[test]
    fn test_from_file_not_found() {
        let path = PathBuf::from("/nonexistent/config.yaml");
        let result = YamlConfig::from_file(&path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
