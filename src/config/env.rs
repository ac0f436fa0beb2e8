use std::env;
use std::str::FromStr;

/// Values read from the process environment.
///
/// Every field is optional; `merge` fills the gaps from YAML and defaults.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub endpoint: Option<String>,
    pub input_sample_rate: Option<u32>,
    pub output_sample_rate: Option<u32>,
    pub frame_size: Option<usize>,
    pub capture_queue_capacity: Option<usize>,
    pub speaker_enabled: Option<bool>,
    pub connect_timeout_ms: Option<u64>,
    pub tool_timeout_ms: Option<u64>,
    pub knowledge_path: Option<String>,
    pub admin_instructions: Option<String>,
    pub lead_webhook_url: Option<String>,
    pub lead_timeout_ms: Option<u64>,
}

impl EnvConfig {
    /// Read every supported variable.
    ///
    /// # Errors
    /// Returns an error if a numeric or boolean variable is set but does not parse.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            api_key: env_string("GEMINI_API_KEY").or_else(|| env_string("API_KEY")),
            model: env_string("GEMINI_LIVE_MODEL"),
            voice: env_string("GEMINI_VOICE"),
            endpoint: env_string("GEMINI_LIVE_URL"),
            input_sample_rate: env_parse("INPUT_SAMPLE_RATE")?,
            output_sample_rate: env_parse("OUTPUT_SAMPLE_RATE")?,
            frame_size: env_parse("CAPTURE_FRAME_SIZE")?,
            capture_queue_capacity: env_parse("CAPTURE_QUEUE_CAPACITY")?,
            speaker_enabled: env_bool("SPEAKER_ENABLED")?,
            connect_timeout_ms: env_parse("CONNECT_TIMEOUT_MS")?,
            tool_timeout_ms: env_parse("TOOL_TIMEOUT_MS")?,
            knowledge_path: env_string("KNOWLEDGE_PATH"),
            admin_instructions: env_string("ADMIN_INSTRUCTIONS"),
            lead_webhook_url: env_string("LEAD_WEBHOOK_URL"),
            lead_timeout_ms: env_parse("LEAD_TIMEOUT_MS")?,
        })
    }
}

/// Non-empty string value of `key`.
fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {key}: {raw:?} ({e})").into()),
        None => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>, Box<dyn std::error::Error>> {
    match env_string(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("Invalid value for {key}: {raw:?} (expected true or false)").into()),
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("API_KEY");
            env::remove_var("SPEAKER_ENABLED");
            env::remove_var("CAPTURE_FRAME_SIZE");
        }
    }

    #[test]
    #[serial]
    fn test_api_key_fallback() {
        cleanup_env_vars();
        unsafe {
            env::set_var("API_KEY", "fallback-key");
        }
        let config = EnvConfig::from_env().unwrap();
        assert_eq!(config.api_key.as_deref(), Some("fallback-key"));

        unsafe {
            env::set_var("GEMINI_API_KEY", "primary-key");
        }
        let config = EnvConfig::from_env().unwrap();
        assert_eq!(config.api_key.as_deref(), Some("primary-key"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_bool_parsing() {
        cleanup_env_vars();
        unsafe {
            env::set_var("SPEAKER_ENABLED", "off");
        }
        assert_eq!(EnvConfig::from_env().unwrap().speaker_enabled, Some(false));

        unsafe {
            env::set_var("SPEAKER_ENABLED", "maybe");
        }
        let err = EnvConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("SPEAKER_ENABLED"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_number_rejected() {
        cleanup_env_vars();
        unsafe {
            env::set_var("CAPTURE_FRAME_SIZE", "lots");
        }
        let err = EnvConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("Invalid value for CAPTURE_FRAME_SIZE"));

        cleanup_env_vars();
    }
}
