use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   tls:
///     cert_path: "/etc/voice-bridge/cert.pem"
///     key_path: "/etc/voice-bridge/key.pem"
///
/// convai:
///   api_key: "your-elevenlabs-key"
///   api_url: "https://api.elevenlabs.io"
///   agent_id: "your-agent-id"
///   timeout_seconds: 10
///
/// session:
///   default_name: "there"
///   default_first_message: "Hi {{name}}, how can I help you today?"
///   default_prompt: "You are a friendly voice assistant."
///
/// limits:
///   max_concurrent_calls: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub convai: Option<ConvaiYaml>,
    pub session: Option<SessionYaml>,
    pub limits: Option<LimitsYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    /// Set to `false` to ignore the paths below
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Conversational-AI backend settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConvaiYaml {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub agent_id: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Per-call defaults from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub default_name: Option<String>,
    pub default_first_message: Option<String>,
    pub default_prompt: Option<String>,
}

/// Connection limits from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LimitsYaml {
    pub max_concurrent_calls: Option<usize>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Ok(serde_yaml::from_str(&contents)?)
    }
}
