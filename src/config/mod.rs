//! Configuration module for the voice bridge
//!
//! Configuration comes from environment variables (with `.env` loaded in
//! `main`) and, optionally, a YAML file. Priority: YAML > ENV vars > .env
//! values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use voice_bridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::bridge::SessionDefaults;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

/// Default base URL of the conversational-AI control API
pub const DEFAULT_API_URL: &str = "https://api.elevenlabs.io";

/// Default signed-URL request timeout in seconds
pub const DEFAULT_SIGNED_URL_TIMEOUT_SECONDS: u64 = 10;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("Missing required configuration: {0}")]
    Missing(&'static str),
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the bridge:
/// - Server settings (host, port, TLS)
/// - Conversational-AI backend credentials and default agent
/// - Per-call defaults for the initiation payload
/// - Concurrent-call limit
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Conversational-AI backend
    /// API key sent as `xi-api-key` to the control API
    pub elevenlabs_api_key: String,
    /// Base URL of the control API
    pub elevenlabs_api_url: String,
    /// Agent dialled when a call does not name one
    pub elevenlabs_agent_id: Option<String>,
    /// Timeout for the signed-URL request
    pub signed_url_timeout_seconds: u64,

    // Session defaults
    pub default_caller_name: String,
    pub default_first_message: String,
    pub default_prompt: String,

    // Connection limits
    /// Maximum concurrent calls
    /// Default: None (unlimited)
    pub max_concurrent_calls: Option<usize>,
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        self.elevenlabs_api_key.zeroize();
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only
    ///
    /// The `.env` file is loaded in `main` before this is called, so its
    /// values are visible here unless overridden by the real environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = env::EnvConfig::load()?;
        let config = merge::merge_config(env, None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let env = env::EnvConfig::load()?;
        let config = merge::merge_config(env, Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn signed_url_timeout(&self) -> Duration {
        Duration::from_secs(self.signed_url_timeout_seconds)
    }

    /// Defaults applied to calls that leave session variables unset
    pub fn session_defaults(&self) -> SessionDefaults {
        SessionDefaults {
            name: self.default_caller_name.clone(),
            first_message: self.default_first_message.clone(),
            prompt: self.default_prompt.clone(),
        }
    }
}
