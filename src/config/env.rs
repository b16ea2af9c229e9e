use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use super::ConfigError;

/// Values read from environment variables
///
/// Every field is optional; defaults are applied in `merge`.
#[derive(Debug, Default)]
pub(super) struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_api_url: Option<String>,
    pub elevenlabs_agent_id: Option<String>,
    pub signed_url_timeout_seconds: Option<u64>,
    pub default_caller_name: Option<String>,
    pub default_first_message: Option<String>,
    pub default_prompt: Option<String>,
    pub max_concurrent_calls: Option<usize>,
}

impl EnvConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_string("HOST"),
            port: env_parse("PORT")?,
            tls_cert_path: env_string("TLS_CERT_PATH").map(PathBuf::from),
            tls_key_path: env_string("TLS_KEY_PATH").map(PathBuf::from),
            elevenlabs_api_key: env_string("ELEVENLABS_API_KEY"),
            elevenlabs_api_url: env_string("ELEVENLABS_API_URL"),
            elevenlabs_agent_id: env_string("ELEVENLABS_AGENT_ID"),
            signed_url_timeout_seconds: env_parse("SIGNED_URL_TIMEOUT_SECONDS")?,
            default_caller_name: env_string("DEFAULT_CALLER_NAME"),
            default_first_message: env_string("DEFAULT_FIRST_MESSAGE"),
            default_prompt: env_string("DEFAULT_PROMPT"),
            max_concurrent_calls: env_parse("MAX_CONCURRENT_CALLS")?,
        })
    }
}

/// Read a variable, treating unset and blank the same.
fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key,
                message: format!("`{raw}`: {e}"),
            })
        })
        .transpose()
}
