use std::path::PathBuf;

use super::env::EnvConfig;
use super::validation::validate_tls_paths;
use super::yaml::YamlConfig;
use super::{ConfigError, DEFAULT_API_URL, DEFAULT_SIGNED_URL_TIMEOUT_SECONDS, ServerConfig};
use crate::core::bridge::variables::{DEFAULT_CALLER_NAME, DEFAULT_FIRST_MESSAGE, DEFAULT_PROMPT};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;

/// Merge environment values with optional YAML overrides
///
/// YAML wins where set; environment fills the rest; defaults cover the
/// remainder. The API key is left empty when absent so validation can
/// report it.
pub(super) fn merge_config(
    env: EnvConfig,
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, ConfigError> {
    let yaml = yaml.unwrap_or_default();
    let server = yaml.server.unwrap_or_default();
    let convai = yaml.convai.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();
    let limits = yaml.limits.unwrap_or_default();

    let tls = match server.tls {
        Some(tls) if tls.enabled == Some(false) => None,
        Some(tls) => validate_tls_paths(
            tls.cert_path.map(PathBuf::from).or(env.tls_cert_path),
            tls.key_path.map(PathBuf::from).or(env.tls_key_path),
        )?,
        None => validate_tls_paths(env.tls_cert_path, env.tls_key_path)?,
    };

    Ok(ServerConfig {
        host: non_blank(server.host)
            .or(env.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: server.port.or(env.port).unwrap_or(DEFAULT_PORT),
        tls,
        elevenlabs_api_key: non_blank(convai.api_key)
            .or(env.elevenlabs_api_key)
            .unwrap_or_default(),
        elevenlabs_api_url: non_blank(convai.api_url)
            .or(env.elevenlabs_api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        elevenlabs_agent_id: non_blank(convai.agent_id).or(env.elevenlabs_agent_id),
        signed_url_timeout_seconds: convai
            .timeout_seconds
            .or(env.signed_url_timeout_seconds)
            .unwrap_or(DEFAULT_SIGNED_URL_TIMEOUT_SECONDS),
        default_caller_name: non_blank(session.default_name)
            .or(env.default_caller_name)
            .unwrap_or_else(|| DEFAULT_CALLER_NAME.to_string()),
        default_first_message: non_blank(session.default_first_message)
            .or(env.default_first_message)
            .unwrap_or_else(|| DEFAULT_FIRST_MESSAGE.to_string()),
        default_prompt: non_blank(session.default_prompt)
            .or(env.default_prompt)
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        max_concurrent_calls: limits.max_concurrent_calls.or(env.max_concurrent_calls),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
