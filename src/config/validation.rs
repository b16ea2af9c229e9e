use std::path::PathBuf;

use url::Url;

use super::{ConfigError, ServerConfig, TlsConfig};

/// Validate a merged configuration
///
/// Checks that:
/// - the API key is present
/// - the API URL is an absolute http(s) URL
/// - the signed-URL timeout and call limit are positive
pub(super) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    validate_api_key(&config.elevenlabs_api_key)?;
    validate_api_url(&config.elevenlabs_api_url)?;

    if config.signed_url_timeout_seconds == 0 {
        return Err(ConfigError::InvalidValue {
            key: "SIGNED_URL_TIMEOUT_SECONDS",
            message: "must be greater than 0".to_string(),
        });
    }

    if config.max_concurrent_calls == Some(0) {
        return Err(ConfigError::InvalidValue {
            key: "MAX_CONCURRENT_CALLS",
            message: "must be greater than 0".to_string(),
        });
    }

    Ok(())
}

fn validate_api_key(api_key: &str) -> Result<(), ConfigError> {
    if api_key.trim().is_empty() {
        return Err(ConfigError::Missing("ELEVENLABS_API_KEY"));
    }
    Ok(())
}

fn validate_api_url(api_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(api_url).map_err(|e| ConfigError::InvalidValue {
        key: "ELEVENLABS_API_URL",
        message: format!("`{api_url}`: {e}"),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: "ELEVENLABS_API_URL",
            message: format!("scheme must be http or https, got `{}`", url.scheme()),
        });
    }
    Ok(())
}

/// TLS needs both a certificate and a key, or neither.
pub(super) fn validate_tls_paths(
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
) -> Result<Option<TlsConfig>, ConfigError> {
    match (cert_path, key_path) {
        (Some(cert_path), Some(key_path)) => Ok(Some(TlsConfig {
            cert_path,
            key_path,
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::InvalidValue {
            key: "TLS_KEY_PATH",
            message: "required when TLS_CERT_PATH is set".to_string(),
        }),
        (None, Some(_)) => Err(ConfigError::InvalidValue {
            key: "TLS_CERT_PATH",
            message: "required when TLS_KEY_PATH is set".to_string(),
        }),
    }
}
