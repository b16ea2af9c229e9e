//! Signed-URL credential resolution.
//!
//! Every AI leg is opened with a short-lived, single-use signed URL issued by
//! the backend's control API. URLs are fetched per session and never cached.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;
use zeroize::Zeroize;

/// Control API path that issues signed conversation URLs.
pub const SIGNED_URL_PATH: &str = "v1/convai/conversation/get-signed-url";

/// Header carrying the backend API key.
pub const API_KEY_HEADER: &str = "xi-api-key";

/// Longest upstream error body kept in error messages.
const MAX_ERROR_BODY_LEN: usize = 256;

/// Errors from signed-URL resolution. All of them abort session setup.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No agent identifier was available for the call
    #[error("Agent id is required to resolve a signed URL")]
    MissingAgentId,

    /// Network failure, timeout or non-2xx response
    #[error("Credential endpoint unavailable: {0}")]
    UpstreamUnavailable(String),

    /// 2xx response without a usable `signed_url`
    #[error("Malformed credential response: {0}")]
    MalformedResponse(String),

    /// The resolver itself could not be built
    #[error("Invalid credential endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Source of signed AI-leg URLs.
#[async_trait]
pub trait SignedUrlResolver: Send + Sync {
    /// Obtain a fresh signed WebSocket URL for `agent_id`.
    async fn resolve_signed_url(&self, agent_id: &str) -> Result<String, CredentialError>;
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(default)]
    signed_url: Option<String>,
}

/// Resolver backed by the ElevenLabs conversational-AI control API.
pub struct ElevenLabsResolver {
    client: reqwest::Client,
    api_url: Url,
    api_key: String,
}

impl Drop for ElevenLabsResolver {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl ElevenLabsResolver {
    /// Create a resolver for the control API rooted at `api_url`.
    pub fn new(
        api_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CredentialError> {
        let mut api_url =
            Url::parse(api_url).map_err(|e| CredentialError::InvalidEndpoint(e.to_string()))?;

        // Url::join replaces the last segment unless the base ends with '/'
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialError::InvalidEndpoint(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, agent_id: &str) -> Result<Url, CredentialError> {
        let mut url = self
            .api_url
            .join(SIGNED_URL_PATH)
            .map_err(|e| CredentialError::InvalidEndpoint(e.to_string()))?;
        url.query_pairs_mut().append_pair("agent_id", agent_id);
        Ok(url)
    }
}

#[async_trait]
impl SignedUrlResolver for ElevenLabsResolver {
    async fn resolve_signed_url(&self, agent_id: &str) -> Result<String, CredentialError> {
        if agent_id.trim().is_empty() {
            return Err(CredentialError::MissingAgentId);
        }

        let url = self.endpoint(agent_id)?;
        tracing::debug!(agent_id, "Requesting signed conversation URL");

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| CredentialError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY_LEN {
                let mut cut = MAX_ERROR_BODY_LEN;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(CredentialError::UpstreamUnavailable(format!(
                "HTTP {status}: {body}"
            )));
        }

        let body: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::MalformedResponse(e.to_string()))?;

        let signed_url = body
            .signed_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                CredentialError::MalformedResponse("missing `signed_url` field".to_string())
            })?;

        let parsed = Url::parse(&signed_url)
            .map_err(|e| CredentialError::MalformedResponse(format!("invalid signed_url: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(CredentialError::MalformedResponse(format!(
                "signed_url must be a WebSocket URL, got scheme `{}`",
                parsed.scheme()
            )));
        }

        // The query string carries the token, so only the host is logged.
        tracing::debug!(
            agent_id,
            host = parsed.host_str().unwrap_or_default(),
            "Resolved signed conversation URL"
        );

        Ok(signed_url)
    }
}
