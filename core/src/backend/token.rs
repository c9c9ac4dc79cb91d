//! Access-token acquisition for chat clients.
//!
//! Chat clients need a short-lived credential before they can connect. The
//! default source is a small HTTP token service answering
//! `GET <url>?device=<vendor>&identity=<display>` with `{"token": "..."}`.

use super::abstraction::BackendError;
use crate::message::VendorIdentity;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Default token service endpoint
pub const DEFAULT_TOKEN_URL: &str = "http://localhost:8000/token";

const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Fetch a credential for the chat client of `device`
    async fn fetch_token(&self, device: &VendorIdentity) -> Result<String, BackendError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Extract the token from a token-service reply body
pub fn parse_token_response(body: &str) -> Result<String, BackendError> {
    let response: TokenResponse =
        serde_json::from_str(body).map_err(|e| BackendError::TokenFetch(e.to_string()))?;
    if response.token.is_empty() {
        return Err(BackendError::TokenFetch("empty token".to_string()));
    }
    Ok(response.token)
}

/// Token provider backed by the HTTP token service
pub struct HttpTokenProvider {
    url: String,
    identity: String,
    agent: ureq::Agent,
}

impl HttpTokenProvider {
    pub fn new(url: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            identity: identity.into(),
            agent: ureq::AgentBuilder::new()
                .timeout(TOKEN_REQUEST_TIMEOUT)
                .build(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AccessTokenProvider for HttpTokenProvider {
    async fn fetch_token(&self, device: &VendorIdentity) -> Result<String, BackendError> {
        let agent = self.agent.clone();
        let url = self.url.clone();
        let identity = self.identity.clone();
        let device = device.to_string();

        debug!("Requesting access token for {} from {}", device, url);

        // ureq is blocking; keep it off the async workers.
        let body = tokio::task::spawn_blocking(move || {
            agent
                .get(&url)
                .query("device", &device)
                .query("identity", &identity)
                .call()
                .map_err(|e| BackendError::TokenFetch(e.to_string()))?
                .into_string()
                .map_err(|e| BackendError::TokenFetch(e.to_string()))
        })
        .await
        .map_err(|e| BackendError::TokenFetch(e.to_string()))??;

        parse_token_response(&body)
    }
}

/// Fixed token, for tests and the simulator
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn fetch_token(&self, _device: &VendorIdentity) -> Result<String, BackendError> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_response() {
        assert_eq!(
            parse_token_response(r#"{"token":"abc","identity":"alice"}"#).unwrap(),
            "abc"
        );
    }

    #[test]
    fn test_parse_token_response_rejects_missing_or_empty() {
        assert!(parse_token_response(r#"{"identity":"alice"}"#).is_err());
        assert!(parse_token_response(r#"{"token":""}"#).is_err());
        assert!(parse_token_response("<html>").is_err());
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticTokenProvider::new("t0k3n");
        let token = provider
            .fetch_token(&VendorIdentity::new("P1"))
            .await
            .unwrap();
        assert_eq!(token, "t0k3n");
    }

    #[tokio::test]
    async fn test_http_provider_unreachable_host_fails() {
        let provider = HttpTokenProvider::new("http://127.0.0.1:9/token", "alice");
        let result = provider.fetch_token(&VendorIdentity::new("P1")).await;
        assert!(matches!(result, Err(BackendError::TokenFetch(_))));
    }
}
