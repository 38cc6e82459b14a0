use async_trait::async_trait;
use reqwest::Client;
use shared::api::{TokenRequest, TokenResponse, TOKEN_ROUTE};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Short-lived credential plus the transport endpoint it is valid for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub token: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to fetch session credential: {0}")]
    Unreachable(String),
    #[error("Token generation failed: {status} {reason}")]
    Status { status: u16, reason: String },
    #[error("malformed credential response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    async fn fetch_credential(
        &self,
        request: &TokenRequest,
    ) -> Result<SessionCredential, CredentialError>;
}

pub struct MissingCredentialFetcher;

#[async_trait]
impl CredentialFetcher for MissingCredentialFetcher {
    async fn fetch_credential(
        &self,
        _request: &TokenRequest,
    ) -> Result<SessionCredential, CredentialError> {
        Err(CredentialError::Unreachable(
            "credential endpoint is not configured".into(),
        ))
    }
}

pub struct HttpCredentialFetcher {
    http: Client,
    endpoint: Url,
}

impl HttpCredentialFetcher {
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        let endpoint = Url::parse(server_url)?.join(TOKEN_ROUTE)?;
        Ok(Self {
            http: Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl CredentialFetcher for HttpCredentialFetcher {
    async fn fetch_credential(
        &self,
        request: &TokenRequest,
    ) -> Result<SessionCredential, CredentialError> {
        debug!(
            "credential: requesting room={} endpoint={}",
            request.room_name, self.endpoint
        );
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|err| CredentialError::Unreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                "credential: request rejected room={} status={status}",
                request.room_name
            );
            return Err(CredentialError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|err| CredentialError::Malformed(err.to_string()))?;
        if body.token.is_empty() || body.url.is_empty() {
            return Err(CredentialError::Malformed(
                "token and url must be non-empty".into(),
            ));
        }

        Ok(SessionCredential {
            token: body.token,
            url: body.url,
        })
    }
}

#[cfg(test)]
#[path = "tests/credentials_tests.rs"]
mod tests;
