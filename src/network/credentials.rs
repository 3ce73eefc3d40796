use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;

use crate::error::CredentialFetchError;

pub const TOKEN_PATH: &str = "/api/momento/token";
pub const CACHES_PATH: &str = "/api/momento/caches";

/// Short-lived bearer token. Expiry is enforced by the service only.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::from(token.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// Source of fresh credentials; called once per session construction.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<Credential, CredentialFetchError>;
}

/// Talks to the same-origin token and cache-listing endpoints.
pub struct HttpTokenEndpoint {
    http: reqwest::Client,
    origin: String,
}

impl HttpTokenEndpoint {
    pub fn new(origin: &str, timeout: Duration) -> Result<Self, CredentialFetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CredentialFetchError::Request(err.to_string()))?;

        Ok(Self {
            http,
            origin: origin.trim_end_matches('/').to_string(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Names of the caches available to this account, in server order.
    pub async fn list_caches(&self) -> Result<Vec<String>, CredentialFetchError> {
        let url = format!("{}{CACHES_PATH}", self.origin);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| CredentialFetchError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialFetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Vec<String>>()
            .await
            .map_err(|err| CredentialFetchError::Decode(err.to_string()))
    }
}

#[async_trait]
impl CredentialProvider for HttpTokenEndpoint {
    async fn fetch_token(&self) -> Result<Credential, CredentialFetchError> {
        let url = format!("{}{TOKEN_PATH}", self.origin);
        let response = self
            .http
            .get(&url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|err| CredentialFetchError::Request(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| CredentialFetchError::Decode(err.to_string()))?;

        if !status.is_success() {
            log::error!("Token endpoint {url} answered {status}");
            return Err(CredentialFetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token = body.trim();
        if token.is_empty() {
            return Err(CredentialFetchError::EmptyCredential);
        }

        log::debug!("Fetched a fresh credential from {url}");
        Ok(Credential::new(token))
    }
}
