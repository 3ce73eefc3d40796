//! Ports the token endpoint depends on.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Permissions baked into a minted token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope {
    AllDataReadWrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueError {
    #[error("master credential is missing or invalid")]
    Unauthenticated,

    #[error("token service unavailable: {0}")]
    Unavailable(String),
}

/// Mints short-lived tokens using the server-held master credential.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn generate_auth_token(
        &self,
        scope: TokenScope,
        expires_in: Duration,
    ) -> Result<String, IssueError>;
}

#[async_trait]
pub trait CacheLister: Send + Sync {
    async fn list_caches(&self) -> Result<Vec<String>, IssueError>;
}
