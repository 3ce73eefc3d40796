use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::server::{CacheLister, IssueError, TokenIssuer, TokenScope};

use super::service::LoopbackService;

/// Server-side client of the loopback service, authenticated with the
/// master credential. Only this side may mint tokens.
pub struct LoopbackAuthClient {
    service: Arc<LoopbackService>,
    master_credential: Option<String>,
}

impl LoopbackAuthClient {
    pub fn new(service: Arc<LoopbackService>, master_credential: Option<String>) -> Self {
        Self {
            service,
            master_credential,
        }
    }

    fn authenticate(&self) -> Result<(), IssueError> {
        match self.master_credential.as_deref() {
            Some(master) if !master.trim().is_empty() => Ok(()),
            _ => Err(IssueError::Unauthenticated),
        }
    }
}

#[async_trait]
impl TokenIssuer for LoopbackAuthClient {
    async fn generate_auth_token(
        &self,
        scope: TokenScope,
        expires_in: Duration,
    ) -> Result<String, IssueError> {
        self.authenticate()?;
        let token = self.service.mint_token(expires_in);
        log::info!("Minted {scope:?} token expiring in {expires_in:?}");
        Ok(token)
    }
}

#[async_trait]
impl CacheLister for LoopbackAuthClient {
    async fn list_caches(&self) -> Result<Vec<String>, IssueError> {
        self.authenticate()?;
        Ok(self.service.list_caches())
    }
}
