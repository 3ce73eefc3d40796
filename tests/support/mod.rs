//! Shared harness: a loopback service, a token endpoint on an ephemeral
//! port, and a client stack pointed at it.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;

use topic_chat::backend::{LoopbackClientFactory, LoopbackService};
use topic_chat::network::{
    ClientFactory, HttpTokenEndpoint, RetryPolicy, SessionManager, SubscriptionController,
    TransportConfig,
};
use topic_chat::server::{
    self, CacheLister, IssueError, TokenEndpointState, TokenIssuer, TokenScope,
};

pub const CACHE: &str = "cacheX";
pub const TOPIC: &str = "topicY";

/// Issues `tok1`, `tok2`, ... and registers the first `admitted` of them
/// with the service. Later tokens are unknown to the service.
pub struct SequenceIssuer {
    service: Arc<LoopbackService>,
    issued: AtomicUsize,
    admitted: usize,
    fail: bool,
}

#[async_trait]
impl TokenIssuer for SequenceIssuer {
    async fn generate_auth_token(
        &self,
        _scope: TokenScope,
        expires_in: Duration,
    ) -> Result<String, IssueError> {
        if self.fail {
            return Err(IssueError::Unauthenticated);
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("tok{n}");
        if n <= self.admitted {
            self.service.admit_token(&token, expires_in);
        }
        Ok(token)
    }
}

#[async_trait]
impl CacheLister for SequenceIssuer {
    async fn list_caches(&self) -> Result<Vec<String>, IssueError> {
        if self.fail {
            return Err(IssueError::Unavailable("issuer down".to_string()));
        }
        Ok(self.service.list_caches())
    }
}

pub struct Harness {
    pub service: Arc<LoopbackService>,
    pub issuer: Arc<SequenceIssuer>,
    pub origin: String,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with(usize::MAX, false).await
    }

    pub async fn start_with(admitted: usize, fail: bool) -> Self {
        let service = LoopbackService::new();
        service.create_cache(CACHE).unwrap();

        let issuer = Arc::new(SequenceIssuer {
            service: service.clone(),
            issued: AtomicUsize::new(0),
            admitted,
            fail,
        });
        let state = TokenEndpointState::new(
            issuer.clone(),
            issuer.clone(),
            Duration::from_secs(300),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let _ = server::serve(listener, state).await;
        });

        Self {
            service,
            issuer,
            origin,
        }
    }

    pub fn issued(&self) -> usize {
        self.issuer.issued.load(Ordering::SeqCst)
    }

    pub fn endpoint(&self) -> HttpTokenEndpoint {
        HttpTokenEndpoint::new(&self.origin, Duration::from_secs(5)).unwrap()
    }

    pub fn loopback_factory(&self) -> LoopbackClientFactory {
        LoopbackClientFactory::new(self.service.clone())
    }

    pub fn controller(&self, max_attempts: u32) -> Arc<SubscriptionController> {
        self.controller_with(max_attempts, Arc::new(self.loopback_factory()))
    }

    pub fn controller_with(
        &self,
        max_attempts: u32,
        factory: Arc<dyn ClientFactory>,
    ) -> Arc<SubscriptionController> {
        let sessions = Arc::new(SessionManager::new(
            Arc::new(self.endpoint()),
            factory,
            TransportConfig::default(),
        ));
        let retry = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        Arc::new(SubscriptionController::new(sessions, retry))
    }
}
