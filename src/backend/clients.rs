use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ErrorCode, TransportError};
use crate::network::credentials::Credential;
use crate::network::transport::{
    CacheClient, ClientFactory, Subscription, SubscriptionCallbacks, TopicClient,
    TransportConfig,
};

use super::service::LoopbackService;

pub struct LoopbackTopicClient {
    service: Arc<LoopbackService>,
    credential: Credential,
}

#[async_trait]
impl TopicClient for LoopbackTopicClient {
    async fn subscribe(
        &self,
        cache_name: &str,
        topic_name: &str,
        callbacks: SubscriptionCallbacks,
    ) -> Result<Subscription, TransportError> {
        self.service.subscribe(
            self.credential.expose(),
            cache_name,
            topic_name,
            callbacks,
        )
    }

    async fn publish(
        &self,
        cache_name: &str,
        topic_name: &str,
        payload: &str,
    ) -> Result<(), TransportError> {
        self.service
            .publish(self.credential.expose(), cache_name, topic_name, payload)
    }
}

pub struct LoopbackCacheClient {
    service: Arc<LoopbackService>,
    credential: Credential,
    default_ttl: Duration,
}

#[async_trait]
impl CacheClient for LoopbackCacheClient {
    async fn set(
        &self,
        cache_name: &str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), TransportError> {
        self.service.cache_set(
            self.credential.expose(),
            cache_name,
            key,
            value,
            ttl.unwrap_or(self.default_ttl),
        )
    }

    async fn get(&self, cache_name: &str, key: &str) -> Result<Option<String>, TransportError> {
        self.service
            .cache_get(self.credential.expose(), cache_name, key)
    }

    async fn delete(&self, cache_name: &str, key: &str) -> Result<(), TransportError> {
        self.service
            .cache_delete(self.credential.expose(), cache_name, key)
    }
}

/// Builds loopback clients bound to one credential.
#[derive(Clone)]
pub struct LoopbackClientFactory {
    service: Arc<LoopbackService>,
}

impl LoopbackClientFactory {
    pub fn new(service: Arc<LoopbackService>) -> Self {
        Self { service }
    }
}

fn require_credential(credential: &Credential) -> Result<(), TransportError> {
    if credential.expose().trim().is_empty() {
        return Err(TransportError::new(
            ErrorCode::InvalidArgument,
            "credential string must not be empty",
        ));
    }
    Ok(())
}

impl ClientFactory for LoopbackClientFactory {
    fn topic_client(
        &self,
        credential: &Credential,
        config: &TransportConfig,
    ) -> Result<Arc<dyn TopicClient>, TransportError> {
        require_credential(credential)?;
        log::debug!("Building topic client with the {:?} profile", config.profile);
        Ok(Arc::new(LoopbackTopicClient {
            service: self.service.clone(),
            credential: credential.clone(),
        }))
    }

    fn cache_client(
        &self,
        credential: &Credential,
        config: &TransportConfig,
    ) -> Result<Arc<dyn CacheClient>, TransportError> {
        require_credential(credential)?;
        Ok(Arc::new(LoopbackCacheClient {
            service: self.service.clone(),
            credential: credential.clone(),
            default_ttl: config.default_ttl,
        }))
    }
}
