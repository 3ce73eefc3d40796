use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransportError;

use super::credentials::Credential;

/// Client configuration profile handed to every transport client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportProfile {
    #[default]
    Browser,
    Laptop,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub profile: TransportProfile,
    /// TTL applied by the cache client when a write does not specify one.
    pub default_ttl: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            profile: TransportProfile::Browser,
            default_ttl: Duration::from_secs(60),
        }
    }
}

/// One message delivered on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicItem {
    payload: String,
}

impl TopicItem {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn value_string(&self) -> &str {
        &self.payload
    }
}

pub type ItemCallback = Arc<dyn Fn(TopicItem) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(TransportError, Subscription) + Send + Sync>;

/// The pair of callbacks a subscription delivers into.
///
/// Cloning shares the underlying closures, so a resubscribe replays the
/// exact same pair.
#[derive(Clone)]
pub struct SubscriptionCallbacks {
    on_item: ItemCallback,
    on_error: ErrorCallback,
}

impl SubscriptionCallbacks {
    pub fn new(
        on_item: impl Fn(TopicItem) + Send + Sync + 'static,
        on_error: impl Fn(TransportError, Subscription) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_item: Arc::new(on_item),
            on_error: Arc::new(on_error),
        }
    }

    pub fn from_parts(on_item: ItemCallback, on_error: ErrorCallback) -> Self {
        Self { on_item, on_error }
    }

    pub fn on_item(&self) -> &ItemCallback {
        &self.on_item
    }

    pub fn on_error(&self) -> &ErrorCallback {
        &self.on_error
    }

    pub fn deliver_item(&self, item: TopicItem) {
        (self.on_item)(item);
    }

    pub fn deliver_error(&self, error: TransportError, subscription: Subscription) {
        (self.on_error)(error, subscription);
    }
}

impl fmt::Debug for SubscriptionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionCallbacks").finish_non_exhaustive()
    }
}

type ReleaseFn = Arc<dyn Fn(Uuid) + Send + Sync>;

/// Handle to a live registration on a (cache, topic) pair.
///
/// Clones refer to the same registration. `unsubscribe` is idempotent.
#[derive(Clone)]
pub struct Subscription {
    id: Uuid,
    cache_name: String,
    topic_name: String,
    closed: Arc<AtomicBool>,
    release: ReleaseFn,
}

impl Subscription {
    /// `release` runs once, on the first `unsubscribe`.
    pub fn new(
        cache_name: impl Into<String>,
        topic_name: impl Into<String>,
        release: impl Fn(Uuid) + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cache_name: cache_name.into(),
            topic_name: topic_name.into(),
            closed: Arc::new(AtomicBool::new(false)),
            release: Arc::new(release),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    pub fn is_active(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            log::debug!(
                "Unsubscribing {} from {}/{}",
                self.id,
                self.cache_name,
                self.topic_name
            );
            (self.release)(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cache_name", &self.cache_name)
            .field("topic_name", &self.topic_name)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Publish/subscribe half of a session.
#[async_trait]
pub trait TopicClient: Send + Sync {
    async fn subscribe(
        &self,
        cache_name: &str,
        topic_name: &str,
        callbacks: SubscriptionCallbacks,
    ) -> Result<Subscription, TransportError>;

    async fn publish(
        &self,
        cache_name: &str,
        topic_name: &str,
        payload: &str,
    ) -> Result<(), TransportError>;
}

/// Key/value half of a session.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// `ttl: None` uses the client's default TTL.
    async fn set(
        &self,
        cache_name: &str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), TransportError>;

    async fn get(&self, cache_name: &str, key: &str) -> Result<Option<String>, TransportError>;

    async fn delete(&self, cache_name: &str, key: &str) -> Result<(), TransportError>;
}

/// Builds transport clients bound to one credential.
pub trait ClientFactory: Send + Sync {
    fn topic_client(
        &self,
        credential: &Credential,
        config: &TransportConfig,
    ) -> Result<Arc<dyn TopicClient>, TransportError>;

    fn cache_client(
        &self,
        credential: &Credential,
        config: &TransportConfig,
    ) -> Result<Arc<dyn CacheClient>, TransportError>;
}
