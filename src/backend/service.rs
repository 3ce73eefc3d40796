//! In-process stand-in for the hosted pub/sub and cache service.
//!
//! Every call is authorised against a registry of short-lived tokens. Topic
//! fan-out happens synchronously inside `publish`, in subscription order.
//! Callbacks always run with the internal lock released, so they may call
//! back into the service (e.g. to unsubscribe).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::interval;
use uuid::Uuid;

use crate::error::{ErrorCode, TransportError};
use crate::network::transport::{Subscription, SubscriptionCallbacks, TopicItem};

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

struct Subscriber {
    token: String,
    callbacks: SubscriptionCallbacks,
    subscription: Subscription,
}

#[derive(Default)]
struct ServiceState {
    tokens: HashMap<String, Instant>,
    caches: BTreeMap<String, HashMap<String, CacheEntry>>,
    topics: HashMap<(String, String), Vec<Subscriber>>,
}

impl ServiceState {
    fn authorize(&self, token: &str) -> Result<(), TransportError> {
        match self.tokens.get(token) {
            Some(expires_at) if Instant::now() < *expires_at => Ok(()),
            Some(_) => Err(TransportError::authentication("auth token has expired")),
            None => Err(TransportError::authentication("invalid auth token")),
        }
    }

    fn token_valid(&self, token: &str) -> bool {
        self.authorize(token).is_ok()
    }

    fn require_cache(&self, cache_name: &str) -> Result<(), TransportError> {
        if self.caches.contains_key(cache_name) {
            Ok(())
        } else {
            Err(TransportError::new(
                ErrorCode::NotFound,
                format!("cache not found: {cache_name}"),
            ))
        }
    }
}

fn require_name(kind: &str, name: &str) -> Result<(), TransportError> {
    if name.trim().is_empty() {
        return Err(TransportError::new(
            ErrorCode::InvalidArgument,
            format!("{kind} name must not be empty"),
        ));
    }
    Ok(())
}

type Delivery = (SubscriptionCallbacks, Subscription);

pub struct LoopbackService {
    state: Mutex<ServiceState>,
}

impl LoopbackService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ServiceState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========== Tokens ==========

    /// Registers an externally chosen token.
    pub fn admit_token(&self, token: &str, lifetime: Duration) {
        self.lock()
            .tokens
            .insert(token.to_string(), Instant::now() + lifetime);
    }

    pub fn mint_token(&self, lifetime: Duration) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.admit_token(&token, lifetime);
        token
    }

    pub fn revoke_token(&self, token: &str) {
        self.lock().tokens.remove(token);
    }

    pub fn revoke_all_tokens(&self) {
        self.lock().tokens.clear();
    }

    pub fn is_token_valid(&self, token: &str) -> bool {
        self.lock().token_valid(token)
    }

    // ========== Caches ==========

    pub fn create_cache(&self, cache_name: &str) -> Result<(), TransportError> {
        require_name("cache", cache_name)?;
        self.lock()
            .caches
            .entry(cache_name.to_string())
            .or_default();
        Ok(())
    }

    pub fn list_caches(&self) -> Vec<String> {
        self.lock().caches.keys().cloned().collect()
    }

    pub fn cache_set(
        &self,
        token: &str,
        cache_name: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.authorize(token)?;
        state.require_cache(cache_name)?;
        require_name("key", key)?;

        if let Some(cache) = state.caches.get_mut(cache_name) {
            cache.insert(
                key.to_string(),
                CacheEntry {
                    value: value.to_string(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }
        Ok(())
    }

    pub fn cache_get(
        &self,
        token: &str,
        cache_name: &str,
        key: &str,
    ) -> Result<Option<String>, TransportError> {
        let mut state = self.lock();
        state.authorize(token)?;
        state.require_cache(cache_name)?;

        let Some(cache) = state.caches.get_mut(cache_name) else {
            return Ok(None);
        };
        let expired = match cache.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.remove(key);
        }
        Ok(None)
    }

    pub fn cache_delete(
        &self,
        token: &str,
        cache_name: &str,
        key: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.authorize(token)?;
        state.require_cache(cache_name)?;
        if let Some(cache) = state.caches.get_mut(cache_name) {
            cache.remove(key);
        }
        Ok(())
    }

    // ========== Topics ==========

    pub fn subscribe(
        self: &Arc<Self>,
        token: &str,
        cache_name: &str,
        topic_name: &str,
        callbacks: SubscriptionCallbacks,
    ) -> Result<Subscription, TransportError> {
        require_name("topic", topic_name)?;
        let mut state = self.lock();
        state.authorize(token)?;
        state.require_cache(cache_name)?;

        let key = (cache_name.to_string(), topic_name.to_string());
        let service: Weak<Self> = Arc::downgrade(self);
        let release_key = key.clone();
        let subscription = Subscription::new(cache_name, topic_name, move |id| {
            if let Some(service) = service.upgrade() {
                service.remove_subscriber(&release_key, id);
            }
        });

        state.topics.entry(key).or_default().push(Subscriber {
            token: token.to_string(),
            callbacks,
            subscription: subscription.clone(),
        });

        log::debug!(
            "Registered subscription {} on {cache_name}/{topic_name}",
            subscription.id()
        );
        Ok(subscription)
    }

    fn remove_subscriber(&self, key: &(String, String), id: Uuid) {
        let mut state = self.lock();
        if let Some(subscribers) = state.topics.get_mut(key) {
            subscribers.retain(|subscriber| subscriber.subscription.id() != id);
            if subscribers.is_empty() {
                state.topics.remove(key);
            }
        }
    }

    /// Delivers `payload` to every live subscriber of the topic. Subscribers
    /// whose token has expired get an authentication error instead and are
    /// dropped.
    pub fn publish(
        &self,
        token: &str,
        cache_name: &str,
        topic_name: &str,
        payload: &str,
    ) -> Result<(), TransportError> {
        require_name("topic", topic_name)?;
        let (deliveries, expired) = {
            let mut state = self.lock();
            state.authorize(token)?;
            state.require_cache(cache_name)?;

            let key = (cache_name.to_string(), topic_name.to_string());
            Self::partition_expired(&mut state, &key)
        };

        Self::notify_expired(expired);
        for (callbacks, _) in deliveries {
            callbacks.deliver_item(TopicItem::new(payload));
        }
        Ok(())
    }

    /// Reports expired subscribers across all topics. Returns how many were
    /// dropped.
    pub fn sweep_expired(&self) -> usize {
        let expired = {
            let mut state = self.lock();
            let keys: Vec<_> = state.topics.keys().cloned().collect();
            let mut expired = Vec::new();
            for key in keys {
                let (_, mut dropped) = Self::partition_expired(&mut state, &key);
                expired.append(&mut dropped);
            }
            expired
        };

        let count = expired.len();
        Self::notify_expired(expired);
        count
    }

    fn partition_expired(
        state: &mut ServiceState,
        key: &(String, String),
    ) -> (Vec<Delivery>, Vec<Delivery>) {
        let Some(subscribers) = state.topics.remove(key) else {
            return (Vec::new(), Vec::new());
        };

        let mut kept = Vec::new();
        let mut live = Vec::new();
        let mut expired = Vec::new();
        for subscriber in subscribers {
            let delivery = (
                subscriber.callbacks.clone(),
                subscriber.subscription.clone(),
            );
            if state.token_valid(&subscriber.token) {
                live.push(delivery);
                kept.push(subscriber);
            } else {
                expired.push(delivery);
            }
        }

        if !kept.is_empty() {
            state.topics.insert(key.clone(), kept);
        }
        (live, expired)
    }

    fn notify_expired(expired: Vec<Delivery>) {
        for (callbacks, subscription) in expired {
            log::debug!(
                "Subscription {} lost its credential; reporting authentication error",
                subscription.id()
            );
            callbacks.deliver_error(
                TransportError::authentication("auth token has expired"),
                subscription,
            );
        }
    }

    pub fn subscriber_count(&self, cache_name: &str, topic_name: &str) -> usize {
        self.lock()
            .topics
            .get(&(cache_name.to_string(), topic_name.to_string()))
            .map_or(0, Vec::len)
    }

    /// Periodically reports subscribers whose token expired while idle.
    pub fn spawn_expiry_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let service = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                let dropped = service.sweep_expired();
                if dropped > 0 {
                    log::info!("Expiry sweep dropped {dropped} subscriptions");
                }
            }
        })
    }
}
