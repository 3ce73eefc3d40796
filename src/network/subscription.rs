use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::RetryConfig;
use crate::error::{ChatError, TransportError};

use super::session::SessionManager;
use super::transport::{ErrorCallback, Subscription, SubscriptionCallbacks};

/// Bound and pacing for re-authentication attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// The first attempt runs immediately; later ones back off exponentially.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

#[derive(Clone)]
struct Registration {
    cache_name: String,
    topic_name: String,
    callbacks: SubscriptionCallbacks,
}

/// Owns the chat room's single topic subscription and rebuilds it when
/// the credential behind it expires.
pub struct SubscriptionController {
    sessions: Arc<SessionManager>,
    retry: RetryPolicy,
    registration: Mutex<Option<Registration>>,
}

impl SubscriptionController {
    pub fn new(sessions: Arc<SessionManager>, retry: RetryPolicy) -> Self {
        Self {
            sessions,
            retry,
            registration: Mutex::new(None),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Subscribes and remembers the callbacks for later resubscribes.
    ///
    /// A rejected subscribe is returned as `ChatError::Subscribe` and is not
    /// retried here.
    pub async fn subscribe(
        &self,
        cache_name: &str,
        topic_name: &str,
        callbacks: SubscriptionCallbacks,
    ) -> Result<Subscription, ChatError> {
        let registration = Registration {
            cache_name: cache_name.to_string(),
            topic_name: topic_name.to_string(),
            callbacks: wrap(callbacks),
        };
        *self.registration.lock().await = Some(registration.clone());

        self.subscribe_with(&registration).await
    }

    /// Entry point for the error callback's reports.
    ///
    /// Authentication errors run the resubscribe protocol and return the new
    /// subscription; anything else is logged and left to the caller. An error
    /// from a subscription that was already replaced only releases it.
    pub async fn handle_error(
        &self,
        error: TransportError,
        failed: Subscription,
    ) -> Result<Option<Subscription>, ChatError> {
        if !error.is_authentication() {
            log::warn!(
                "Subscription {} on {}/{} reported {error}; not retrying",
                failed.id(),
                failed.cache_name(),
                failed.topic_name()
            );
            return Ok(None);
        }

        let Some(registration) = self.registration.lock().await.clone() else {
            log::debug!("Subscription {} failed after the room closed", failed.id());
            failed.unsubscribe();
            return Ok(None);
        };

        if let Some(current) = self.sessions.current_subscription().await {
            if current.id() != failed.id() {
                log::debug!(
                    "Ignoring authentication error from replaced subscription {}",
                    failed.id()
                );
                failed.unsubscribe();
                return Ok(None);
            }
        }

        log::info!("Received authentication error, getting new token and resubscribing");
        self.recover(registration, Some(failed)).await.map(Some)
    }

    /// Runs the resubscribe protocol against the current subscription.
    ///
    /// With nothing registered the session is just invalidated.
    pub async fn refresh(&self) -> Result<Option<Subscription>, ChatError> {
        let Some(registration) = self.registration.lock().await.clone() else {
            self.sessions.invalidate().await;
            return Ok(None);
        };

        let current = self.sessions.current_subscription().await;
        self.recover(registration, current).await.map(Some)
    }

    /// Releases the subscription and session and forgets the callbacks.
    pub async fn close(&self) {
        self.registration.lock().await.take();
        self.sessions.invalidate().await;
    }

    async fn subscribe_with(&self, registration: &Registration) -> Result<Subscription, ChatError> {
        let session = self.sessions.get_clients().await?;
        let subscription = session
            .topic_client()
            .subscribe(
                &registration.cache_name,
                &registration.topic_name,
                registration.callbacks.clone(),
            )
            .await
            .map_err(|err| {
                log::error!(
                    "Unable to subscribe to {}/{}: {err}",
                    registration.cache_name,
                    registration.topic_name
                );
                ChatError::Subscribe(err)
            })?;

        if let Some(prior) = self.sessions.replace_subscription(subscription.clone()).await {
            prior.unsubscribe();
        }

        log::info!(
            "Subscribed to {}/{} on session #{}",
            registration.cache_name,
            registration.topic_name,
            session.generation()
        );
        Ok(subscription)
    }

    async fn recover(
        &self,
        registration: Registration,
        failed: Option<Subscription>,
    ) -> Result<Subscription, ChatError> {
        // Attempts are counted per recovery.
        for attempt in 1..=self.retry.max_attempts {
            let delay = self.retry.delay_for(attempt);
            if !delay.is_zero() {
                log::info!("Waiting {delay:?} before re-authentication attempt {attempt}");
                tokio::time::sleep(delay).await;
            }

            if let Some(failed) = &failed {
                failed.unsubscribe();
            }
            self.sessions.invalidate().await;

            match self.subscribe_with(&registration).await {
                Ok(subscription) => return Ok(subscription),
                Err(ChatError::Subscribe(err)) if err.is_authentication() => {
                    log::warn!("Resubscribe attempt {attempt} was rejected: {err}");
                }
                Err(err) => return Err(err),
            }
        }

        log::error!(
            "Giving up on {}/{} after {} re-authentication attempts",
            registration.cache_name,
            registration.topic_name,
            self.retry.max_attempts
        );
        Err(ChatError::ReauthExhausted {
            attempts: self.retry.max_attempts,
        })
    }
}

/// Logs every error before the caller's own callback sees it.
fn wrap(callbacks: SubscriptionCallbacks) -> SubscriptionCallbacks {
    let on_error = callbacks.on_error().clone();
    let logged: ErrorCallback = Arc::new(move |err: TransportError, subscription: Subscription| {
        log::warn!(
            "Subscription {} on {}/{} reported {err}",
            subscription.id(),
            subscription.cache_name(),
            subscription.topic_name()
        );
        on_error(err, subscription);
    });

    SubscriptionCallbacks::from_parts(callbacks.on_item().clone(), logged)
}
