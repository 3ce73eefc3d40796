use std::sync::Arc;

use crate::common::ChatEvent;
use crate::error::ChatError;

use super::session::SessionManager;
use super::subscription::SubscriptionController;

/// Publishes chat events, refreshing the session once on credential expiry.
pub struct Publisher {
    sessions: Arc<SessionManager>,
    subscriptions: Arc<SubscriptionController>,
}

impl Publisher {
    pub fn new(subscriptions: Arc<SubscriptionController>) -> Self {
        Self {
            sessions: subscriptions.sessions().clone(),
            subscriptions,
        }
    }

    /// Publishes `payload`, retrying exactly once after an authentication
    /// failure. A second failure is returned, never retried.
    pub async fn publish(
        &self,
        cache_name: &str,
        topic_name: &str,
        payload: &str,
    ) -> Result<(), ChatError> {
        let session = self.sessions.get_clients().await?;
        let Err(err) = session
            .topic_client()
            .publish(cache_name, topic_name, payload)
            .await
        else {
            return Ok(());
        };

        if !err.is_authentication() {
            log::error!("Failed to publish to {cache_name}/{topic_name}: {err}");
            return Err(ChatError::Publish(err));
        }

        log::info!("Token has expired, going to refresh subscription and retry publish");
        self.subscriptions.refresh().await?;

        let session = self.sessions.get_clients().await?;
        session
            .topic_client()
            .publish(cache_name, topic_name, payload)
            .await
            .map_err(|err| {
                log::error!("Retried publish to {cache_name}/{topic_name} failed: {err}");
                ChatError::Publish(err)
            })
    }

    pub async fn publish_event(
        &self,
        cache_name: &str,
        topic_name: &str,
        event: &ChatEvent,
    ) -> Result<(), ChatError> {
        let payload = event
            .to_payload()
            .map_err(|err| ChatError::Encode(err.to_string()))?;
        self.publish(cache_name, topic_name, &payload).await
    }

    pub async fn announce_join(
        &self,
        cache_name: &str,
        topic_name: &str,
        username: &str,
    ) -> Result<(), ChatError> {
        let event = ChatEvent::user_joined(username);
        self.publish_event(cache_name, topic_name, &event).await
    }

    pub async fn send_chat_message(
        &self,
        cache_name: &str,
        topic_name: &str,
        username: &str,
        text: &str,
    ) -> Result<(), ChatError> {
        let event = ChatEvent::message(username, text);
        self.publish_event(cache_name, topic_name, &event).await
    }
}
