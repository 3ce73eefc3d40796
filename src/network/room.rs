use std::sync::Arc;

use tokio::sync::mpsc;

use crate::common::{ChatEvent, RoomCommand, RoomEvent};
use crate::error::{ChatError, TransportError};

use super::publisher::Publisher;
use super::subscription::SubscriptionController;
use super::transport::{Subscription, SubscriptionCallbacks, TopicItem};

enum Inbound {
    Item(TopicItem),
    Error(TransportError, Subscription),
}

/// Drives one chat room: subscribe, announce the user once, then relay
/// commands from the UI and events from the topic.
pub struct ChatRoom {
    cache_name: String,
    topic_name: String,
    username: String,
    subscriptions: Arc<SubscriptionController>,
    publisher: Publisher,
    event_sender: mpsc::Sender<RoomEvent>,
    command_receiver: mpsc::Receiver<RoomCommand>,
}

impl ChatRoom {
    pub fn new(
        cache_name: impl Into<String>,
        topic_name: impl Into<String>,
        username: impl Into<String>,
        subscriptions: Arc<SubscriptionController>,
        event_sender: mpsc::Sender<RoomEvent>,
        command_receiver: mpsc::Receiver<RoomCommand>,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            topic_name: topic_name.into(),
            username: username.into(),
            publisher: Publisher::new(subscriptions.clone()),
            subscriptions,
            event_sender,
            command_receiver,
        }
    }

    pub async fn run(mut self) -> Result<(), ChatError> {
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let callbacks = inbound_callbacks(inbound_tx);

        if let Err(err) = self
            .subscriptions
            .subscribe(&self.cache_name, &self.topic_name, callbacks)
            .await
        {
            log::error!("Error subscribing to topic: {err}");
            self.notify(RoomEvent::SubscribeFailed(err.to_string())).await;
            return Err(err);
        }

        log::info!("Successfully subscribed to {}", self.topic_name);
        self.notify(RoomEvent::Subscribed {
            topic: self.topic_name.clone(),
        })
        .await;

        // Only this initial join is announced; resubscribes stay silent.
        if let Err(err) = self
            .publisher
            .announce_join(&self.cache_name, &self.topic_name, &self.username)
            .await
        {
            log::warn!("Failed to announce {}: {err}", self.username);
            self.notify(RoomEvent::DeliveryFailed(err.to_string())).await;
        }

        let result = loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(RoomCommand::SendMessage(text)) => self.send_message(text).await,
                        Some(RoomCommand::Leave) | None => break Ok(()),
                    }
                }
                Some(inbound) = inbound_rx.recv() => {
                    if let Err(err) = self.handle_inbound(inbound).await {
                        break Err(err);
                    }
                }
            }
        };

        self.subscriptions.close().await;
        log::info!("Left chat room {}", self.topic_name);
        result
    }

    async fn send_message(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        if let Err(err) = self
            .publisher
            .send_chat_message(&self.cache_name, &self.topic_name, &self.username, &text)
            .await
        {
            log::warn!("Message was not delivered: {err}");
            self.notify(RoomEvent::DeliveryFailed(err.to_string())).await;
        }
    }

    async fn handle_inbound(&mut self, inbound: Inbound) -> Result<(), ChatError> {
        match inbound {
            Inbound::Item(item) => {
                match ChatEvent::from_payload(item.value_string()) {
                    Ok(event) => self.notify(RoomEvent::EventReceived(event)).await,
                    Err(err) => log::error!("{err}"),
                }
                Ok(())
            }
            Inbound::Error(err, subscription) => {
                log::error!("Received error from subscription, {err}");
                match self.subscriptions.handle_error(err, subscription).await {
                    Ok(Some(_)) => {
                        self.notify(RoomEvent::Resubscribed).await;
                        Ok(())
                    }
                    Ok(None) => Ok(()),
                    Err(err) => {
                        self.notify(RoomEvent::ConnectionLost(err.to_string())).await;
                        Err(err)
                    }
                }
            }
        }
    }

    async fn notify(&self, event: RoomEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify UI: {err}");
        }
    }
}

/// Callbacks that hand everything to the room loop, preserving arrival order.
fn inbound_callbacks(sender: mpsc::UnboundedSender<Inbound>) -> SubscriptionCallbacks {
    let error_sender = sender.clone();
    SubscriptionCallbacks::new(
        move |item| {
            let _ = sender.send(Inbound::Item(item));
        },
        move |err, subscription| {
            let _ = error_sender.send(Inbound::Error(err, subscription));
        },
    )
}
