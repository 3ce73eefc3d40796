use super::types::ChatEvent;

/// Events sent from the chat room to the UI.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    EventReceived(ChatEvent),
    Subscribed { topic: String },
    /// The session was rebuilt after the credential expired.
    Resubscribed,
    SubscribeFailed(String),
    DeliveryFailed(String),
    /// Terminal failure; the room stops processing.
    ConnectionLost(String),
}
