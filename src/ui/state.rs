use crate::common::{ChatEvent, RoomEvent};

/// Connection status shown in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Failed(String),
}

/// Local UI state.
pub struct AppState {
    pub topic_name: String,
    /// Events in the order the transport delivered them.
    pub events: Vec<ChatEvent>,
    pub input_text: String,
    pub status: ConnectionStatus,
    pub notices: Vec<String>,
}

impl AppState {
    pub fn new(topic_name: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            events: Vec::new(),
            input_text: String::new(),
            status: ConnectionStatus::Connecting,
            notices: Vec::new(),
        }
    }

    pub fn apply(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::EventReceived(chat) => self.events.push(chat),
            RoomEvent::Subscribed { .. } => self.status = ConnectionStatus::Connected,
            RoomEvent::Resubscribed => {
                self.status = ConnectionStatus::Connected;
                self.push_notice("Session refreshed".to_string());
            }
            RoomEvent::SubscribeFailed(reason) | RoomEvent::ConnectionLost(reason) => {
                self.status = ConnectionStatus::Failed(reason);
            }
            RoomEvent::DeliveryFailed(reason) => {
                self.push_notice(format!("Message not delivered: {reason}"));
            }
        }
    }

    fn push_notice(&mut self, notice: String) {
        self.notices.push(notice);
        // Keep at most 20 notices
        if self.notices.len() > 20 {
            self.notices.remove(0);
        }
    }
}
