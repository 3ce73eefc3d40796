use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::PayloadParseError;

/// Wire-level event exchanged over a chat topic, tagged by `event`.
///
/// `timestamp` is milliseconds since the epoch on the producer's clock. It
/// doubles as the display time; events are never reordered or deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ChatEvent {
    #[serde(rename = "user_joined")]
    UserJoined { username: String, timestamp: i64 },
    #[serde(rename = "message")]
    Message {
        username: String,
        text: String,
        timestamp: i64,
    },
}

impl ChatEvent {
    pub fn user_joined(username: impl Into<String>) -> Self {
        ChatEvent::UserJoined {
            username: username.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn message(username: impl Into<String>, text: impl Into<String>) -> Self {
        ChatEvent::Message {
            username: username.into(),
            text: text.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn username(&self) -> &str {
        match self {
            ChatEvent::UserJoined { username, .. } | ChatEvent::Message { username, .. } => {
                username
            }
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            ChatEvent::UserJoined { timestamp, .. } | ChatEvent::Message { timestamp, .. } => {
                *timestamp
            }
        }
    }

    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decodes a topic payload; unknown `event` tags are rejected.
    pub fn from_payload(payload: &str) -> Result<Self, PayloadParseError> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_with_tag_first() {
        let event = ChatEvent::Message {
            username: "alice".to_string(),
            text: "hi".to_string(),
            timestamp: 1_700_000_000_123,
        };

        assert_eq!(
            event.to_payload().unwrap(),
            r#"{"event":"message","username":"alice","text":"hi","timestamp":1700000000123}"#
        );
    }

    #[test]
    fn user_joined_parses_from_wire_json() {
        let event =
            ChatEvent::from_payload(r#"{"event":"user_joined","username":"bob","timestamp":42}"#)
                .unwrap();

        assert_eq!(
            event,
            ChatEvent::UserJoined {
                username: "bob".to_string(),
                timestamp: 42
            }
        );
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(ChatEvent::from_payload("{not json").is_err());
    }

    #[test]
    fn unknown_event_tag_is_rejected() {
        let payload = r#"{"event":"user_left","username":"bob","timestamp":42}"#;
        assert!(ChatEvent::from_payload(payload).is_err());
    }

    #[test]
    fn untagged_json_is_rejected() {
        let payload = r#"{"username":"bob","text":"hello","timestamp":42}"#;
        assert!(ChatEvent::from_payload(payload).is_err());
    }

    #[test]
    fn constructors_stamp_current_time() {
        let before = Utc::now().timestamp_millis();
        let event = ChatEvent::message("alice", "hi");
        let after = Utc::now().timestamp_millis();

        assert!(event.timestamp() >= before && event.timestamp() <= after);
        assert_eq!(event.username(), "alice");
    }
}
