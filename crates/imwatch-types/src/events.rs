use serde::{Deserialize, Serialize};

use crate::models::ChangeEvent;

/// Events published by the listener to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ListenerEvent {
    /// A row that no earlier poll has surfaced
    Message(ChangeEvent),

    /// Polling failed and the listener halted. Sent at most once.
    Error { message: String },
}

impl ListenerEvent {
    /// Returns the message payload, or `None` for the error event.
    pub fn as_message(&self) -> Option<&ChangeEvent> {
        match self {
            Self::Message(event) => Some(event),
            Self::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn message_serializes_with_type_tag() {
        let event = ListenerEvent::Message(ChangeEvent {
            guid: "a-1".into(),
            text: Some("hi".into()),
            handle: Some("+15555550123".into()),
            group: None,
            from_me: false,
            date: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            date_read: None,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Message");
        assert_eq!(json["data"]["guid"], "a-1");
        assert_eq!(json["data"]["text"], "hi");
        assert!(json["data"]["date_read"].is_null());
        assert_eq!(json["data"]["date"], "2024-03-01T12:00:00Z");
    }

    #[test]
    fn error_event_is_not_a_message() {
        let event = ListenerEvent::Error { message: "disk I/O error".into() };
        assert!(event.is_error());
        assert!(event.as_message().is_none());

        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"Error","data":{"message":"disk I/O error"}}"#);
    }
}
