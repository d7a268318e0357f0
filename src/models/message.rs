//! Message models

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// How a message's `contents` should be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    /// Plain text.
    #[default]
    Text,
    /// URL of a previously uploaded blob.
    Image,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Text => "TEXT",
            MediaType::Image => "IMAGE",
        }
    }
}

/// A message as stored by the backend.
///
/// Sender fields are a snapshot of the sender's identity at send time.
/// `created_at` is `None` while the server timestamp is still pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub contents: String,
    #[serde(default)]
    pub media_type: MediaType,
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_avatar: Option<String>,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    /// True while the server has not yet assigned `created_at`.
    pub fn is_pending(&self) -> bool {
        self.created_at.is_none()
    }

    /// `HH:MM` (UTC) label for display, empty while pending.
    pub fn time_label(&self) -> String {
        self.created_at
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default()
    }
}

/// Denormalized sender identity copied into every new message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderIdentity {
    pub sender_id: String,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
}

/// Sentinel asking the backend to fill in its current time on write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerTimestamp;

impl Serialize for ServerTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(".sv", "timestamp")?;
        map.end()
    }
}

/// Body of a single-document create call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub contents: String,
    pub media_type: MediaType,
    #[serde(flatten)]
    pub sender: SenderIdentity,
    pub created_at: ServerTimestamp,
}

impl NewMessage {
    pub fn new(contents: impl Into<String>, media_type: MediaType, sender: SenderIdentity) -> Self {
        Self {
            contents: contents.into(),
            media_type,
            sender,
            created_at: ServerTimestamp,
        }
    }

    /// Materialize the stored form once the backend has assigned id and time.
    pub fn into_message(self, id: String, created_at: DateTime<Utc>) -> Message {
        Message {
            id,
            contents: self.contents,
            media_type: self.media_type,
            sender_id: self.sender.sender_id,
            sender_name: self.sender.sender_name,
            sender_avatar: self.sender.sender_avatar,
            created_at: Some(created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> SenderIdentity {
        SenderIdentity {
            sender_id: "u1".to_string(),
            sender_name: "Ada".to_string(),
            sender_avatar: Some("https://example.com/ada.png".to_string()),
        }
    }

    #[test]
    fn test_new_message_wire_shape() {
        let msg = NewMessage::new("hello", MediaType::Text, sender());
        let v = serde_json::to_value(&msg).unwrap();

        assert_eq!(v["contents"], "hello");
        assert_eq!(v["mediaType"], "TEXT");
        assert_eq!(v["senderId"], "u1");
        assert_eq!(v["senderName"], "Ada");
        assert_eq!(v["createdAt"][".sv"], "timestamp");
    }

    #[test]
    fn test_message_pending_timestamp() {
        let json = r#"{"id":"m1","contents":"hi","senderId":"u1","senderName":"Ada","createdAt":null}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.is_pending());
        assert_eq!(msg.media_type, MediaType::Text);
        assert_eq!(msg.time_label(), "");
    }

    #[test]
    fn test_message_accepts_snake_case_timestamp() {
        let json = r#"{"id":"m1","contents":"hi","mediaType":"IMAGE","senderId":"u1","created_at":"2024-03-01T09:15:00Z"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.media_type, MediaType::Image);
        assert_eq!(msg.time_label(), "09:15");
    }
}
