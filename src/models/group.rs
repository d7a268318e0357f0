//! Chat group models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named channel owning a collection of messages.
///
/// `last_message_at` is written only by the message-created trigger and is
/// used to order the group list by recency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ChatGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            last_message_at: None,
        }
    }
}

/// Sort groups most recently active first. Groups that never received a
/// message go last, keeping their relative order.
pub fn sort_by_recency(groups: &mut [ChatGroup]) {
    groups.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
}
