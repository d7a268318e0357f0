//! Server-side trigger run on every message append
//!
//! Bumps the owning group's `lastMessageAt` and fans a push notification out
//! to the topic named after the group. The trigger is the only writer of
//! `lastMessageAt`; clients never touch it.

use std::future::Future;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::models::{MediaType, Message};
use crate::store::{MemoryStore, StoreError};

/// Body used when the message contents is not something to show as text.
pub const IMAGE_PLACEHOLDER: &str = "Sent an image";

/// Write access to a group's recency field, held by the trigger only.
pub trait GroupRecency: Send + Sync {
    /// Set `lastMessageAt` to the current server time and return it.
    fn record_last_message(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<DateTime<Utc>, StoreError>> + Send;
}

/// A push notification addressed to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// Push fan-out contract.
pub trait Publisher: Send + Sync + 'static {
    fn publish(
        &self,
        topic: &str,
        notification: &Notification,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Best-effort check for contents that are a link rather than prose.
///
/// Anyone can send text that parses as a URL, so this only picks the
/// notification body; it is never used to decide how a message renders.
pub fn looks_like_url(contents: &str) -> bool {
    let trimmed = contents.trim();
    if trimmed.contains(char::is_whitespace) {
        return false;
    }
    match url::Url::parse(trimmed) {
        Ok(url) => url.has_host(),
        Err(_) => false,
    }
}

/// Notification announcing a new message.
pub fn notification_for(message: &Message) -> Notification {
    let body = if message.media_type == MediaType::Image || looks_like_url(&message.contents) {
        IMAGE_PLACEHOLDER.to_string()
    } else {
        message.contents.clone()
    };
    Notification {
        title: message.sender_name.clone(),
        body,
    }
}

/// Run the trigger for one newly created message.
pub async fn on_message_created<W, P>(
    store: &W,
    publisher: &P,
    group_id: &str,
    message: &Message,
) -> Result<()>
where
    W: GroupRecency,
    P: Publisher,
{
    let at = store
        .record_last_message(group_id)
        .await
        .with_context(|| format!("Failed to update lastMessageAt of {}", group_id))?;
    tracing::debug!("Group {} lastMessageAt = {}", group_id, at);

    let notification = notification_for(message);
    publisher
        .publish(group_id, &notification)
        .await
        .with_context(|| format!("Failed to publish to topic {}", group_id))?;
    Ok(())
}

/// Run the trigger for every append made to `store` until it is dropped.
pub fn spawn_message_trigger<P: Publisher>(store: MemoryStore, publisher: Arc<P>) -> JoinHandle<()> {
    let mut created = store.subscribe_created();
    tokio::spawn(async move {
        loop {
            match created.recv().await {
                Ok(event) => {
                    if let Err(e) =
                        on_message_created(&store, publisher.as_ref(), &event.group_id, &event.message)
                            .await
                    {
                        tracing::warn!("Message trigger failed: {:#}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Message trigger skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Publisher that logs and keeps every notification it was given.
#[derive(Default)]
pub struct TopicLog {
    sent: Mutex<Vec<(String, Notification)>>,
}

impl TopicLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first.
    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Publisher for TopicLog {
    async fn publish(&self, topic: &str, notification: &Notification) -> Result<()> {
        tracing::info!(
            "Push to topic {}: {}: {}",
            topic,
            notification.title,
            notification.body
        );
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((topic.to_string(), notification.clone()));
        Ok(())
    }
}
