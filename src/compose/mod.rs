//! Send path: text drafts and image messages
//!
//! Nothing here touches a feed. A sent message becomes visible when the
//! live query delivers it back.

use std::sync::Arc;

use chrono::Utc;

use crate::alerts::{self, Alerts};
use crate::auth::Session;
use crate::models::{MediaType, NewMessage};
use crate::store::{BlobStore, DocumentStore, StoreError};

/// Append one message as the session user. The timestamp is assigned by
/// the backend.
pub async fn send<S: DocumentStore>(
    store: &S,
    session: &Session,
    group_id: &str,
    content: &str,
    media_type: MediaType,
) -> Result<String, StoreError> {
    let message = NewMessage::new(content, media_type, session.sender());
    let id = store.append(group_id, &message).await?;
    tracing::debug!("Sent {} message {} to {}", media_type.as_str(), id, group_id);
    Ok(id)
}

/// Blob path for an image sent now.
pub fn image_path(group_id: &str) -> String {
    format!("{}/{}", group_id, Utc::now().timestamp_millis())
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub message_id: String,
    /// The user has not said yet whether they want notifications for this
    /// group; ask now.
    pub prompt_for_notifications: bool,
}

/// Input box state for one group.
pub struct Composer<S> {
    store: Arc<S>,
    session: Session,
    group_id: String,
    alerts: Alerts,
    draft: String,
    notifications: Option<bool>,
}

impl<S: DocumentStore> Composer<S> {
    /// `notifications` is the stored opt-in choice for the group, read once
    /// when the conversation is opened.
    pub fn new(
        store: Arc<S>,
        session: Session,
        group_id: &str,
        alerts: Alerts,
        notifications: Option<bool>,
    ) -> Self {
        Self {
            store,
            session,
            group_id: group_id.to_string(),
            alerts,
            draft: String::new(),
            notifications,
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Remember the answer to the opt-in prompt so it is not asked again.
    pub fn record_notification_choice(&mut self, enabled: bool) {
        self.notifications = Some(enabled);
    }

    /// Send the current draft.
    ///
    /// Blank drafts are ignored. The draft is cleared only once the append
    /// succeeds; on failure it is kept and a notice is raised.
    pub async fn send_draft(&mut self) -> Option<Sent> {
        let text = self.draft.trim().to_string();
        if text.is_empty() {
            return None;
        }

        match send(&*self.store, &self.session, &self.group_id, &text, MediaType::Text).await {
            Ok(message_id) => {
                self.draft.clear();
                Some(self.sent(message_id))
            }
            Err(e) => {
                tracing::warn!("Send to {} failed: {}", self.group_id, e);
                self.alerts.notice(alerts::SEND_FAILED);
                None
            }
        }
    }

    /// Replace the draft with `text` and send it.
    pub async fn send_text(&mut self, text: &str) -> Option<Sent> {
        self.set_draft(text);
        self.send_draft().await
    }

    fn sent(&self, message_id: String) -> Sent {
        Sent {
            message_id,
            prompt_for_notifications: self.notifications.is_none(),
        }
    }
}

impl<S: DocumentStore + BlobStore> Composer<S> {
    /// Upload an image, then post its URL as an `IMAGE` message.
    ///
    /// The message is only created after the upload succeeded.
    pub async fn send_image(&mut self, bytes: Vec<u8>, content_type: &str) -> Option<Sent> {
        let path = image_path(&self.group_id);
        let url = match self.store.upload(&path, bytes, content_type).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Upload of {} failed: {}", path, e);
                self.alerts.notice(alerts::UPLOAD_FAILED);
                return None;
            }
        };

        match send(&*self.store, &self.session, &self.group_id, &url, MediaType::Image).await {
            Ok(message_id) => Some(self.sent(message_id)),
            Err(e) => {
                tracing::warn!("Image message to {} failed: {}", self.group_id, e);
                self.alerts.notice(alerts::SEND_FAILED);
                None
            }
        }
    }
}
