//! User-facing alert channel
//!
//! Backend failures are caught where they happen and turned into an `Alert`
//! for whatever renders the UI. Nothing here retries.

use tokio::sync::mpsc;

pub const ALERT_TITLE: &str = "Uh-oh!";
pub const FETCH_MESSAGES_FAILED: &str =
    "It looks like we're having trouble fetching the messages. Please try again later.";
pub const FETCH_OLDER_FAILED: &str =
    "It looks like we're having trouble loading older messages. Please try again later.";
pub const SEND_FAILED: &str =
    "It looks like we're having trouble sending your message. Please try again later.";
pub const UPLOAD_FAILED: &str =
    "It looks like we're having trouble uploading your image. Please try again later.";
pub const FETCH_GROUPS_FAILED: &str =
    "It looks like we're having trouble fetching your chat groups. Please try again later.";

/// Whether the alert must be dismissed before the user can carry on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Blocking,
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
}

/// Sending half of the alert channel. Cheap to clone.
#[derive(Clone)]
pub struct Alerts {
    tx: mpsc::UnboundedSender<Alert>,
}

impl Alerts {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn blocking(&self, message: &str) {
        self.raise(AlertLevel::Blocking, message);
    }

    pub fn notice(&self, message: &str) {
        self.raise(AlertLevel::Notice, message);
    }

    fn raise(&self, level: AlertLevel, message: &str) {
        let alert = Alert {
            level,
            title: ALERT_TITLE.to_string(),
            message: message.to_string(),
        };
        if self.tx.send(alert).is_err() {
            tracing::debug!("Alert dropped, nobody is listening: {}", message);
        }
    }
}
