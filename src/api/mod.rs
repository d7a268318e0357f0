//! Command implementations for the CLI

mod demo;
mod groups;
mod messages;
mod notifications;

use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::alerts::{Alert, AlertLevel};
use crate::auth::Session;
use crate::config::Config;
use crate::models::{MediaType, Message};
use crate::store::RestStore;

/// Everything a backend command needs.
struct Context {
    config: Config,
    session: Session,
    store: Arc<RestStore>,
}

impl Context {
    fn load() -> Result<Self> {
        let config = Config::load()?;
        let session = Session::from_config(&config)?;
        let store = Arc::new(RestStore::from_config(&config)?);
        Ok(Self {
            config,
            session,
            store,
        })
    }
}

/// One line per message, `[HH:MM] sender: contents`.
fn print_message(message: &Message) {
    let contents = match message.media_type {
        MediaType::Text => message.contents.clone(),
        MediaType::Image => format!("[image] {}", message.contents),
    };
    println!("[{}] {}: {}", message.time_label(), message.sender_name, contents);
}

fn print_alert(alert: &Alert) {
    match alert.level {
        AlertLevel::Blocking => eprintln!("{} {}", alert.title, alert.message),
        AlertLevel::Notice => eprintln!("{}", alert.message),
    }
}

/// Print pending alerts; fail with the first one if there was any.
fn flush_alerts(rx: &mut mpsc::UnboundedReceiver<Alert>) -> Result<()> {
    let mut first = None;
    while let Ok(alert) = rx.try_recv() {
        print_alert(&alert);
        first.get_or_insert(alert);
    }
    match first {
        Some(alert) => bail!("{}", alert.message),
        None => Ok(()),
    }
}

/// List chat groups, most recently active first
pub async fn list_groups() -> Result<()> {
    groups::list_groups().await
}

/// Print a group's newest messages plus `pages - 1` older pages
pub async fn read_messages(group_id: &str, pages: usize) -> Result<()> {
    messages::read_messages(group_id, pages).await
}

/// Send a text message
pub async fn send_message(to: &str, message: &str) -> Result<()> {
    messages::send_message(to, message).await
}

/// Upload an image file and send it
pub async fn send_image(to: &str, path: &str) -> Result<()> {
    messages::send_image(to, path).await
}

/// Follow a group live until Ctrl-C
pub async fn watch(group_id: &str) -> Result<()> {
    messages::watch(group_id).await
}

/// Show or change the notification opt-in for a group
pub async fn notifications(group_id: &str, set: Option<&str>) -> Result<()> {
    notifications::notifications(group_id, set)
}

/// Run the whole flow against the in-process backend
pub async fn demo() -> Result<()> {
    demo::run().await
}
