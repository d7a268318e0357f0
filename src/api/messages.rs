//! Reading, sending and following messages

use anyhow::{bail, Context as _, Result};
use futures::StreamExt;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use super::{flush_alerts, print_alert, print_message, Context};
use crate::alerts::Alerts;
use crate::compose::{Composer, Sent};
use crate::config::NotificationPreferences;
use crate::feed::{self, FeedEvent};
use crate::models::Message;

pub async fn read_messages(group_id: &str, pages: usize) -> Result<()> {
    let ctx = Context::load()?;
    let (alerts, mut alert_rx) = Alerts::channel();
    let mut feed = feed::subscribe(
        Arc::clone(&ctx.store),
        group_id,
        ctx.config.feed_options(),
        alerts,
    )
    .await;

    if let Err(e) = feed.wait_loaded().await {
        feed.close().await;
        flush_alerts(&mut alert_rx)?;
        return Err(e.into());
    }

    for _ in 1..pages.max(1) {
        match feed.load_more().await {
            Ok(0) | Err(_) => break,
            Ok(n) => tracing::debug!("Loaded {} older messages", n),
        }
    }

    let messages = feed.messages();
    feed.close().await;

    if messages.is_empty() {
        println!("(no messages)");
    }
    for message in messages.iter().rev() {
        print_message(message);
    }

    flush_alerts(&mut alert_rx)
}

fn composer(ctx: Context, group_id: &str, alerts: Alerts) -> Result<Composer<crate::store::RestStore>> {
    let prefs = NotificationPreferences::load()?;
    Ok(Composer::new(
        ctx.store,
        ctx.session,
        group_id,
        alerts,
        prefs.get(group_id),
    ))
}

fn report_sent(group_id: &str, sent: &Sent) {
    println!("Message sent.");
    if sent.prompt_for_notifications {
        println!(
            "Want to hear about new messages? Run 'groupchat notifications {} --set on'.",
            group_id
        );
    }
}

pub async fn send_message(to: &str, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        bail!("Message is empty");
    }

    let ctx = Context::load()?;
    let (alerts, mut alert_rx) = Alerts::channel();
    let mut composer = composer(ctx, to, alerts)?;

    match composer.send_text(message).await {
        Some(sent) => {
            report_sent(to, &sent);
            Ok(())
        }
        None => flush_alerts(&mut alert_rx),
    }
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

pub async fn send_image(to: &str, path: &str) -> Result<()> {
    let path = Path::new(path);
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let ctx = Context::load()?;
    let (alerts, mut alert_rx) = Alerts::channel();
    let mut composer = composer(ctx, to, alerts)?;

    tracing::info!("Uploading {} ({} bytes)...", path.display(), bytes.len());
    match composer.send_image(bytes, content_type(path)).await {
        Some(sent) => {
            report_sent(to, &sent);
            Ok(())
        }
        None => flush_alerts(&mut alert_rx),
    }
}

/// Messages not printed yet, newest first. `seen` is reset to the ids in
/// `messages`, so it never outgrows the view.
fn take_unseen(seen: &mut HashSet<String>, messages: Vec<Message>) -> Vec<Message> {
    let current: HashSet<String> = messages.iter().map(|m| m.id.clone()).collect();
    let fresh = messages
        .into_iter()
        .filter(|m| !seen.contains(&m.id))
        .collect();
    *seen = current;
    fresh
}

pub async fn watch(group_id: &str) -> Result<()> {
    let ctx = Context::load()?;
    let (alerts, mut alert_rx) = Alerts::channel();
    let mut feed = feed::subscribe(
        Arc::clone(&ctx.store),
        group_id,
        ctx.config.feed_options(),
        alerts,
    )
    .await;

    let mut seen: HashSet<String> = HashSet::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    println!("Watching {} (Ctrl-C to stop)", group_id);

    let result: Result<()> = loop {
        tokio::select! {
            event = feed.next() => match event {
                Some(FeedEvent::Loaded { .. }) | Some(FeedEvent::LiveUpdated { .. }) => {
                    let fresh = take_unseen(&mut seen, feed.messages());
                    for message in fresh.iter().rev() {
                        print_message(message);
                    }
                }
                Some(FeedEvent::Backfilled { .. }) => {}
                Some(FeedEvent::Stopped { reason }) => break Err(reason.into()),
                None => break Ok(()),
            },
            Some(alert) = alert_rx.recv() => print_alert(&alert),
            _ = &mut ctrl_c => break Ok(()),
        }
    };

    feed.close().await;
    while let Ok(alert) = alert_rx.try_recv() {
        print_alert(&alert);
    }
    result
}
