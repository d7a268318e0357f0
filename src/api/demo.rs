//! Offline walkthrough on the in-process backend
//!
//! Seeds two groups, follows one live, pages back through history, sends
//! a text and an image, and shows what the message trigger published.

use anyhow::{bail, Context as _, Result};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::{print_alert, print_message};
use crate::alerts::Alerts;
use crate::auth::Session;
use crate::compose::Composer;
use crate::feed::{self, FeedEvent, FeedHandle, FeedOptions, PagingPolicy};
use crate::functions::{spawn_message_trigger, TopicLog};
use crate::models::{ChatGroup, MediaType, NewMessage};
use crate::store::{DocumentStore, MemoryStore};

const DEMO_PAGE_SIZE: usize = 5;
const WAIT: Duration = Duration::from_secs(5);

fn seed(store: &MemoryStore) -> Result<()> {
    store.create_group(ChatGroup::new("general", "General", "Everyone, everything"));
    store.create_group(ChatGroup::new("random", "Random", "Off-topic"));

    let grace = Session::new("grace", "Grace Hopper", None).sender();
    let start = Utc::now() - ChronoDuration::hours(2);
    store.insert_at(
        "random",
        NewMessage::new("anyone up for lunch?", MediaType::Text, grace.clone()),
        start,
    )?;
    for i in 0..12 {
        store.insert_at(
            "general",
            NewMessage::new(format!("note #{}", i + 1), MediaType::Text, grace.clone()),
            start + ChronoDuration::minutes(5 * (i + 1)),
        )?;
    }
    Ok(())
}

async fn print_groups(store: &MemoryStore) -> Result<()> {
    for group in store.list_groups().await? {
        let last = group
            .last_message_at
            .map(|at| at.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<10} {:<12} last: {}", group.id, group.name, last);
    }
    Ok(())
}

async fn wait_for_update(feed: &mut FeedHandle<MemoryStore>) -> Result<()> {
    let event = tokio::time::timeout(WAIT, async {
        loop {
            match feed.next_event().await {
                Some(FeedEvent::LiveUpdated { .. }) => return Ok(()),
                Some(FeedEvent::Stopped { reason }) => return Err(reason),
                Some(_) => {}
                None => return Ok(()),
            }
        }
    })
    .await
    .context("Timed out waiting for the live feed")?;
    Ok(event?)
}

async fn wait_for_trigger(publisher: &TopicLog, count: usize) -> Result<()> {
    tokio::time::timeout(WAIT, async {
        while publisher.sent().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("Timed out waiting for the message trigger")
}

pub async fn run() -> Result<()> {
    let store = MemoryStore::new();
    seed(&store)?;

    let publisher = Arc::new(TopicLog::new());
    let trigger = spawn_message_trigger(store.clone(), Arc::clone(&publisher));
    let store = Arc::new(store);

    let session = Session::new("ada", "Ada Lovelace", None);
    let (alerts, mut alert_rx) = Alerts::channel();

    println!("\nGroups:");
    print_groups(&store).await?;

    let options = FeedOptions {
        page_size: DEMO_PAGE_SIZE,
        paging: PagingPolicy::Exhaustion,
    };
    let mut feed = feed::subscribe(Arc::clone(&store), "general", options, alerts.clone()).await;
    let loaded = feed.wait_loaded().await?;
    println!("\nLive window on general: {} messages", loaded);

    loop {
        let appended = feed.load_more().await?;
        if appended == 0 {
            break;
        }
        println!("Backfilled {} older messages ({} total)", appended, feed.len());
    }

    let mut composer = Composer::new(Arc::clone(&store), session, "general", alerts, None);
    let Some(sent) = composer.send_text("Hello from the demo").await else {
        bail!("Demo send failed");
    };
    if sent.prompt_for_notifications {
        println!("(would ask whether to enable notifications for general)");
    }
    composer.record_notification_choice(true);
    wait_for_update(&mut feed).await?;

    if composer
        .send_image(b"\x89PNG demo".to_vec(), "image/png")
        .await
        .is_none()
    {
        bail!("Demo image send failed");
    }
    wait_for_update(&mut feed).await?;

    println!("\ngeneral, oldest first:");
    for message in feed.messages().iter().rev() {
        print_message(message);
    }

    wait_for_trigger(&publisher, 2).await?;
    println!("\nPublished notifications:");
    for (topic, notification) in publisher.sent() {
        println!("  [{}] {}: {}", topic, notification.title, notification.body);
    }

    println!("\nGroups after sending:");
    print_groups(&store).await?;

    feed.switch_group("random").await;
    let loaded = feed.wait_loaded().await?;
    println!("\nSwitched to random: {} messages", loaded);
    for message in feed.messages().iter().rev() {
        print_message(message);
    }

    feed.close().await;
    trigger.abort();

    while let Ok(alert) = alert_rx.try_recv() {
        print_alert(&alert);
    }
    Ok(())
}
