//! Live message feed for one chat group
//!
//! A feed keeps an ordered, de-duplicated view of a group's messages. The
//! newest page is kept live by a push subscription that replaces the head of
//! the view wholesale on every change; older pages are pulled on demand and
//! appended behind it.
//!
//! Lifecycle: `Uninitialized -> Loading -> Live`, with `Backfilling` while a
//! pull is in flight and `Stopped` once the live channel fails. A failed
//! channel is not re-opened; call `switch_group` (or subscribe again) to
//! recover.

mod window;

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::alerts::{self, Alerts};
use crate::models::Message;
use crate::store::{DocumentStore, ListenGuard, SnapshotResult, StoreError};

use window::MessageWindow;

/// Messages per live window and per backfill page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Undelivered events kept per feed. Past this, update notifications are
/// dropped; the view itself is always current.
pub const EVENT_BACKLOG: usize = 64;

/// How the feed decides that no older messages are left to pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PagingPolicy {
    /// Stop once the first live window or a pulled page comes back short.
    #[default]
    Exhaustion,
    /// Only pull while the loaded count is an exact multiple of the page
    /// size. Gives up early whenever live updates push the count off a page
    /// boundary even though older messages exist.
    PageMultiple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    pub page_size: usize,
    pub paging: PagingPolicy,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            paging: PagingPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Uninitialized,
    /// Channel open, first snapshot not received yet.
    Loading,
    Live,
    /// Live, with a pull for older messages in flight.
    Backfilling,
    /// The live channel failed; the view keeps what it had.
    Stopped,
}

/// Change notifications for the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// First snapshot arrived (possibly empty).
    Loaded { count: usize },
    /// A later snapshot replaced the live window.
    LiveUpdated { count: usize },
    /// Older messages were appended.
    Backfilled { appended: usize },
    /// The live channel failed and will not be re-opened.
    Stopped { reason: StoreError },
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("failed to load older messages: {0}")]
    Backfill(#[source] StoreError),
}

#[derive(Debug)]
struct FeedState {
    group_id: String,
    phase: FeedPhase,
    loaded: bool,
    backfilling: bool,
    /// No older messages are known to exist (exhaustion policy).
    exhausted: bool,
    window: MessageWindow,
}

impl FeedState {
    fn new() -> Self {
        Self {
            group_id: String::new(),
            phase: FeedPhase::Uninitialized,
            loaded: false,
            backfilling: false,
            exhausted: false,
            window: MessageWindow::new(),
        }
    }

    fn reset(&mut self, group_id: &str) {
        *self = Self::new();
        self.group_id = group_id.to_string();
        self.phase = FeedPhase::Loading;
    }

    fn apply_live(&mut self, snapshot: Vec<Message>, page_size: usize) -> FeedEvent {
        let first = !self.loaded;
        if first {
            // A short first window means the whole history is already here.
            self.exhausted = snapshot.len() < page_size;
            self.loaded = true;
            self.phase = FeedPhase::Live;
        }
        self.window.replace_live(snapshot);

        let count = self.window.len();
        if first {
            FeedEvent::Loaded { count }
        } else {
            FeedEvent::LiveUpdated { count }
        }
    }

    fn may_have_older(&self, options: &FeedOptions) -> bool {
        match options.paging {
            PagingPolicy::Exhaustion => !self.exhausted,
            PagingPolicy::PageMultiple => self.window.len() % options.page_size == 0,
        }
    }
}

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

struct OpenChannel {
    guard: ListenGuard,
    pump: JoinHandle<()>,
}

/// A live view of one group's messages.
///
/// Owns at most one push channel at a time. Also a `Stream` of `FeedEvent`s.
pub struct FeedHandle<S: DocumentStore> {
    store: Arc<S>,
    options: FeedOptions,
    alerts: Alerts,
    state: Arc<Mutex<FeedState>>,
    events_tx: mpsc::Sender<FeedEvent>,
    events_rx: mpsc::Receiver<FeedEvent>,
    channel: Option<OpenChannel>,
}

/// Open a live feed on `group_id`.
///
/// A missing group or a failed connection does not fail the call; it shows
/// up as a blocking alert and a `Stopped` event.
pub async fn subscribe<S: DocumentStore>(
    store: Arc<S>,
    group_id: &str,
    options: FeedOptions,
    alerts: Alerts,
) -> FeedHandle<S> {
    let options = FeedOptions {
        page_size: options.page_size.max(1),
        ..options
    };
    let (events_tx, events_rx) = mpsc::channel(EVENT_BACKLOG);
    let mut handle = FeedHandle {
        store,
        options,
        alerts,
        state: Arc::new(Mutex::new(FeedState::new())),
        events_tx,
        events_rx,
        channel: None,
    };
    handle.open(group_id).await;
    handle
}

impl<S: DocumentStore> FeedHandle<S> {
    fn state(&self) -> MutexGuard<'_, FeedState> {
        lock(&self.state)
    }

    pub fn group_id(&self) -> String {
        self.state().group_id.clone()
    }

    pub fn phase(&self) -> FeedPhase {
        let state = self.state();
        if state.phase == FeedPhase::Live && state.backfilling {
            FeedPhase::Backfilling
        } else {
            state.phase
        }
    }

    /// Copy of the current view, newest first.
    pub fn messages(&self) -> Vec<Message> {
        self.state().window.messages().to_vec()
    }

    pub fn len(&self) -> usize {
        self.state().window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().window.is_empty()
    }

    pub fn options(&self) -> FeedOptions {
        self.options
    }

    /// Next change notification.
    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        self.events_rx.recv().await
    }

    /// Wait for the first snapshot. Returns the failure if the channel
    /// stopped first.
    pub async fn wait_loaded(&mut self) -> Result<usize, StoreError> {
        loop {
            match self.next_event().await {
                Some(FeedEvent::Loaded { count }) => return Ok(count),
                Some(FeedEvent::Stopped { reason }) => return Err(reason),
                Some(_) => {}
                None => return Err(StoreError::Unavailable("feed closed".to_string())),
            }
        }
    }

    async fn open(&mut self, group_id: &str) {
        lock(&self.state).reset(group_id);
        tracing::info!("Subscribing to {}", group_id);

        match self.store.listen(group_id, self.options.page_size).await {
            Ok(subscription) => {
                let (snapshots, guard) = subscription.into_parts();
                let pump = tokio::spawn(pump(
                    snapshots,
                    Arc::clone(&self.state),
                    self.events_tx.clone(),
                    self.alerts.clone(),
                    self.options.page_size,
                ));
                self.channel = Some(OpenChannel { guard, pump });
            }
            Err(e) => stop(&self.state, &self.events_tx, &self.alerts, e),
        }
    }

    async fn close_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.guard.close().await;
            if let Err(e) = channel.pump.await {
                if !e.is_cancelled() {
                    tracing::warn!("Feed pump ended abnormally: {}", e);
                }
            }
        }
    }

    /// Point the feed at another group. The current channel is fully closed
    /// before the new one opens, and the view starts over.
    pub async fn switch_group(&mut self, group_id: &str) {
        self.close_channel().await;
        // Events about the previous group are stale now.
        while self.events_rx.try_recv().is_ok() {}
        self.open(group_id).await;
    }

    /// Tear down the channel and discard the view.
    pub async fn close(mut self) {
        self.close_channel().await;
        tracing::info!("Feed on {} closed", self.group_id());
    }

    /// Pull the next page of older messages and append it to the view.
    ///
    /// Returns how many messages were appended. Does nothing (returns 0)
    /// before the first snapshot, while another pull is in flight, or when
    /// the paging policy says there is nothing older. A failed pull leaves
    /// the view untouched and raises a notice.
    pub async fn load_more(&self) -> Result<usize, FeedError> {
        let page_size = self.options.page_size;
        let (group_id, cursor) = {
            let mut state = self.state();
            if !state.loaded {
                tracing::debug!("load_more ignored: feed not loaded yet");
                return Ok(0);
            }
            if state.backfilling {
                tracing::debug!("load_more ignored: pull already in flight");
                return Ok(0);
            }
            if !state.may_have_older(&self.options) {
                tracing::debug!("load_more skipped: no older messages expected");
                return Ok(0);
            }
            let Some(cursor) = state.window.backfill_cursor() else {
                return Ok(0);
            };
            state.backfilling = true;
            (state.group_id.clone(), cursor)
        };

        tracing::debug!("Pulling {} messages of {} older than {}", page_size, group_id, cursor);
        let result = self.store.query_page(&group_id, page_size, Some(cursor)).await;

        let appended = {
            let mut state = self.state();
            state.backfilling = false;
            match result {
                Ok(page) => {
                    if page.len() < page_size {
                        state.exhausted = true;
                    }
                    state.window.append_older(page, cursor)
                }
                Err(e) => {
                    drop(state);
                    tracing::warn!("Backfill of {} failed: {}", group_id, e);
                    self.alerts.notice(alerts::FETCH_OLDER_FAILED);
                    return Err(FeedError::Backfill(e));
                }
            }
        };

        emit(&self.events_tx, FeedEvent::Backfilled { appended });
        Ok(appended)
    }
}

impl<S: DocumentStore> Stream for FeedHandle<S> {
    type Item = FeedEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<FeedEvent>> {
        self.get_mut().events_rx.poll_recv(cx)
    }
}

impl<S: DocumentStore> Drop for FeedHandle<S> {
    fn drop(&mut self) {
        // The guard closes the channel on drop; the pump winds down with it.
        if let Some(channel) = &self.channel {
            channel.pump.abort();
        }
    }
}

/// Queue an event without waiting on the consumer.
///
/// The last free slot is held back for `Loaded` and `Stopped`, which end
/// `wait_loaded` and a watch loop.
fn emit(events: &mpsc::Sender<FeedEvent>, event: FeedEvent) {
    let terminal = matches!(event, FeedEvent::Loaded { .. } | FeedEvent::Stopped { .. });
    if !terminal && events.capacity() <= 1 {
        tracing::debug!("Feed event queue full, dropping {:?}", event);
        return;
    }
    if let Err(e) = events.try_send(event) {
        tracing::debug!("Feed event dropped: {}", e);
    }
}

fn stop(
    state: &Mutex<FeedState>,
    events: &mpsc::Sender<FeedEvent>,
    alerts: &Alerts,
    reason: StoreError,
) {
    let group_id = {
        let mut state = lock(state);
        state.phase = FeedPhase::Stopped;
        state.group_id.clone()
    };
    tracing::warn!("Live feed for {} stopped: {}", group_id, reason);
    alerts.blocking(alerts::FETCH_MESSAGES_FAILED);
    emit(events, FeedEvent::Stopped { reason });
}

/// Apply snapshots to the shared state until the channel ends or fails.
async fn pump(
    mut snapshots: mpsc::UnboundedReceiver<SnapshotResult>,
    state: Arc<Mutex<FeedState>>,
    events: mpsc::Sender<FeedEvent>,
    alerts: Alerts,
    page_size: usize,
) {
    while let Some(result) = snapshots.recv().await {
        match result {
            Ok(snapshot) => {
                let event = lock(&state).apply_live(snapshot, page_size);
                tracing::debug!("Feed event: {:?}", event);
                emit(&events, event);
            }
            Err(e) => {
                stop(&state, &events, &alerts, e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::window::tests::is_ordered;
    use super::*;
    use crate::alerts::{Alert, AlertLevel};
    use crate::models::{ChatGroup, MediaType, NewMessage, SenderIdentity};
    use crate::store::memory::FailOp;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use futures::StreamExt;

    fn sender() -> SenderIdentity {
        SenderIdentity {
            sender_id: "u1".to_string(),
            sender_name: "Ada".to_string(),
            sender_avatar: None,
        }
    }

    /// Group `g1` with `count` messages one second apart, oldest `m0`.
    fn seeded(count: usize) -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.create_group(ChatGroup::new("g1", "General", ""));
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        for i in 0..count {
            let msg = NewMessage::new(format!("m{}", i), MediaType::Text, sender());
            store
                .insert_at("g1", msg, start + Duration::seconds(i as i64))
                .unwrap();
        }
        Arc::new(store)
    }

    fn options(page_size: usize, paging: PagingPolicy) -> FeedOptions {
        FeedOptions { page_size, paging }
    }

    async fn append_text(store: &MemoryStore, text: &str) {
        let msg = NewMessage::new(text, MediaType::Text, sender());
        store.append("g1", &msg).await.unwrap();
    }

    async fn wait_for_update(feed: &mut FeedHandle<MemoryStore>) {
        loop {
            match feed.next_event().await {
                Some(FeedEvent::LiveUpdated { .. }) => return,
                Some(FeedEvent::Stopped { reason }) => panic!("feed stopped: {}", reason),
                Some(_) => {}
                None => panic!("event channel closed"),
            }
        }
    }

    fn drain_alerts(rx: &mut mpsc::UnboundedReceiver<Alert>) -> Vec<Alert> {
        let mut out = Vec::new();
        while let Ok(alert) = rx.try_recv() {
            out.push(alert);
        }
        out
    }

    #[tokio::test]
    async fn test_subscribe_loads_newest_page() {
        let store = seeded(70);
        let (alerts, _rx) = Alerts::channel();
        let mut feed = subscribe(store, "g1", FeedOptions::default(), alerts).await;
        assert_eq!(feed.phase(), FeedPhase::Loading);

        assert_eq!(feed.wait_loaded().await.unwrap(), 50);
        assert_eq!(feed.phase(), FeedPhase::Live);

        let messages = feed.messages();
        assert_eq!(messages[0].contents, "m69");
        assert_eq!(messages[49].contents, "m20");
        assert!(is_ordered(&messages));
    }

    #[tokio::test]
    async fn test_empty_group_is_loaded_not_loading() {
        let store = seeded(0);
        let (alerts, _rx) = Alerts::channel();
        let mut feed = subscribe(store, "g1", FeedOptions::default(), alerts).await;

        assert_eq!(feed.wait_loaded().await.unwrap(), 0);
        assert_eq!(feed.phase(), FeedPhase::Live);
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn test_load_more_before_first_snapshot_is_noop() {
        let store = seeded(70);
        let (alerts, _rx) = Alerts::channel();
        let feed = subscribe(Arc::clone(&store), "g1", FeedOptions::default(), alerts).await;

        // The memory listener has not been polled yet.
        assert_eq!(feed.load_more().await.unwrap(), 0);
        assert_eq!(store.page_queries(), 0);
    }

    #[tokio::test]
    async fn test_load_more_appends_strictly_older() {
        let store = seeded(120);
        let (alerts, _rx) = Alerts::channel();
        let mut feed = subscribe(Arc::clone(&store), "g1", FeedOptions::default(), alerts).await;
        feed.wait_loaded().await.unwrap();

        let cursor = feed.messages().last().unwrap().created_at.unwrap();
        assert_eq!(feed.load_more().await.unwrap(), 50);
        let messages = feed.messages();
        assert!(messages[50..].iter().all(|m| m.created_at.unwrap() < cursor));
        assert!(is_ordered(&messages));

        // Last page is short; after it the feed knows it is exhausted.
        assert_eq!(feed.load_more().await.unwrap(), 20);
        assert_eq!(feed.len(), 120);
        assert_eq!(feed.load_more().await.unwrap(), 0);
        assert_eq!(store.page_queries(), 2);
        assert_eq!(feed.next_event().await, Some(FeedEvent::Backfilled { appended: 50 }));
    }

    #[tokio::test]
    async fn test_short_first_window_needs_no_pull() {
        let store = seeded(10);
        let (alerts, _rx) = Alerts::channel();
        let mut feed = subscribe(Arc::clone(&store), "g1", FeedOptions::default(), alerts).await;
        feed.wait_loaded().await.unwrap();

        assert_eq!(feed.load_more().await.unwrap(), 0);
        assert_eq!(store.page_queries(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_load_more_issues_one_pull() {
        let store = seeded(120);
        let (alerts, _rx) = Alerts::channel();
        let mut feed = subscribe(Arc::clone(&store), "g1", FeedOptions::default(), alerts).await;
        feed.wait_loaded().await.unwrap();

        let mut first = tokio_test::task::spawn(feed.load_more());
        tokio_test::assert_pending!(first.poll());
        assert_eq!(feed.phase(), FeedPhase::Backfilling);

        // A second trigger while the first pull is suspended.
        assert_eq!(feed.load_more().await.unwrap(), 0);

        let appended = loop {
            if let std::task::Poll::Ready(result) = first.poll() {
                break result.unwrap();
            }
            tokio::task::yield_now().await;
        };
        drop(first);

        assert_eq!(appended, 50);
        assert_eq!(store.page_queries(), 1);
        assert_eq!(feed.phase(), FeedPhase::Live);
    }

    #[tokio::test]
    async fn test_join_of_two_load_more_calls() {
        let store = seeded(120);
        let (alerts, _rx) = Alerts::channel();
        let mut feed = subscribe(Arc::clone(&store), "g1", FeedOptions::default(), alerts).await;
        feed.wait_loaded().await.unwrap();

        let (a, b) = tokio::join!(feed.load_more(), feed.load_more());
        let mut counts = [a.unwrap(), b.unwrap()];
        counts.sort();
        assert_eq!(counts, [0, 50]);
        assert_eq!(store.page_queries(), 1);
    }

    #[tokio::test]
    async fn test_failed_pull_leaves_view_unchanged() {
        let store = seeded(120);
        let (alerts, mut alert_rx) = Alerts::channel();
        let mut feed = subscribe(Arc::clone(&store), "g1", FeedOptions::default(), alerts).await;
        feed.wait_loaded().await.unwrap();
        let before = feed.messages();

        store.fail_next(FailOp::Page);
        assert!(matches!(feed.load_more().await, Err(FeedError::Backfill(_))));
        assert_eq!(feed.messages(), before);
        assert_eq!(feed.phase(), FeedPhase::Live);

        let raised = drain_alerts(&mut alert_rx);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].level, AlertLevel::Notice);

        // The guard was released, so a retry goes through.
        assert_eq!(feed.load_more().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_live_update_replaces_head_and_keeps_tail() {
        let store = seeded(120);
        let (alerts, _rx) = Alerts::channel();
        let mut feed = subscribe(Arc::clone(&store), "g1", FeedOptions::default(), alerts).await;
        feed.wait_loaded().await.unwrap();
        feed.load_more().await.unwrap();

        append_text(&store, "fresh").await;
        wait_for_update(&mut feed).await;

        let messages = feed.messages();
        assert_eq!(messages.len(), 101);
        assert_eq!(messages[0].contents, "fresh");
        // "m70" slid out of the live window but stays in view.
        assert_eq!(messages[50].contents, "m70");
        assert!(is_ordered(&messages));

        let mut ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 101);
    }

    #[tokio::test]
    async fn test_page_multiple_policy_gives_up_off_boundary() {
        // Known gap of the modulus rule: one live arrival leaves 51 loaded
        // while 60 older messages still exist, and paging stops.
        let store = seeded(110);
        let (alerts, _rx) = Alerts::channel();
        let opts = options(50, PagingPolicy::PageMultiple);
        let mut feed = subscribe(Arc::clone(&store), "g1", opts, alerts).await;
        feed.wait_loaded().await.unwrap();

        append_text(&store, "fresh").await;
        wait_for_update(&mut feed).await;
        assert_eq!(feed.len(), 51);

        assert_eq!(feed.load_more().await.unwrap(), 0);
        assert_eq!(store.page_queries(), 0);
    }

    #[tokio::test]
    async fn test_page_multiple_policy_pulls_on_boundary() {
        let store = seeded(51);
        let (alerts, _rx) = Alerts::channel();
        let opts = options(50, PagingPolicy::PageMultiple);
        let mut feed = subscribe(Arc::clone(&store), "g1", opts, alerts).await;
        feed.wait_loaded().await.unwrap();

        assert_eq!(feed.len(), 50);
        assert_eq!(feed.load_more().await.unwrap(), 1);
        // 51 is off the boundary: no further pull.
        assert_eq!(feed.load_more().await.unwrap(), 0);
        assert_eq!(store.page_queries(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_policy_survives_live_arrivals() {
        let store = seeded(110);
        let (alerts, _rx) = Alerts::channel();
        let mut feed = subscribe(Arc::clone(&store), "g1", FeedOptions::default(), alerts).await;
        feed.wait_loaded().await.unwrap();

        append_text(&store, "fresh").await;
        wait_for_update(&mut feed).await;

        assert_eq!(feed.load_more().await.unwrap(), 50);
        assert_eq!(feed.load_more().await.unwrap(), 10);
        assert_eq!(feed.len(), 111);
    }

    #[tokio::test]
    async fn test_subscription_failure_raises_blocking_alert_once() {
        let store = seeded(5);
        let (alerts, mut alert_rx) = Alerts::channel();
        let mut feed = subscribe(Arc::clone(&store), "g1", FeedOptions::default(), alerts).await;
        feed.wait_loaded().await.unwrap();

        store.break_listeners("g1", "connection reset");
        let event = loop {
            match feed.next_event().await.unwrap() {
                FeedEvent::Stopped { reason } => break reason,
                _ => {}
            }
        };
        assert_eq!(event, StoreError::Unavailable("connection reset".to_string()));
        assert_eq!(feed.phase(), FeedPhase::Stopped);
        assert_eq!(feed.len(), 5);

        // No automatic re-subscribe: later appends are not reflected.
        append_text(&store, "unseen").await;
        tokio::task::yield_now().await;
        assert_eq!(feed.len(), 5);

        let raised = drain_alerts(&mut alert_rx);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].level, AlertLevel::Blocking);
    }

    #[tokio::test]
    async fn test_missing_group_stops_feed() {
        let store = seeded(0);
        let (alerts, mut alert_rx) = Alerts::channel();
        let mut feed = subscribe(store, "ghost", FeedOptions::default(), alerts).await;

        let err = feed.wait_loaded().await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("ghost".to_string()));
        assert_eq!(feed.phase(), FeedPhase::Stopped);
        assert_eq!(drain_alerts(&mut alert_rx).len(), 1);
    }

    #[tokio::test]
    async fn test_switch_group_closes_previous_channel_first() {
        let store = seeded(3);
        store.create_group(ChatGroup::new("g2", "Random", ""));
        let (alerts, _rx) = Alerts::channel();
        let mut feed = subscribe(Arc::clone(&store), "g1", FeedOptions::default(), alerts).await;
        feed.wait_loaded().await.unwrap();
        assert_eq!(store.open_listeners(), 1);

        feed.switch_group("g2").await;
        assert_eq!(store.open_listeners(), 1);
        assert_eq!(feed.group_id(), "g2");
        assert_eq!(feed.wait_loaded().await.unwrap(), 0);
        assert!(feed.is_empty());

        // Appends to the old group no longer reach this view.
        append_text(&store, "old group").await;
        tokio::task::yield_now().await;
        assert!(feed.is_empty());

        feed.close().await;
        assert_eq!(store.open_listeners(), 0);
    }

    #[tokio::test]
    async fn test_feed_is_an_event_stream() {
        let store = seeded(2);
        let (alerts, _rx) = Alerts::channel();
        let mut feed = subscribe(Arc::clone(&store), "g1", FeedOptions::default(), alerts).await;

        assert_eq!(feed.next().await, Some(FeedEvent::Loaded { count: 2 }));
        append_text(&store, "third").await;
        assert_eq!(feed.next().await, Some(FeedEvent::LiveUpdated { count: 3 }));
    }

    #[tokio::test]
    async fn test_dropping_feed_releases_channel() {
        let store = seeded(2);
        let (alerts, _rx) = Alerts::channel();
        let mut feed = subscribe(Arc::clone(&store), "g1", FeedOptions::default(), alerts).await;
        feed.wait_loaded().await.unwrap();

        drop(feed);
        for _ in 0..50 {
            if store.open_listeners() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.open_listeners(), 0);
    }

    #[tokio::test]
    async fn test_unread_events_are_capped_and_stop_still_arrives() {
        let store = seeded(0);
        let (alerts, _rx) = Alerts::channel();
        let mut feed = subscribe(
            Arc::clone(&store),
            "g1",
            options(1000, PagingPolicy::Exhaustion),
            alerts,
        )
        .await;
        assert_eq!(feed.wait_loaded().await.unwrap(), 0);

        let total = EVENT_BACKLOG * 2;
        for i in 0..total {
            append_text(&store, &format!("burst {}", i)).await;
        }
        store.break_listeners("g1", "connection reset");

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while feed.phase() != FeedPhase::Stopped {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(feed.len(), total);

        let mut queued = Vec::new();
        while let Ok(event) = feed.events_rx.try_recv() {
            queued.push(event);
        }
        assert!(queued.len() <= EVENT_BACKLOG);
        assert_eq!(
            queued.last(),
            Some(&FeedEvent::Stopped {
                reason: StoreError::Unavailable("connection reset".to_string())
            })
        );
    }
}
