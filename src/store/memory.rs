//! In-process backend
//!
//! Keeps groups, messages and blobs in memory, assigns strictly increasing
//! server timestamps, and pushes a full window to every live query whenever
//! its group changes. Used by the `demo` command and as the test backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::{BlobStore, DocumentStore, SnapshotResult, StoreError, Subscription};
use crate::functions::GroupRecency;
use crate::models::{self, ChatGroup, Message, NewMessage};

/// Capacity of the change fan-out. Lagging listeners just re-read their window.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A backend call that the next invocation should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOp {
    Page,
    Append,
    Upload,
}

/// Emitted after every client append, for server-side triggers.
#[derive(Debug, Clone)]
pub struct CreatedEvent {
    pub group_id: String,
    pub message: Message,
}

#[derive(Debug, Clone)]
enum Change {
    Appended(String),
    Broken { group_id: String, reason: String },
}

struct GroupDoc {
    group: ChatGroup,
    /// Arrival order.
    messages: Vec<Message>,
}

#[derive(Default)]
struct Data {
    groups: BTreeMap<String, GroupDoc>,
    blobs: HashMap<String, Vec<u8>>,
    last_timestamp: Option<DateTime<Utc>>,
    failures: Vec<FailOp>,
}

impl Data {
    /// Server clock: wall time, bumped so consecutive writes never tie.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::milliseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    fn take_failure(&mut self, op: FailOp) -> bool {
        match self.failures.iter().position(|f| *f == op) {
            Some(pos) => {
                self.failures.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Messages newest first; equal timestamps keep arrival order.
    fn ordered(&self, group_id: &str) -> Result<Vec<Message>, StoreError> {
        let doc = self
            .groups
            .get(group_id)
            .ok_or_else(|| StoreError::NotFound(group_id.to_string()))?;
        let mut messages = doc.messages.clone();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }
}

struct Inner {
    data: Mutex<Data>,
    changes: broadcast::Sender<Change>,
    created: broadcast::Sender<CreatedEvent>,
    page_queries: AtomicUsize,
    open_listeners: AtomicUsize,
}

/// Cheaply cloneable handle to one in-memory backend.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (created, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                data: Mutex::new(Data::default()),
                changes,
                created,
                page_queries: AtomicUsize::new(0),
                open_listeners: AtomicUsize::new(0),
            }),
        }
    }

    fn data(&self) -> MutexGuard<'_, Data> {
        self.inner.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, change: Change) {
        // No receivers just means nobody is listening.
        let _ = self.inner.changes.send(change);
    }

    /// Create (or replace) a group. Groups are created out of band.
    pub fn create_group(&self, group: ChatGroup) {
        let id = group.id.clone();
        self.data().groups.insert(
            id,
            GroupDoc {
                group,
                messages: Vec::new(),
            },
        );
    }

    /// Insert a message with an explicit timestamp, bypassing the server
    /// clock and triggers. Seeds history for demos and tests.
    pub fn insert_at(
        &self,
        group_id: &str,
        message: NewMessage,
        created_at: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        {
            let mut data = self.data();
            let doc = data
                .groups
                .get_mut(group_id)
                .ok_or_else(|| StoreError::NotFound(group_id.to_string()))?;
            doc.messages.push(message.into_message(id.clone(), created_at));
        }
        self.notify(Change::Appended(group_id.to_string()));
        Ok(id)
    }

    /// Make the next call of the given kind fail with `Unavailable`.
    pub fn fail_next(&self, op: FailOp) {
        self.data().failures.push(op);
    }

    /// Terminate every live query on a group with an error.
    pub fn break_listeners(&self, group_id: &str, reason: &str) {
        self.notify(Change::Broken {
            group_id: group_id.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Receive every message appended through `DocumentStore::append`.
    pub fn subscribe_created(&self) -> broadcast::Receiver<CreatedEvent> {
        self.inner.created.subscribe()
    }

    /// Number of one-shot page queries served so far.
    pub fn page_queries(&self) -> usize {
        self.inner.page_queries.load(Ordering::SeqCst)
    }

    /// Number of live-query channels currently open.
    pub fn open_listeners(&self) -> usize {
        self.inner.open_listeners.load(Ordering::SeqCst)
    }

    pub fn message_count(&self, group_id: &str) -> usize {
        self.data()
            .groups
            .get(group_id)
            .map_or(0, |doc| doc.messages.len())
    }

    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.data().blobs.get(path).cloned()
    }

    pub fn group(&self, group_id: &str) -> Option<ChatGroup> {
        self.data().groups.get(group_id).map(|doc| doc.group.clone())
    }

    fn window(&self, group_id: &str, limit: usize) -> SnapshotResult {
        let mut messages = self.data().ordered(group_id)?;
        messages.truncate(limit);
        Ok(messages)
    }
}

/// Decrements the open-listener count when a listener task ends or is aborted.
struct OpenListener(Arc<Inner>);

impl OpenListener {
    fn register(inner: Arc<Inner>) -> Self {
        inner.open_listeners.fetch_add(1, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for OpenListener {
    fn drop(&mut self) {
        self.0.open_listeners.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Push the current window; false once the listener should stop.
fn deliver(
    store: &MemoryStore,
    group_id: &str,
    limit: usize,
    tx: &mpsc::UnboundedSender<SnapshotResult>,
) -> bool {
    let snapshot = store.window(group_id, limit);
    let failed = snapshot.is_err();
    tx.send(snapshot).is_ok() && !failed
}

impl DocumentStore for MemoryStore {
    async fn list_groups(&self) -> Result<Vec<ChatGroup>, StoreError> {
        tokio::task::yield_now().await;
        let mut groups: Vec<ChatGroup> = self
            .data()
            .groups
            .values()
            .map(|doc| doc.group.clone())
            .collect();
        models::sort_by_recency(&mut groups);
        Ok(groups)
    }

    async fn listen(&self, group_id: &str, limit: usize) -> Result<Subscription, StoreError> {
        tokio::task::yield_now().await;

        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        // Subscribe before the first read so no append slips between them.
        let mut changes = self.inner.changes.subscribe();
        let open = OpenListener::register(Arc::clone(&self.inner));
        let store = self.clone();
        let group_id = group_id.to_string();

        tracing::debug!("Memory listener opened on {} (limit {})", group_id, limit);

        let task = tokio::spawn(async move {
            let _open = open;
            if !deliver(&store, &group_id, limit, &tx) {
                return;
            }
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    change = changes.recv() => match change {
                        Ok(Change::Appended(g)) if g == group_id => {
                            if !deliver(&store, &group_id, limit, &tx) {
                                break;
                            }
                        }
                        Ok(Change::Broken { group_id: g, reason }) if g == group_id => {
                            let _ = tx.send(Err(StoreError::Unavailable(reason)));
                            break;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            if !deliver(&store, &group_id, limit, &tx) {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            tracing::debug!("Memory listener on {} closed", group_id);
        });

        Ok(Subscription::new(rx, cancel_tx, task))
    }

    async fn query_page(
        &self,
        group_id: &str,
        limit: usize,
        start_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, StoreError> {
        self.inner.page_queries.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let mut data = self.data();
        if data.take_failure(FailOp::Page) {
            return Err(StoreError::Unavailable("page query failed".to_string()));
        }
        let page = data
            .ordered(group_id)?
            .into_iter()
            .filter(|m| match (start_after, m.created_at) {
                (None, _) => true,
                (Some(cursor), Some(t)) => t < cursor,
                (Some(_), None) => false,
            })
            .take(limit)
            .collect();
        Ok(page)
    }

    async fn append(&self, group_id: &str, message: &NewMessage) -> Result<String, StoreError> {
        tokio::task::yield_now().await;

        let id = uuid::Uuid::new_v4().to_string();
        let stored = {
            let mut data = self.data();
            if data.take_failure(FailOp::Append) {
                return Err(StoreError::Unavailable("append failed".to_string()));
            }
            if !data.groups.contains_key(group_id) {
                return Err(StoreError::NotFound(group_id.to_string()));
            }
            let created_at = data.next_timestamp();
            let stored = message.clone().into_message(id.clone(), created_at);
            if let Some(doc) = data.groups.get_mut(group_id) {
                doc.messages.push(stored.clone());
            }
            stored
        };

        tracing::debug!("Memory append {} to {}", id, group_id);
        self.notify(Change::Appended(group_id.to_string()));
        let _ = self.inner.created.send(CreatedEvent {
            group_id: group_id.to_string(),
            message: stored,
        });
        Ok(id)
    }
}

impl BlobStore for MemoryStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        tokio::task::yield_now().await;

        let mut data = self.data();
        if data.take_failure(FailOp::Upload) {
            return Err(StoreError::Unavailable("upload failed".to_string()));
        }
        tracing::debug!("Memory upload {} ({} bytes, {})", path, bytes.len(), content_type);
        data.blobs.insert(path.to_string(), bytes);
        Ok(format!("memory://blobs/{}", path))
    }
}

impl GroupRecency for MemoryStore {
    async fn record_last_message(&self, group_id: &str) -> Result<DateTime<Utc>, StoreError> {
        tokio::task::yield_now().await;

        let mut data = self.data();
        let at = data.next_timestamp();
        let doc = data
            .groups
            .get_mut(group_id)
            .ok_or_else(|| StoreError::NotFound(group_id.to_string()))?;
        doc.group.last_message_at = Some(at);
        Ok(at)
    }
}
