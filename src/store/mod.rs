//! Backend seam: document store, blob store and live-query subscriptions
//!
//! The feed, composer and CLI only talk to the backend through the traits in
//! this module. `RestStore` speaks to a remote backend over HTTP and
//! WebSocket; `MemoryStore` is an in-process backend used by `demo` and tests.

mod listen;
pub mod memory;
pub mod rest;

use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::models::{ChatGroup, Message, NewMessage};

pub use memory::MemoryStore;
pub use rest::RestStore;

/// Errors reported by a backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("group {0} not found")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

/// One full-window delivery from a live query, or the error that ended it.
pub type SnapshotResult = Result<Vec<Message>, StoreError>;

/// Document store contract.
///
/// Message queries are ordered by `createdAt` descending.
pub trait DocumentStore: Send + Sync + 'static {
    /// All groups, most recently active first.
    fn list_groups(&self) -> impl Future<Output = Result<Vec<ChatGroup>, StoreError>> + Send;

    /// Open a live query over the newest `limit` messages of a group.
    ///
    /// Every change is delivered as a full replacement of the window. A
    /// missing group is reported through the subscription, not here.
    fn listen(
        &self,
        group_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;

    /// One-shot page of up to `limit` messages strictly older than
    /// `start_after` (or the newest page when `None`).
    fn query_page(
        &self,
        group_id: &str,
        limit: usize,
        start_after: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send;

    /// Create a message; returns the id assigned by the backend.
    fn append(
        &self,
        group_id: &str,
        message: &NewMessage,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;
}

/// Blob store contract.
pub trait BlobStore: Send + Sync + 'static {
    /// Upload bytes under `path`; returns a publicly resolvable URL.
    fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;
}

/// An open live query.
#[derive(Debug)]
pub struct Subscription {
    pub snapshots: mpsc::UnboundedReceiver<SnapshotResult>,
    pub guard: ListenGuard,
}

impl Subscription {
    /// Build a subscription from the delivery channel and the task feeding it.
    pub fn new(
        snapshots: mpsc::UnboundedReceiver<SnapshotResult>,
        cancel: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            snapshots,
            guard: ListenGuard {
                cancel: Some(cancel),
                task: Some(task),
            },
        }
    }

    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<SnapshotResult>, ListenGuard) {
        (self.snapshots, self.guard)
    }
}

/// Owns the channel behind a live query and closes it exactly once.
#[derive(Debug)]
pub struct ListenGuard {
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ListenGuard {
    /// Close the channel and wait for the feeding task to finish.
    pub async fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!("Live query task ended abnormally: {}", e);
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_none()
    }
}

impl Drop for ListenGuard {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}
