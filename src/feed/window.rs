//! Ordered, de-duplicated message list behind a feed.
//!
//! The head holds the latest live window; older pages are appended behind it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::Message;

#[derive(Debug, Default, Clone)]
pub struct MessageWindow {
    /// Newest first.
    messages: Vec<Message>,
    /// How many leading entries came from the last live snapshot.
    live_len: usize,
}

impl MessageWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn live_len(&self) -> usize {
        self.live_len
    }

    /// Replace the live head with a fresh snapshot.
    ///
    /// Everything already loaded that the snapshot does not carry stays,
    /// directly behind the new head and in its previous order. That covers
    /// backfilled pages as well as messages that just slid out of the
    /// bounded live window.
    pub fn replace_live(&mut self, snapshot: Vec<Message>) {
        let mut seen: HashSet<String> = HashSet::with_capacity(snapshot.len());
        let mut merged = Vec::with_capacity(snapshot.len().max(self.messages.len()));

        for message in snapshot {
            if seen.insert(message.id.clone()) {
                merged.push(message);
            }
        }
        self.live_len = merged.len();

        for message in self.messages.drain(..) {
            if seen.insert(message.id.clone()) {
                merged.push(message);
            }
        }
        self.messages = merged;
    }

    /// `createdAt` of the oldest acknowledged message, used as the pull cursor.
    pub fn backfill_cursor(&self) -> Option<DateTime<Utc>> {
        self.messages.iter().rev().find_map(|m| m.created_at)
    }

    /// Append the part of `page` that is strictly older than `cursor` and not
    /// already present. Returns how many messages were added.
    pub fn append_older(&mut self, page: Vec<Message>, cursor: DateTime<Utc>) -> usize {
        let mut seen: HashSet<String> = self.messages.iter().map(|m| m.id.clone()).collect();
        let before = self.messages.len();

        for message in page {
            let older = matches!(message.created_at, Some(t) if t < cursor);
            if older && seen.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
        self.messages.len() - before
    }
}
