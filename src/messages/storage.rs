//! Persistent store port and its in-memory implementation
//!
//! The store owns ids and creation timestamps. Live queries are modelled as a
//! channel of full snapshots for one scope; a snapshot is pushed on subscribe
//! and after every change touching that scope.

use super::types::{newest_first, FeedbackMessage, MessageId, MessageScope, NewMessage, ReadStatus};
use crate::{FeedbackError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// One delivery on a live query: the full ordered list, or a transport failure
pub type Snapshot = Result<Vec<FeedbackMessage>>;
pub type SnapshotReceiver = UnboundedReceiver<Snapshot>;

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Persist a message atomically, assigning its id and creation time
    async fn create(&self, message: NewMessage) -> Result<MessageId>;

    async fn get(&self, chantier_id: &str, id: MessageId) -> Result<Option<FeedbackMessage>>;

    /// Append `user_id` to the read set; returns false if the message is gone
    async fn mark_read(&self, chantier_id: &str, id: MessageId, user_id: &str) -> Result<bool>;

    /// Remove a message; returns false if it was already absent
    async fn delete(&self, chantier_id: &str, id: MessageId) -> Result<bool>;

    /// Open a live query ordered newest first
    fn watch(&self, scope: &MessageScope) -> SnapshotReceiver;
}

struct Watcher {
    scope: MessageScope,
    tx: UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct StoreInner {
    messages: Vec<FeedbackMessage>,
    watchers: Vec<Watcher>,
    offline: bool,
    last_created_at: Option<DateTime<Utc>>,
}

impl StoreInner {
    fn snapshot(&self, scope: &MessageScope) -> Vec<FeedbackMessage> {
        let mut list: Vec<FeedbackMessage> = self
            .messages
            .iter()
            .filter(|m| scope.contains(m))
            .cloned()
            .collect();
        list.sort_by(newest_first);
        list
    }

    fn notify(&mut self, changed: &MessageScope) {
        self.watchers.retain(|w| !w.tx.is_closed());
        for watcher in &self.watchers {
            if &watcher.scope == changed {
                let _ = watcher.tx.send(Ok(self.snapshot(&watcher.scope)));
            }
        }
    }

    fn notify_all(&mut self, snapshot_or_error: impl Fn(&Self, &MessageScope) -> Snapshot) {
        self.watchers.retain(|w| !w.tx.is_closed());
        for watcher in &self.watchers {
            let _ = watcher.tx.send(snapshot_or_error(self, &watcher.scope));
        }
    }

    /// Creation times are strictly increasing so commit order is preserved
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created_at = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline {
            Err(FeedbackError::TransportUnavailable("store is offline".into()))
        } else {
            Ok(())
        }
    }
}

/// In-memory store with live queries and an offline switch for fault injection
#[derive(Clone, Default)]
pub struct MemoryFeedbackStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record with an explicit creation time (imports, fixtures)
    pub fn insert_at(&self, message: NewMessage, created_at: DateTime<Utc>) -> MessageId {
        let id = MessageId::new();
        let scope = message.scope.clone();
        let mut inner = self.inner.write();
        inner.messages.push(message.into_message(id, created_at));
        inner.notify(&scope);
        id
    }

    /// Toggle transport failure; watchers see an error while offline and a
    /// fresh snapshot when connectivity returns.
    pub fn set_offline(&self, offline: bool) {
        let mut inner = self.inner.write();
        if inner.offline == offline {
            return;
        }
        inner.offline = offline;
        info!("Memory store is now {}", if offline { "offline" } else { "online" });
        if offline {
            inner.notify_all(|_, _| {
                Err(FeedbackError::TransportUnavailable("connection lost".into()))
            });
        } else {
            inner.notify_all(|inner, scope| Ok(inner.snapshot(scope)));
        }
    }

    pub fn get_all(&self) -> Vec<FeedbackMessage> {
        self.inner.read().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().messages.is_empty()
    }

    pub fn watcher_count(&self) -> usize {
        let mut inner = self.inner.write();
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.len()
    }
}

#[async_trait]
impl FeedbackStore for MemoryFeedbackStore {
    async fn create(&self, message: NewMessage) -> Result<MessageId> {
        message.body.validate()?;
        let mut inner = self.inner.write();
        inner.ensure_online()?;

        let id = MessageId::new();
        let created_at = inner.next_created_at();
        let scope = message.scope.clone();
        inner.messages.push(message.into_message(id, created_at));
        debug!("Created message {} in {}", id, scope);
        inner.notify(&scope);
        Ok(id)
    }

    async fn get(&self, chantier_id: &str, id: MessageId) -> Result<Option<FeedbackMessage>> {
        let inner = self.inner.read();
        inner.ensure_online()?;
        Ok(inner
            .messages
            .iter()
            .find(|m| m.id == id && m.chantier_id == chantier_id)
            .cloned())
    }

    async fn mark_read(&self, chantier_id: &str, id: MessageId, user_id: &str) -> Result<bool> {
        let mut inner = self.inner.write();
        inner.ensure_online()?;

        let Some(message) = inner
            .messages
            .iter_mut()
            .find(|m| m.id == id && m.chantier_id == chantier_id)
        else {
            return Ok(false);
        };

        let changed = message.read_by.insert(user_id.to_string())
            || message.status != ReadStatus::Read;
        message.status = ReadStatus::Read;
        let scope = message.scope();
        if changed {
            inner.notify(&scope);
        }
        Ok(true)
    }

    async fn delete(&self, chantier_id: &str, id: MessageId) -> Result<bool> {
        let mut inner = self.inner.write();
        inner.ensure_online()?;

        let Some(pos) = inner
            .messages
            .iter()
            .position(|m| m.id == id && m.chantier_id == chantier_id)
        else {
            return Ok(false);
        };

        let removed = inner.messages.remove(pos);
        debug!("Deleted message {} from {}", id, removed.scope());
        inner.notify(&removed.scope());
        Ok(true)
    }

    fn watch(&self, scope: &MessageScope) -> SnapshotReceiver {
        let (tx, rx) = unbounded_channel();
        let mut inner = self.inner.write();
        let first = if inner.offline {
            Err(FeedbackError::TransportUnavailable("store is offline".into()))
        } else {
            Ok(inner.snapshot(scope))
        };
        let _ = tx.send(first);
        inner.watchers.push(Watcher {
            scope: scope.clone(),
            tx,
        });
        rx
    }
}
