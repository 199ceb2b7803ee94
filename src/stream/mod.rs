//! Live, scoped, ordered view of a phase's feedback messages
//!
//! A subscription binds one scope to a callback. Every snapshot coming out of
//! the store is re-filtered to the exact scope and re-sorted newest first
//! before the callback sees it. Transport errors never reach the callback:
//! the last good list stays in place, the failure is logged and reflected in
//! [`StreamHealth`].

use crate::messages::{newest_first, FeedbackMessage, FeedbackStore, MessageScope};
use crate::utils::ViewLifetime;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connection state of a subscription as last observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamHealth {
    Live,
    Degraded(String),
}

pub struct MessageStream {
    store: Arc<dyn FeedbackStore>,
    lifetime: ViewLifetime,
}

impl MessageStream {
    pub fn new(store: Arc<dyn FeedbackStore>, lifetime: ViewLifetime) -> Self {
        Self { store, lifetime }
    }

    /// Start delivering ordered snapshots of `scope` to `on_update`.
    ///
    /// Must be called from within a tokio runtime. The callback runs on the
    /// subscription task and is never invoked after the handle is
    /// unsubscribed or the view is torn down.
    pub fn subscribe<F>(&self, scope: MessageScope, mut on_update: F) -> SubscriptionHandle
    where
        F: FnMut(&[FeedbackMessage]) + Send + 'static,
    {
        let mut rx = self.store.watch(&scope);
        let active = Arc::new(AtomicBool::new(true));
        let health = Arc::new(RwLock::new(StreamHealth::Live));
        let latest = Arc::new(RwLock::new(Vec::new()));

        let task = {
            let active = Arc::clone(&active);
            let health = Arc::clone(&health);
            let latest = Arc::clone(&latest);
            let lifetime = self.lifetime.clone();
            let scope = scope.clone();

            tokio::spawn(async move {
                info!("Subscribed to feedback for {}", scope);
                while let Some(snapshot) = rx.recv().await {
                    if !active.load(Ordering::SeqCst) || !lifetime.is_mounted() {
                        break;
                    }
                    match snapshot {
                        Ok(messages) => {
                            let list = scoped_newest_first(&scope, messages);
                            debug!("Delivering {} messages for {}", list.len(), scope);
                            *health.write() = StreamHealth::Live;
                            *latest.write() = list.clone();
                            on_update(&list);
                        }
                        Err(e) => {
                            warn!("Feedback stream for {} failed, keeping last list: {}", scope, e);
                            *health.write() = StreamHealth::Degraded(e.to_string());
                        }
                    }
                }
                debug!("Subscription task for {} finished", scope);
            })
        };

        SubscriptionHandle {
            scope,
            active,
            health,
            latest,
            task: Some(task),
        }
    }
}

/// Keep only exact-scope members, newest first with id tie-break
pub fn scoped_newest_first(
    scope: &MessageScope,
    messages: Vec<FeedbackMessage>,
) -> Vec<FeedbackMessage> {
    let mut list: Vec<FeedbackMessage> =
        messages.into_iter().filter(|m| scope.contains(m)).collect();
    list.sort_by(newest_first);
    list
}

/// Owner of a live subscription; dropping it unsubscribes
pub struct SubscriptionHandle {
    scope: MessageScope,
    active: Arc<AtomicBool>,
    health: Arc<RwLock<StreamHealth>>,
    latest: Arc<RwLock<Vec<FeedbackMessage>>>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Stop deliveries. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        info!("Unsubscribed from feedback for {}", self.scope);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn scope(&self) -> &MessageScope {
        &self.scope
    }

    pub fn health(&self) -> StreamHealth {
        self.health.read().clone()
    }

    /// Last list delivered to the callback
    pub fn latest(&self) -> Vec<FeedbackMessage> {
        self.latest.read().clone()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MemoryFeedbackStore, MessageBody, NewMessage};
    use std::time::Duration;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn text(scope: &MessageScope, body: &str) -> NewMessage {
        NewMessage::new(scope.clone(), "alice", MessageBody::text(body).unwrap())
    }

    fn collect(
        stream: &MessageStream,
        scope: MessageScope,
    ) -> (SubscriptionHandle, UnboundedReceiver<Vec<FeedbackMessage>>) {
        let (tx, rx) = unbounded_channel();
        let handle = stream.subscribe(scope, move |list| {
            let _ = tx.send(list.to_vec());
        });
        (handle, rx)
    }

    #[tokio::test]
    async fn test_initial_snapshot_is_delivered() {
        let store = MemoryFeedbackStore::new();
        let scope = MessageScope::phase("c1", "p1");
        store.create(text(&scope, "existing")).await.unwrap();

        let stream = MessageStream::new(Arc::new(store), ViewLifetime::new());
        let (_handle, mut rx) = collect(&stream, scope);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn test_error_keeps_last_list_and_degrades_health() {
        let store = MemoryFeedbackStore::new();
        let scope = MessageScope::phase("c1", "p1");
        store.create(text(&scope, "kept")).await.unwrap();

        let stream = MessageStream::new(Arc::new(store.clone()), ViewLifetime::new());
        let (handle, mut rx) = collect(&stream, scope);
        assert_eq!(rx.recv().await.unwrap().len(), 1);

        store.set_offline(true);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(rx.try_recv().is_err(), "errors must not reach the callback");
        assert!(matches!(handle.health(), StreamHealth::Degraded(_)));
        assert_eq!(handle.latest().len(), 1);

        store.set_offline(false);
        assert_eq!(rx.recv().await.unwrap().len(), 1);
        assert_eq!(handle.health(), StreamHealth::Live);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_stops_updates() {
        let store = MemoryFeedbackStore::new();
        let scope = MessageScope::phase("c1", "p1");
        let stream = MessageStream::new(Arc::new(store.clone()), ViewLifetime::new());
        let (mut handle, mut rx) = collect(&stream, scope.clone());
        let _ = rx.recv().await;

        handle.unsubscribe();
        handle.unsubscribe();
        assert!(!handle.is_active());

        store.create(text(&scope, "after")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_teardown_drops_late_updates() {
        let store = MemoryFeedbackStore::new();
        let scope = MessageScope::phase("c1", "p1");
        let lifetime = ViewLifetime::new();
        let stream = MessageStream::new(Arc::new(store.clone()), lifetime.clone());
        let (_handle, mut rx) = collect(&stream, scope.clone());
        let _ = rx.recv().await;

        lifetime.teardown();
        store.create(text(&scope, "late")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }
}
