//! End-to-end tests for the feedback subsystem
//!
//! These tests wire a full view against the in-memory collaborators and
//! check the user-visible contracts: ordering and scoping of the feed, the
//! optimistic text path, voice notes, single-slot playback and deletion.

use async_trait::async_trait;
use chantier_feedback::audio::{SimulatedCaptureEngine, SimulatedPlaybackEngine};
use chantier_feedback::deletion::{Answered, DeleteOutcome};
use chantier_feedback::integration::FeedbackView;
use chantier_feedback::messages::{
    FeedbackMessage, FeedbackStore, MemoryFeedbackStore, MessageBody, MessageId, MessageScope,
    NewMessage, SnapshotReceiver,
};
use chantier_feedback::playback::PlayOutcome;
use chantier_feedback::session::StaticSession;
use chantier_feedback::stream::SubscriptionHandle;
use chantier_feedback::upload::{BlobStore, MemoryBlobStore};
use chantier_feedback::utils::FeedbackNotice;
use chantier_feedback::{FeedbackError, Result};
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::Notify;

/// Store whose `create` waits for the test to open the gate
struct GatedStore {
    inner: MemoryFeedbackStore,
    gate: Notify,
    fail: AtomicBool,
}

impl GatedStore {
    fn new(inner: MemoryFeedbackStore) -> Self {
        Self {
            inner,
            gate: Notify::new(),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl FeedbackStore for GatedStore {
    async fn create(&self, message: NewMessage) -> Result<MessageId> {
        self.gate.notified().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(FeedbackError::TransportUnavailable("gate closed".into()));
        }
        self.inner.create(message).await
    }

    async fn get(&self, chantier_id: &str, id: MessageId) -> Result<Option<FeedbackMessage>> {
        self.inner.get(chantier_id, id).await
    }

    async fn mark_read(&self, chantier_id: &str, id: MessageId, user_id: &str) -> Result<bool> {
        self.inner.mark_read(chantier_id, id, user_id).await
    }

    async fn delete(&self, chantier_id: &str, id: MessageId) -> Result<bool> {
        self.inner.delete(chantier_id, id).await
    }

    fn watch(&self, scope: &MessageScope) -> SnapshotReceiver {
        self.inner.watch(scope)
    }
}

/// Blob store whose `write` waits for the test to open the gate
struct GatedBlobs {
    inner: MemoryBlobStore,
    gate: Notify,
}

#[async_trait]
impl BlobStore for GatedBlobs {
    async fn write(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        self.gate.notified().await;
        self.inner.write(path, bytes).await
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.inner.delete(url).await
    }
}

struct Harness {
    store: MemoryFeedbackStore,
    blobs: MemoryBlobStore,
    capture: Arc<SimulatedCaptureEngine>,
    player: SimulatedPlaybackEngine,
    session: Arc<StaticSession>,
}

impl Harness {
    fn new(user: &str) -> Self {
        Self {
            store: MemoryFeedbackStore::new(),
            blobs: MemoryBlobStore::new("https://storage.test"),
            capture: Arc::new(SimulatedCaptureEngine::new(
                std::env::temp_dir().join("chantier-feedback-flow-tests"),
                8000,
            )),
            player: SimulatedPlaybackEngine::new(),
            session: Arc::new(StaticSession::signed_in(user)),
        }
    }

    fn view_with(
        &self,
        scope: MessageScope,
        store: Arc<dyn FeedbackStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> FeedbackView {
        FeedbackView::builder(scope)
            .with_store(store)
            .with_blobs(blobs)
            .with_session(self.session.clone())
            .with_capture_engine(self.capture.clone())
            .with_playback_engine(Arc::new(self.player.clone()))
            .build()
            .expect("view should build")
    }

    fn view(&self, scope: MessageScope) -> FeedbackView {
        self.view_with(
            scope,
            Arc::new(self.store.clone()),
            Arc::new(self.blobs.clone()),
        )
    }
}

fn feed(view: &FeedbackView) -> (SubscriptionHandle, UnboundedReceiver<Vec<FeedbackMessage>>) {
    let (tx, rx) = unbounded_channel();
    let handle = view.subscribe(move |list| {
        let _ = tx.send(list.to_vec());
    });
    (handle, rx)
}

fn text(scope: &MessageScope, author: &str, body: &str) -> NewMessage {
    NewMessage::new(scope.clone(), author, MessageBody::text(body).unwrap())
}

#[tokio::test]
async fn test_feed_is_newest_first() {
    let harness = Harness::new("alice");
    let scope = MessageScope::phase("c1", "p1");
    let t = |secs: i64| Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
    harness.store.insert_at(text(&scope, "bob", "t2"), t(2));
    harness.store.insert_at(text(&scope, "bob", "t1"), t(1));
    harness.store.insert_at(text(&scope, "bob", "t3"), t(3));

    let view = harness.view(scope);
    let (_handle, mut rx) = feed(&view);

    let bodies: Vec<String> = rx
        .recv()
        .await
        .unwrap()
        .into_iter()
        .map(|m| match m.body {
            MessageBody::Text { body } => body,
            MessageBody::Voice { .. } => unreachable!(),
        })
        .collect();
    assert_eq!(bodies, vec!["t3", "t2", "t1"]);
}

#[tokio::test]
async fn test_phase_and_step_feeds_are_disjoint() {
    let harness = Harness::new("alice");
    let phase = MessageScope::phase("c1", "p1");
    let step = MessageScope::step("c1", "p1", "s1");
    harness.store.create(text(&phase, "bob", "phase note")).await.unwrap();
    harness.store.create(text(&step, "bob", "step note")).await.unwrap();
    harness
        .store
        .create(text(&MessageScope::step("c1", "p1", "s2"), "bob", "other step"))
        .await
        .unwrap();

    let phase_view = harness.view(phase);
    let step_view = harness.view(step);
    let (_a, mut phase_rx) = feed(&phase_view);
    let (_b, mut step_rx) = feed(&step_view);

    let phase_list = phase_rx.recv().await.unwrap();
    let step_list = step_rx.recv().await.unwrap();

    assert_eq!(phase_list.len(), 1);
    assert!(phase_list.iter().all(|m| m.step_id.is_none()));
    assert_eq!(step_list.len(), 1);
    assert!(step_list.iter().all(|m| m.step_id.as_deref() == Some("s1")));
}

#[tokio::test]
async fn test_sent_text_arrives_only_through_stream() {
    let harness = Harness::new("alice");
    let view = harness.view(MessageScope::phase("c1", "p1"));
    let (_handle, mut rx) = feed(&view);
    assert!(rx.recv().await.unwrap().is_empty());

    view.composer().set_draft("Bonjour");
    let id = view.composer().send_text().await.unwrap().unwrap();

    let list = rx.recv().await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, id);
    assert_eq!(list[0].author_id, "alice");
}

#[tokio::test]
async fn test_draft_cleared_before_store_confirms() {
    let harness = Harness::new("alice");
    let gated = Arc::new(GatedStore::new(harness.store.clone()));
    let view = harness.view_with(
        MessageScope::phase("c1", "p1"),
        gated.clone(),
        Arc::new(harness.blobs.clone()),
    );
    view.composer().set_draft("Bonjour");

    let (sent, _) = tokio::join!(view.composer().send_text(), async {
        tokio::task::yield_now().await;
        assert_eq!(view.composer().draft(), "", "draft must clear on issue");
        gated.gate.notify_one();
    });

    assert!(sent.unwrap().is_some());
    assert_eq!(view.composer().draft(), "");
}

#[tokio::test]
async fn test_failed_send_restores_bonjour() {
    let harness = Harness::new("alice");
    harness.store.set_offline(true);
    let view = harness.view(MessageScope::phase("c1", "p1"));
    view.composer().set_draft("Bonjour");

    let err = view.composer().send_text().await.unwrap_err();

    assert!(matches!(err, FeedbackError::SendFailed(_)));
    assert_eq!(view.composer().draft(), "Bonjour");
    assert!(harness.store.is_empty());
    let notice = view.notices().try_recv().unwrap();
    assert!(notice.requires_acknowledgement());
}

#[tokio::test]
async fn test_late_failure_after_teardown_is_dropped() {
    let harness = Harness::new("alice");
    let gated = Arc::new(GatedStore::new(harness.store.clone()));
    gated.fail.store(true, Ordering::SeqCst);
    let view = harness.view_with(
        MessageScope::phase("c1", "p1"),
        gated.clone(),
        Arc::new(harness.blobs.clone()),
    );
    view.composer().set_draft("Bonjour");

    let (sent, _) = tokio::join!(view.composer().send_text(), async {
        tokio::task::yield_now().await;
        view.teardown().await;
        gated.gate.notify_one();
    });

    assert!(sent.is_err());
    assert_eq!(view.composer().draft(), "");
    assert!(view.notices().try_recv().is_none());
}

#[tokio::test]
async fn test_voice_note_is_persisted_with_positive_duration() {
    let harness = Harness::new("alice");
    let view = harness.view(MessageScope::step("c1", "p1", "s1"));

    view.composer().press_to_record().await.unwrap();
    let id = view.composer().release_to_send().await.unwrap().unwrap();

    let message = harness.store.get("c1", id).await.unwrap().unwrap();
    assert_eq!(message.step_id.as_deref(), Some("s1"));
    match message.body {
        MessageBody::Voice {
            url,
            duration_seconds,
        } => {
            assert!(duration_seconds > 0.0);
            assert!(harness.blobs.contains_url(&url));
            assert!(url.starts_with("https://storage.test/feedback/c1/"));
        }
        MessageBody::Text { .. } => panic!("expected a voice message"),
    }
}

#[tokio::test]
async fn test_recording_suppressed_while_uploading() {
    let harness = Harness::new("alice");
    let gated = Arc::new(GatedBlobs {
        inner: harness.blobs.clone(),
        gate: Notify::new(),
    });
    let view = harness.view_with(
        MessageScope::phase("c1", "p1"),
        Arc::new(harness.store.clone()),
        gated.clone(),
    );

    view.composer().press_to_record().await.unwrap();

    let (sent, _) = tokio::join!(view.composer().release_to_send(), async {
        while !view.composer().is_uploading() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(!view.composer().can_start_recording());
        let err = view.composer().press_to_record().await.unwrap_err();
        assert!(matches!(err, FeedbackError::RecorderBusy(_)));
        gated.gate.notify_one();
    });

    assert!(sent.unwrap().is_some());
    assert!(view.composer().can_start_recording());
}

#[tokio::test]
async fn test_failed_voice_upload_reports_send_failed() {
    let harness = Harness::new("alice");
    harness.blobs.set_offline(true);
    let view = harness.view(MessageScope::phase("c1", "p1"));

    view.composer().press_to_record().await.unwrap();
    let err = view.composer().release_to_send().await.unwrap_err();

    assert!(matches!(err, FeedbackError::SendFailed(_)));
    assert!(harness.store.is_empty());
    assert!(matches!(
        view.notices().try_recv(),
        Some(FeedbackNotice::SendFailed { draft_restored: false, .. })
    ));
    assert!(view.composer().can_start_recording());
}

#[tokio::test]
async fn test_permission_denied_posts_notice() {
    let harness = Harness::new("alice");
    harness.capture.set_permission(false);
    let view = harness.view(MessageScope::phase("c1", "p1"));

    let err = view.composer().press_to_record().await.unwrap_err();
    assert_eq!(err, FeedbackError::PermissionDenied);
    assert_eq!(view.notices().try_recv(), Some(FeedbackNotice::PermissionDenied));

    assert_eq!(view.composer().release_to_send().await, Ok(None));
}

#[tokio::test]
async fn test_playing_b_stops_a() {
    let harness = Harness::new("alice");
    let view = harness.view(MessageScope::phase("c1", "p1"));
    let a = MessageId::new();
    let b = MessageId::new();

    assert_eq!(view.playback().play(a, "a.wav").await, PlayOutcome::Started);
    assert_eq!(view.playback().play(b, "b.wav").await, PlayOutcome::Started);

    assert_eq!(view.playback().currently_playing(), Some(b));
    assert_eq!(harness.player.live_resources(), 1);
    assert_eq!(harness.player.stop_count(), 1);
    assert!(!harness.player.finish("a.wav"));
}

#[tokio::test]
async fn test_recording_stops_playback() {
    let harness = Harness::new("alice");
    let view = harness.view(MessageScope::phase("c1", "p1"));

    view.playback().play(MessageId::new(), "a.wav").await;
    view.composer().press_to_record().await.unwrap();

    assert_eq!(view.playback().currently_playing(), None);
    assert_eq!(harness.player.live_resources(), 0);
    view.composer().cancel_recording().await;
}

#[tokio::test]
async fn test_playback_refused_while_recording() {
    let harness = Harness::new("alice");
    let view = harness.view(MessageScope::phase("c1", "p1"));
    let id = MessageId::new();

    view.composer().press_to_record().await.unwrap();
    assert_eq!(view.playback().play(id, "a.wav").await, PlayOutcome::RecordingActive);
    assert_eq!(view.playback().currently_playing(), None);
    assert_eq!(harness.player.live_resources(), 0);

    view.composer().release_to_send().await.unwrap();
    assert_eq!(view.playback().play(id, "a.wav").await, PlayOutcome::Started);
}

#[tokio::test]
async fn test_delete_with_foreign_audio_url_keeps_blob() {
    let harness = Harness::new("alice");
    let view = harness.view(MessageScope::phase("c1", "p1"));
    view.composer().press_to_record().await.unwrap();
    let id = view.composer().release_to_send().await.unwrap().unwrap();
    let url = harness
        .store
        .get("c1", id)
        .await
        .unwrap()
        .unwrap()
        .audio_url()
        .map(str::to_string)
        .unwrap();

    harness.session.sign_in("mallory");
    let outcome = view
        .deletion()
        .delete_message("c1", MessageId::new(), Some(&url), &Answered(true))
        .await
        .unwrap();

    assert_eq!(outcome, DeleteOutcome::AlreadyGone);
    assert!(harness.store.get("c1", id).await.unwrap().is_some());
    assert!(harness.blobs.contains_url(&url));
}

#[tokio::test]
async fn test_delete_twice_is_silent() {
    let harness = Harness::new("alice");
    let view = harness.view(MessageScope::phase("c1", "p1"));
    view.composer().press_to_record().await.unwrap();
    let id = view.composer().release_to_send().await.unwrap().unwrap();
    let message = harness.store.get("c1", id).await.unwrap().unwrap();
    assert!(view.deletion().can_delete(&message));

    let first = view
        .deletion()
        .delete_message("c1", id, message.audio_url(), &Answered(true))
        .await
        .unwrap();
    let second = view
        .deletion()
        .delete_message("c1", id, message.audio_url(), &Answered(true))
        .await
        .unwrap();

    assert_eq!(first, DeleteOutcome::Deleted);
    assert_eq!(second, DeleteOutcome::AlreadyGone);
    assert!(harness.blobs.is_empty());
}

#[tokio::test]
async fn test_read_receipt_reaches_subscribers() {
    let harness = Harness::new("bob");
    let scope = MessageScope::phase("c1", "p1");
    harness.store.create(text(&scope, "alice", "à lire")).await.unwrap();
    let view = harness.view(scope);
    let (_handle, mut rx) = feed(&view);
    let initial = rx.recv().await.unwrap();

    let marked = view.receipts().mark_all_read(&initial).await.unwrap();
    assert_eq!(marked, 1);

    let updated = rx.recv().await.unwrap();
    assert!(updated[0].is_read_by("bob"));
}
