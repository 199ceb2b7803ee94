//! Per-view assembly of the feedback components
//!
//! A hosting view builds one [`FeedbackView`] for the phase or step it shows.
//! Everything inside shares the view's lifetime token and notice queue, and
//! owns exactly one playback controller, gated on the composer's recorder.

use crate::audio::{AudioRecorder, CaptureEngine, PlaybackEngine};
use crate::composer::Composer;
use crate::deletion::{DeletePolicy, DeletionHandler};
use crate::integration::FeedbackConfig;
use crate::messages::{FeedbackMessage, FeedbackStore, MessageScope, ReadReceipts};
use crate::playback::PlaybackController;
use crate::session::SessionProvider;
use crate::stream::{MessageStream, SubscriptionHandle};
use crate::upload::{BlobStore, UploadPipeline};
use crate::utils::{NoticeChannel, ViewLifetime};
use crate::{FeedbackError, Result};
use std::sync::Arc;
use tracing::info;

pub struct FeedbackView {
    scope: MessageScope,
    lifetime: ViewLifetime,
    notices: NoticeChannel,
    stream: MessageStream,
    composer: Composer,
    playback: Arc<PlaybackController>,
    deletion: DeletionHandler,
    receipts: ReadReceipts,
}

impl FeedbackView {
    pub fn builder(scope: MessageScope) -> FeedbackViewBuilder {
        FeedbackViewBuilder::new(scope)
    }

    pub fn scope(&self) -> &MessageScope {
        &self.scope
    }

    /// Subscribe to this view's scope
    pub fn subscribe<F>(&self, on_update: F) -> SubscriptionHandle
    where
        F: FnMut(&[FeedbackMessage]) + Send + 'static,
    {
        self.stream.subscribe(self.scope.clone(), on_update)
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn deletion(&self) -> &DeletionHandler {
        &self.deletion
    }

    pub fn receipts(&self) -> &ReadReceipts {
        &self.receipts
    }

    pub fn notices(&self) -> &NoticeChannel {
        &self.notices
    }

    pub fn lifetime(&self) -> &ViewLifetime {
        &self.lifetime
    }

    /// Unmount: drop late callbacks, abandon capture, release playback
    pub async fn teardown(&self) {
        self.lifetime.teardown();
        self.composer.cancel_recording().await;
        self.playback.teardown().await;
        info!("Feedback view for {} torn down", self.scope);
    }
}

/// Builder for creating a feedback view
pub struct FeedbackViewBuilder {
    scope: MessageScope,
    config: FeedbackConfig,
    store: Option<Arc<dyn FeedbackStore>>,
    blobs: Option<Arc<dyn BlobStore>>,
    session: Option<Arc<dyn SessionProvider>>,
    capture: Option<Arc<dyn CaptureEngine>>,
    player: Option<Arc<dyn PlaybackEngine>>,
    delete_policy: Option<Arc<dyn DeletePolicy>>,
}

impl FeedbackViewBuilder {
    pub fn new(scope: MessageScope) -> Self {
        Self {
            scope,
            config: FeedbackConfig::default(),
            store: None,
            blobs: None,
            session: None,
            capture: None,
            player: None,
            delete_policy: None,
        }
    }

    /// Set the complete configuration
    pub fn with_config(mut self, config: FeedbackConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn FeedbackStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn with_session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_capture_engine(mut self, capture: Arc<dyn CaptureEngine>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_playback_engine(mut self, player: Arc<dyn PlaybackEngine>) -> Self {
        self.player = Some(player);
        self
    }

    pub fn with_delete_policy(mut self, policy: Arc<dyn DeletePolicy>) -> Self {
        self.delete_policy = Some(policy);
        self
    }

    /// Build the view
    pub fn build(self) -> Result<FeedbackView> {
        self.config.validate()?;
        let store = self.store.ok_or_else(|| missing("store"))?;
        let blobs = self.blobs.ok_or_else(|| missing("blob store"))?;
        let session = self.session.ok_or_else(|| missing("session"))?;
        let capture = self.capture.ok_or_else(|| missing("capture engine"))?;
        let player = self.player.ok_or_else(|| missing("playback engine"))?;

        let lifetime = ViewLifetime::new();
        let notices = NoticeChannel::new(self.config.notice_capacity, lifetime.clone());
        let recorder = AudioRecorder::new(capture);
        let playback =
            Arc::new(PlaybackController::new(player).with_recording_gate(recorder.activity()));

        let uploads = UploadPipeline::new(Arc::clone(&blobs), Arc::clone(&store), &self.config);
        let composer = Composer::new(
            self.scope.clone(),
            Arc::clone(&store),
            Arc::clone(&session),
            recorder,
            uploads,
            notices.clone(),
            lifetime.clone(),
        )
        .with_playback(Arc::clone(&playback));

        let mut deletion = DeletionHandler::new(Arc::clone(&store), blobs, Arc::clone(&session))
            .with_notices(notices.clone());
        if let Some(policy) = self.delete_policy {
            deletion = deletion.with_policy(policy);
        }

        Ok(FeedbackView {
            stream: MessageStream::new(Arc::clone(&store), lifetime.clone()),
            receipts: ReadReceipts::new(store, session),
            scope: self.scope,
            lifetime,
            notices,
            composer,
            playback,
            deletion,
        })
    }
}

fn missing(what: &str) -> FeedbackError {
    FeedbackError::Config(format!("feedback view needs a {}", what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{SimulatedCaptureEngine, SimulatedPlaybackEngine};
    use crate::messages::MemoryFeedbackStore;
    use crate::session::StaticSession;
    use crate::upload::MemoryBlobStore;

    #[test]
    fn test_builder_requires_collaborators() {
        let result = FeedbackView::builder(MessageScope::phase("c1", "p1")).build();
        assert!(matches!(result, Err(FeedbackError::Config(_))));
    }

    #[tokio::test]
    async fn test_teardown_releases_playback() {
        let player = SimulatedPlaybackEngine::new();
        let view = FeedbackView::builder(MessageScope::phase("c1", "p1"))
            .with_store(Arc::new(MemoryFeedbackStore::new()))
            .with_blobs(Arc::new(MemoryBlobStore::default()))
            .with_session(Arc::new(StaticSession::signed_in("alice")))
            .with_capture_engine(Arc::new(SimulatedCaptureEngine::new(
                std::env::temp_dir(),
                8000,
            )))
            .with_playback_engine(Arc::new(player.clone()))
            .build()
            .unwrap();

        view.playback()
            .play(crate::messages::MessageId::new(), "a.wav")
            .await;
        assert_eq!(player.live_resources(), 1);

        view.teardown().await;
        assert_eq!(player.live_resources(), 0);
        assert!(!view.lifetime().is_mounted());
    }
}
