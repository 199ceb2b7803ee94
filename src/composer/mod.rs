//! Message composer for one phase or step
//!
//! Text goes out optimistically: the draft is cleared before the store call
//! and put back verbatim if the call fails. Nothing is echoed locally, the
//! sent message shows up only when the stream delivers it.
//!
//! Voice notes are press-and-hold: [`Composer::press_to_record`] starts a
//! capture, [`Composer::release_to_send`] finalizes, uploads and persists it.

use crate::audio::AudioRecorder;
use crate::messages::{FeedbackStore, MessageBody, MessageId, MessageScope, NewMessage, UserId};
use crate::playback::PlaybackController;
use crate::session::SessionProvider;
use crate::upload::UploadPipeline;
use crate::utils::{FeedbackNotice, NoticeChannel, ViewLifetime};
use crate::{FeedbackError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Composer {
    scope: MessageScope,
    store: Arc<dyn FeedbackStore>,
    session: Arc<dyn SessionProvider>,
    recorder: AudioRecorder,
    uploads: UploadPipeline,
    playback: Option<Arc<PlaybackController>>,
    draft: Mutex<String>,
    notices: NoticeChannel,
    lifetime: ViewLifetime,
}

impl Composer {
    pub fn new(
        scope: MessageScope,
        store: Arc<dyn FeedbackStore>,
        session: Arc<dyn SessionProvider>,
        recorder: AudioRecorder,
        uploads: UploadPipeline,
        notices: NoticeChannel,
        lifetime: ViewLifetime,
    ) -> Self {
        Self {
            scope,
            store,
            session,
            recorder,
            uploads,
            playback: None,
            draft: Mutex::new(String::new()),
            notices,
            lifetime,
        }
    }

    /// Share the view's player so recording never overlaps playback
    pub fn with_playback(mut self, playback: Arc<PlaybackController>) -> Self {
        self.playback = Some(playback);
        self
    }

    pub fn scope(&self) -> &MessageScope {
        &self.scope
    }

    pub fn draft(&self) -> String {
        self.draft.lock().clone()
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        *self.draft.lock() = text.into();
    }

    pub fn recorder(&self) -> &AudioRecorder {
        &self.recorder
    }

    pub fn is_uploading(&self) -> bool {
        self.uploads.is_uploading()
    }

    /// Write paths are disabled entirely without a signed-in user
    pub fn can_write(&self) -> bool {
        self.session.is_signed_in()
    }

    /// Recording is offered only when idle and no voice note is uploading
    pub fn can_start_recording(&self) -> bool {
        self.can_write() && !self.uploads.is_uploading() && !self.recorder.is_busy()
    }

    /// Send the current draft.
    ///
    /// Returns `Ok(None)` for a blank draft. The draft is empty as soon as
    /// this is called; on failure it holds the exact text again.
    pub async fn send_text(&self) -> Result<Option<MessageId>> {
        let author = self.current_author()?;

        let original = {
            let mut draft = self.draft.lock();
            if draft.trim().is_empty() {
                return Ok(None);
            }
            std::mem::take(&mut *draft)
        };

        let result = match MessageBody::text(original.trim()) {
            Ok(body) => {
                self.store
                    .create(NewMessage::new(self.scope.clone(), author, body))
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(id) => {
                debug!("Text message {} sent to {}", id, self.scope);
                Ok(Some(id))
            }
            Err(e) => {
                warn!("Text send to {} failed: {}", self.scope, e);
                let restored = self.restore_draft(original);
                self.notices.notify(FeedbackNotice::SendFailed {
                    reason: e.to_string(),
                    draft_restored: restored,
                });
                Err(FeedbackError::SendFailed(e.to_string()))
            }
        }
    }

    /// Begin a voice note (press)
    pub async fn press_to_record(&self) -> Result<()> {
        self.current_author()?;
        if self.uploads.is_uploading() {
            return Err(FeedbackError::RecorderBusy("a voice note is uploading".into()));
        }
        if self.recorder.is_busy() {
            return Err(FeedbackError::RecorderBusy("already recording".into()));
        }

        if let Some(playback) = &self.playback {
            playback.stop().await;
        }

        match self.recorder.start().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.report_capture_error(&e);
                Err(e)
            }
        }
    }

    /// Finish the voice note (release) and send it.
    ///
    /// Returns `Ok(None)` when no capture was running, e.g. the press was
    /// refused or cancelled.
    pub async fn release_to_send(&self) -> Result<Option<MessageId>> {
        if !self.recorder.is_recording() {
            debug!("Release without an active recording");
            return Ok(None);
        }

        let recording = match self.recorder.stop().await {
            Ok(recording) => recording,
            Err(e) => {
                self.report_capture_error(&e);
                return Err(e);
            }
        };

        let author = match self.current_author() {
            Ok(author) => author,
            Err(e) => {
                warn!("Session ended during recording, voice note not sent");
                return Err(e);
            }
        };

        match self.uploads.send_voice(&self.scope, &author, &recording).await {
            Ok(id) => {
                info!("Voice note {} sent to {}", id, self.scope);
                Ok(Some(id))
            }
            Err(e) => {
                self.notices.notify(FeedbackNotice::SendFailed {
                    reason: e.to_string(),
                    draft_restored: false,
                });
                Err(e)
            }
        }
    }

    pub async fn cancel_recording(&self) {
        self.recorder.cancel().await;
    }

    /// Dismiss a blocking recorder error such as a refused permission
    pub fn acknowledge_error(&self) {
        self.recorder.acknowledge_error();
    }

    fn current_author(&self) -> Result<UserId> {
        self.session.current_user().ok_or(FeedbackError::NotSignedIn)
    }

    fn report_capture_error(&self, error: &FeedbackError) {
        match error {
            FeedbackError::PermissionDenied => {
                self.notices.notify(FeedbackNotice::PermissionDenied);
            }
            FeedbackError::CaptureEngineFailure(reason) => {
                warn!("Capture engine failure: {}", reason);
                self.recorder.acknowledge_error();
                self.notices.notify(FeedbackNotice::CaptureFailed(reason.clone()));
            }
            other => debug!("Recording not started: {}", other),
        }
    }

    /// Put failed text back without clobbering anything typed since
    fn restore_draft(&self, original: String) -> bool {
        if !self.lifetime.is_mounted() {
            debug!("View torn down, not restoring draft");
            return false;
        }
        let mut draft = self.draft.lock();
        if draft.is_empty() {
            *draft = original;
        } else {
            *draft = format!("{}\n{}", original, draft);
        }
        true
    }
}
