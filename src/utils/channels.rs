use crate::utils::lifetime::ViewLifetime;
use crate::FeedbackError;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, warn};

/// Something the host view should show the user
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackNotice {
    /// Microphone refused; the host shows settings guidance
    PermissionDenied,
    /// A text or voice send failed; for text the draft has been restored
    SendFailed { reason: String, draft_restored: bool },
    /// Recorder or player fault; state is already back to idle
    CaptureFailed(String),
    /// Deletion could not reach the store
    DeleteFailed(String),
}

impl FeedbackNotice {
    /// Blocking notices stay on screen until dismissed
    pub fn requires_acknowledgement(&self) -> bool {
        !matches!(self, FeedbackNotice::CaptureFailed(_))
    }

    pub fn from_error(error: &FeedbackError) -> Self {
        match error {
            FeedbackError::PermissionDenied => FeedbackNotice::PermissionDenied,
            FeedbackError::CaptureEngineFailure(reason) => {
                FeedbackNotice::CaptureFailed(reason.clone())
            }
            other => FeedbackNotice::SendFailed {
                reason: other.to_string(),
                draft_restored: false,
            },
        }
    }
}

/// Bounded notice queue between the feedback components and the host view
#[derive(Clone)]
pub struct NoticeChannel {
    tx: Sender<FeedbackNotice>,
    rx: Receiver<FeedbackNotice>,
    lifetime: ViewLifetime,
}

impl NoticeChannel {
    pub fn new(capacity: usize, lifetime: ViewLifetime) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, lifetime }
    }

    /// Post a notice; dropped after teardown or when the host is not draining
    pub fn notify(&self, notice: FeedbackNotice) {
        if !self.lifetime.is_mounted() {
            debug!("View torn down, dropping notice {:?}", notice);
            return;
        }
        match self.tx.try_send(notice) {
            Ok(()) => {}
            Err(TrySendError::Full(notice)) => warn!("Notice queue full, dropping {:?}", notice),
            Err(TrySendError::Disconnected(_)) => debug!("Notice queue closed"),
        }
    }

    /// Next pending notice, if any
    pub fn try_recv(&self) -> Option<FeedbackNotice> {
        self.rx.try_recv().ok()
    }

    pub fn receiver(&self) -> Receiver<FeedbackNotice> {
        self.rx.clone()
    }

    pub fn drain(&self) -> Vec<FeedbackNotice> {
        self.rx.try_iter().collect()
    }
}
