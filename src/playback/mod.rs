//! Single-slot voice note playback for one view
//!
//! At most one note is loaded at a time. The loaded resource is owned by the
//! slot and released by dropping it, which happens on stop, on switching to
//! another note, on natural end, on teardown and when the controller itself
//! is dropped.

use crate::audio::{LoadedSound, PlaybackEngine, RecordingActivity};
use crate::messages::MessageId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

/// Result of a `play` request
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Started,
    /// The note was already playing and has been stopped
    Stopped,
    /// The engine could not load or start the note; the slot is empty
    Failed(String),
    /// Refused because the view is capturing a voice note
    RecordingActive,
}

/// The loaded note and the resource backing it
pub struct PlaybackSlot {
    pub message_id: MessageId,
    generation: u64,
    loaded_resource: Box<dyn LoadedSound>,
}

pub struct PlaybackController {
    engine: Arc<dyn PlaybackEngine>,
    slot: Arc<AsyncMutex<Option<PlaybackSlot>>>,
    current: Arc<Mutex<Option<MessageId>>>,
    generation: AtomicU64,
    recording: Option<RecordingActivity>,
}

impl PlaybackController {
    pub fn new(engine: Arc<dyn PlaybackEngine>) -> Self {
        Self {
            engine,
            slot: Arc::new(AsyncMutex::new(None)),
            current: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
            recording: None,
        }
    }

    /// Refuse to play while `recording` holds the microphone
    pub fn with_recording_gate(mut self, recording: RecordingActivity) -> Self {
        self.recording = Some(recording);
        self
    }

    pub fn currently_playing(&self) -> Option<MessageId> {
        *self.current.lock()
    }

    pub fn is_playing(&self, message_id: MessageId) -> bool {
        self.currently_playing() == Some(message_id)
    }

    /// Play `url` for `message_id`, or stop it if it is the note already playing
    pub async fn play(&self, message_id: MessageId, url: &str) -> PlayOutcome {
        let mut slot = self.slot.lock().await;

        if self.recording.as_ref().is_some_and(|r| r.is_busy()) {
            info!("Not playing note {} while recording", message_id);
            return PlayOutcome::RecordingActive;
        }

        if let Some(mut previous) = slot.take() {
            *self.current.lock() = None;
            let same_note = previous.message_id == message_id;
            if let Err(e) = previous.loaded_resource.stop().await {
                warn!("Failed to stop note {}: {}", previous.message_id, e);
            }
            drop(previous);
            if same_note {
                info!("Stopped note {}", message_id);
                return PlayOutcome::Stopped;
            }
        }

        let mut resource = match self.engine.load(url).await {
            Ok(resource) => resource,
            Err(e) => {
                error!("Failed to load note {} from {}: {}", message_id, url, e);
                return PlayOutcome::Failed(e.to_string());
            }
        };

        let finished = match resource.play().await {
            Ok(finished) => finished,
            Err(e) => {
                error!("Failed to start note {}: {}", message_id, e);
                return PlayOutcome::Failed(e.to_string());
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *slot = Some(PlaybackSlot {
            message_id,
            generation,
            loaded_resource: resource,
        });
        *self.current.lock() = Some(message_id);
        info!("Playing note {}", message_id);

        let slot_ref = Arc::clone(&self.slot);
        let current = Arc::clone(&self.current);
        tokio::spawn(async move {
            // Err means the sender was dropped by a stop or release
            if finished.await.is_err() {
                return;
            }
            let mut slot = slot_ref.lock().await;
            if slot.as_ref().map(|s| s.generation) == Some(generation) {
                slot.take();
                *current.lock() = None;
                debug!("Note {} finished", message_id);
            }
        });

        PlayOutcome::Started
    }

    /// Stop and release whatever is loaded
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(mut current) = slot.take() {
            *self.current.lock() = None;
            if let Err(e) = current.loaded_resource.stop().await {
                warn!("Failed to stop note {}: {}", current.message_id, e);
            }
            info!("Stopped note {}", current.message_id);
        }
    }

    /// Release the slot when the hosting view goes away
    pub async fn teardown(&self) {
        self.stop().await;
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        *self.current.lock() = None;
        match self.slot.try_lock() {
            Ok(mut slot) => {
                if let Some(current) = slot.take() {
                    debug!("Releasing note {} on controller drop", current.message_id);
                }
            }
            Err(_) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let slot = Arc::clone(&self.slot);
                    handle.spawn(async move {
                        if let Some(current) = slot.lock().await.take() {
                            debug!("Released note {} after controller drop", current.message_id);
                        }
                    });
                }
                Err(_) => warn!("Playback slot busy during drop outside a runtime, note not released"),
            },
        }
    }
}
