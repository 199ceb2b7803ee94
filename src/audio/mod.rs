//! Audio capture and playback
//!
//! The recorder state machine and the playback controller talk to hardware
//! only through [`CaptureEngine`] and [`PlaybackEngine`]. Simulated engines
//! back the tests and the demo; cpal-backed drivers live behind the
//! `audio-io` feature.

pub mod recorder;
pub mod simulated;
pub mod wav;
#[cfg(feature = "audio-io")]
pub mod input;
#[cfg(feature = "audio-io")]
pub mod output;

pub use recorder::{
    resolve_duration_seconds, AudioRecorder, FinishedRecording, RecorderState, RecordingActivity,
    RecordingSession,
};
pub use simulated::{SimulatedCaptureEngine, SimulatedPlaybackEngine};
pub use wav::{read_wav, wav_duration_millis, write_wav};
#[cfg(feature = "audio-io")]
pub use input::CpalCaptureEngine;
#[cfg(feature = "audio-io")]
pub use output::CpalPlaybackEngine;

use crate::Result;
use async_trait::async_trait;
use tokio::sync::oneshot;

/// What a capture engine hands back when recording stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureArtifact {
    pub local_uri: String,
    /// Encoded length as reported by the device; 0 when unknown
    pub hardware_duration_millis: u64,
}

#[async_trait]
pub trait CaptureEngine: Send + Sync {
    /// `Ok(false)` means the user refused microphone access
    async fn request_permission(&self) -> Result<bool>;

    async fn start(&self) -> Result<()>;

    /// Finalize the artifact
    async fn stop(&self) -> Result<CaptureArtifact>;

    /// Abort capture and throw the partial artifact away
    async fn discard(&self);
}

/// Signal fired once when a sound plays to its end
pub type PlaybackFinished = oneshot::Receiver<()>;

#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Acquire a playable resource; it is released when dropped
    async fn load(&self, url: &str) -> Result<Box<dyn LoadedSound>>;
}

#[async_trait]
pub trait LoadedSound: Send {
    async fn play(&mut self) -> Result<PlaybackFinished>;

    async fn stop(&mut self) -> Result<()>;
}
