//! Voice note capture state machine
//!
//! ```text
//! Idle -> Requesting -> Armed -> Recording -> Stopping -> Idle
//!            |             |         |           |
//!            +-------------+---------+-----------+--> Error --(retry)--> Idle
//! ```
//!
//! A fault reported by the engine mid-capture goes through
//! [`AudioRecorder::capture_fault`]; otherwise it surfaces at `stop()`.
//!
//! The state lock is never held across an await. Every `start` call gets an
//! attempt number and each later transition checks both the state and that
//! number, so a start that was cancelled and superseded cannot take over the
//! newer attempt.

use super::{CaptureArtifact, CaptureEngine};
use crate::{FeedbackError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum RecorderState {
    Idle,
    /// Waiting on the microphone permission prompt
    Requesting,
    /// Permission granted, capture not yet running
    Armed,
    Recording,
    /// Engine is finalizing the artifact
    Stopping,
    Error(FeedbackError),
}

/// Local bookkeeping for the capture in progress
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub start_time: Instant,
    pub audio_uri: Option<String>,
    pub hardware_duration_millis: u64,
}

/// A finalized local artifact, ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRecording {
    pub local_uri: String,
    pub duration_seconds: f64,
}

/// Pick the duration of a finished recording.
///
/// Device-reported length wins when positive, then the wall-clock hold time,
/// then a one second floor. The result is never zero.
pub fn resolve_duration_seconds(hardware_duration_millis: u64, elapsed: Duration) -> f64 {
    if hardware_duration_millis > 0 {
        hardware_duration_millis as f64 / 1000.0
    } else if !elapsed.is_zero() {
        elapsed.as_secs_f64()
    } else {
        1.0
    }
}

struct RecorderInner {
    state: RecorderState,
    session: Option<RecordingSession>,
    attempt: u64,
}

impl RecorderInner {
    fn is_busy(&self) -> bool {
        matches!(
            self.state,
            RecorderState::Requesting
                | RecorderState::Armed
                | RecorderState::Recording
                | RecorderState::Stopping
        )
    }
}

pub struct AudioRecorder {
    engine: Arc<dyn CaptureEngine>,
    inner: Arc<Mutex<RecorderInner>>,
}

/// Read-only view of whether a recorder holds the microphone
#[derive(Clone)]
pub struct RecordingActivity {
    inner: Arc<Mutex<RecorderInner>>,
}

impl RecordingActivity {
    pub fn is_busy(&self) -> bool {
        self.inner.lock().is_busy()
    }
}

impl AudioRecorder {
    pub fn new(engine: Arc<dyn CaptureEngine>) -> Self {
        Self {
            engine,
            inner: Arc::new(Mutex::new(RecorderInner {
                state: RecorderState::Idle,
                session: None,
                attempt: 0,
            })),
        }
    }

    /// Handle for components that must stay quiet while capturing
    pub fn activity(&self) -> RecordingActivity {
        RecordingActivity {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.inner.lock().state.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().state == RecorderState::Recording
    }

    /// True while a session is being set up, captured or finalized
    pub fn is_busy(&self) -> bool {
        self.inner.lock().is_busy()
    }

    /// Dismiss an error and return to idle
    pub fn acknowledge_error(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, RecorderState::Error(_)) {
            inner.state = RecorderState::Idle;
            inner.session = None;
        }
    }

    /// Ask for the microphone and begin capture.
    ///
    /// Starting from `Error` counts as a retry. Returns `RecorderBusy` when a
    /// session already exists.
    pub async fn start(&self) -> Result<()> {
        let attempt = {
            let mut inner = self.inner.lock();
            match &inner.state {
                RecorderState::Idle => {}
                RecorderState::Error(previous) => {
                    debug!("Retrying capture after error: {}", previous);
                }
                other => {
                    return Err(FeedbackError::RecorderBusy(format!(
                        "cannot start while {:?}",
                        other
                    )));
                }
            }
            inner.state = RecorderState::Requesting;
            inner.session = None;
            inner.attempt += 1;
            inner.attempt
        };

        let permission = self.engine.request_permission().await;
        if !self.owns(attempt, &RecorderState::Requesting) {
            info!("Recording cancelled while waiting for permission");
            return Ok(());
        }
        match permission {
            Ok(true) => {}
            Ok(false) => {
                warn!("Microphone permission denied");
                self.fail_from(attempt, RecorderState::Requesting, FeedbackError::PermissionDenied);
                return Err(FeedbackError::PermissionDenied);
            }
            Err(e) => {
                let err = capture_failure(e);
                self.fail_from(attempt, RecorderState::Requesting, err.clone());
                return Err(err);
            }
        }

        if !self.transition(attempt, RecorderState::Requesting, RecorderState::Armed) {
            info!("Recording cancelled while waiting for permission");
            return Ok(());
        }

        if let Err(e) = self.engine.start().await {
            let err = capture_failure(e);
            error!("Capture engine failed to start: {}", err);
            self.fail_from(attempt, RecorderState::Armed, err.clone());
            return Err(err);
        }

        let started = {
            let mut inner = self.inner.lock();
            if inner.state == RecorderState::Armed && inner.attempt == attempt {
                inner.state = RecorderState::Recording;
                inner.session = Some(RecordingSession {
                    start_time: Instant::now(),
                    audio_uri: None,
                    hardware_duration_millis: 0,
                });
                true
            } else {
                false
            }
        };

        if started {
            info!("Started voice recording");
        } else {
            info!("Recording cancelled before capture began");
            self.engine.discard().await;
        }
        Ok(())
    }

    /// Finalize the current session and resolve its duration
    pub async fn stop(&self) -> Result<FinishedRecording> {
        let (attempt, session) = {
            let mut inner = self.inner.lock();
            if inner.state != RecorderState::Recording {
                return Err(FeedbackError::RecorderBusy(format!(
                    "cannot stop while {:?}",
                    inner.state
                )));
            }
            inner.state = RecorderState::Stopping;
            (inner.attempt, inner.session.take())
        };
        let Some(mut session) = session else {
            let err = FeedbackError::CaptureEngineFailure("recording session missing".into());
            self.fail_from(attempt, RecorderState::Stopping, err.clone());
            return Err(err);
        };

        // Hold time ends at release, not when the engine finishes encoding
        let elapsed = session.start_time.elapsed();
        let artifact = match self.engine.stop().await {
            Ok(artifact) => artifact,
            Err(e) => {
                let err = capture_failure(e);
                error!("Capture engine failed to finalize: {}", err);
                self.fail_from(attempt, RecorderState::Stopping, err.clone());
                return Err(err);
            }
        };

        let CaptureArtifact {
            local_uri,
            hardware_duration_millis,
        } = artifact;
        session.audio_uri = Some(local_uri.clone());
        session.hardware_duration_millis = hardware_duration_millis;

        let duration_seconds = resolve_duration_seconds(hardware_duration_millis, elapsed);
        debug!(
            "Recording finalized: hardware={}ms elapsed={:?} -> {:.3}s",
            hardware_duration_millis, elapsed, duration_seconds
        );

        self.transition(attempt, RecorderState::Stopping, RecorderState::Idle);
        info!("Stopped voice recording ({:.2}s)", duration_seconds);

        Ok(FinishedRecording {
            local_uri,
            duration_seconds,
        })
    }

    /// Abandon the session without producing an artifact
    pub async fn cancel(&self) {
        let had_capture = {
            let mut inner = self.inner.lock();
            match inner.state {
                RecorderState::Recording => {
                    inner.state = RecorderState::Idle;
                    inner.session = None;
                    true
                }
                RecorderState::Requesting | RecorderState::Armed => {
                    inner.state = RecorderState::Idle;
                    false
                }
                _ => return,
            }
        };

        if had_capture {
            self.engine.discard().await;
        }
        info!("Recording cancelled");
    }

    /// Report an engine fault while capturing.
    ///
    /// Moves `Recording` to `Error(CaptureEngineFailure)` and discards the
    /// capture. Returns false when no capture was running.
    pub async fn capture_fault(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        {
            let mut inner = self.inner.lock();
            if inner.state != RecorderState::Recording {
                debug!("Ignoring capture fault outside recording: {}", reason);
                return false;
            }
            inner.state = RecorderState::Error(FeedbackError::CaptureEngineFailure(reason.clone()));
            inner.session = None;
        }
        error!("Capture engine fault during recording: {}", reason);
        self.engine.discard().await;
        true
    }

    fn owns(&self, attempt: u64, state: &RecorderState) -> bool {
        let inner = self.inner.lock();
        inner.attempt == attempt && inner.state == *state
    }

    fn transition(&self, attempt: u64, from: RecorderState, to: RecorderState) -> bool {
        let mut inner = self.inner.lock();
        if inner.attempt == attempt && inner.state == from {
            inner.state = to;
            true
        } else {
            false
        }
    }

    fn fail_from(&self, attempt: u64, from: RecorderState, err: FeedbackError) {
        let mut inner = self.inner.lock();
        if inner.attempt == attempt && inner.state == from {
            inner.state = RecorderState::Error(err);
            inner.session = None;
        }
    }
}

fn capture_failure(e: FeedbackError) -> FeedbackError {
    match e {
        FeedbackError::PermissionDenied | FeedbackError::CaptureEngineFailure(_) => e,
        other => FeedbackError::CaptureEngineFailure(other.to_string()),
    }
}
