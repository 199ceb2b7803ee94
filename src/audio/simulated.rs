//! Device-free engines
//!
//! The capture side writes a real (silent) WAV file so uploads carry bytes
//! and the header-derived duration is genuine. Both engines expose knobs to
//! inject the failure modes the recorder and player must survive.

use super::wav::{wav_duration_millis, write_wav};
use super::{CaptureArtifact, CaptureEngine, LoadedSound, PlaybackEngine, PlaybackFinished};
use crate::{FeedbackError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

pub struct SimulatedCaptureEngine {
    dir: PathBuf,
    sample_rate: u32,
    permission_granted: AtomicBool,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    hardware_duration_override: Mutex<Option<u64>>,
    started_at: Mutex<Option<Instant>>,
    discarded: AtomicUsize,
}

impl SimulatedCaptureEngine {
    pub fn new(dir: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            dir: dir.into(),
            sample_rate,
            permission_granted: AtomicBool::new(true),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            hardware_duration_override: Mutex::new(None),
            started_at: Mutex::new(None),
            discarded: AtomicUsize::new(0),
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Report this length instead of the encoded one (0 mimics a codec glitch)
    pub fn set_hardware_duration_millis(&self, millis: Option<u64>) {
        *self.hardware_duration_override.lock() = millis;
    }

    pub fn discarded_count(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureEngine for SimulatedCaptureEngine {
    async fn request_permission(&self) -> Result<bool> {
        Ok(self.permission_granted.load(Ordering::SeqCst))
    }

    async fn start(&self) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(FeedbackError::CaptureEngineFailure("simulated start failure".into()));
        }
        *self.started_at.lock() = Some(Instant::now());
        Ok(())
    }

    async fn stop(&self) -> Result<CaptureArtifact> {
        let started_at = self.started_at.lock().take();
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(FeedbackError::CaptureEngineFailure("simulated stop failure".into()));
        }
        let elapsed = started_at.map(|t| t.elapsed()).unwrap_or_default();

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.wav", Uuid::new_v4()));
        let frames = (elapsed.as_secs_f64() * self.sample_rate as f64) as usize;
        write_wav(&path, &vec![0.0; frames], self.sample_rate, 1)?;

        let reported = *self.hardware_duration_override.lock();
        let hardware_duration_millis = match reported {
            Some(millis) => millis,
            None => wav_duration_millis(&path)?,
        };

        Ok(CaptureArtifact {
            local_uri: path.to_string_lossy().into_owned(),
            hardware_duration_millis,
        })
    }

    async fn discard(&self) {
        self.started_at.lock().take();
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct PlaybackRegistry {
    /// Pending natural-end signals by url, tagged with the owning sound
    finishers: HashMap<String, (u64, oneshot::Sender<()>)>,
    next_sound: u64,
    history: Vec<String>,
    stops: usize,
}

/// Player that never makes a sound; tests end playback with [`Self::finish`]
#[derive(Clone, Default)]
pub struct SimulatedPlaybackEngine {
    registry: Arc<Mutex<PlaybackRegistry>>,
    failing_urls: Arc<Mutex<HashSet<String>>>,
    live: Arc<AtomicUsize>,
}

impl SimulatedPlaybackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make loading `url` fail
    pub fn fail_url(&self, url: impl Into<String>) {
        self.failing_urls.lock().insert(url.into());
    }

    /// Simulate `url` reaching its natural end
    pub fn finish(&self, url: &str) -> bool {
        match self.registry.lock().finishers.remove(url) {
            Some((_, tx)) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Loaded resources not yet released
    pub fn live_resources(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Every url that started playing, in order
    pub fn played(&self) -> Vec<String> {
        self.registry.lock().history.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.registry.lock().stops
    }
}

#[async_trait]
impl PlaybackEngine for SimulatedPlaybackEngine {
    async fn load(&self, url: &str) -> Result<Box<dyn LoadedSound>> {
        if self.failing_urls.lock().contains(url) {
            return Err(FeedbackError::CaptureEngineFailure(format!(
                "cannot decode {}",
                url
            )));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        let id = {
            let mut registry = self.registry.lock();
            registry.next_sound += 1;
            registry.next_sound
        };
        debug!("Loaded simulated sound {}", url);
        Ok(Box::new(SimulatedSound {
            id,
            url: url.to_string(),
            registry: Arc::clone(&self.registry),
            live: Arc::clone(&self.live),
        }))
    }
}

struct SimulatedSound {
    id: u64,
    url: String,
    registry: Arc<Mutex<PlaybackRegistry>>,
    live: Arc<AtomicUsize>,
}

#[async_trait]
impl LoadedSound for SimulatedSound {
    async fn play(&mut self) -> Result<PlaybackFinished> {
        let (tx, rx) = oneshot::channel();
        let mut registry = self.registry.lock();
        registry.finishers.insert(self.url.clone(), (self.id, tx));
        registry.history.push(self.url.clone());
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.release_finisher();
        self.registry.lock().stops += 1;
        Ok(())
    }
}

impl SimulatedSound {
    /// Drop our pending end signal so whoever awaits it sees a stop
    fn release_finisher(&self) {
        let mut registry = self.registry.lock();
        if registry.finishers.get(&self.url).map(|(id, _)| *id) == Some(self.id) {
            registry.finishers.remove(&self.url);
        }
    }
}

impl Drop for SimulatedSound {
    fn drop(&mut self) {
        self.release_finisher();
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
