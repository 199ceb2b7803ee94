use super::wav::read_wav;
use super::{LoadedSound, PlaybackEngine, PlaybackFinished};
use crate::{FeedbackError, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// Plays local WAV voice notes on the default cpal output device
#[derive(Debug, Default, Clone)]
pub struct CpalPlaybackEngine;

impl CpalPlaybackEngine {
    pub fn new() -> Self {
        Self
    }
}

fn device_error(context: &str, e: impl std::fmt::Display) -> FeedbackError {
    FeedbackError::CaptureEngineFailure(format!("{}: {}", context, e))
}

#[async_trait]
impl PlaybackEngine for CpalPlaybackEngine {
    async fn load(&self, url: &str) -> Result<Box<dyn LoadedSound>> {
        let path = url.strip_prefix("file://").unwrap_or(url).to_string();
        let (samples, sample_rate, channels) = tokio::task::spawn_blocking(move || read_wav(path))
            .await
            .map_err(|e| device_error("WAV reader join failed", e))??;

        let mono: Vec<f32> = if channels <= 1 {
            samples
        } else {
            samples
                .chunks(channels as usize)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };
        debug!("Loaded {} frames at {} Hz from {}", mono.len(), sample_rate, url);

        Ok(Box::new(CpalSound {
            samples: Arc::new(mono),
            sample_rate,
            worker: None,
        }))
    }
}

struct PlaybackWorker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

struct CpalSound {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    worker: Option<PlaybackWorker>,
}

impl CpalSound {
    fn halt(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
        }
    }
}

fn playback_thread(
    samples: Arc<Vec<f32>>,
    source_rate: u32,
    ready_tx: Sender<Result<()>>,
    stop_rx: Receiver<()>,
    finished_tx: oneshot::Sender<()>,
) {
    let setup = (|| {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| FeedbackError::CaptureEngineFailure("No output device available".into()))?;
        info!(
            "Using output device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(|e| device_error("Failed to get output config", e))?
            .into();
        Ok::<_, FeedbackError>((device, config))
    })();
    let (device, config) = match setup {
        Ok(setup) => setup,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let channels = config.channels as usize;
    let step = source_rate as f64 / config.sample_rate.0 as f64;
    let position = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = bounded::<()>(1);

    let cursor = Arc::clone(&position);
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let mut frame = cursor.load(Ordering::Relaxed);
            for out in data.chunks_mut(channels) {
                // Nearest-neighbour rate conversion is enough for voice notes
                let index = (frame as f64 * step) as usize;
                let sample = samples.get(index).copied().unwrap_or(0.0);
                out.fill(sample);
                frame += 1;
            }
            cursor.store(frame, Ordering::Relaxed);
            if (frame as f64 * step) as usize >= samples.len() {
                let _ = done_tx.try_send(());
            }
        },
        |err| error!("Audio output stream error: {}", err),
        None,
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(device_error("Failed to build output stream", e)));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(device_error("Failed to start output stream", e)));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    let natural_end = select! {
        recv(done_rx) -> _ => true,
        recv(stop_rx) -> _ => false,
    };
    drop(stream);

    if natural_end {
        let _ = finished_tx.send(());
    }
}

#[async_trait]
impl LoadedSound for CpalSound {
    async fn play(&mut self) -> Result<PlaybackFinished> {
        self.halt();

        let (ready_tx, ready_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);
        let (finished_tx, finished_rx) = oneshot::channel();
        let samples = Arc::clone(&self.samples);
        let source_rate = self.sample_rate;

        let handle = thread::spawn(move || {
            playback_thread(samples, source_rate, ready_tx, stop_rx, finished_tx)
        });

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| device_error("playback start join failed", e))?
            .map_err(|_| FeedbackError::CaptureEngineFailure("playback thread exited".into()))?;
        if let Err(e) = ready {
            let _ = handle.join();
            return Err(e);
        }

        self.worker = Some(PlaybackWorker { stop_tx, handle });
        info!("Started audio playback");
        Ok(finished_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.halt();
        info!("Stopped audio playback");
        Ok(())
    }
}

impl Drop for CpalSound {
    fn drop(&mut self) {
        self.halt();
    }
}
