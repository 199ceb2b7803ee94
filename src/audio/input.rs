use super::wav::{wav_duration_millis, write_wav};
use super::{CaptureArtifact, CaptureEngine};
use crate::{FeedbackError, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Captured mono samples and their sample rate
type CaptureOutput = (Vec<f32>, u32);

struct CaptureWorker {
    stop_tx: Sender<()>,
    handle: JoinHandle<Result<CaptureOutput>>,
}

/// Microphone capture through the default cpal input device.
///
/// cpal streams are not `Send`, so each session owns a thread that builds the
/// stream, accumulates samples and hands them back on stop.
pub struct CpalCaptureEngine {
    dir: PathBuf,
    worker: Mutex<Option<CaptureWorker>>,
}

impl CpalCaptureEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            worker: Mutex::new(None),
        }
    }

    fn take_worker(&self) -> Option<CaptureWorker> {
        self.worker.lock().take()
    }
}

fn device_error(context: &str, e: impl std::fmt::Display) -> FeedbackError {
    FeedbackError::CaptureEngineFailure(format!("{}: {}", context, e))
}

fn capture_thread(ready_tx: Sender<Result<()>>, stop_rx: Receiver<()>) -> Result<CaptureOutput> {
    let host = cpal::default_host();
    let setup = (|| {
        let device = host
            .default_input_device()
            .ok_or_else(|| FeedbackError::CaptureEngineFailure("No input device available".into()))?;
        info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        let config: cpal::StreamConfig = device
            .default_input_config()
            .map_err(|e| device_error("Failed to get input config", e))?
            .into();
        Ok::<_, FeedbackError>((device, config))
    })();

    let (device, config) = match setup {
        Ok(setup) => setup,
        Err(e) => {
            let _ = ready_tx.send(Err(e.clone()));
            return Err(e);
        }
    };

    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;
    let (audio_tx, audio_rx) = unbounded::<Vec<f32>>();

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let samples = if channels == 1 {
                data.to_vec()
            } else {
                data.chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                    .collect()
            };
            if let Err(e) = audio_tx.send(samples) {
                debug!("Failed to forward audio data: {}", e);
            }
        },
        |err| error!("Audio input stream error: {}", err),
        None,
    );

    let stream = match stream.map_err(|e| device_error("Failed to build input stream", e)) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e.clone()));
            return Err(e);
        }
    };
    if let Err(e) = stream.play() {
        let e = device_error("Failed to start input stream", e);
        let _ = ready_tx.send(Err(e.clone()));
        return Err(e);
    }
    let _ = ready_tx.send(Ok(()));

    let mut recorded = Vec::new();
    loop {
        while let Ok(chunk) = audio_rx.try_recv() {
            recorded.extend_from_slice(&chunk);
        }
        if stop_rx.recv_timeout(Duration::from_millis(10)).is_ok() {
            break;
        }
    }
    drop(stream);
    while let Ok(chunk) = audio_rx.try_recv() {
        recorded.extend_from_slice(&chunk);
    }

    Ok((recorded, sample_rate))
}

async fn join_worker(worker: CaptureWorker) -> Result<CaptureOutput> {
    let _ = worker.stop_tx.send(());
    tokio::task::spawn_blocking(move || {
        worker
            .handle
            .join()
            .map_err(|_| FeedbackError::CaptureEngineFailure("capture thread panicked".into()))?
    })
    .await
    .map_err(|e| device_error("capture join failed", e))?
}

#[async_trait]
impl CaptureEngine for CpalCaptureEngine {
    async fn request_permission(&self) -> Result<bool> {
        // Desktop hosts have no runtime prompt; a missing device is a fault, not a refusal
        let has_device = tokio::task::spawn_blocking(|| cpal::default_host().default_input_device().is_some())
            .await
            .map_err(|e| device_error("device probe failed", e))?;
        if has_device {
            Ok(true)
        } else {
            Err(FeedbackError::CaptureEngineFailure("No input device available".into()))
        }
    }

    async fn start(&self) -> Result<()> {
        if let Some(stale) = self.take_worker() {
            let _ = join_worker(stale).await;
        }

        let (ready_tx, ready_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);
        let handle = thread::spawn(move || capture_thread(ready_tx, stop_rx));

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| device_error("capture start join failed", e))?
            .map_err(|_| FeedbackError::CaptureEngineFailure("capture thread exited".into()))?;

        if let Err(e) = ready {
            let _ = handle.join();
            return Err(e);
        }

        *self.worker.lock() = Some(CaptureWorker { stop_tx, handle });
        info!("Started audio capture");
        Ok(())
    }

    async fn stop(&self) -> Result<CaptureArtifact> {
        let worker = self
            .take_worker()
            .ok_or_else(|| FeedbackError::CaptureEngineFailure("capture not running".into()))?;
        let (samples, sample_rate) = join_worker(worker).await?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.wav", Uuid::new_v4()));
        let write_path = path.clone();
        tokio::task::spawn_blocking(move || write_wav(&write_path, &samples, sample_rate, 1))
            .await
            .map_err(|e| device_error("WAV writer join failed", e))??;

        let hardware_duration_millis = wav_duration_millis(&path)?;
        info!("Stopped audio capture ({} ms)", hardware_duration_millis);

        Ok(CaptureArtifact {
            local_uri: path.to_string_lossy().into_owned(),
            hardware_duration_millis,
        })
    }

    async fn discard(&self) {
        if let Some(worker) = self.take_worker() {
            if let Err(e) = join_worker(worker).await {
                debug!("Discarded capture ended with error: {}", e);
            }
        }
    }
}

impl Drop for CpalCaptureEngine {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.stop_tx.send(());
        }
    }
}
