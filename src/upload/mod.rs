//! Voice note upload: local artifact -> blob store -> message record
//!
//! The two steps are not transactional. If the record cannot be written after
//! the blob landed, the blob is left behind as an orphan and only logged.

pub mod blob;

pub use blob::{BlobStore, MemoryBlobStore};

use crate::audio::FinishedRecording;
use crate::integration::FeedbackConfig;
use crate::messages::{FeedbackStore, MessageBody, MessageId, MessageScope, NewMessage};
use crate::{FeedbackError, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct UploadPipeline {
    blobs: Arc<dyn BlobStore>,
    store: Arc<dyn FeedbackStore>,
    blob_prefix: String,
    default_extension: String,
    in_flight: Arc<AtomicUsize>,
}

/// Counts an upload as in flight until dropped
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl UploadPipeline {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        store: Arc<dyn FeedbackStore>,
        config: &FeedbackConfig,
    ) -> Self {
        Self {
            blobs,
            store,
            blob_prefix: config.blob_prefix.trim_matches('/').to_string(),
            default_extension: config.audio_extension.clone(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_uploading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Copy the local artifact into blob storage under a unique name
    pub async fn upload_audio(&self, local_uri: &str, chantier_id: &str) -> Result<String> {
        let _guard = InFlight::enter(&self.in_flight);

        let local_path = local_path(local_uri);
        let bytes = tokio::fs::read(local_path).await?;
        let blob_path = self.blob_path(local_path, chantier_id);

        let url = self.blobs.write(&blob_path, bytes).await?;
        info!("Uploaded voice note to {}", url);
        Ok(url)
    }

    /// Persist a voice message pointing at an uploaded blob
    pub async fn create_voice_message(
        &self,
        chantier_id: &str,
        phase_id: &str,
        author_id: &str,
        remote_url: &str,
        duration_seconds: f64,
        step_id: Option<&str>,
    ) -> Result<MessageId> {
        let scope = MessageScope {
            chantier_id: chantier_id.to_string(),
            phase_id: phase_id.to_string(),
            step_id: step_id.map(str::to_string),
        };
        let body = MessageBody::voice(remote_url, duration_seconds)?;
        let id = self
            .store
            .create(NewMessage::new(scope, author_id, body))
            .await?;
        debug!("Created voice message {} ({:.2}s)", id, duration_seconds);
        Ok(id)
    }

    /// Upload and persist as one operation; any failure is reported as `SendFailed`
    pub async fn send_voice(
        &self,
        scope: &MessageScope,
        author_id: &str,
        recording: &FinishedRecording,
    ) -> Result<MessageId> {
        let _guard = InFlight::enter(&self.in_flight);

        let remote_url = self
            .upload_audio(&recording.local_uri, &scope.chantier_id)
            .await
            .map_err(|e| FeedbackError::SendFailed(format!("upload failed: {}", e)))?;

        let id = match self
            .create_voice_message(
                &scope.chantier_id,
                &scope.phase_id,
                author_id,
                &remote_url,
                recording.duration_seconds,
                scope.step_id.as_deref(),
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!("Voice message not persisted, blob {} is orphaned: {}", remote_url, e);
                return Err(FeedbackError::SendFailed(format!("persist failed: {}", e)));
            }
        };

        if let Err(e) = tokio::fs::remove_file(local_path(&recording.local_uri)).await {
            debug!("Could not remove local recording {}: {}", recording.local_uri, e);
        }
        Ok(id)
    }

    fn blob_path(&self, local_path: &str, chantier_id: &str) -> String {
        let extension = Path::new(local_path)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .unwrap_or(self.default_extension.as_str());
        format!(
            "{}/{}/{}-{}.{}",
            self.blob_prefix,
            chantier_id,
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            extension
        )
    }
}

fn local_path(local_uri: &str) -> &str {
    local_uri.strip_prefix("file://").unwrap_or(local_uri)
}
