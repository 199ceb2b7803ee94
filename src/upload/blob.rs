use crate::{FeedbackError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path` and return a durable, publicly resolvable url
    async fn write(&self, path: &str, bytes: Vec<u8>) -> Result<String>;

    /// Remove the blob behind `url`; absent blobs are not an error
    async fn delete(&self, url: &str) -> Result<()>;
}

/// Blob store kept in memory, served under a fake base url
#[derive(Clone)]
pub struct MemoryBlobStore {
    base_url: String,
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            blobs: Arc::new(RwLock::new(HashMap::new())),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.path_of(url)
            .map(|path| self.blobs.read().contains_key(path))
            .unwrap_or(false)
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.blobs.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    fn path_of<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(self.base_url.as_str())
            .map(|rest| rest.trim_start_matches('/'))
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(FeedbackError::TransportUnavailable("blob store is offline".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        self.ensure_online()?;
        let path = path.trim_start_matches('/');
        debug!("Stored blob {} ({} bytes)", path, bytes.len());
        self.blobs.write().insert(path.to_string(), bytes);
        Ok(format!("{}/{}", self.base_url, path))
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.ensure_online()?;
        let path = self
            .path_of(url)
            .ok_or_else(|| FeedbackError::InvalidMessage(format!("foreign blob url {}", url)))?;
        self.blobs.write().remove(path);
        Ok(())
    }
}
