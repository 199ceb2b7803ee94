//! Configuration for the feedback subsystem
//!
//! Provides centralized configuration for all components.

use crate::names::{CLIENT_AUTHOR_ID, TEAM_AUTHOR_ID};
use crate::{FeedbackError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration shared by the composer, recorder and upload pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Top-level folder for voice notes in the blob store
    pub blob_prefix: String,

    /// Extension used when the local artifact has none
    pub audio_extension: String,

    /// Where capture engines write local recordings
    pub recording_dir: PathBuf,

    /// Sample rate used by capture engines that write WAV files
    pub capture_sample_rate: u32,

    /// Capacity of the composer notice channel
    pub notice_capacity: usize,

    /// Shown for authors the directory does not know
    pub unknown_author_label: String,

    /// Author ids that resolve to fixed names without a lookup
    pub reserved_names: BTreeMap<String, String>,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        let mut reserved_names = BTreeMap::new();
        reserved_names.insert(CLIENT_AUTHOR_ID.to_string(), "Client".to_string());
        reserved_names.insert(TEAM_AUTHOR_ID.to_string(), "Équipe".to_string());

        Self {
            blob_prefix: "feedback".to_string(),
            audio_extension: "wav".to_string(),
            recording_dir: std::env::temp_dir().join("chantier-feedback"),
            capture_sample_rate: 16000,
            notice_capacity: 32,
            unknown_author_label: "Utilisateur".to_string(),
            reserved_names,
        }
    }
}

impl FeedbackConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FeedbackError::Config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Set the blob folder
    pub fn with_blob_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.blob_prefix = prefix.into();
        self
    }

    /// Set where local recordings are written
    pub fn with_recording_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recording_dir = dir.into();
        self
    }

    /// Set the fallback author label
    pub fn with_unknown_author_label(mut self, label: impl Into<String>) -> Self {
        self.unknown_author_label = label.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.blob_prefix.trim_matches('/').is_empty() {
            return Err(FeedbackError::Config("blob_prefix must not be empty".into()));
        }
        if self.audio_extension.is_empty() || self.audio_extension.contains('.') {
            return Err(FeedbackError::Config(format!(
                "audio_extension must be a bare extension, got {:?}",
                self.audio_extension
            )));
        }
        if self.capture_sample_rate == 0 {
            return Err(FeedbackError::Config("capture_sample_rate must be positive".into()));
        }
        if self.notice_capacity == 0 {
            return Err(FeedbackError::Config("notice_capacity must be positive".into()));
        }
        Ok(())
    }
}
