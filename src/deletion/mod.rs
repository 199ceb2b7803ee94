//! Author-only, confirmed, idempotent deletion of feedback messages
//!
//! The host only shows the delete affordance when [`DeletionHandler::can_delete`]
//! holds. The same rule is checked again through [`DeletePolicy`] right
//! before the store call, so a storage-side rule can be slotted in without
//! touching callers.

use crate::messages::{FeedbackMessage, FeedbackStore, MessageId};
use crate::session::SessionProvider;
use crate::upload::BlobStore;
use crate::utils::{FeedbackNotice, NoticeChannel};
use crate::{FeedbackError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DELETE_PROMPT: &str = "Supprimer ce message ? Cette action est irréversible.";

/// Explicit human confirmation step
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Pre-answered confirmation, for hosts that ask before calling in
#[derive(Debug, Clone, Copy)]
pub struct Answered(pub bool);

#[async_trait]
impl Confirmation for Answered {
    async fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

#[async_trait]
pub trait DeletePolicy: Send + Sync {
    /// `message` is `None` when the record no longer exists
    async fn authorize(&self, actor: &str, message: Option<&FeedbackMessage>) -> Result<()>;
}

/// Only the author may delete
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthorOnly;

#[async_trait]
impl DeletePolicy for AuthorOnly {
    async fn authorize(&self, actor: &str, message: Option<&FeedbackMessage>) -> Result<()> {
        match message {
            Some(message) if message.author_id != actor => {
                Err(FeedbackError::Unauthorized(message.id.to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Rely on the view having hidden the affordance
#[derive(Debug, Default, Clone, Copy)]
pub struct TrustCallerGate;

#[async_trait]
impl DeletePolicy for TrustCallerGate {
    async fn authorize(&self, _actor: &str, _message: Option<&FeedbackMessage>) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing to delete; treated as success
    AlreadyGone,
    /// The user declined the confirmation
    Cancelled,
}

pub struct DeletionHandler {
    store: Arc<dyn FeedbackStore>,
    blobs: Arc<dyn BlobStore>,
    session: Arc<dyn SessionProvider>,
    policy: Arc<dyn DeletePolicy>,
    notices: Option<NoticeChannel>,
}

impl DeletionHandler {
    pub fn new(
        store: Arc<dyn FeedbackStore>,
        blobs: Arc<dyn BlobStore>,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            store,
            blobs,
            session,
            policy: Arc::new(AuthorOnly),
            notices: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn DeletePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_notices(mut self, notices: NoticeChannel) -> Self {
        self.notices = Some(notices);
        self
    }

    /// Whether the view should offer deletion for `message`
    pub fn can_delete(&self, message: &FeedbackMessage) -> bool {
        self.session
            .current_user()
            .map(|user| user == message.author_id)
            .unwrap_or(false)
    }

    /// Delete a message and, for voice notes, its blob.
    ///
    /// The blob url always comes from the stored record; `audio_url` is only
    /// cross-checked against it.
    pub async fn delete_message(
        &self,
        chantier_id: &str,
        message_id: MessageId,
        audio_url: Option<&str>,
        confirmation: &dyn Confirmation,
    ) -> Result<DeleteOutcome> {
        let actor = self.session.current_user().ok_or(FeedbackError::NotSignedIn)?;

        if !confirmation.confirm(DELETE_PROMPT).await {
            debug!("Deletion of {} cancelled", message_id);
            return Ok(DeleteOutcome::Cancelled);
        }

        let result = self
            .remove(chantier_id, message_id, audio_url, &actor)
            .await;
        if let (Err(e), Some(notices)) = (&result, &self.notices) {
            notices.notify(FeedbackNotice::DeleteFailed(e.to_string()));
        }
        result
    }

    async fn remove(
        &self,
        chantier_id: &str,
        message_id: MessageId,
        audio_url: Option<&str>,
        actor: &str,
    ) -> Result<DeleteOutcome> {
        let existing = self.store.get(chantier_id, message_id).await?;
        self.policy.authorize(actor, existing.as_ref()).await?;

        let removed = self.store.delete(chantier_id, message_id).await?;

        // Only the blob of the authorized record may go; a missing record
        // leaves blobs alone
        let stored_url = existing.as_ref().and_then(|m| m.audio_url());
        if let Some(claimed) = audio_url {
            if stored_url != Some(claimed) {
                warn!(
                    "Ignoring audio url {} passed for message {}, it is not the stored one",
                    claimed, message_id
                );
            }
        }
        if let Some(url) = stored_url {
            if let Err(e) = self.blobs.delete(url).await {
                warn!("Could not delete blob {} for message {}: {}", url, message_id, e);
            }
        }

        if removed {
            info!("Deleted message {}", message_id);
            Ok(DeleteOutcome::Deleted)
        } else {
            debug!("Message {} was already gone", message_id);
            Ok(DeleteOutcome::AlreadyGone)
        }
    }
}
