use super::storage::FeedbackStore;
use super::types::FeedbackMessage;
use crate::session::SessionProvider;
use crate::{FeedbackError, Result};
use std::sync::Arc;
use tracing::debug;

/// Marks messages as read by the signed-in user
pub struct ReadReceipts {
    store: Arc<dyn FeedbackStore>,
    session: Arc<dyn SessionProvider>,
}

impl ReadReceipts {
    pub fn new(store: Arc<dyn FeedbackStore>, session: Arc<dyn SessionProvider>) -> Self {
        Self { store, session }
    }

    /// Append the current user to the message's readers.
    ///
    /// Returns `Ok(false)` without touching the store when nothing would
    /// change: own messages, already-read messages, or a vanished record.
    pub async fn mark_read(&self, message: &FeedbackMessage) -> Result<bool> {
        let user = self.session.current_user().ok_or(FeedbackError::NotSignedIn)?;

        if message.author_id == user || message.is_read_by(&user) {
            return Ok(false);
        }

        let updated = self
            .store
            .mark_read(&message.chantier_id, message.id, &user)
            .await?;
        debug!("Marked {} read by {} (found: {})", message.id, user, updated);
        Ok(updated)
    }

    /// Mark every unread message authored by someone else
    pub async fn mark_all_read(&self, messages: &[FeedbackMessage]) -> Result<usize> {
        let mut marked = 0;
        for message in messages {
            if self.mark_read(message).await? {
                marked += 1;
            }
        }
        Ok(marked)
    }
}
