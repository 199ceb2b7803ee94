use crate::{FeedbackError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

pub type UserId = String;

/// Store-assigned message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a message lives: a phase of a chantier, optionally narrowed to one step.
///
/// Phase-level and step-level scopes are disjoint: a phase scope never
/// contains messages that carry a step id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageScope {
    pub chantier_id: String,
    pub phase_id: String,
    pub step_id: Option<String>,
}

impl MessageScope {
    pub fn phase(chantier_id: impl Into<String>, phase_id: impl Into<String>) -> Self {
        Self {
            chantier_id: chantier_id.into(),
            phase_id: phase_id.into(),
            step_id: None,
        }
    }

    pub fn step(
        chantier_id: impl Into<String>,
        phase_id: impl Into<String>,
        step_id: impl Into<String>,
    ) -> Self {
        Self {
            chantier_id: chantier_id.into(),
            phase_id: phase_id.into(),
            step_id: Some(step_id.into()),
        }
    }

    /// Exact-match membership test
    pub fn contains(&self, message: &FeedbackMessage) -> bool {
        message.chantier_id == self.chantier_id
            && message.phase_id == self.phase_id
            && message.step_id == self.step_id
    }
}

impl fmt::Display for MessageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step_id {
            Some(step) => write!(f, "{}/{}/{}", self.chantier_id, self.phase_id, step),
            None => write!(f, "{}/{}", self.chantier_id, self.phase_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text { body: String },
    Voice { url: String, duration_seconds: f64 },
}

impl MessageBody {
    pub fn text(body: impl Into<String>) -> Result<Self> {
        let body = Self::Text { body: body.into() };
        body.validate()?;
        Ok(body)
    }

    pub fn voice(url: impl Into<String>, duration_seconds: f64) -> Result<Self> {
        let body = Self::Voice {
            url: url.into(),
            duration_seconds,
        };
        body.validate()?;
        Ok(body)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            MessageBody::Text { body } if body.trim().is_empty() => Err(
                FeedbackError::InvalidMessage("text message body is empty".into()),
            ),
            MessageBody::Voice { url, .. } if url.is_empty() => Err(
                FeedbackError::InvalidMessage("voice message has no audio url".into()),
            ),
            MessageBody::Voice {
                duration_seconds, ..
            } if !duration_seconds.is_finite() || *duration_seconds <= 0.0 => {
                Err(FeedbackError::InvalidMessage(format!(
                    "voice message duration must be positive, got {}",
                    duration_seconds
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn is_voice(&self) -> bool {
        matches!(self, MessageBody::Voice { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    Unread,
    Read,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackMessage {
    pub id: MessageId,
    pub chantier_id: String,
    pub phase_id: String,
    pub step_id: Option<String>,
    pub author_id: UserId,
    pub body: MessageBody,
    pub created_at: DateTime<Utc>,
    pub status: ReadStatus,
    pub read_by: BTreeSet<UserId>,
}

impl FeedbackMessage {
    pub fn scope(&self) -> MessageScope {
        MessageScope {
            chantier_id: self.chantier_id.clone(),
            phase_id: self.phase_id.clone(),
            step_id: self.step_id.clone(),
        }
    }

    /// Blob url for voice notes
    pub fn audio_url(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Voice { url, .. } => Some(url.as_str()),
            MessageBody::Text { .. } => None,
        }
    }

    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.contains(user_id)
    }
}

/// Descending by creation time, ties broken by id so the order is total.
pub fn newest_first(a: &FeedbackMessage, b: &FeedbackMessage) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// A message as submitted, before the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub scope: MessageScope,
    pub author_id: UserId,
    pub body: MessageBody,
}

impl NewMessage {
    pub fn new(scope: MessageScope, author_id: impl Into<UserId>, body: MessageBody) -> Self {
        Self {
            scope,
            author_id: author_id.into(),
            body,
        }
    }

    /// Materialize the record; status starts unread with no readers.
    pub fn into_message(self, id: MessageId, created_at: DateTime<Utc>) -> FeedbackMessage {
        FeedbackMessage {
            id,
            chantier_id: self.scope.chantier_id,
            phase_id: self.scope.phase_id,
            step_id: self.scope.step_id,
            author_id: self.author_id,
            body: self.body,
            created_at,
            status: ReadStatus::Unread,
            read_by: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message_at(scope: &MessageScope, secs: i64) -> FeedbackMessage {
        NewMessage::new(scope.clone(), "alice", MessageBody::text("hi").unwrap())
            .into_message(MessageId::new(), Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[test]
    fn test_text_body_rejects_blank() {
        assert!(MessageBody::text("   ").is_err());
        assert!(MessageBody::text("Bonjour").is_ok());
    }

    #[test]
    fn test_voice_body_requires_positive_duration() {
        assert!(MessageBody::voice("https://blob/a.wav", 0.0).is_err());
        assert!(MessageBody::voice("https://blob/a.wav", f64::NAN).is_err());
        assert!(MessageBody::voice("", 2.0).is_err());
        assert!(MessageBody::voice("https://blob/a.wav", 2.0).is_ok());
    }

    #[test]
    fn test_scope_is_exact() {
        let phase = MessageScope::phase("c1", "p1");
        let step = MessageScope::step("c1", "p1", "s1");

        let phase_msg = message_at(&phase, 1);
        let step_msg = message_at(&step, 2);

        assert!(phase.contains(&phase_msg));
        assert!(!phase.contains(&step_msg));
        assert!(step.contains(&step_msg));
        assert!(!step.contains(&phase_msg));
        assert!(!MessageScope::step("c1", "p1", "s2").contains(&step_msg));
    }

    #[test]
    fn test_newest_first_orders_descending() {
        let scope = MessageScope::phase("c1", "p1");
        let mut list = vec![message_at(&scope, 1), message_at(&scope, 3), message_at(&scope, 2)];
        list.sort_by(newest_first);
        let secs: Vec<i64> = list.iter().map(|m| m.created_at.timestamp()).collect();
        assert_eq!(secs, vec![3, 2, 1]);
    }

    #[test]
    fn test_ties_break_by_id() {
        let scope = MessageScope::phase("c1", "p1");
        let a = message_at(&scope, 5);
        let b = message_at(&scope, 5);
        let mut first = vec![a.clone(), b.clone()];
        let mut second = vec![b, a];
        first.sort_by(newest_first);
        second.sort_by(newest_first);
        assert_eq!(first, second);
    }

    #[test]
    fn test_new_message_starts_unread() {
        let msg = message_at(&MessageScope::phase("c1", "p1"), 1);
        assert_eq!(msg.status, ReadStatus::Unread);
        assert!(msg.read_by.is_empty());
        assert!(msg.audio_url().is_none());
    }
}
