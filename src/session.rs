//! Identity of the signed-in actor
//!
//! Every write path (send, record, delete, read receipts) asks the session
//! for the current user and refuses to run without one.

use crate::messages::UserId;
use parking_lot::RwLock;

pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;

    fn is_signed_in(&self) -> bool {
        self.current_user().is_some()
    }
}

/// Session whose user is set directly by the host
#[derive(Debug, Default)]
pub struct StaticSession {
    user: RwLock<Option<UserId>>,
}

impl StaticSession {
    pub fn signed_in(user_id: impl Into<UserId>) -> Self {
        Self {
            user: RwLock::new(Some(user_id.into())),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user_id: impl Into<UserId>) {
        *self.user.write() = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *self.user.write() = None;
    }
}

impl SessionProvider for StaticSession {
    fn current_user(&self) -> Option<UserId> {
        self.user.read().clone()
    }
}
