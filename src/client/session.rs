//! Session provider
//!
//! The sync layer only needs to know who is signed in, if anyone, at the
//! moment it stamps a remote write. [`AuthManager`](crate::client::auth::AuthManager)
//! is the full implementation; [`StaticSession`] serves embedders that manage
//! identity themselves, and tests.

use std::sync::RwLock;

use crate::shared::user::SessionUser;

/// Supplies the current user identity
pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<SessionUser>;
}

/// Session whose user is set directly
#[derive(Debug, Default)]
pub struct StaticSession {
    user: RwLock<Option<SessionUser>>,
}

impl StaticSession {
    pub fn new(user: Option<SessionUser>) -> Self {
        Self {
            user: RwLock::new(user),
        }
    }

    pub fn signed_in(user: SessionUser) -> Self {
        Self::new(Some(user))
    }

    pub fn set_user(&self, user: Option<SessionUser>) {
        if let Ok(mut current) = self.user.write() {
            *current = user;
        }
    }
}

impl SessionProvider for StaticSession {
    fn current_user(&self) -> Option<SessionUser> {
        self.user.read().ok().and_then(|user| user.clone())
    }
}
