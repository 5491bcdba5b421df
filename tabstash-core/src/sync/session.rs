//! Authenticated session access.

use async_trait::async_trait;
use std::sync::RwLock;

/// An authenticated user session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Stable account id; scopes every remote record and the derived key.
    pub user_id: String,
    /// Bearer token for the remote store.
    pub access_token: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

/// Source of the current session. `None` means signed out.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_session(&self) -> Option<Session>;
}

/// A session held in memory and swapped on sign-in/sign-out.
#[derive(Debug, Default)]
pub struct StaticSession {
    current: RwLock<Option<Session>>,
}

impl StaticSession {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(session: Session) -> Self {
        Self {
            current: RwLock::new(Some(session)),
        }
    }

    pub fn sign_in(&self, session: Session) {
        if let Ok(mut current) = self.current.write() {
            *current = Some(session);
        }
    }

    /// Clear the session, returning the one that was active.
    pub fn sign_out(&self) -> Option<Session> {
        self.current.write().ok().and_then(|mut current| current.take())
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn get_session(&self) -> Option<Session> {
        self.current.read().ok().and_then(|current| current.clone())
    }
}
