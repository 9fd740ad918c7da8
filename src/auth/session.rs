//! Session storage and expiry checks.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::refresh::TokenGrant;

/// An authenticated session: bearer token, refresh token, expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry of the access token. `None` means the backend did
    /// not report one; such tokens are never considered expired.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        access_token: String,
        refresh_token: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now() >= exp,
            None => false,
        }
    }

    /// True when the access token expires within `buffer` from now.
    pub fn expires_within(&self, buffer: Duration) -> bool {
        match self.expires_at {
            Some(exp) => {
                let buffer = chrono::Duration::from_std(buffer).unwrap_or(chrono::Duration::MAX);
                exp - Utc::now() <= buffer
            }
            None => false,
        }
    }
}

/// Shared, process-wide handle to the current session.
///
/// Created on login by the host, mutated by the middleware on refresh,
/// cleared on logout or unrecoverable refresh failure.
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session (login).
    pub fn set(&self, session: Session) {
        *self.inner.write().expect("session lock poisoned") = Some(session);
    }

    /// Copy of the current session, if any.
    pub fn snapshot(&self) -> Option<Session> {
        self.inner.read().expect("session lock poisoned").clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|s| s.refresh_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().expect("session lock poisoned").is_some()
    }

    /// Replace the stored tokens with a fresh grant. A grant without an
    /// expiry gets `default_lifetime` from now.
    pub fn update_tokens(&self, grant: &TokenGrant, default_lifetime: Duration) {
        let expires_at = grant.expires_at.or_else(|| {
            chrono::Duration::from_std(default_lifetime)
                .ok()
                .map(|d| Utc::now() + d)
        });
        *self.inner.write().expect("session lock poisoned") = Some(Session::new(
            grant.access.clone(),
            grant.refresh.clone(),
            expires_at,
        ));
    }

    /// Destroy the session (logout / unrecoverable refresh failure).
    pub fn clear(&self) {
        *self.inner.write().expect("session lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_in(secs: i64) -> Session {
        Session::new(
            "access".into(),
            "refresh".into(),
            Some(Utc::now() + chrono::Duration::seconds(secs)),
        )
    }

    #[test]
    fn test_expiry_checks() {
        assert!(session_expiring_in(-10).is_expired());
        assert!(!session_expiring_in(600).is_expired());

        // 10 minutes left, 5 minute buffer: not yet inside the window.
        assert!(!session_expiring_in(600).expires_within(Duration::from_secs(300)));
        // 2 minutes left: inside the window.
        assert!(session_expiring_in(120).expires_within(Duration::from_secs(300)));
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let s = Session::new("access".into(), "refresh".into(), None);
        assert!(!s.is_expired());
        assert!(!s.expires_within(Duration::from_secs(300)));
    }

    #[test]
    fn test_handle_update_and_clear() {
        let handle = SessionHandle::new();
        assert!(!handle.is_authenticated());

        handle.set(session_expiring_in(600));
        assert_eq!(handle.access_token().as_deref(), Some("access"));

        let grant = TokenGrant {
            access: "access2".into(),
            refresh: "refresh2".into(),
            expires_at: None,
        };
        handle.update_tokens(&grant, Duration::from_secs(1800));
        let s = handle.snapshot().unwrap();
        assert_eq!(s.access_token, "access2");
        assert_eq!(s.refresh_token, "refresh2");
        // Default lifetime applied when the grant carries no expiry.
        assert!(s.expires_at.is_some());
        assert!(!s.expires_within(Duration::from_secs(60)));

        handle.clear();
        assert!(handle.snapshot().is_none());
    }
}
