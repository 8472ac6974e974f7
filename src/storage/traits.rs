//! Session backend trait for Satchel.
//!
//! This module defines the `SessionBackend` trait for session persistence.
//! Backends differ in where the data lives (inside the token itself, or
//! server-side keyed by the token) and in their capacity limits; they all
//! share the same load/save contract.

use std::sync::Arc;

use chrono::Duration;

use crate::core::Session;
use crate::error::Result;

/// Trait for session storage backends.
///
/// Implementations must surface unreachable storage as
/// `SatchelError::BackendUnavailable` and must not retry internally.
pub trait SessionBackend: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Load the session addressed by a transported token.
    ///
    /// Returns `Ok(None)` if no live session exists for the token.
    fn load(&self, token: &str) -> Result<Option<Session>>;

    /// Persist a session and return the token to transport to the client.
    ///
    /// Fails with `SizeLimitExceeded` when the encoded session is larger
    /// than the backend's capacity bound.
    fn save(&self, session: &Session) -> Result<String>;

    /// Remove whatever is stored for a session identity.
    ///
    /// Returns `Ok(())` even if nothing was stored.
    fn destroy(&self, id: &str) -> Result<()>;

    /// Issue a new session identity.
    fn generate_identity(&self) -> String {
        generate_session_id()
    }

    /// Inactivity window after which saved sessions expire.
    ///
    /// `SessionStore` stamps `expires_at` from this on every save.
    fn ttl(&self) -> Option<Duration> {
        None
    }
}

/// Blanket implementation of SessionBackend for Arc-wrapped backends.
///
/// This allows sharing one process-wide backend between request handlers.
impl<T: SessionBackend + ?Sized> SessionBackend for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn load(&self, token: &str) -> Result<Option<Session>> {
        (**self).load(token)
    }

    fn save(&self, session: &Session) -> Result<String> {
        (**self).save(session)
    }

    fn destroy(&self, id: &str) -> Result<()> {
        (**self).destroy(id)
    }

    fn generate_identity(&self) -> String {
        (**self).generate_identity()
    }

    fn ttl(&self) -> Option<Duration> {
        (**self).ttl()
    }
}

/// Generate a random session identity (UUID v4, 32 hex chars).
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Check that a keyed-backend identity is safe to use as a storage key.
///
/// Accepts 1-128 ASCII alphanumerics, `-` and `_`. Anything else (path
/// separators, dots, whitespace) is treated as an unknown session.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
