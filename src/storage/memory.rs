//! In-memory session backend.
//!
//! Keyed server-side store held in process memory. Useful for tests and
//! single-process deployments; data is lost when the backend is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};

use crate::core::Session;
use crate::error::{Result, SatchelError};
use crate::storage::traits::is_valid_session_id;
use crate::storage::SessionBackend;
use crate::util::ensure_within_limit;

const NAME: &str = "memory";

/// Expired records are swept from the map once every this many saves.
pub const PURGE_INTERVAL: usize = 64;

/// One encoded session and its expiry, kept apart so sweeps skip decoding.
#[derive(Debug)]
struct Record {
    encoded: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Record {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

type Records = HashMap<String, Record>;

/// In-memory session backend.
///
/// Thread-safe implementation using `RwLock<HashMap>`. Records are stored
/// as encoded JSON so size limits measure the same bytes a remote store
/// would hold. Abandoned sessions are dropped by a periodic sweep on save.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Encoded sessions keyed by identity.
    sessions: RwLock<Records>,
    /// Optional capacity bound per session.
    max_size_bytes: Option<usize>,
    /// Inactivity TTL applied by `SessionStore`.
    ttl: Option<Duration>,
    /// Saves since creation, drives the sweep.
    saves: AtomicUsize,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a per-session capacity bound.
    pub fn with_max_size(mut self, max_size_bytes: Option<usize>) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// Expire sessions after `ttl` of inactivity.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Get the number of stored sessions (expired ones included).
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Check if the backend is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Clear all sessions.
    pub fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    /// Drop expired sessions. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        Ok(Self::purge(&mut *self.write()?))
    }

    fn purge(sessions: &mut Records) -> usize {
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired(now));
        before - sessions.len()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Records>> {
        self.sessions
            .read()
            .map_err(|_| SatchelError::backend_unavailable(NAME, "session map lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Records>> {
        self.sessions
            .write()
            .map_err(|_| SatchelError::backend_unavailable(NAME, "session map lock poisoned"))
    }
}

impl SessionBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn load(&self, token: &str) -> Result<Option<Session>> {
        if !is_valid_session_id(token) {
            return Ok(None);
        }

        let encoded = match self.read()?.get(token) {
            Some(record) => record.encoded.clone(),
            None => return Ok(None),
        };

        let session: Session = serde_json::from_str(&encoded)?;
        if session.is_expired() {
            self.write()?.remove(token);
            return Ok(None);
        }

        Ok(Some(session))
    }

    fn save(&self, session: &Session) -> Result<String> {
        let encoded = serde_json::to_string(session)?;
        ensure_within_limit(encoded.len(), self.max_size_bytes)?;

        let mut sessions = self.write()?;
        if (self.saves.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_INTERVAL == 0 {
            let removed = Self::purge(&mut sessions);
            if removed > 0 {
                tracing::debug!(removed, "purged expired memory sessions");
            }
        }
        sessions.insert(
            session.id.clone(),
            Record {
                encoded,
                expires_at: session.expires_at,
            },
        );
        Ok(session.id.clone())
    }

    fn destroy(&self, id: &str) -> Result<()> {
        self.write()?.remove(id);
        Ok(())
    }

    fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::tests::test_keyed_backend_roundtrip;
    use chrono::{Duration, Utc};
    use serde_json::json;

    #[test]
    fn test_memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        test_keyed_backend_roundtrip(&backend);
    }

    #[test]
    fn test_new_backend_is_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.is_empty().unwrap());
        assert_eq!(backend.len().unwrap(), 0);
    }

    #[test]
    fn test_len_and_clear() {
        let backend = MemoryBackend::new();
        backend.save(&Session::new("s1")).unwrap();
        backend.save(&Session::new("s2")).unwrap();
        assert_eq!(backend.len().unwrap(), 2);

        backend.clear().unwrap();
        assert!(backend.is_empty().unwrap());
    }

    #[test]
    fn test_expired_session_not_loaded() {
        let backend = MemoryBackend::new();
        let mut session = Session::new("s1");
        session.expires_at = Some(Utc::now() - Duration::seconds(1));
        backend.save(&session).unwrap();

        assert!(backend.load("s1").unwrap().is_none());
        // Expired record is dropped on access
        assert!(backend.is_empty().unwrap());
    }

    #[test]
    fn test_purge_expired() {
        let backend = MemoryBackend::new();
        let mut expired = Session::new("old");
        expired.expires_at = Some(Utc::now() - Duration::seconds(1));
        backend.save(&expired).unwrap();
        backend.save(&Session::new("live")).unwrap();

        assert_eq!(backend.purge_expired().unwrap(), 1);
        assert_eq!(backend.len().unwrap(), 1);
        assert!(backend.load("live").unwrap().is_some());
    }

    #[test]
    fn test_abandoned_expired_session_swept_on_save() {
        let backend = MemoryBackend::new();
        let mut abandoned = Session::new("abandoned");
        abandoned.expires_at = Some(Utc::now() - Duration::seconds(1));
        backend.save(&abandoned).unwrap();

        // Never loaded again; later saves from other clients sweep it
        for i in 0..PURGE_INTERVAL {
            backend.save(&Session::new(format!("live{}", i))).unwrap();
        }

        assert_eq!(backend.len().unwrap(), PURGE_INTERVAL);
        assert!(!backend.read().unwrap().contains_key("abandoned"));
    }

    #[test]
    fn test_poisoned_lock_is_backend_unavailable() {
        use std::sync::Arc;

        let backend = Arc::new(MemoryBackend::new());
        let poisoner = Arc::clone(&backend);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.sessions.write().unwrap();
            panic!("poison the session map");
        })
        .join();

        assert!(matches!(
            backend.len().unwrap_err(),
            SatchelError::BackendUnavailable { .. }
        ));
        assert!(backend.is_empty().is_err());
        assert!(backend.save(&Session::new("s1")).is_err());
    }

    #[test]
    fn test_size_limit_rejects_save() {
        let backend = MemoryBackend::new().with_max_size(Some(200));
        let mut session = Session::new("s1");
        session
            .data
            .insert("blob".to_string(), json!("x".repeat(500)));

        let err = backend.save(&session).unwrap_err();
        assert!(matches!(err, SatchelError::SizeLimitExceeded { limit: 200, .. }));
        assert!(backend.is_empty().unwrap());
    }

    #[test]
    fn test_invalid_token_is_unknown_session() {
        let backend = MemoryBackend::new();
        assert!(backend.load("../../etc/passwd").unwrap().is_none());
        assert!(backend.load("").unwrap().is_none());
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let backend = Arc::new(MemoryBackend::new());
        let mut handles = vec![];

        for i in 0..10 {
            let backend = Arc::clone(&backend);
            handles.push(thread::spawn(move || {
                let session = Session::new(format!("s{}", i));
                backend.save(&session).unwrap();
                backend.load(&format!("s{}", i)).unwrap().unwrap();
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(backend.len().unwrap(), 10);
    }
}
