//! Request-scoped session handle.
//!
//! A `SessionStore` lives for exactly one request cycle: it is loaded from
//! the token the client presented, mutated by request handling, and saved
//! once at response time. Dropping it without saving discards every
//! pending mutation, which is how request cancellation is honoured.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::flash::{self, Flash};
use crate::core::session::Session;
use crate::error::{FailOpen, Result, SatchelError};
use crate::storage::SessionBackend;

/// What the transport collaborator must do with the client's token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Send this token to the client.
    Set(String),
    /// Tell the client to drop its token.
    Clear,
    /// Nothing to send; the client had no token and still needs none.
    Unchanged,
}

impl Transport {
    /// Token to send, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Set(token) => Some(token),
            Self::Clear | Self::Unchanged => None,
        }
    }
}

/// Session handle for one request cycle.
#[derive(Debug)]
pub struct SessionStore<'b, B: SessionBackend + ?Sized> {
    /// Process-wide backend.
    backend: &'b B,
    /// The session being worked on.
    session: Session,
    /// Flash values visible only in this cycle.
    now: BTreeMap<String, Value>,
    /// Whether the backend currently holds a record for `session.id`.
    persisted: bool,
    /// Whether the client presented a token this cycle.
    presented_token: bool,
    /// Whether `reset` issued a new identity this cycle.
    renewed: bool,
    /// Whether the end-of-cycle flash sweep has been committed.
    swept: bool,
    /// Inactivity TTL applied on save.
    ttl: Option<Duration>,
}

impl<'b, B: SessionBackend + ?Sized> SessionStore<'b, B> {
    /// Load the session for a transported token.
    ///
    /// Returns an empty session with a new identity when there is no token,
    /// no stored data, or the token fails verification. Fails only when the
    /// backend is unavailable.
    pub fn load(backend: &'b B, token: Option<&str>) -> Result<Self> {
        let token = token.filter(|t| !t.is_empty());

        let found = match token {
            Some(token) => match backend.load(token) {
                Err(e) if !e.is_fail_open() => return Err(e),
                result => result.fail_open_default("loading session"),
            },
            None => None,
        };

        let persisted = found.is_some();
        let session = match found {
            Some(session) => session,
            None => Session::new(backend.generate_identity()),
        };

        debug!(
            backend = backend.name(),
            session_id = %session.id,
            new = !persisted,
            "session loaded"
        );

        Ok(Self {
            backend,
            session,
            now: BTreeMap::new(),
            persisted,
            presented_token: token.is_some(),
            renewed: false,
            swept: false,
            ttl: backend.ttl(),
        })
    }

    /// Expire the saved session after `ttl` of inactivity.
    ///
    /// Overrides the backend's own [`SessionBackend::ttl`] for this cycle.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Current identity.
    pub fn id(&self) -> &str {
        &self.session.id
    }

    /// Whether no stored session was found for the presented token.
    pub fn is_new(&self) -> bool {
        !self.persisted
    }

    /// Whether `reset` issued a new identity this cycle.
    pub fn is_renewed(&self) -> bool {
        self.renewed
    }

    /// Read-only view of the underlying record.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Get a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.session.data.get(key)
    }

    /// Get a value converted to `T`.
    ///
    /// Fails with a serialization error if the stored value has another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|value| T::deserialize(value).map_err(SatchelError::from))
            .transpose()
    }

    /// Get a value converted to `T`, or `default` if absent.
    pub fn fetch<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get_as(key)?.unwrap_or(default))
    }

    /// Whether a key is set.
    pub fn contains_key(&self, key: &str) -> bool {
        self.session.data.contains_key(key)
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.session.data.keys().map(String::as_str)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.session.data.len()
    }

    /// Whether no key is set.
    pub fn is_empty(&self) -> bool {
        self.session.data.is_empty()
    }

    /// Set a value, returning the previous one.
    ///
    /// The value is converted before anything is touched, so a conversion
    /// failure leaves the session unchanged.
    pub fn set<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Option<Value>> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| SatchelError::unserializable(&key, e.to_string()))?;
        Ok(self.session.data.insert(key, value))
    }

    /// Remove a value, returning it.
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.session.data.remove(key)
    }

    /// Remove every value. Identity and flash are kept.
    pub fn clear(&mut self) {
        self.session.data.clear();
    }

    /// Flash view for this cycle.
    pub fn flash(&mut self) -> Flash<'_> {
        Flash::new(&mut self.session.flash, &mut self.now)
    }

    /// Discard all data and issue a new identity.
    ///
    /// The old identity is destroyed in the backend right away, so a later
    /// load under it finds nothing (keyed backends). The next save sends
    /// the new token.
    pub fn reset(&mut self) -> Result<()> {
        let old_id = self.session.id.clone();
        if self.persisted {
            self.backend.destroy(&old_id)?;
        }

        self.session = Session::new(self.backend.generate_identity());
        self.now.clear();
        self.persisted = false;
        self.renewed = true;

        debug!(
            backend = self.backend.name(),
            old_session_id = %old_id,
            session_id = %self.session.id,
            "session reset"
        );
        Ok(())
    }

    /// End the cycle: rotate the flash and persist through the backend.
    ///
    /// On error nothing changes, flash markers included, so the caller can
    /// shrink the session and retry. The flash sweep is committed by the
    /// first successful save only; later saves persist without rotating.
    pub fn save(&mut self) -> Result<Transport> {
        let mut outgoing = self.session.clone();
        let removed = if self.swept {
            0
        } else {
            flash::sweep(&mut outgoing.flash)
        };

        if outgoing.is_empty() {
            if self.persisted {
                self.backend.destroy(&outgoing.id)?;
            }
            let transport = if self.persisted || self.presented_token || self.renewed {
                Transport::Clear
            } else {
                Transport::Unchanged
            };

            self.commit(outgoing, false);
            debug!(session_id = %self.session.id, ?transport, "empty session not stored");
            return Ok(transport);
        }

        outgoing.touch(self.ttl);
        let token = self.backend.save(&outgoing)?;

        self.commit(outgoing, true);
        debug!(
            backend = self.backend.name(),
            session_id = %self.session.id,
            size = token.len(),
            flash_removed = removed,
            "session saved"
        );
        Ok(Transport::Set(token))
    }

    fn commit(&mut self, session: Session, persisted: bool) {
        self.session = session;
        self.persisted = persisted;
        self.swept = true;
    }
}
