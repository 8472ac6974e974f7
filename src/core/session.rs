//! Session record types for Satchel.
//!
//! A `Session` is the unit a backend persists: the client's key/value data
//! plus the reserved flash sub-map. Request handling never touches these
//! fields directly; it goes through [`SessionStore`](crate::core::SessionStore)
//! and [`Flash`](crate::core::Flash).

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved key the flash sub-map is serialized under.
pub const FLASH_KEY: &str = "_flash";

/// Flash entries keyed by flash key.
pub type FlashMap = BTreeMap<String, FlashEntry>;

/// Persisted session for one client identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Identity correlating the client to this record.
    pub id: String,
    /// Controller-visible key/value data.
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
    /// Flash entries, tagged with their lifecycle marker.
    #[serde(rename = "_flash", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flash: FlashMap,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last saved.
    pub updated_at: DateTime<Utc>,
    /// When the session stops being loadable, if a TTL applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create an empty session with the given identity.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            data: BTreeMap::new(),
            flash: FlashMap::new(),
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    /// Whether there is nothing worth persisting.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.flash.is_empty()
    }

    /// Whether the session expired before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether the session has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Stamp `updated_at` and push `expires_at` out by `ttl` (if any).
    pub fn touch(&mut self, ttl: Option<Duration>) {
        self.updated_at = Utc::now();
        self.expires_at = ttl.map(|ttl| self.updated_at + ttl);
    }
}

/// Lifecycle position of a flash entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    /// Written (or kept) during the current cycle.
    #[default]
    Fresh,
    /// Written in the previous cycle; delivered to this one.
    Carried,
    /// Readable now, removed by the next sweep.
    Stale,
}

impl Marker {
    /// Marker after an end-of-cycle sweep, or `None` if the entry is dropped.
    pub fn rotate(self) -> Option<Marker> {
        match self {
            Marker::Fresh => Some(Marker::Carried),
            Marker::Carried | Marker::Stale => None,
        }
    }
}

/// A flash value with its marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlashEntry {
    pub value: Value,
    pub marker: Marker,
}

impl FlashEntry {
    /// Create a fresh entry.
    pub fn fresh(value: Value) -> Self {
        Self {
            value,
            marker: Marker::Fresh,
        }
    }
}
