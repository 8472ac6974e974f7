//! Flash messages for Satchel.
//!
//! The flash is a sub-partition of the session whose entries live for
//! exactly one cycle boundary past the cycle that wrote them. Entries move
//! `fresh -> carried -> removed` at each end-of-cycle sweep; `keep` sends
//! an entry back to `fresh`, `discard` marks it `stale`. Values written
//! with `now_set` sit in a request-local overlay and are never persisted.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::session::{FlashEntry, FlashMap, Marker};

/// Conventional key for informational messages.
pub const NOTICE: &str = "notice";

/// Conventional key for error messages.
pub const ALERT: &str = "alert";

/// Flash view over a session's flash sub-map and the request's now overlay.
///
/// All flash mutations go through this struct.
#[derive(Debug)]
pub struct Flash<'a> {
    /// Persisted entries (the session's reserved sub-map).
    entries: &'a mut FlashMap,
    /// Current-cycle-only values.
    now: &'a mut BTreeMap<String, Value>,
}

impl<'a> Flash<'a> {
    /// Create a flash view.
    pub fn new(entries: &'a mut FlashMap, now: &'a mut BTreeMap<String, Value>) -> Self {
        Self { entries, now }
    }

    /// Set a flash value for the next cycle (marker `fresh`).
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.now.remove(&key);
        self.entries.insert(key, FlashEntry::fresh(value.into()));
    }

    /// Get a flash value regardless of its marker.
    ///
    /// A value from `now_set` shadows a persisted entry with the same key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.now
            .get(key)
            .or_else(|| self.entries.get(key).map(|entry| &entry.value))
    }

    /// Get a flash value as a string slice.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Whether a flash value is visible this cycle.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Marker of a persisted entry.
    pub fn marker(&self, key: &str) -> Option<Marker> {
        self.entries.get(key).map(|entry| entry.marker)
    }

    /// Visible keys, overlay and persisted, sorted and deduplicated.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .now
            .keys()
            .chain(self.entries.keys())
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// Number of visible values.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether no value is visible this cycle.
    pub fn is_empty(&self) -> bool {
        self.now.is_empty() && self.entries.is_empty()
    }

    /// Write a value visible only during the current cycle.
    ///
    /// Any persisted entry under the same key is dropped so it is not
    /// delivered to the next cycle either.
    pub fn now_set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.entries.remove(&key);
        self.now.insert(key, value.into());
    }

    /// Keep an entry for one more cycle. Returns false if there is no such
    /// persisted entry.
    pub fn keep(&mut self, key: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.marker = Marker::Fresh;
                true
            }
            None => false,
        }
    }

    /// Keep every persisted entry for one more cycle.
    pub fn keep_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.marker = Marker::Fresh;
        }
    }

    /// Mark an entry for removal at the end of this cycle. It stays
    /// readable until then.
    pub fn discard(&mut self, key: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.marker = Marker::Stale;
                true
            }
            None => false,
        }
    }

    /// Mark every persisted entry for removal at the end of this cycle.
    pub fn discard_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.marker = Marker::Stale;
        }
    }

    /// Remove a value immediately, from both the overlay and the entries.
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        let from_now = self.now.remove(key);
        let from_entries = self.entries.remove(key).map(|entry| entry.value);
        from_now.or(from_entries)
    }

    /// Remove every flash value immediately.
    pub fn clear(&mut self) {
        self.now.clear();
        self.entries.clear();
    }

    /// Informational message, if any.
    pub fn notice(&self) -> Option<&str> {
        self.get_str(NOTICE)
    }

    /// Set the informational message for the next cycle.
    pub fn set_notice(&mut self, message: impl Into<String>) {
        self.set(NOTICE, message.into());
    }

    /// Error message, if any.
    pub fn alert(&self) -> Option<&str> {
        self.get_str(ALERT)
    }

    /// Set the error message for the next cycle.
    pub fn set_alert(&mut self, message: impl Into<String>) {
        self.set(ALERT, message.into());
    }
}

/// Rotate flash entries at the end of a cycle.
///
/// `fresh` entries become `carried`; `carried` and `stale` entries are
/// removed. Returns the number of removed entries.
pub fn sweep(entries: &mut FlashMap) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| match entry.marker.rotate() {
        Some(next) => {
            entry.marker = next;
            true
        }
        None => false,
    });
    before - entries.len()
}
