//! Session storage backends for Satchel.
//!
//! This module provides persistence for session records, supporting an
//! inline signed-token backend and keyed file and in-memory backends.

pub mod cookie;
pub mod factory;
pub mod file;
pub mod memory;
pub mod traits;

pub use cookie::CookieBackend;
pub use factory::{BackendKind, ConfiguredBackend};
pub use file::{FileBackend, StoredSession};
pub use memory::MemoryBackend;
pub use traits::{generate_session_id, SessionBackend};
