//! Core types and logic for Satchel.
//!
//! This module contains the session record, the flash lifecycle, and the
//! request-scoped store that ties them to a backend.

pub mod flash;
pub mod session;
pub mod store;

pub use flash::{sweep, Flash, ALERT, NOTICE};
pub use session::{FlashEntry, FlashMap, Marker, Session, FLASH_KEY};
pub use store::{SessionStore, Transport};
