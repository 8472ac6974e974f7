//! Satchel - request-scoped sessions with flash messages
//!
//! Satchel keeps per-client state across request cycles behind a pluggable
//! backend: a signed inline token, an in-process map, or JSON files. A
//! reserved flash sub-map carries one-shot messages that survive exactly
//! one request boundary unless kept.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod util;

pub use config::Config;
pub use core::{Flash, FlashEntry, Marker, Session, SessionStore, Transport};
pub use error::{FailOpen, Result, SatchelError};
pub use storage::{
    BackendKind, ConfiguredBackend, CookieBackend, FileBackend, MemoryBackend, SessionBackend,
};

// CLI commands
pub use cli::{CleanCommand, DecodeCommand, InitCommand, SessionsCommand, ShowCommand};
