//! Backend selection from configuration.
//!
//! The backend is chosen once at process start. `ConfiguredBackend` is a
//! closed enum over the shipped variants so callers hold one concrete type
//! instead of a trait object.

use std::fmt;

use chrono::Duration;

use crate::config::Config;
use crate::core::Session;
use crate::error::{Result, SatchelError};
use crate::storage::{CookieBackend, FileBackend, MemoryBackend, SessionBackend};

/// Backend variants selectable by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Signed inline token.
    Cookie,
    /// In-process keyed store.
    Memory,
    /// JSON files keyed by identity.
    File,
}

impl BackendKind {
    /// Parse a backend kind from its config name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cookie" => Some(Self::Cookie),
            "memory" => Some(Self::Memory),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    /// Whether session data lives server-side, addressed by identity.
    pub fn is_keyed(&self) -> bool {
        !matches!(self, Self::Cookie)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cookie => write!(f, "cookie"),
            Self::Memory => write!(f, "memory"),
            Self::File => write!(f, "file"),
        }
    }
}

/// The backend selected by configuration.
#[derive(Debug)]
pub enum ConfiguredBackend {
    Cookie(CookieBackend),
    Memory(MemoryBackend),
    File(FileBackend),
}

impl ConfiguredBackend {
    /// Build the backend named by `config.session.backend`.
    ///
    /// Fails with a config error if the backend is unknown, the cookie
    /// secret is missing or too short, or the sessions directory cannot
    /// be determined or created.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let kind = BackendKind::parse(&config.session.backend).ok_or_else(|| {
            SatchelError::config(format!(
                "unknown session backend '{}'",
                config.session.backend
            ))
        })?;
        let max_size = config.session.max_size_bytes;
        let ttl = config.session.ttl();

        let backend = match kind {
            BackendKind::Cookie => {
                let secret = config.cookie.secret.as_deref().ok_or_else(|| {
                    SatchelError::config(
                        "cookie backend requires [cookie].secret or SATCHEL_SECRET",
                    )
                })?;
                let mut backend = CookieBackend::new(secret)?
                    .with_previous_secrets(&config.cookie.previous_secrets)?
                    .with_ttl(ttl);
                if let Some(limit) = max_size {
                    backend = backend.with_max_size(limit);
                }
                Self::Cookie(backend)
            }
            BackendKind::Memory => Self::Memory(
                MemoryBackend::new()
                    .with_max_size(max_size)
                    .with_ttl(ttl),
            ),
            BackendKind::File => {
                let dir = config.sessions_dir().ok_or_else(|| {
                    SatchelError::config("Could not determine sessions directory")
                })?;
                Self::File(
                    FileBackend::with_dir(dir)?
                        .with_max_size(max_size)
                        .with_ttl(ttl),
                )
            }
        };

        tracing::debug!(
            backend = %kind,
            ttl_seconds = ttl.map(|t| t.num_seconds()),
            "session backend configured"
        );
        Ok(backend)
    }

    /// Which variant this is.
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Cookie(_) => BackendKind::Cookie,
            Self::Memory(_) => BackendKind::Memory,
            Self::File(_) => BackendKind::File,
        }
    }
}

impl SessionBackend for ConfiguredBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Cookie(b) => b.name(),
            Self::Memory(b) => b.name(),
            Self::File(b) => b.name(),
        }
    }

    fn load(&self, token: &str) -> Result<Option<Session>> {
        match self {
            Self::Cookie(b) => b.load(token),
            Self::Memory(b) => b.load(token),
            Self::File(b) => b.load(token),
        }
    }

    fn save(&self, session: &Session) -> Result<String> {
        match self {
            Self::Cookie(b) => b.save(session),
            Self::Memory(b) => b.save(session),
            Self::File(b) => b.save(session),
        }
    }

    fn destroy(&self, id: &str) -> Result<()> {
        match self {
            Self::Cookie(b) => b.destroy(id),
            Self::Memory(b) => b.destroy(id),
            Self::File(b) => b.destroy(id),
        }
    }

    fn generate_identity(&self) -> String {
        match self {
            Self::Cookie(b) => b.generate_identity(),
            Self::Memory(b) => b.generate_identity(),
            Self::File(b) => b.generate_identity(),
        }
    }

    fn ttl(&self) -> Option<Duration> {
        match self {
            Self::Cookie(b) => b.ttl(),
            Self::Memory(b) => b.ttl(),
            Self::File(b) => b.ttl(),
        }
    }
}
