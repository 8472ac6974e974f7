//! Sessions command for Satchel.
//!
//! Lists sessions stored by the file backend, most recently saved first,
//! useful for finding session IDs to pass to `satchel show`.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{FileBackend, StoredSession};

/// Options for the sessions command.
#[derive(Debug, Clone, Default)]
pub struct SessionsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Maximum number of sessions to show.
    pub limit: usize,
}

/// Summary of a single session for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session ID.
    pub id: String,
    /// Number of data keys.
    pub keys: usize,
    /// Number of flash entries.
    pub flash: usize,
    /// Size on disk in bytes.
    pub bytes: u64,
    /// Last saved timestamp (ISO 8601).
    pub updated_at: String,
    /// Expiry timestamp (ISO 8601), if a TTL applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl From<&StoredSession> for SessionSummary {
    fn from(stored: &StoredSession) -> Self {
        let session = &stored.session;
        Self {
            id: session.id.clone(),
            keys: session.data.len(),
            flash: session.flash.len(),
            bytes: stored.bytes,
            updated_at: session.updated_at.to_rfc3339(),
            expires_at: session.expires_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Output format for the sessions command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsOutput {
    /// Whether the command was successful.
    pub success: bool,
    /// List of session summaries.
    pub sessions: Vec<SessionSummary>,
    /// Total count of sessions returned.
    pub count: usize,
    /// Error message if command failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionsOutput {
    /// Create a successful output.
    pub fn success(sessions: Vec<SessionSummary>) -> Self {
        let count = sessions.len();
        Self {
            success: true,
            sessions,
            count,
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            sessions: vec![],
            count: 0,
            error: Some(error.into()),
        }
    }

    /// Format as human-readable text.
    pub fn format_text(&self) -> String {
        if !self.success {
            return format!(
                "Sessions failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }

        if self.sessions.is_empty() {
            return "No sessions found.".to_string();
        }

        let mut lines = vec![format!("Sessions ({} found):", self.count)];
        lines.push(String::new());

        lines.push(format!(
            "{:<32}  {:>4}  {:>5}  {:<19}  {}",
            "ID", "KEYS", "FLASH", "UPDATED", "EXPIRES"
        ));
        lines.push("-".repeat(90));

        for session in &self.sessions {
            // RFC 3339 is ASCII; keep YYYY-MM-DDTHH:MM:SS
            let updated: String = session.updated_at.chars().take(19).collect();
            let expires: String = match &session.expires_at {
                Some(t) => t.chars().take(19).collect(),
                None => "-".to_string(),
            };
            lines.push(format!(
                "{:<32}  {:>4}  {:>5}  {:<19}  {}",
                session.id, session.keys, session.flash, updated, expires
            ));
        }

        lines.join("\n")
    }
}

/// The sessions command implementation.
pub struct SessionsCommand {
    backend: FileBackend,
}

impl SessionsCommand {
    /// Create a new sessions command.
    pub fn new(backend: FileBackend) -> Self {
        Self { backend }
    }

    /// Run the sessions command.
    pub fn run(&self, options: &SessionsOptions) -> SessionsOutput {
        match self.list_sessions(options.limit) {
            Ok(sessions) => {
                let summaries: Vec<SessionSummary> =
                    sessions.iter().map(SessionSummary::from).collect();
                SessionsOutput::success(summaries)
            }
            Err(e) => SessionsOutput::failure(format!("Failed to list sessions: {}", e)),
        }
    }

    fn list_sessions(&self, limit: usize) -> Result<Vec<StoredSession>> {
        self.backend.list(limit)
    }
}
