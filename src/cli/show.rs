//! Show command for Satchel.
//!
//! Prints one stored session from the file backend, including flash
//! entries and their lifecycle markers.

use serde::{Deserialize, Serialize};

use crate::core::{Marker, Session};
use crate::storage::{FileBackend, SessionBackend};

/// Options for the show command.
#[derive(Debug, Clone, Default)]
pub struct ShowOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the show command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowOutput {
    /// Whether the session was found.
    pub success: bool,
    /// The stored session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    /// Error message if command failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ShowOutput {
    /// Create a successful output.
    pub fn success(session: Session) -> Self {
        Self {
            success: true,
            session: Some(session),
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            session: None,
            error: Some(error.into()),
        }
    }
}

/// The show command implementation.
pub struct ShowCommand {
    backend: FileBackend,
}

impl ShowCommand {
    /// Create a new show command.
    pub fn new(backend: FileBackend) -> Self {
        Self { backend }
    }

    /// Run the show command.
    pub fn run(&self, session_id: &str) -> ShowOutput {
        match self.backend.load(session_id) {
            Ok(Some(session)) => ShowOutput::success(session),
            Ok(None) => ShowOutput::failure(format!("Session not found: {}", session_id)),
            Err(e) => ShowOutput::failure(format!("Failed to load session: {}", e)),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ShowOutput, options: &ShowOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        match (&output.session, output.success) {
            (Some(session), true) => format_session(session),
            _ => format!(
                "Error: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// Render a session as text. Shared with `decode`.
pub(crate) fn format_session(session: &Session) -> String {
    let mut lines = vec![
        format!("Session: {}", session.id),
        format!("  created: {}", session.created_at.to_rfc3339()),
        format!("  updated: {}", session.updated_at.to_rfc3339()),
        format!(
            "  expires: {}",
            session
                .expires_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        ),
        String::new(),
    ];

    if session.data.is_empty() {
        lines.push("Data: (empty)".to_string());
    } else {
        lines.push(format!("Data ({} keys):", session.data.len()));
        for (key, value) in &session.data {
            lines.push(format!("  {} = {}", key, value));
        }
    }

    if !session.flash.is_empty() {
        lines.push(String::new());
        lines.push(format!("Flash ({} entries):", session.flash.len()));
        for (key, entry) in &session.flash {
            lines.push(format!(
                "  {} = {} [{}]",
                key,
                entry.value,
                marker_label(entry.marker)
            ));
        }
    }

    lines.join("\n") + "\n"
}

fn marker_label(marker: Marker) -> &'static str {
    match marker {
        Marker::Fresh => "fresh",
        Marker::Carried => "carried",
        Marker::Stale => "stale",
    }
}
