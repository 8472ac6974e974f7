//! Decode command for Satchel.
//!
//! Verifies a cookie token against the configured secrets and prints the
//! session it carries. Handy when a client reports being logged out: a
//! tampered or expired token shows up here instead of silently becoming an
//! empty session.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cli::show::format_session;
use crate::config::SessionConfig;
use crate::core::Session;
use crate::error::SatchelError;
use crate::storage::CookieBackend;

/// Options for the decode command.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the decode command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeOutput {
    /// Whether the token verified and is still loadable.
    pub success: bool,
    /// Whether the signature check failed.
    pub tampered: bool,
    /// Whether the token verified but its session has expired.
    pub expired: bool,
    /// Token length in bytes.
    pub bytes: usize,
    /// The decoded session, when the signature verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    /// Error message if command failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DecodeOutput {
    /// Create an output for a verified token.
    pub fn verified(session: Session, bytes: usize) -> Self {
        let expired = session.is_expired_at(Utc::now());
        Self {
            success: !expired,
            tampered: false,
            expired,
            bytes,
            session: Some(session),
            error: expired.then(|| "session has expired".to_string()),
        }
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>, tampered: bool, bytes: usize) -> Self {
        Self {
            success: false,
            tampered,
            expired: false,
            bytes,
            session: None,
            error: Some(error.into()),
        }
    }
}

/// The decode command implementation.
pub struct DecodeCommand {
    backend: CookieBackend,
    /// Name the token travels under, for the report header.
    key: String,
}

impl DecodeCommand {
    /// Create a new decode command.
    pub fn new(backend: CookieBackend) -> Self {
        Self {
            backend,
            key: SessionConfig::default().key,
        }
    }

    /// Report the token under the configured `[session].key`.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Run the decode command.
    pub fn run(&self, token: &str) -> DecodeOutput {
        let token = token.trim();
        match self.backend.decode(token) {
            Ok(session) => DecodeOutput::verified(session, token.len()),
            Err(e @ SatchelError::TamperDetected { .. }) => {
                DecodeOutput::failure(e.to_string(), true, token.len())
            }
            Err(e) => DecodeOutput::failure(e.to_string(), false, token.len()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &DecodeOutput, options: &DecodeOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        let status = if output.tampered {
            "TAMPERED"
        } else if output.expired {
            "EXPIRED"
        } else if output.success {
            "valid"
        } else {
            "invalid"
        };

        let mut text = format!(
            "Token: {} ({} bytes, limit {})\nKey: {}\n",
            status,
            output.bytes,
            self.backend.max_size_bytes(),
            self.key
        );

        if let Some(error) = &output.error {
            text.push_str(&format!("Error: {}\n", error));
        }
        if let Some(session) = &output.session {
            text.push('\n');
            text.push_str(&format_session(session));
        }

        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SessionBackend;
    use chrono::Duration;
    use serde_json::json;

    const SECRET: &str = "decode-command-test-secret-0123456789";

    fn token_for(session: &Session) -> String {
        CookieBackend::new(SECRET).unwrap().save(session).unwrap()
    }

    fn command() -> DecodeCommand {
        DecodeCommand::new(CookieBackend::new(SECRET).unwrap())
    }

    #[test]
    fn test_decode_valid_token() {
        let mut session = Session::new("sid");
        session.data.insert("current_user_id".to_string(), json!(42));
        let token = token_for(&session);

        let cmd = command();
        let output = cmd.run(&token);

        assert!(output.success);
        assert!(!output.tampered);
        assert_eq!(output.bytes, token.len());
        assert_eq!(output.session.as_ref().unwrap().id, "sid");

        let text = cmd.format_output(&output, &DecodeOptions::default());
        assert!(text.starts_with("Token: valid"));
        assert!(text.contains("Key: _satchel_session"));
        assert!(text.contains("current_user_id = 42"));
    }

    #[test]
    fn test_decode_reports_configured_key() {
        let token = token_for(&Session::new("sid"));
        let cmd = command().with_key("app_session");
        let output = cmd.run(&token);

        let text = cmd.format_output(&output, &DecodeOptions::default());
        assert!(text.contains("Key: app_session"));
    }

    #[test]
    fn test_decode_tolerates_surrounding_whitespace() {
        let token = token_for(&Session::new("sid"));
        assert!(command().run(&format!("  {}\n", token)).success);
    }

    #[test]
    fn test_decode_tampered_token() {
        let token = token_for(&Session::new("sid"));
        let forged = format!("x{}", token);

        let cmd = command();
        let output = cmd.run(&forged);

        assert!(!output.success);
        assert!(output.tampered);
        assert!(output.session.is_none());
        assert!(cmd
            .format_output(&output, &DecodeOptions::default())
            .contains("TAMPERED"));
    }

    #[test]
    fn test_decode_expired_token() {
        let mut session = Session::new("sid");
        session.expires_at = Some(Utc::now() - Duration::minutes(1));
        let token = token_for(&session);

        let output = command().run(&token);

        assert!(!output.success);
        assert!(output.expired);
        assert!(!output.tampered);
        assert!(output.session.is_some());
    }

    #[test]
    fn test_decode_json_output() {
        let token = token_for(&Session::new("sid"));
        let cmd = command();
        let output = cmd.run(&token);

        let json = cmd.format_output(
            &output,
            &DecodeOptions {
                json: true,
                ..Default::default()
            },
        );
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["session"]["id"], "sid");
    }
}
