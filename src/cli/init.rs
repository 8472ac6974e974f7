//! Init command for Satchel.
//!
//! Writes a project config with a freshly generated cookie secret and
//! creates the sessions directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Options for the init command.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Force overwrite existing files.
    pub force: bool,
}

/// Output format for the init command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitOutput {
    /// Whether initialization was successful.
    pub success: bool,
    /// Files and directories created.
    pub created: Vec<String>,
    /// Files that already existed (skipped).
    pub skipped: Vec<String>,
    /// Error message if initialization failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InitOutput {
    /// Create a successful output.
    pub fn success(created: Vec<String>, skipped: Vec<String>) -> Self {
        Self {
            success: true,
            created,
            skipped,
            error: None,
        }
    }

    /// Create a failed output with partial success information.
    ///
    /// This reports what was created before the failure occurred, so the user
    /// knows what partial state may have been left behind.
    pub fn failure(error: impl Into<String>, created: Vec<String>, skipped: Vec<String>) -> Self {
        Self {
            success: false,
            created,
            skipped,
            error: Some(error.into()),
        }
    }
}

/// Generate a 64-character hex signing secret.
pub fn generate_secret() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// The init command implementation.
pub struct InitCommand {
    cwd: PathBuf,
}

impl InitCommand {
    /// Create a new init command.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    /// Path of the project config this command writes.
    pub fn config_path(&self) -> PathBuf {
        self.cwd.join(".satchel").join("config.toml")
    }

    /// Run the init command.
    pub fn run(&self, options: &InitOptions) -> InitOutput {
        let mut created = Vec::new();
        let mut skipped = Vec::new();

        let config_path = self.config_path();
        if config_path.exists() && !options.force {
            skipped.push(config_path.display().to_string());
        } else {
            let mut config = Config::default();
            config.cookie.secret = Some(generate_secret());

            match config.save_project(&self.cwd) {
                Ok(path) => created.push(path.display().to_string()),
                Err(e) => return InitOutput::failure(e.to_string(), created, skipped),
            }
        }

        // Sessions directory as the merged config sees it
        let config = Config::load_from_cwd(&self.cwd);
        if let Some(sessions) = config.sessions_dir() {
            match Self::ensure_dir(&sessions) {
                Ok(true) => created.push(sessions.display().to_string()),
                Ok(false) => skipped.push(sessions.display().to_string()),
                Err(e) => return InitOutput::failure(e, created, skipped),
            }
        }

        InitOutput::success(created, skipped)
    }

    /// Ensure a directory exists.
    /// Returns Ok(true) if created, Ok(false) if already exists.
    fn ensure_dir(path: &Path) -> Result<bool, String> {
        if path.exists() {
            if path.is_dir() {
                return Ok(false);
            } else {
                return Err(format!("{} exists but is not a directory", path.display()));
            }
        }

        fs::create_dir_all(path)
            .map_err(|e| format!("Failed to create directory {}: {}", path.display(), e))?;

        Ok(true)
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &InitOutput, options: &InitOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    /// Format output as human-readable text.
    fn format_human_readable(&self, output: &InitOutput) -> String {
        let mut lines = Vec::new();

        if !output.success {
            lines.push(format!(
                "Init failed: {}",
                output.error.as_deref().unwrap_or("unknown error")
            ));

            if !output.created.is_empty() {
                lines.push(String::new());
                lines.push("Partially created before failure:".to_string());
                for path in &output.created {
                    lines.push(format!("  {}", path));
                }
            }

            return lines.join("\n") + "\n";
        }

        if output.created.is_empty() {
            return "Satchel already initialized. Use --force to regenerate the secret.\n"
                .to_string();
        }

        lines.push("Created:".to_string());
        for path in &output.created {
            lines.push(format!("  {}", path));
        }

        if !output.skipped.is_empty() {
            lines.push(String::new());
            lines.push("Already existed (skipped):".to_string());
            for path in &output.skipped {
                lines.push(format!("  {}", path));
            }
        }

        lines.push(String::new());
        lines.push("Keep .satchel/config.toml out of version control: it holds the signing secret."
            .to_string());

        lines.join("\n") + "\n"
    }
}
