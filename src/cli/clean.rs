//! Clean command for Satchel.
//!
//! Purges expired and idle session files from the file backend, plus
//! orphaned temp files left behind by interrupted writes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::Session;
use crate::storage::FileBackend;

/// Options for the clean command.
#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Also remove sessions idle longer than this (e.g., "7d", "24h").
    pub before: Option<String>,
    /// Also remove orphaned temp files.
    pub orphans: bool,
    /// Report what would be removed without removing it.
    pub dry_run: bool,
}

/// Output format for the clean command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanOutput {
    pub success: bool,
    /// Removed session ids, sorted.
    pub deleted_ids: Vec<String>,
    pub orphans_deleted: usize,
    pub bytes_freed: u64,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CleanOutput {
    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// The clean command implementation.
pub struct CleanCommand {
    backend: FileBackend,
}

impl CleanCommand {
    /// Create a clean command over a file backend's directory.
    pub fn new(backend: FileBackend) -> Self {
        Self { backend }
    }

    /// Run the clean command.
    pub fn run(&self, options: &CleanOptions) -> CleanOutput {
        let now = Utc::now();
        let idle_cutoff = match options.before.as_deref().map(idle_cutoff).transpose() {
            Ok(cutoff) => cutoff,
            Err(e) => return CleanOutput::failure(e),
        };

        let stored = match self.backend.scan() {
            Ok(stored) => stored,
            Err(e) => return CleanOutput::failure(format!("Failed to scan sessions: {}", e)),
        };

        let mut output = CleanOutput {
            success: true,
            dry_run: options.dry_run,
            ..Default::default()
        };

        for entry in stored {
            if is_stale(&entry.session, now, idle_cutoff) && remove(&entry.path, options.dry_run)
            {
                output.deleted_ids.push(entry.session.id);
                output.bytes_freed += entry.bytes;
            }
        }

        if options.orphans {
            for (path, bytes) in self.orphan_files() {
                if remove(&path, options.dry_run) {
                    output.orphans_deleted += 1;
                    output.bytes_freed += bytes;
                }
            }
        }

        output.deleted_ids.sort();
        output
    }

    /// Temp files in the sessions directory, with their sizes.
    fn orphan_files(&self) -> Vec<(PathBuf, u64)> {
        let Ok(entries) = fs::read_dir(self.backend.dir()) else {
            return Vec::new();
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| FileBackend::is_temp_file(&entry.path()))
            .map(|entry| {
                let bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
                (entry.path(), bytes)
            })
            .collect()
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &CleanOutput, options: &CleanOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        if !output.success {
            return format!(
                "Clean failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let mut text = format!(
            "{}Removed {} session(s), {} orphan(s), {} bytes\n",
            if output.dry_run { "[dry-run] " } else { "" },
            output.deleted_ids.len(),
            output.orphans_deleted,
            output.bytes_freed
        );
        for id in &output.deleted_ids {
            text.push_str(&format!("  {}\n", id));
        }
        text
    }
}

fn is_stale(session: &Session, now: DateTime<Utc>, idle_cutoff: Option<DateTime<Utc>>) -> bool {
    session.is_expired_at(now) || idle_cutoff.is_some_and(|cutoff| session.updated_at < cutoff)
}

/// Remove one file unless this is a dry run. Failures are logged and skipped.
fn remove(path: &Path, dry_run: bool) -> bool {
    if dry_run {
        return true;
    }
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove (continuing)");
            false
        }
    }
}

/// Turn a `--before` duration into the idle cutoff instant.
fn idle_cutoff(before: &str) -> Result<DateTime<Utc>, String> {
    let duration = parse_duration(before)?;
    Utc::now()
        .checked_sub_signed(duration)
        .ok_or_else(|| format!("Duration too large: {}", before))
}

/// Parse a duration string like "7d", "24h", "30m". A bare number is days.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = match s.char_indices().last() {
        Some((i, c @ ('d' | 'h' | 'm' | 's'))) => (&s[..i], c),
        _ => (s, 'd'),
    };

    let num: i64 = num_str
        .parse()
        .map_err(|_| format!("Invalid duration number: {}", num_str))?;
    if num <= 0 {
        return Err("Duration must be positive".to_string());
    }

    let duration = match unit {
        'd' => Duration::try_days(num),
        'h' => Duration::try_hours(num),
        'm' => Duration::try_minutes(num),
        _ => Duration::try_seconds(num),
    };
    duration.ok_or_else(|| format!("Duration out of range: {}", s))
}
