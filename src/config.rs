//! Configuration loading for Satchel.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.satchel/config.toml`)
//! 3. User config (`~/.satchel/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional except the cookie secret, which the
//! cookie backend refuses to start without.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;

use crate::error::{Result, SatchelError};

/// Main configuration struct for Satchel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Backend selection and session limits.
    pub session: SessionConfig,
    /// Cookie backend settings.
    pub cookie: CookieConfig,
    /// File backend settings.
    pub file: FileConfig,
}

/// Longest honoured TTL (100 years); larger values are clamped.
pub const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Valid values for the session backend field.
pub const VALID_BACKENDS: &[&str] = &["cookie", "memory", "file"];

/// Backend selection and session limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Backend: "cookie", "memory", or "file".
    pub backend: String,
    /// Name the transport collaborator stores the token under.
    ///
    /// Satchel never reads the token by name itself; `satchel decode`
    /// reports it so operators can match tokens to requests.
    pub key: String,
    /// Expire sessions after this many seconds of inactivity (0 = never).
    pub ttl_seconds: u64,
    /// Capacity bound for an encoded session. Cookie backend defaults to 4096.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<usize>,
}

impl SessionConfig {
    /// Check if a backend value is valid.
    pub fn is_valid_backend(value: &str) -> bool {
        VALID_BACKENDS.contains(&value)
    }

    /// Inactivity TTL, if enabled.
    pub fn ttl(&self) -> Option<Duration> {
        match self.ttl_seconds {
            0 => None,
            secs => Some(Duration::seconds(secs.min(MAX_TTL_SECONDS) as i64)),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: "cookie".to_string(),
            key: "_satchel_session".to_string(),
            ttl_seconds: 0,
            max_size_bytes: None,
        }
    }
}

/// Cookie backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CookieConfig {
    /// Signing secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Retired secrets still accepted when verifying tokens.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub previous_secrets: Vec<String>,
}

/// File backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// Session directory; defaults to `<satchel_home>/sessions`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration with full precedence chain.
    pub fn load() -> Self {
        // Fail-open: if cwd is unavailable, skip the project layer
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Load user config from `~/.satchel/config.toml`.
    fn load_user_config() -> Option<Config> {
        let home = satchel_home()?;
        Self::load_optional(&home.join("config.toml"))
    }

    /// Load project config from `.satchel/config.toml` in the given directory.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        Self::load_optional(&cwd.join(".satchel").join("config.toml"))
    }

    /// Load a config file if it exists, warning (not failing) on bad TOML.
    fn load_optional(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        match Self::load_from_file(path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                None
            }
        }
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| SatchelError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| SatchelError::config(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // SATCHEL_BACKEND
        if let Ok(val) = env::var("SATCHEL_BACKEND") {
            if SessionConfig::is_valid_backend(&val) {
                self.session.backend = val;
            } else {
                tracing::warn!(
                    "Invalid SATCHEL_BACKEND value '{}'. Valid values: {:?}. Using '{}'.",
                    val,
                    VALID_BACKENDS,
                    self.session.backend
                );
            }
        }

        // SATCHEL_SECRET
        if let Ok(val) = env::var("SATCHEL_SECRET") {
            if val.is_empty() {
                tracing::warn!("SATCHEL_SECRET is empty, ignoring");
            } else {
                self.cookie.secret = Some(val);
            }
        }

        // SATCHEL_TTL_SECONDS
        if let Ok(val) = env::var("SATCHEL_TTL_SECONDS") {
            match val.parse::<u64>() {
                Ok(n) => self.session.ttl_seconds = n,
                Err(_) => tracing::warn!(
                    "Invalid SATCHEL_TTL_SECONDS value '{}'. \
                    Expected a non-negative integer. Using '{}'.",
                    val,
                    self.session.ttl_seconds
                ),
            }
        }

        // SATCHEL_MAX_SIZE_BYTES
        if let Ok(val) = env::var("SATCHEL_MAX_SIZE_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => self.session.max_size_bytes = Some(n),
                _ => tracing::warn!(
                    "Invalid SATCHEL_MAX_SIZE_BYTES value '{}'. \
                    Expected a positive integer. Using '{:?}'.",
                    val,
                    self.session.max_size_bytes
                ),
            }
        }

        // SATCHEL_SESSIONS_DIR
        if let Ok(val) = env::var("SATCHEL_SESSIONS_DIR") {
            if !val.is_empty() {
                self.file.dir = Some(PathBuf::from(val));
            }
        }
    }

    /// Merge another config into this one.
    ///
    /// The `other` config takes precedence. Non-default fields from `other`
    /// are applied field by field.
    ///
    /// # Limitation
    ///
    /// A layer cannot set a value back to its default to undo a non-default
    /// value from a lower layer (e.g. `backend = "cookie"` in the project
    /// file cannot override `backend = "file"` in the user file).
    fn merge(mut self, other: Config) -> Self {
        let default_session = SessionConfig::default();
        if other.session.backend != default_session.backend {
            self.session.backend = other.session.backend;
        }
        if other.session.key != default_session.key {
            self.session.key = other.session.key;
        }
        if other.session.ttl_seconds != default_session.ttl_seconds {
            self.session.ttl_seconds = other.session.ttl_seconds;
        }
        if other.session.max_size_bytes.is_some() {
            self.session.max_size_bytes = other.session.max_size_bytes;
        }

        if other.cookie.secret.is_some() {
            self.cookie.secret = other.cookie.secret;
        }
        if !other.cookie.previous_secrets.is_empty() {
            self.cookie.previous_secrets = other.cookie.previous_secrets;
        }

        if other.file.dir.is_some() {
            self.file.dir = other.file.dir;
        }

        self
    }

    /// Validate values that serde accepts but the backends cannot use.
    pub fn validate(&self) -> Result<()> {
        if !SessionConfig::is_valid_backend(&self.session.backend) {
            return Err(SatchelError::config(format!(
                "unknown session backend '{}' (valid: {:?})",
                self.session.backend, VALID_BACKENDS
            )));
        }
        if self.session.max_size_bytes == Some(0) {
            return Err(SatchelError::config("max_size_bytes must be positive"));
        }
        Ok(())
    }

    /// Directory the file backend stores sessions in.
    pub fn sessions_dir(&self) -> Option<PathBuf> {
        self.file.dir.clone().or_else(sessions_dir)
    }

    /// Save configuration to the project config file.
    ///
    /// Writes to `.satchel/config.toml` in the given directory, creating the
    /// directory if needed. Uses atomic write (temp file, then rename).
    pub fn save_project(&self, cwd: &Path) -> Result<PathBuf> {
        let satchel_dir = cwd.join(".satchel");

        if !satchel_dir.exists() {
            fs::create_dir_all(&satchel_dir).map_err(|e| SatchelError::storage(&satchel_dir, e))?;
        }

        let config_path = satchel_dir.join("config.toml");

        let content =
            toml::to_string_pretty(self).map_err(|e| SatchelError::config(e.to_string()))?;

        // Atomic write: write to temp file, then rename
        let temp_path = satchel_dir.join(".config.toml.tmp");
        fs::write(&temp_path, &content).map_err(|e| SatchelError::storage(&temp_path, e))?;

        let file = fs::File::open(&temp_path).map_err(|e| SatchelError::storage(&temp_path, e))?;
        file.sync_all()
            .map_err(|e| SatchelError::storage(&temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &config_path)
            .map_err(|e| SatchelError::storage(&config_path, e))?;

        Ok(config_path)
    }
}

/// Get the Satchel home directory.
///
/// Checks `SATCHEL_HOME` first, then falls back to `~/.satchel`.
/// An empty `SATCHEL_HOME` is ignored.
pub fn satchel_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("SATCHEL_HOME") {
        if home.is_empty() {
            tracing::warn!("SATCHEL_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("SATCHEL_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".satchel"));
    }

    // Fallback for containerized/minimal environments without HOME
    let fallback_path = env::temp_dir().join("satchel");
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback_path.display()
    );
    Some(fallback_path)
}

/// Get the default sessions directory.
///
/// Returns `<satchel_home>/sessions/`.
pub fn sessions_dir() -> Option<PathBuf> {
    satchel_home().map(|h| h.join("sessions"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "SATCHEL_BACKEND",
        "SATCHEL_SECRET",
        "SATCHEL_TTL_SECONDS",
        "SATCHEL_MAX_SIZE_BYTES",
        "SATCHEL_SESSIONS_DIR",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    /// Point SATCHEL_HOME at an empty temp dir so the user layer is empty.
    fn isolated_home() -> TempDir {
        let home = TempDir::new().unwrap();
        env::set_var("SATCHEL_HOME", home.path());
        home
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.session.backend, "cookie");
        assert_eq!(config.session.key, "_satchel_session");
        assert_eq!(config.session.ttl_seconds, 0);
        assert!(config.session.ttl().is_none());
        assert!(config.session.max_size_bytes.is_none());
        assert!(config.cookie.secret.is_none());
        assert!(config.cookie.previous_secrets.is_empty());
        assert!(config.file.dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ttl() {
        let config = SessionConfig {
            ttl_seconds: 90,
            ..Default::default()
        };
        assert_eq!(config.ttl(), Some(Duration::seconds(90)));

        let huge = SessionConfig {
            ttl_seconds: u64::MAX,
            ..Default::default()
        };
        assert_eq!(huge.ttl(), Some(Duration::seconds(MAX_TTL_SECONDS as i64)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let toml_content = r#"
[session]
backend = "file"
ttl_seconds = 3600
max_size_bytes = 2048

[file]
dir = "/var/lib/app/sessions"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();

        assert_eq!(config.session.backend, "file");
        assert_eq!(config.session.ttl_seconds, 3600);
        assert_eq!(config.session.max_size_bytes, Some(2048));
        assert_eq!(config.file.dir, Some(PathBuf::from("/var/lib/app/sessions")));
        // Other fields should be defaults
        assert_eq!(config.session.key, "_satchel_session");
    }

    #[test]
    fn test_load_from_file_missing() {
        assert!(Config::load_from_file(Path::new("/nonexistent/config.toml")).is_err());
    }

    #[test]
    fn test_load_from_file_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "this is not valid toml [[[").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(matches!(err, SatchelError::Config { .. }));
    }

    #[test]
    fn test_validate_rejects_unknown_backend() {
        let mut config = Config::default();
        config.session.backend = "redis".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_max_size() {
        let mut config = Config::default();
        config.session.max_size_bytes = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_project_config_precedence() {
        clear_env();
        let _home = isolated_home();
        let dir = TempDir::new().unwrap();
        let satchel_dir = dir.path().join(".satchel");
        fs::create_dir_all(&satchel_dir).unwrap();
        fs::write(
            satchel_dir.join("config.toml"),
            "[session]\nbackend = \"memory\"\n",
        )
        .unwrap();

        let config = Config::load_from_cwd(dir.path());

        assert_eq!(config.session.backend, "memory");
        assert_eq!(config.session.key, "_satchel_session");

        env::remove_var("SATCHEL_HOME");
    }

    #[test]
    #[serial]
    fn test_user_config_layered_under_project() {
        clear_env();
        let home = isolated_home();
        fs::write(
            home.path().join("config.toml"),
            "[session]\nttl_seconds = 60\n\n[cookie]\nsecret = \"user-secret\"\n",
        )
        .unwrap();

        let dir = TempDir::new().unwrap();
        let satchel_dir = dir.path().join(".satchel");
        fs::create_dir_all(&satchel_dir).unwrap();
        fs::write(
            satchel_dir.join("config.toml"),
            "[session]\nttl_seconds = 120\n",
        )
        .unwrap();

        let config = Config::load_from_cwd(dir.path());

        assert_eq!(config.session.ttl_seconds, 120);
        assert_eq!(config.cookie.secret.as_deref(), Some("user-secret"));

        env::remove_var("SATCHEL_HOME");
    }

    #[test]
    #[serial]
    fn test_env_var_precedence() {
        clear_env();
        let _home = isolated_home();
        let dir = TempDir::new().unwrap();
        let satchel_dir = dir.path().join(".satchel");
        fs::create_dir_all(&satchel_dir).unwrap();
        fs::write(
            satchel_dir.join("config.toml"),
            "[session]\nbackend = \"memory\"\n",
        )
        .unwrap();

        env::set_var("SATCHEL_BACKEND", "file");

        let config = Config::load_from_cwd(dir.path());
        assert_eq!(config.session.backend, "file");

        clear_env();
        env::remove_var("SATCHEL_HOME");
    }

    #[test]
    #[serial]
    fn test_env_var_overrides() {
        clear_env();
        env::set_var("SATCHEL_SECRET", "s3cr3t");
        env::set_var("SATCHEL_TTL_SECONDS", "300");
        env::set_var("SATCHEL_MAX_SIZE_BYTES", "1024");
        env::set_var("SATCHEL_SESSIONS_DIR", "/tmp/satchel-sessions");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.cookie.secret.as_deref(), Some("s3cr3t"));
        assert_eq!(config.session.ttl_seconds, 300);
        assert_eq!(config.session.max_size_bytes, Some(1024));
        assert_eq!(
            config.sessions_dir(),
            Some(PathBuf::from("/tmp/satchel-sessions"))
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_var_invalid_values_ignored() {
        clear_env();
        env::set_var("SATCHEL_BACKEND", "redis");
        env::set_var("SATCHEL_TTL_SECONDS", "soon");
        env::set_var("SATCHEL_MAX_SIZE_BYTES", "0");
        env::set_var("SATCHEL_SECRET", "");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config, Config::default());

        clear_env();
    }

    #[test]
    fn test_merge_is_field_by_field() {
        let mut base = Config::default();
        base.session.backend = "file".to_string();
        base.cookie.secret = Some("base".to_string());

        let mut other = Config::default();
        other.session.ttl_seconds = 30;

        let merged = base.merge(other);
        assert_eq!(merged.session.backend, "file");
        assert_eq!(merged.session.ttl_seconds, 30);
        assert_eq!(merged.cookie.secret.as_deref(), Some("base"));
    }

    #[test]
    fn test_save_project_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.session.backend = "file".to_string();
        config.cookie.secret = Some("x".repeat(40));

        let path = config.save_project(dir.path()).unwrap();
        assert!(path.ends_with(".satchel/config.toml"));
        assert!(!dir.path().join(".satchel/.config.toml.tmp").exists());

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    #[serial]
    fn test_satchel_home_env() {
        env::set_var("SATCHEL_HOME", "/opt/satchel");
        assert_eq!(satchel_home(), Some(PathBuf::from("/opt/satchel")));
        assert_eq!(sessions_dir(), Some(PathBuf::from("/opt/satchel/sessions")));
        env::remove_var("SATCHEL_HOME");
    }
}
