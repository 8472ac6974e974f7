//! Unified error types for Satchel.
//!
//! Every error is local to one request cycle. Most are surfaced to the
//! caller; tamper detection and corrupt stored records follow the
//! fail-open principle instead: log a warning and continue with an empty
//! session rather than failing the request.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for Satchel operations.
#[derive(Error, Debug)]
pub enum SatchelError {
    /// The storage backend could not be reached. Never retried internally.
    #[error("session backend '{backend}' unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// A value could not be converted by the backend codec.
    #[error("value for key '{key}' is not serializable: {message}")]
    UnserializableValue { key: String, message: String },

    /// The encoded session exceeds the active backend's capacity bound.
    #[error("session is {size} bytes, exceeding the {limit} byte limit")]
    SizeLimitExceeded { size: usize, limit: usize },

    /// An inline token failed signature verification or decoding.
    #[error("session token rejected: {reason}")]
    TamperDetected { reason: String },

    /// I/O errors from config or maintenance file operations.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON parsing/serialization errors on stored records.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading or validation errors.
    #[error("config error: {message}")]
    Config { message: String },
}

/// A specialized Result type for Satchel operations.
pub type Result<T> = std::result::Result<T, SatchelError>;

impl SatchelError {
    /// Create a backend unavailable error.
    pub fn backend_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create an unserializable value error.
    pub fn unserializable(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnserializableValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a size limit error.
    pub fn size_limit(size: usize, limit: usize) -> Self {
        Self::SizeLimitExceeded { size, limit }
    }

    /// Create a tamper detection error.
    pub fn tampered(reason: impl Into<String>) -> Self {
        Self::TamperDetected {
            reason: reason.into(),
        }
    }

    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this error should trigger fail-open behavior on load.
    ///
    /// A forged or corrupt record is treated as "no session": the client
    /// gets a fresh one. Unreachable backends and caller errors are not.
    pub fn is_fail_open(&self) -> bool {
        matches!(self, Self::TamperDetected { .. } | Self::Serde { .. })
    }
}

impl From<io::Error> for SatchelError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for SatchelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Trait for fail-open error handling.
///
/// Log the error and return a safe default instead.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using default)", context, err);
                T::default()
            }
        }
    }
}

/// Exit codes for the Satchel CLI.
pub mod exit_codes {
    /// Command succeeded.
    pub const SUCCESS: i32 = 0;

    /// Command ran but reported a failure.
    pub const ERROR: i32 = 1;

    /// The process panicked.
    pub const CRASH: i32 = 3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_unavailable_display() {
        let err = SatchelError::backend_unavailable("file", "disk gone");
        assert_eq!(
            err.to_string(),
            "session backend 'file' unavailable: disk gone"
        );
    }

    #[test]
    fn test_unserializable_display() {
        let err = SatchelError::unserializable("cart", "key must be a string");
        assert!(err.to_string().contains("'cart'"));
        assert!(err.to_string().contains("key must be a string"));
    }

    #[test]
    fn test_size_limit_display() {
        let err = SatchelError::size_limit(5000, 4096);
        assert_eq!(
            err.to_string(),
            "session is 5000 bytes, exceeding the 4096 byte limit"
        );
    }

    #[test]
    fn test_tampered_display() {
        let err = SatchelError::tampered("signature mismatch");
        assert_eq!(err.to_string(), "session token rejected: signature mismatch");
    }

    #[test]
    fn test_storage_error_display() {
        let err = SatchelError::storage(
            "/tmp/test.json",
            io::Error::new(io::ErrorKind::NotFound, "file not found"),
        );
        assert!(err.to_string().contains("storage error"));
        assert!(err.to_string().contains("/tmp/test.json"));
    }

    #[test]
    fn test_config_error_display() {
        let err = SatchelError::config("invalid TOML");
        assert_eq!(err.to_string(), "config error: invalid TOML");
    }

    #[test]
    fn test_is_fail_open() {
        assert!(SatchelError::tampered("x").is_fail_open());
        assert!(SatchelError::serde("x").is_fail_open());

        assert!(!SatchelError::backend_unavailable("memory", "x").is_fail_open());
        assert!(!SatchelError::unserializable("k", "x").is_fail_open());
        assert!(!SatchelError::size_limit(2, 1).is_fail_open());
        assert!(!SatchelError::config("x").is_fail_open());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: SatchelError = io_err.into();
        assert!(matches!(err, SatchelError::Storage { .. }));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: SatchelError = json_err.into();
        assert!(matches!(err, SatchelError::Serde { .. }));
    }

    #[test]
    fn test_fail_open_default() {
        let result: Result<Vec<String>> = Err(SatchelError::tampered("test"));
        let value = result.fail_open_default("test context");
        assert!(value.is_empty());
    }

    #[test]
    fn test_fail_open_success() {
        let result: Result<i32> = Ok(100);
        assert_eq!(result.fail_open_default("test context"), 100);
    }
}
