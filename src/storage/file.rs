//! File-based session backend.
//!
//! Sessions are stored as JSON files in `~/.satchel/sessions/` (or a
//! configured directory), one file per identity. Atomic writes are
//! achieved via temp file + rename pattern.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Duration;

use crate::config::sessions_dir;
use crate::core::Session;
use crate::error::{Result, SatchelError};
use crate::storage::traits::is_valid_session_id;
use crate::storage::SessionBackend;
use crate::util::{ensure_within_limit, read_to_string_with_limit, MAX_RECORD_SIZE};

const NAME: &str = "file";

/// File-based session backend.
///
/// Any I/O failure other than a missing file is reported as
/// `BackendUnavailable`. Records too large or not valid UTF-8 load as
/// corrupt, so the store fails open on them.
#[derive(Debug, Clone)]
pub struct FileBackend {
    /// Directory where session files are stored.
    sessions_dir: PathBuf,
    /// Optional capacity bound per session.
    max_size_bytes: Option<usize>,
    /// Inactivity TTL applied by `SessionStore`.
    ttl: Option<Duration>,
}

/// A stored session together with its on-disk footprint.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub session: Session,
    pub path: PathBuf,
    pub bytes: u64,
}

impl FileBackend {
    /// Create a new file backend with the default directory.
    ///
    /// Uses `~/.satchel/sessions/` or `$SATCHEL_HOME/sessions/`.
    pub fn new() -> Result<Self> {
        let dir = sessions_dir().ok_or_else(|| {
            SatchelError::config("Could not determine sessions directory (no home directory)")
        })?;
        Self::with_dir(dir)
    }

    /// Create a new file backend with a custom directory.
    pub fn with_dir(sessions_dir: impl Into<PathBuf>) -> Result<Self> {
        let sessions_dir = sessions_dir.into();

        if !sessions_dir.exists() {
            fs::create_dir_all(&sessions_dir)
                .map_err(|e| SatchelError::storage(&sessions_dir, e))?;
        }

        Ok(Self {
            sessions_dir,
            max_size_bytes: None,
            ttl: None,
        })
    }

    /// Set a per-session capacity bound.
    pub fn with_max_size(mut self, max_size_bytes: Option<usize>) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// Expire sessions after `ttl` of inactivity.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Largest record this backend writes or reads back.
    fn record_limit(&self) -> usize {
        self.max_size_bytes.unwrap_or(MAX_RECORD_SIZE as usize)
    }

    /// Directory holding the session files.
    pub fn dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Get the path for a session file.
    fn session_path(&self, id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", id))
    }

    /// Get a fresh temp file path for one atomic write.
    ///
    /// Unique per writer so concurrent saves of one identity never share it.
    fn temp_path(&self, id: &str) -> PathBuf {
        self.sessions_dir.join(format!(
            ".{}.{}.{}.tmp",
            id,
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ))
    }

    /// Whether a directory entry is an in-flight or orphaned temp file.
    pub fn is_temp_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.') && n.ends_with(".tmp"))
    }

    fn unavailable(path: &Path, err: io::Error) -> SatchelError {
        SatchelError::backend_unavailable(NAME, format!("{}: {}", path.display(), err))
    }

    /// Write encoded session bytes atomically using temp file + rename.
    fn atomic_write(&self, id: &str, encoded: &str) -> Result<()> {
        let final_path = self.session_path(id);
        let temp_path = self.temp_path(id);

        let written = fs::File::create(&temp_path).and_then(|mut file| {
            file.write_all(encoded.as_bytes())?;
            file.sync_all()
        });

        // Rename temp file to final path (atomic on POSIX)
        let result = written.and_then(|()| fs::rename(&temp_path, &final_path));
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(Self::unavailable(&final_path, e));
        }

        Ok(())
    }

    /// List stored sessions, most recently updated first.
    ///
    /// Unreadable or corrupt files are skipped. Expired sessions are
    /// included so maintenance commands can see them.
    pub fn list(&self, limit: usize) -> Result<Vec<StoredSession>> {
        let mut sessions = self.scan()?;
        sessions.sort_by(|a, b| b.session.updated_at.cmp(&a.session.updated_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    /// Read every parseable session file in the directory.
    pub fn scan(&self) -> Result<Vec<StoredSession>> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.sessions_dir)
            .map_err(|e| Self::unavailable(&self.sessions_dir, e))?;

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Self::unavailable(&self.sessions_dir, e))?;
            let path = entry.path();

            // Skip non-JSON files and temp files
            if path.extension().map(|e| e != "json").unwrap_or(true) || Self::is_temp_file(&path)
            {
                continue;
            }

            if let Ok(Some(content)) = read_to_string_with_limit(&path, self.record_limit() as u64)
            {
                if let Ok(session) = serde_json::from_str::<Session>(&content) {
                    sessions.push(StoredSession {
                        session,
                        bytes: content.len() as u64,
                        path,
                    });
                }
            }
        }

        Ok(sessions)
    }
}

impl SessionBackend for FileBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn load(&self, token: &str) -> Result<Option<Session>> {
        if !is_valid_session_id(token) {
            return Ok(None);
        }

        let path = self.session_path(token);
        let content = match read_to_string_with_limit(&path, self.record_limit() as u64) {
            Ok(Some(content)) => content,
            Ok(None) => return Ok(None),
            Err(SatchelError::SizeLimitExceeded { size, limit }) => {
                return Err(SatchelError::serde(format!(
                    "stored record is {} bytes, over the {} byte limit",
                    size, limit
                )))
            }
            Err(SatchelError::Storage { source, .. })
                if source.kind() == io::ErrorKind::InvalidData =>
            {
                return Err(SatchelError::serde(format!(
                    "stored record is not UTF-8: {}",
                    source
                )))
            }
            Err(SatchelError::Storage { path, source }) => {
                return Err(Self::unavailable(&path, source))
            }
            Err(e) => return Err(e),
        };

        let session: Session = serde_json::from_str(&content)?;
        if session.is_expired() {
            tracing::debug!(session_id = %token, "file session expired");
            return Ok(None);
        }

        Ok(Some(session))
    }

    fn save(&self, session: &Session) -> Result<String> {
        if !is_valid_session_id(&session.id) {
            return Err(SatchelError::backend_unavailable(
                NAME,
                format!("refusing to store session with unsafe id '{}'", session.id),
            ));
        }

        let encoded = serde_json::to_string(session)?;
        ensure_within_limit(encoded.len(), Some(self.record_limit()))?;

        self.atomic_write(&session.id, &encoded)?;
        Ok(session.id.clone())
    }

    fn destroy(&self, id: &str) -> Result<()> {
        if !is_valid_session_id(id) {
            return Ok(());
        }

        let path = self.session_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Self::unavailable(&path, e)),
        }

        Ok(())
    }

    fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::tests::test_keyed_backend_roundtrip;
    use crate::core::SessionStore;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_backend() -> (FileBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::with_dir(dir.path()).unwrap();
        (backend, dir)
    }

    #[test]
    fn test_file_backend_roundtrip() {
        let (backend, _dir) = create_test_backend();
        test_keyed_backend_roundtrip(&backend);
    }

    #[test]
    fn test_with_dir_creates_directory() {
        let dir = TempDir::new().unwrap();
        let sessions_path = dir.path().join("sessions");

        assert!(!sessions_path.exists());
        let _backend = FileBackend::with_dir(&sessions_path).unwrap();
        assert!(sessions_path.is_dir());
    }

    #[test]
    fn test_session_path() {
        let (backend, _dir) = create_test_backend();
        assert!(backend.session_path("abc").ends_with("abc.json"));
    }

    fn temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| FileBackend::is_temp_file(&e.as_ref().unwrap().path()))
            .count()
    }

    #[test]
    fn test_temp_file_cleaned_up() {
        let (backend, dir) = create_test_backend();
        backend.save(&Session::new("temp-test")).unwrap();
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[test]
    fn test_temp_paths_unique_per_write() {
        let (backend, _dir) = create_test_backend();
        let a = backend.temp_path("s1");
        assert_ne!(a, backend.temp_path("s1"));
        assert!(FileBackend::is_temp_file(&a));
    }

    #[test]
    fn test_concurrent_saves_of_one_identity() {
        use std::sync::Arc;
        use std::thread;

        let (backend, dir) = create_test_backend();
        let backend = Arc::new(backend);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let backend = Arc::clone(&backend);
                thread::spawn(move || {
                    let mut session = Session::new("shared");
                    session.data.insert("writer".to_string(), json!(i));
                    session
                        .data
                        .insert("padding".to_string(), json!("x".repeat(4096)));
                    backend.save(&session).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = backend.load("shared").unwrap().unwrap();
        assert!(stored.data["writer"].as_i64().unwrap() < 8);
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[test]
    fn test_expired_session_not_loaded() {
        let (backend, _dir) = create_test_backend();
        let mut session = Session::new("old");
        session.expires_at = Some(Utc::now() - Duration::minutes(1));
        backend.save(&session).unwrap();

        assert!(backend.load("old").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_record_is_serde_error() {
        let (backend, dir) = create_test_backend();
        fs::write(dir.path().join("broken.json"), "not json").unwrap();

        let err = backend.load("broken").unwrap_err();
        assert!(err.is_fail_open());
    }

    #[test]
    fn test_unreachable_directory_is_backend_unavailable() {
        let dir = TempDir::new().unwrap();
        let sessions_path = dir.path().join("sessions");
        let backend = FileBackend::with_dir(&sessions_path).unwrap();

        // Replace the directory with a plain file
        fs::remove_dir(&sessions_path).unwrap();
        fs::write(&sessions_path, "not a directory").unwrap();

        let err = backend.save(&Session::new("s1")).unwrap_err();
        assert!(matches!(err, SatchelError::BackendUnavailable { .. }));

        let err = backend.load("s1").unwrap_err();
        assert!(matches!(err, SatchelError::BackendUnavailable { .. }));
    }

    #[test]
    fn test_size_limit_leaves_previous_record() {
        let (backend, _dir) = create_test_backend();
        let backend = backend.with_max_size(Some(300));

        let mut session = Session::new("s1");
        session.data.insert("small".to_string(), json!(1));
        backend.save(&session).unwrap();

        session
            .data
            .insert("big".to_string(), json!("x".repeat(1000)));
        let err = backend.save(&session).unwrap_err();
        assert!(matches!(err, SatchelError::SizeLimitExceeded { .. }));

        let stored = backend.load("s1").unwrap().unwrap();
        assert!(!stored.data.contains_key("big"));
    }

    #[test]
    fn test_default_limit_applies_to_writes() {
        let (backend, _dir) = create_test_backend();
        let mut session = Session::new("huge");
        session.data.insert(
            "blob".to_string(),
            json!("x".repeat(MAX_RECORD_SIZE as usize)),
        );

        let err = backend.save(&session).unwrap_err();
        assert!(matches!(err, SatchelError::SizeLimitExceeded { .. }));
        assert!(backend.load("huge").unwrap().is_none());
    }

    #[test]
    fn test_oversized_record_fails_open() {
        let (backend, dir) = create_test_backend();
        let backend = backend.with_max_size(Some(100));
        fs::write(dir.path().join("big.json"), "x".repeat(200)).unwrap();

        let err = backend.load("big").unwrap_err();
        assert!(err.is_fail_open());

        let store = SessionStore::load(&backend, Some("big")).unwrap();
        assert!(store.is_new());
    }

    #[test]
    fn test_non_utf8_record_fails_open() {
        let (backend, dir) = create_test_backend();
        fs::write(dir.path().join("binary.json"), [0xff, 0xfe, 0x00, 0x7b]).unwrap();

        let err = backend.load("binary").unwrap_err();
        assert!(err.is_fail_open());

        let store = SessionStore::load(&backend, Some("binary")).unwrap();
        assert!(store.is_new());
    }

    #[test]
    fn test_unsafe_ids_rejected() {
        let (backend, _dir) = create_test_backend();
        assert!(backend.load("../escape").unwrap().is_none());
        assert!(backend.save(&Session::new("../escape")).is_err());
        backend.destroy("../escape").unwrap();
    }

    #[test]
    fn test_list_orders_by_updated_at() {
        let (backend, _dir) = create_test_backend();

        for (i, age) in [30, 10, 20].iter().enumerate() {
            let mut session = Session::new(format!("s{}", i));
            session.updated_at = Utc::now() - Duration::seconds(*age);
            backend.save(&session).unwrap();
        }

        let listed = backend.list(10).unwrap();
        let ids: Vec<&str> = listed.iter().map(|s| s.session.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s0"]);

        assert_eq!(backend.list(2).unwrap().len(), 2);
    }

    #[test]
    fn test_scan_ignores_temp_and_invalid_files() {
        let (backend, dir) = create_test_backend();
        backend.save(&Session::new("valid")).unwrap();

        fs::write(dir.path().join(".orphan.json.tmp"), "{}").unwrap();
        fs::write(dir.path().join("invalid.json"), "not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let sessions = backend.scan().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session.id, "valid");
        assert!(sessions[0].bytes > 0);
    }

    #[test]
    fn test_is_temp_file() {
        assert!(FileBackend::is_temp_file(Path::new("/x/.abc.json.tmp")));
        assert!(!FileBackend::is_temp_file(Path::new("/x/abc.json")));
    }
}
