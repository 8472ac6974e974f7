//! Utility functions for Satchel.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Result, SatchelError};

/// Maximum stored record size that will be read into memory (1 MB).
///
/// The file backend's write and read bound when no `max_size_bytes` is
/// configured.
pub const MAX_RECORD_SIZE: u64 = 1024 * 1024;

/// Fail with `SizeLimitExceeded` if `size` is over an optional `limit`.
pub fn ensure_within_limit(size: usize, limit: Option<usize>) -> Result<()> {
    match limit {
        Some(limit) if size > limit => Err(SatchelError::size_limit(size, limit)),
        _ => Ok(()),
    }
}

/// Read a file into a string with a size limit.
///
/// Returns `Ok(None)` if the file does not exist.
///
/// # Errors
///
/// * `SizeLimitExceeded` if the file is larger than `max_size`
/// * `Storage` if the file exists but cannot be read
pub fn read_to_string_with_limit(path: &Path, max_size: u64) -> Result<Option<String>> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SatchelError::storage(path, e)),
    };

    let size = metadata.len();
    if size > max_size {
        return Err(SatchelError::size_limit(
            usize::try_from(size).unwrap_or(usize::MAX),
            usize::try_from(max_size).unwrap_or(usize::MAX),
        ));
    }

    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SatchelError::storage(path, e)),
    }
}
