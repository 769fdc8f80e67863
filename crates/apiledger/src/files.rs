// crates/apiledger/src/files.rs
// ============================================================================
// Module: JSON File Helpers
// Description: Atomic JSON writes and directory listing for file-backed stores.
// Purpose: Share one write discipline between the archival log and the cache.
// Dependencies: serde_json, tempfile
// ============================================================================

//! ## Overview
//! Files are written to a uniquely named temporary file in the target
//! directory, synced, then renamed into place, so readers never observe a
//! partially written JSON object. Concurrent writers to the same name race
//! only on the final rename; the last rename wins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use tempfile::NamedTempFile;

// ============================================================================
// SECTION: Writes
// ============================================================================

/// Serializes `value` as pretty JSON and atomically places it at `path`.
///
/// # Errors
///
/// Returns an I/O error when serialization, the temporary write, or the
/// rename fails.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<u64> {
    let bytes = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    write_bytes_atomic(path, &bytes)?;
    Ok(u64::try_from(bytes.len()).unwrap_or(u64::MAX))
}

/// Atomically places `bytes` at `path`.
fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("target path has no parent directory"))?;
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

// ============================================================================
// SECTION: Listing
// ============================================================================

/// One `.json` file found in a directory.
#[derive(Debug, Clone)]
pub(crate) struct JsonFile {
    /// Full path.
    pub(crate) path: PathBuf,
    /// Size in bytes.
    pub(crate) bytes: u64,
    /// Modification time in unix milliseconds, when the platform reports one.
    pub(crate) modified_ms: Option<i64>,
}

/// Lists regular `.json` files directly inside `dir`.
///
/// A missing directory lists as empty. Entries whose metadata cannot be read
/// are skipped.
pub(crate) fn list_json_files(dir: &Path) -> io::Result<Vec<JsonFile>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        files.push(JsonFile {
            path,
            bytes: metadata.len(),
            modified_ms: metadata.modified().ok().and_then(system_time_ms),
        });
    }
    files.sort_by(|left, right| left.path.cmp(&right.path));
    Ok(files)
}

/// Converts a system time to unix milliseconds.
fn system_time_ms(time: SystemTime) -> Option<i64> {
    let elapsed = time.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(elapsed.as_millis()).ok()
}

/// Removes a file, treating "already gone" as success.
///
/// Returns whether this call removed the file.
pub(crate) fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
