// crates/apiledger/src/archive.rs
// ============================================================================
// Module: Archival Log
// Description: Write-once JSON snapshots of requests, responses, and sessions.
// Purpose: Provide an audit/export copy that never gates the structured store.
// Dependencies: apiledger-core, serde, serde_json, tempfile, thiserror
// ============================================================================

//! ## Overview
//! The archival log mirrors structured-store writes as one JSON object per
//! file under a fixed directory per record kind. It is never read for
//! consistency-critical decisions; the structured store stays the source of
//! truth and callers treat every archive error as non-fatal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use apiledger_core::LedgerError;
use apiledger_core::RequestId;
use apiledger_core::RequestRecord;
use apiledger_core::ResponseId;
use apiledger_core::ResponseRecord;
use apiledger_core::SessionId;
use apiledger_core::SessionRecord;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::files::write_json_atomic;

// ============================================================================
// SECTION: Layout
// ============================================================================

/// Archive directory kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// `request_<id>.json` snapshots.
    Requests,
    /// `response_<id>.json` snapshots.
    Responses,
    /// `session_<id>.json` snapshots.
    Sessions,
    /// `session_<id>_<millis>.json` session exports.
    Exports,
}

impl ArchiveKind {
    /// Every archive directory, in layout order.
    pub const ALL: [Self; 4] = [Self::Requests, Self::Responses, Self::Sessions, Self::Exports];

    /// Directory name under the storage root.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::Responses => "responses",
            Self::Sessions => "sessions",
            Self::Exports => "exports",
        }
    }
}

/// Prefix of session snapshot filenames.
const SESSION_FILE_PREFIX: &str = "session_";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Archival log errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Filesystem failure.
    #[error("archive io error: {0}")]
    Io(String),
}

impl From<ArchiveError> for LedgerError {
    fn from(error: ArchiveError) -> Self {
        match error {
            ArchiveError::Io(message) => Self::StorageIo(message),
        }
    }
}

// ============================================================================
// SECTION: Export Document
// ============================================================================

/// Everything recorded for one session, written to `exports/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    /// Session aggregate.
    pub session: SessionRecord,
    /// Requests in timestamp order.
    pub requests: Vec<RequestRecord>,
    /// Responses in timestamp order.
    pub responses: Vec<ResponseRecord>,
    /// Export time in unix milliseconds.
    pub exported_at_ms: i64,
}

// ============================================================================
// SECTION: Archive
// ============================================================================

/// File-backed archival log rooted at the storage directory.
#[derive(Debug, Clone)]
pub struct ArchiveLog {
    /// Storage root; each kind lives in a subdirectory.
    root: PathBuf,
}

impl ArchiveLog {
    /// Opens the archive, creating all kind directories.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Io`] when a directory cannot be created.
    pub fn open(root: &Path) -> Result<Self, ArchiveError> {
        for kind in ArchiveKind::ALL {
            fs::create_dir_all(root.join(kind.dir_name()))
                .map_err(|err| ArchiveError::Io(format!("{}: {err}", kind.dir_name())))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Directory holding files of `kind`.
    #[must_use]
    pub fn dir(&self, kind: ArchiveKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Snapshot path for a request.
    #[must_use]
    pub fn request_path(&self, request_id: &RequestId) -> PathBuf {
        self.dir(ArchiveKind::Requests).join(format!("request_{request_id}.json"))
    }

    /// Snapshot path for a response.
    #[must_use]
    pub fn response_path(&self, response_id: &ResponseId) -> PathBuf {
        self.dir(ArchiveKind::Responses).join(format!("response_{response_id}.json"))
    }

    /// Snapshot path for a session.
    #[must_use]
    pub fn session_path(&self, session_id: &SessionId) -> PathBuf {
        self.dir(ArchiveKind::Sessions).join(format!("{SESSION_FILE_PREFIX}{session_id}.json"))
    }

    /// Writes a request snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Io`] when the file cannot be written.
    pub fn write_request(&self, record: &RequestRecord) -> Result<PathBuf, ArchiveError> {
        let path = self.request_path(&record.request_id);
        write_snapshot(&path, record)?;
        Ok(path)
    }

    /// Writes a response snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Io`] when the file cannot be written.
    pub fn write_response(&self, record: &ResponseRecord) -> Result<PathBuf, ArchiveError> {
        let path = self.response_path(&record.response_id);
        write_snapshot(&path, record)?;
        Ok(path)
    }

    /// Writes (or rewrites) a session snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Io`] when the file cannot be written.
    pub fn write_session(&self, record: &SessionRecord) -> Result<PathBuf, ArchiveError> {
        let path = self.session_path(&record.session_id);
        write_snapshot(&path, record)?;
        Ok(path)
    }

    /// Writes a session export named by session id and export time.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Io`] when the file cannot be written.
    pub fn write_export(&self, export: &SessionExport) -> Result<PathBuf, ArchiveError> {
        let path = self.dir(ArchiveKind::Exports).join(format!(
            "{SESSION_FILE_PREFIX}{}_{}.json",
            export.session.session_id, export.exported_at_ms
        ));
        write_snapshot(&path, export)?;
        Ok(path)
    }
}

/// Session id encoded in a `sessions/` snapshot filename.
#[must_use]
pub fn session_id_from_snapshot(path: &Path) -> Option<SessionId> {
    let stem = path.file_stem()?.to_str()?;
    let raw = stem.strip_prefix(SESSION_FILE_PREFIX)?;
    let session_id = SessionId::new(raw);
    session_id.validate().ok()?;
    Some(session_id)
}

/// Writes one snapshot file.
fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<(), ArchiveError> {
    write_json_atomic(path, value)
        .map(|_| ())
        .map_err(|err| ArchiveError::Io(format!("{}: {err}", path.display())))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
