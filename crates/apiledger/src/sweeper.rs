// crates/apiledger/src/sweeper.rs
// ============================================================================
// Module: Retention Sweeper
// Description: Age-based purge across the store, archive, and cache.
// Purpose: Bound storage growth without ever touching active sessions.
// Dependencies: apiledger-core, apiledger-store-sqlite, serde, tracing
// ============================================================================

//! ## Overview
//! A sweep computes `cutoff = now - days_to_keep` once, purges structured
//! records at or before it, then removes archive and cache files whose
//! modification time is at or before it. Every table and every file is an
//! independent step: failures are collected in the report and the sweep
//! continues, so an interrupted sweep is resumed by running it again.
//!
//! Session snapshots of sessions that are still active are kept regardless
//! of age. If the active set cannot be read, the whole sessions directory is
//! skipped for that sweep.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::path::Path;

use apiledger_core::MILLIS_PER_DAY;
use apiledger_core::SessionId;
use apiledger_store_sqlite::PurgeFailure;
use apiledger_store_sqlite::RecordPurgeCounts;
use apiledger_store_sqlite::SqliteLedgerStore;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::archive::ArchiveKind;
use crate::archive::ArchiveLog;
use crate::archive::session_id_from_snapshot;
use crate::cache::CACHE_DIR_NAME;
use crate::files::list_json_files;
use crate::files::remove_if_present;

// ============================================================================
// SECTION: Report
// ============================================================================

/// Files deleted from one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePurgeCount {
    /// Directory name under the storage root.
    pub directory: String,
    /// Files deleted.
    pub deleted: u64,
}

/// Outcome of one retention sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Retention period requested.
    pub days_to_keep: u32,
    /// Items at or before this unix millisecond were eligible.
    pub cutoff_ms: i64,
    /// Structured-store rows deleted, with per-table failures.
    pub records: RecordPurgeCounts,
    /// Files deleted per directory.
    pub files: Vec<FilePurgeCount>,
    /// Per-file and per-directory failures.
    pub errors: Vec<PurgeFailure>,
}

impl PurgeReport {
    /// Total files deleted.
    #[must_use]
    pub fn files_deleted(&self) -> u64 {
        self.files.iter().map(|count| count.deleted).sum()
    }

    /// Total failures across records and files.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.records.errors.len() + self.errors.len()
    }
}

// ============================================================================
// SECTION: Sweep
// ============================================================================

/// Retention cutoff for `days_to_keep` relative to `now_ms`.
#[must_use]
pub fn retention_cutoff(now_ms: i64, days_to_keep: u32) -> i64 {
    now_ms.saturating_sub(i64::from(days_to_keep).saturating_mul(MILLIS_PER_DAY))
}

/// Runs one sweep. Never fails as a whole.
pub(crate) fn sweep(
    store: &SqliteLedgerStore,
    archive: &ArchiveLog,
    storage_root: &Path,
    days_to_keep: u32,
    now_ms: i64,
) -> PurgeReport {
    let cutoff_ms = retention_cutoff(now_ms, days_to_keep);
    let records = store.purge_records_before(cutoff_ms);
    let mut errors = Vec::new();
    let mut files = Vec::new();

    for kind in [ArchiveKind::Requests, ArchiveKind::Responses, ArchiveKind::Exports] {
        let deleted = sweep_directory(&archive.dir(kind), cutoff_ms, &mut errors, |_| false);
        files.push(FilePurgeCount {
            directory: kind.dir_name().to_string(),
            deleted,
        });
    }

    let sessions_dir = archive.dir(ArchiveKind::Sessions);
    match store.active_session_ids() {
        Ok(active) => {
            let active: BTreeSet<SessionId> = active.into_iter().collect();
            let deleted = sweep_directory(&sessions_dir, cutoff_ms, &mut errors, |path| {
                session_id_from_snapshot(path).is_some_and(|id| active.contains(&id))
            });
            files.push(FilePurgeCount {
                directory: ArchiveKind::Sessions.dir_name().to_string(),
                deleted,
            });
        }
        Err(err) => {
            warn!(error = %err, "active sessions unavailable; session snapshots kept");
            errors.push(PurgeFailure {
                target: ArchiveKind::Sessions.dir_name().to_string(),
                message: err.to_string(),
            });
        }
    }

    let deleted =
        sweep_directory(&storage_root.join(CACHE_DIR_NAME), cutoff_ms, &mut errors, |_| false);
    files.push(FilePurgeCount {
        directory: CACHE_DIR_NAME.to_string(),
        deleted,
    });

    let report = PurgeReport {
        days_to_keep,
        cutoff_ms,
        records,
        files,
        errors,
    };
    info!(
        days_to_keep,
        cutoff_ms,
        records_deleted = report.records.total(),
        files_deleted = report.files_deleted(),
        failures = report.error_count(),
        "retention sweep finished"
    );
    report
}

/// Deletes `.json` files modified at or before `cutoff_ms` unless `keep`.
fn sweep_directory(
    dir: &Path,
    cutoff_ms: i64,
    errors: &mut Vec<PurgeFailure>,
    keep: impl Fn(&Path) -> bool,
) -> u64 {
    let listing = match list_json_files(dir) {
        Ok(listing) => listing,
        Err(err) => {
            errors.push(PurgeFailure {
                target: dir.display().to_string(),
                message: err.to_string(),
            });
            return 0;
        }
    };
    let mut deleted = 0_u64;
    for file in listing {
        let Some(modified_ms) = file.modified_ms else {
            continue;
        };
        if modified_ms > cutoff_ms || keep(&file.path) {
            continue;
        }
        match remove_if_present(&file.path) {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(err) => {
                warn!(path = %file.path.display(), error = %err, "file purge failed");
                errors.push(PurgeFailure {
                    target: file.path.display().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }
    deleted
}

// ============================================================================
// SECTION: Tests
// ============================================================================
