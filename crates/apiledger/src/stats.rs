// crates/apiledger/src/stats.rs
// ============================================================================
// Module: Storage Statistics
// Description: Record counts and byte sizes across the store, archive, and cache.
// Purpose: Back the operator `stats` view.
// Dependencies: apiledger-store-sqlite, serde
// ============================================================================

//! ## Overview
//! Statistics are a point-in-time scan. Files created or removed during the
//! scan may or may not be counted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use apiledger_core::LedgerError;
use apiledger_store_sqlite::SqliteLedgerStore;
use apiledger_store_sqlite::StoreRecordCounts;
use serde::Deserialize;
use serde::Serialize;

use crate::archive::ArchiveKind;
use crate::archive::ArchiveLog;
use crate::cache::CACHE_DIR_NAME;
use crate::files::list_json_files;

// ============================================================================
// SECTION: Types
// ============================================================================

/// File totals for one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryStats {
    /// Directory name under the storage root.
    pub name: String,
    /// JSON files present.
    pub file_count: u64,
    /// Bytes across those files.
    pub bytes: u64,
}

/// Storage statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Structured-store row counts.
    pub database: StoreRecordCounts,
    /// Database size including WAL and shared-memory files.
    pub database_bytes: u64,
    /// Archive and cache directories.
    pub directories: Vec<DirectoryStats>,
    /// Database plus all directory bytes.
    pub total_bytes: u64,
    /// Scan time in unix milliseconds.
    pub generated_at_ms: i64,
}

// ============================================================================
// SECTION: Collection
// ============================================================================

/// Scans the store and every storage directory.
pub(crate) fn collect(
    store: &SqliteLedgerStore,
    archive: &ArchiveLog,
    storage_root: &Path,
    now_ms: i64,
) -> Result<StorageStats, LedgerError> {
    let database = store.record_counts()?;
    let database_bytes = store.database_bytes();
    let mut directories = Vec::with_capacity(ArchiveKind::ALL.len() + 1);
    for kind in ArchiveKind::ALL {
        directories.push(directory_stats(kind.dir_name(), &archive.dir(kind))?);
    }
    directories.push(directory_stats(CACHE_DIR_NAME, &storage_root.join(CACHE_DIR_NAME))?);
    let total_bytes = directories
        .iter()
        .fold(database_bytes, |total, dir| total.saturating_add(dir.bytes));
    Ok(StorageStats {
        database,
        database_bytes,
        directories,
        total_bytes,
        generated_at_ms: now_ms,
    })
}

/// Counts JSON files and bytes in one directory.
fn directory_stats(name: &str, dir: &Path) -> Result<DirectoryStats, LedgerError> {
    let files = list_json_files(dir)
        .map_err(|err| LedgerError::StorageIo(format!("{}: {err}", dir.display())))?;
    Ok(DirectoryStats {
        name: name.to_string(),
        file_count: u64::try_from(files.len()).unwrap_or(u64::MAX),
        bytes: files.iter().fold(0_u64, |total, file| total.saturating_add(file.bytes)),
    })
}
