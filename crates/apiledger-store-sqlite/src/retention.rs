// crates/apiledger-store-sqlite/src/retention.rs
// ============================================================================
// Module: SQLite Record Retention
// Description: Age-based purge of structured records.
// Purpose: Delete records at or before a cutoff, one independent step per table.
// Dependencies: rusqlite, serde, tracing
// ============================================================================

//! ## Overview
//! Each table is purged by its own statement; a failing step is recorded and
//! the remaining steps still run, so an interrupted or partially failed sweep
//! can simply be run again. Active sessions are never deleted. Requests that
//! still have a response survive until their response is purged, keeping the
//! response-to-request reference intact.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::store::SqliteLedgerStore;
use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One purge step that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeFailure {
    /// Table, directory, or file the step targeted.
    pub target: String,
    /// Error message.
    pub message: String,
}

/// Rows deleted per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPurgeCounts {
    /// Response records deleted.
    pub responses: u64,
    /// Request records deleted.
    pub requests: u64,
    /// Inactive session records deleted.
    pub sessions: u64,
    /// Rate-limit windows deleted.
    pub rate_limit_windows: u64,
    /// Analytics buckets deleted.
    pub analytics_buckets: u64,
    /// Steps that failed.
    pub errors: Vec<PurgeFailure>,
}

impl RecordPurgeCounts {
    /// Total rows deleted.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.responses
            .saturating_add(self.requests)
            .saturating_add(self.sessions)
            .saturating_add(self.rate_limit_windows)
            .saturating_add(self.analytics_buckets)
    }
}

/// Purge steps in execution order: table label and delete statement.
const PURGE_STEPS: [(&str, &str); 5] = [
    ("responses", "DELETE FROM responses WHERE timestamp_ms <= ?1"),
    (
        "requests",
        "DELETE FROM requests WHERE timestamp_ms <= ?1 AND NOT EXISTS (SELECT 1 FROM responses \
         WHERE responses.request_id = requests.request_id)",
    ),
    ("sessions", "DELETE FROM sessions WHERE active = 0 AND last_activity_ms <= ?1"),
    ("rate_limits", "DELETE FROM rate_limits WHERE window_start_ms <= ?1"),
    ("analytics_buckets", "DELETE FROM analytics_buckets WHERE bucket_start_ms <= ?1"),
];

// ============================================================================
// SECTION: Purge
// ============================================================================

impl SqliteLedgerStore {
    /// Deletes records timestamped at or before `cutoff_ms`.
    ///
    /// Never fails as a whole: per-step errors are collected in
    /// [`RecordPurgeCounts::errors`].
    #[must_use]
    pub fn purge_records_before(&self, cutoff_ms: i64) -> RecordPurgeCounts {
        let mut deleted = [0_u64; 5];
        let mut errors = Vec::new();
        for (slot, (target, sql)) in deleted.iter_mut().zip(PURGE_STEPS) {
            match self.purge_step(sql, cutoff_ms) {
                Ok(count) => *slot = count,
                Err(err) => {
                    warn!(table = target, error = %err, "record purge step failed");
                    errors.push(PurgeFailure {
                        target: target.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
        let [responses, requests, sessions, rate_limit_windows, analytics_buckets] = deleted;
        let counts = RecordPurgeCounts {
            responses,
            requests,
            sessions,
            rate_limit_windows,
            analytics_buckets,
            errors,
        };
        info!(cutoff_ms, deleted = counts.total(), failures = counts.errors.len(), "records purged");
        counts
    }

    /// Runs one delete statement in its own implicit transaction.
    fn purge_step(&self, sql: &str, cutoff_ms: i64) -> Result<u64, SqliteStoreError> {
        let guard = self.lock_writer()?;
        let deleted = guard
            .execute(sql, params![cutoff_ms])
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
    }
}
