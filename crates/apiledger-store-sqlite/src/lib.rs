// crates/apiledger-store-sqlite/src/lib.rs
// ============================================================================
// Module: API Ledger SQLite Store
// Description: SQLite-backed structured store for API telemetry.
// Purpose: Persist requests, responses, sessions, rate-limit windows, and
//          hourly analytics buckets with atomic, concurrent-safe updates.
// Dependencies: apiledger-core, rusqlite, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteLedgerStore`] is the source of truth for API telemetry. Every
//! operation is one atomic unit of work on a serialized write connection;
//! reads run against a small pool of connections so analytics scans see a
//! consistent snapshot without blocking request-path writers (WAL mode).
//! Invariants:
//! - Response records always reference an existing request record.
//! - Session counters change only through single guarded `UPDATE`s.
//! - Rate-limit admission is a count-guarded `UPDATE` inside an immediate
//!   transaction, so concurrent callers never over-admit.
//! - Analytics buckets are overwritten from raw records, never accumulated.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod analytics;
mod rate_limit;
mod retention;
mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use analytics::MAX_REPORT_DAYS;
pub use analytics::MAX_TOP_ENDPOINTS;
pub use rate_limit::MAX_CLIENT_KEY_LENGTH;
pub use rate_limit::RATE_LIMIT_WINDOW_MS;
pub use retention::PurgeFailure;
pub use retention::RecordPurgeCounts;
pub use store::LoggedRequest;
pub use store::LoggedResponse;
pub use store::MAX_READ_POOL_SIZE;
pub use store::SessionUpsert;
pub use store::SqliteLedgerStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::StoreRecordCounts;
