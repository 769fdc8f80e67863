// crates/apiledger/src/lib.rs
// ============================================================================
// Module: API Ledger Library
// Description: Public API surface for the API ledger facade.
// Purpose: Expose the ledger instance, archive, cache, sweeper, and stats.
// Dependencies: apiledger-core, apiledger-store-sqlite, apiledger-config
// ============================================================================

//! ## Overview
//! The API ledger records every inbound request and its outcome, keeps
//! per-session aggregates and hourly analytics, rate-limits callers per
//! endpoint, caches expensive responses, and purges aged data. All of it is
//! reached through one explicitly constructed [`ApiLedger`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod archive;
pub mod cache;
mod files;
pub mod ledger;
pub mod stats;
pub mod sweeper;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use archive::ArchiveError;
pub use archive::ArchiveKind;
pub use archive::ArchiveLog;
pub use archive::SessionExport;
pub use cache::CacheEntry;
pub use cache::CacheError;
pub use cache::ResponseCache;
pub use ledger::ApiLedger;
pub use stats::DirectoryStats;
pub use stats::StorageStats;
pub use sweeper::FilePurgeCount;
pub use sweeper::PurgeReport;
pub use sweeper::retention_cutoff;
