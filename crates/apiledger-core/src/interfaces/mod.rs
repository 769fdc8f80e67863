// crates/apiledger-core/src/interfaces/mod.rs
// ============================================================================
// Module: API Ledger Interfaces
// Description: Error taxonomy and the clock seam shared by all ledger crates.
// Purpose: Let callers branch on failure kind and let tests control time.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`LedgerError`] is the one error type the surrounding service sees. Each
//! storage layer keeps its own detailed error enum and converts into this
//! taxonomy at the facade boundary. [`Clock`] is the only source of "now" for
//! timestamps, TTLs, rate-limit windows, and retention cutoffs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::RecordValidationError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Ledger failure taxonomy.
///
/// # Invariants
/// - `StorageIo` never reaches end users; callers degrade to "not recorded".
/// - `RaceGuard` is only produced by rate-limit admission and means "not admitted".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Disk or database backend unavailable.
    #[error("ledger storage io error: {0}")]
    StorageIo(String),
    /// Malformed record fields, rejected before any write.
    #[error("ledger validation error: {0}")]
    Validation(String),
    /// Referenced record does not exist.
    #[error("ledger record not found: {0}")]
    NotFound(String),
    /// An atomic guarded update lost its precondition.
    #[error("ledger race guard violated: {0}")]
    RaceGuard(String),
}

impl LedgerError {
    /// Stable label for log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StorageIo(_) => "storage_io",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::RaceGuard(_) => "race_guard",
        }
    }
}

impl From<RecordValidationError> for LedgerError {
    fn from(error: RecordValidationError) -> Self {
        Self::Validation(error.to_string())
    }
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current time in unix milliseconds.
pub trait Clock: Send + Sync {
    /// Returns the current unix time in milliseconds.
    fn now_millis(&self) -> i64;
}
