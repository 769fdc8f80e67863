// crates/apiledger-store-sqlite/src/rate_limit.rs
// ============================================================================
// Module: SQLite Rate Limiter
// Description: Fixed-window admission counters keyed by client and endpoint.
// Purpose: Cap request rate per client without read-then-write races.
// Dependencies: apiledger-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! Each (client address, endpoint) pair owns at most one window row. A
//! window opens on the first call after the previous one expired and lasts
//! [`RATE_LIMIT_WINDOW_MS`]. Admission is a single count-guarded `UPDATE`
//! inside an immediate transaction: two concurrent callers can never both
//! observe `count < limit` and both increment past it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use apiledger_core::RateLimitDecision;
use apiledger_core::RateLimitInfo;
use apiledger_core::validate_endpoint;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use tracing::debug;

use crate::store::SqliteLedgerStore;
use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Length of a rate-limit window in milliseconds.
pub const RATE_LIMIT_WINDOW_MS: i64 = 60_000;
/// Maximum length of the client key (address) used for rate limiting.
pub const MAX_CLIENT_KEY_LENGTH: usize = 256;

// ============================================================================
// SECTION: Admission
// ============================================================================

impl SqliteLedgerStore {
    /// Admits or rejects one call for `(client_address, endpoint)`.
    ///
    /// Expired windows for the key are discarded, a window is opened if none
    /// is live, and the count is incremented only while it is below `limit`.
    /// A rejected call marks the window blocked; the count is not changed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for a zero limit or malformed
    /// key, [`SqliteStoreError::RaceGuard`] if the window row disappears
    /// mid-transaction, or a storage error when the transaction fails.
    pub fn check_and_admit(
        &self,
        client_address: &str,
        endpoint: &str,
        limit: u32,
    ) -> Result<RateLimitDecision, SqliteStoreError> {
        if limit == 0 {
            return Err(SqliteStoreError::Invalid("rate limit must be greater than zero".into()));
        }
        if client_address.is_empty() || client_address.len() > MAX_CLIENT_KEY_LENGTH {
            return Err(SqliteStoreError::Invalid(format!(
                "client address must be 1..={MAX_CLIENT_KEY_LENGTH} bytes"
            )));
        }
        validate_endpoint(endpoint)?;
        let now = self.now_millis();
        let mut guard = self.lock_writer()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "DELETE FROM rate_limits WHERE client_address = ?1 AND endpoint = ?2 AND \
             window_end_ms <= ?3",
            params![client_address, endpoint, now],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "INSERT INTO rate_limits (client_address, endpoint, request_count, window_start_ms, \
             window_end_ms, blocked) VALUES (?1, ?2, 0, ?3, ?4, 0) ON CONFLICT(client_address, \
             endpoint) DO NOTHING",
            params![client_address, endpoint, now, now + RATE_LIMIT_WINDOW_MS],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let admitted = tx
            .execute(
                "UPDATE rate_limits SET request_count = request_count + 1 WHERE client_address = \
                 ?1 AND endpoint = ?2 AND window_end_ms > ?3 AND request_count < ?4",
                params![client_address, endpoint, now, limit],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?
            == 1;
        if !admitted {
            tx.execute(
                "UPDATE rate_limits SET blocked = 1 WHERE client_address = ?1 AND endpoint = ?2",
                params![client_address, endpoint],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        let window = tx
            .query_row(
                "SELECT request_count, window_start_ms, window_end_ms, blocked FROM rate_limits \
                 WHERE client_address = ?1 AND endpoint = ?2",
                params![client_address, endpoint],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let Some((current_count, window_start_ms, reset_at_ms, blocked)) = window else {
            return Err(SqliteStoreError::RaceGuard(
                "rate-limit window vanished during admission".to_string(),
            ));
        };
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        debug!(
            client_address,
            endpoint,
            admitted,
            current_count,
            limit,
            "rate-limit admission"
        );
        Ok(RateLimitDecision {
            admitted,
            info: RateLimitInfo {
                current_count,
                limit,
                window_start_ms,
                reset_at_ms,
                blocked,
            },
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
