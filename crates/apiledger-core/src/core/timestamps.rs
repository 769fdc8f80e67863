// crates/apiledger-core/src/core/timestamps.rs
// ============================================================================
// Module: API Ledger Time Model
// Description: Unix-millisecond timestamps and UTC hour/day bucketing.
// Purpose: Give records, rollups, and retention one shared notion of time.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Every stored timestamp is unix epoch milliseconds (UTC). Analytics buckets
//! are keyed by the UTC calendar date (`YYYY-MM-DD`) and hour (`0..=23`) that
//! contain a timestamp. Wall-clock reads happen only through
//! [`crate::Clock`]; the helpers here are pure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds per second.
pub const MILLIS_PER_SECOND: i64 = 1_000;
/// Milliseconds per minute.
pub const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
/// Milliseconds per hour.
pub const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
/// Milliseconds per day.
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

// ============================================================================
// SECTION: Hour Buckets
// ============================================================================

/// UTC hour containing a timestamp.
///
/// # Invariants
/// - `end_ms - start_ms == MILLIS_PER_HOUR`, except in the first and last
///   hours representable as unix milliseconds, where both ends saturate.
/// - `start_ms` is aligned to a whole UTC hour.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HourBucket {
    /// Calendar date `YYYY-MM-DD`.
    pub date: String,
    /// Hour of day.
    pub hour: u8,
    /// Inclusive start (unix ms).
    pub start_ms: i64,
    /// Exclusive end (unix ms).
    pub end_ms: i64,
}

impl HourBucket {
    /// Returns the bucket containing `timestamp_ms`.
    #[must_use]
    pub fn containing(timestamp_ms: i64) -> Self {
        let start_ms = timestamp_ms.saturating_sub(timestamp_ms.rem_euclid(MILLIS_PER_HOUR));
        let hour = u8::try_from(start_ms.rem_euclid(MILLIS_PER_DAY) / MILLIS_PER_HOUR).unwrap_or(0);
        Self {
            date: date_string(start_ms),
            hour,
            start_ms,
            end_ms: start_ms.saturating_add(MILLIS_PER_HOUR),
        }
    }
}

/// Start of the UTC day containing `timestamp_ms`.
#[must_use]
pub const fn day_start_ms(timestamp_ms: i64) -> i64 {
    timestamp_ms.saturating_sub(timestamp_ms.rem_euclid(MILLIS_PER_DAY))
}

/// UTC calendar date (`YYYY-MM-DD`) containing `timestamp_ms`.
#[must_use]
pub fn date_string(timestamp_ms: i64) -> String {
    let Some(datetime) = to_datetime(timestamp_ms) else {
        return "0000-00-00".to_string();
    };
    format!("{:04}-{:02}-{:02}", datetime.year(), u8::from(datetime.month()), datetime.day())
}

/// RFC 3339 rendering of `timestamp_ms` for operator-facing output; falls
/// back to the raw number outside the supported calendar range.
#[must_use]
pub fn format_rfc3339(timestamp_ms: i64) -> String {
    to_datetime(timestamp_ms)
        .and_then(|datetime| datetime.format(&Rfc3339).ok())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Converts unix milliseconds into a UTC datetime.
fn to_datetime(timestamp_ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp_ms) * 1_000_000).ok()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
