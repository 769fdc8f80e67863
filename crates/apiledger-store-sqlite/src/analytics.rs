// crates/apiledger-store-sqlite/src/analytics.rs
// ============================================================================
// Module: SQLite Analytics Aggregator
// Description: Hourly rollup buckets and trailing-window reports.
// Purpose: Summarize raw request/response records into hourly buckets and reports.
// Dependencies: apiledger-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! A rollup recomputes one UTC hour from raw records and overwrites the
//! bucket for that hour inside one immediate transaction on the writer, so a
//! stored bucket always matches the raw records committed before it. Running
//! it twice, or concurrently, for the same hour yields the same bucket.
//! Reports read buckets for per-day/per-hour totals and raw records for
//! endpoint and session statistics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use apiledger_core::AnalyticsBucket;
use apiledger_core::AnalyticsReport;
use apiledger_core::DailyTotals;
use apiledger_core::EndpointCount;
use apiledger_core::HourBucket;
use apiledger_core::HourlyTotals;
use apiledger_core::MILLIS_PER_DAY;
use apiledger_core::ReportPeriod;
use apiledger_core::SessionSummary;
use apiledger_core::date_string;
use apiledger_core::day_start_ms;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use tracing::debug;

use crate::store::SqliteLedgerStore;
use crate::store::SqliteStoreError;
use crate::store::column_u64;
use crate::store::map_read_error;
use crate::store::to_sql_i64;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Longest trailing window a report may cover.
pub const MAX_REPORT_DAYS: u32 = 3_650;
/// Largest number of endpoints a report may rank.
pub const MAX_TOP_ENDPOINTS: u32 = 100;

// ============================================================================
// SECTION: Rollups
// ============================================================================

impl SqliteLedgerStore {
    /// Recomputes and overwrites the bucket for the UTC hour containing
    /// `timestamp_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the aggregation or the upsert fails;
    /// the stored bucket is left unchanged.
    pub fn rollup(&self, timestamp_ms: i64) -> Result<AnalyticsBucket, SqliteStoreError> {
        let hour = HourBucket::containing(timestamp_ms);
        let mut guard = self.lock_writer()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let bucket = aggregate_hour(&tx, &hour)?;
        tx.execute(
            "INSERT INTO analytics_buckets (date, hour, bucket_start_ms, total_requests, \
             successful_requests, failed_requests, unique_sessions, avg_processing_secs, \
             total_bytes) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) ON CONFLICT(date, hour) DO \
             UPDATE SET bucket_start_ms = excluded.bucket_start_ms, total_requests = \
             excluded.total_requests, successful_requests = excluded.successful_requests, \
             failed_requests = excluded.failed_requests, unique_sessions = \
             excluded.unique_sessions, avg_processing_secs = excluded.avg_processing_secs, \
             total_bytes = excluded.total_bytes",
            params![
                bucket.date,
                bucket.hour,
                bucket.bucket_start_ms,
                to_sql_i64(bucket.total_requests, "total_requests")?,
                to_sql_i64(bucket.successful_requests, "successful_requests")?,
                to_sql_i64(bucket.failed_requests, "failed_requests")?,
                to_sql_i64(bucket.unique_sessions, "unique_sessions")?,
                bucket.avg_processing_secs,
                to_sql_i64(bucket.total_bytes, "total_bytes")?
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        debug!(
            date = %bucket.date,
            hour = bucket.hour,
            total_requests = bucket.total_requests,
            "analytics bucket rolled up"
        );
        Ok(bucket)
    }

    /// Loads the stored bucket for `(date, hour)`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or the row is corrupt.
    pub fn get_bucket(
        &self,
        date: &str,
        hour: u8,
    ) -> Result<Option<AnalyticsBucket>, SqliteStoreError> {
        let guard = self.lock_reader()?;
        let bucket = guard
            .query_row(
                "SELECT date, hour, bucket_start_ms, total_requests, successful_requests, \
                 failed_requests, unique_sessions, avg_processing_secs, total_bytes FROM \
                 analytics_buckets WHERE date = ?1 AND hour = ?2",
                params![date, hour],
                |row| {
                    Ok(AnalyticsBucket {
                        date: row.get(0)?,
                        hour: row.get(1)?,
                        bucket_start_ms: row.get(2)?,
                        total_requests: column_u64(row, 3)?,
                        successful_requests: column_u64(row, 4)?,
                        failed_requests: column_u64(row, 5)?,
                        unique_sessions: column_u64(row, 6)?,
                        avg_processing_secs: row.get(7)?,
                        total_bytes: column_u64(row, 8)?,
                    })
                },
            )
            .optional()
            .map_err(map_read_error)?;
        drop(guard);
        Ok(bucket)
    }

    // ------------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------------

    /// Builds a report over the trailing `days` UTC days, today included.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when `days` or `top_endpoints`
    /// is out of range, or a storage error when a query fails.
    pub fn report(
        &self,
        days: u32,
        top_endpoints: u32,
    ) -> Result<AnalyticsReport, SqliteStoreError> {
        if days == 0 || days > MAX_REPORT_DAYS {
            return Err(SqliteStoreError::Invalid(format!(
                "report days out of range: {days} (1..={MAX_REPORT_DAYS})"
            )));
        }
        if top_endpoints == 0 || top_endpoints > MAX_TOP_ENDPOINTS {
            return Err(SqliteStoreError::Invalid(format!(
                "top endpoints out of range: {top_endpoints} (1..={MAX_TOP_ENDPOINTS})"
            )));
        }
        let now = self.now_millis();
        let today_start = day_start_ms(now);
        let window_start = today_start - i64::from(days - 1) * MILLIS_PER_DAY;
        let mut guard = self.lock_reader()?;
        let tx = guard.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let daily = daily_totals(&tx, window_start)?;
        let hourly = hourly_totals(&tx, today_start)?;
        let top = top_endpoints_since(&tx, window_start, top_endpoints)?;
        let sessions = session_summary(&tx, window_start)?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        Ok(AnalyticsReport {
            period: ReportPeriod {
                start_date: date_string(window_start),
                end_date: date_string(now),
                days,
            },
            daily,
            hourly,
            top_endpoints: top,
            sessions,
            generated_at_ms: now,
        })
    }
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Aggregates raw records for one hour.
fn aggregate_hour(
    connection: &Connection,
    hour: &HourBucket,
) -> Result<AnalyticsBucket, SqliteStoreError> {
    let (total_requests, successful_requests, avg_processing_secs, total_bytes) = connection
        .query_row(
            "SELECT COUNT(*), COALESCE(SUM(success), 0), COALESCE(AVG(duration_secs), 0.0), \
             COALESCE(SUM(response_bytes), 0) FROM responses WHERE timestamp_ms >= ?1 AND \
             timestamp_ms < ?2",
            params![hour.start_ms, hour.end_ms],
            |row| {
                Ok((
                    column_u64(row, 0)?,
                    column_u64(row, 1)?,
                    row.get::<_, f64>(2)?,
                    column_u64(row, 3)?,
                ))
            },
        )
        .map_err(map_read_error)?;
    let unique_sessions = connection
        .query_row(
            "SELECT COUNT(DISTINCT session_id) FROM requests WHERE session_id IS NOT NULL AND \
             timestamp_ms >= ?1 AND timestamp_ms < ?2",
            params![hour.start_ms, hour.end_ms],
            |row| column_u64(row, 0),
        )
        .map_err(map_read_error)?;
    Ok(AnalyticsBucket {
        date: hour.date.clone(),
        hour: hour.hour,
        bucket_start_ms: hour.start_ms,
        total_requests,
        successful_requests,
        failed_requests: total_requests.saturating_sub(successful_requests),
        unique_sessions,
        avg_processing_secs,
        total_bytes,
    })
}

/// Per-day totals from buckets, oldest first.
fn daily_totals(
    connection: &Connection,
    window_start: i64,
) -> Result<Vec<DailyTotals>, SqliteStoreError> {
    let mut stmt = connection
        .prepare(
            "SELECT date, SUM(total_requests), SUM(successful_requests), SUM(failed_requests), \
             SUM(unique_sessions), SUM(avg_processing_secs * total_requests), SUM(total_bytes) \
             FROM analytics_buckets WHERE bucket_start_ms >= ?1 GROUP BY date ORDER BY date ASC",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let rows = stmt
        .query_map(params![window_start], |row| {
            let total_requests = column_u64(row, 1)?;
            let weighted_secs: f64 = row.get(5)?;
            Ok(DailyTotals {
                date: row.get(0)?,
                total_requests,
                successful_requests: column_u64(row, 2)?,
                failed_requests: column_u64(row, 3)?,
                session_hours: column_u64(row, 4)?,
                avg_processing_secs: weighted_mean(weighted_secs, total_requests),
                total_bytes: column_u64(row, 6)?,
            })
        })
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let mut totals = Vec::new();
    for row in rows {
        totals.push(row.map_err(map_read_error)?);
    }
    Ok(totals)
}

/// Per-hour totals for the day starting at `today_start`.
fn hourly_totals(
    connection: &Connection,
    today_start: i64,
) -> Result<Vec<HourlyTotals>, SqliteStoreError> {
    let mut stmt = connection
        .prepare(
            "SELECT hour, total_requests, successful_requests, failed_requests FROM \
             analytics_buckets WHERE bucket_start_ms >= ?1 ORDER BY hour ASC",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let rows = stmt
        .query_map(params![today_start], |row| {
            Ok(HourlyTotals {
                hour: row.get(0)?,
                total_requests: column_u64(row, 1)?,
                successful_requests: column_u64(row, 2)?,
                failed_requests: column_u64(row, 3)?,
            })
        })
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let mut totals = Vec::new();
    for row in rows {
        totals.push(row.map_err(map_read_error)?);
    }
    Ok(totals)
}

/// Busiest endpoints by request count since `window_start`.
fn top_endpoints_since(
    connection: &Connection,
    window_start: i64,
    limit: u32,
) -> Result<Vec<EndpointCount>, SqliteStoreError> {
    let mut stmt = connection
        .prepare(
            "SELECT endpoint, COUNT(*) AS request_count FROM requests WHERE timestamp_ms >= ?1 \
             GROUP BY endpoint ORDER BY request_count DESC, endpoint ASC LIMIT ?2",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let rows = stmt
        .query_map(params![window_start, limit], |row| {
            Ok(EndpointCount {
                endpoint: row.get(0)?,
                request_count: column_u64(row, 1)?,
            })
        })
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let mut endpoints = Vec::new();
    for row in rows {
        endpoints.push(row.map_err(map_read_error)?);
    }
    Ok(endpoints)
}

/// Session statistics for sessions created since `window_start`.
fn session_summary(
    connection: &Connection,
    window_start: i64,
) -> Result<SessionSummary, SqliteStoreError> {
    connection
        .query_row(
            "SELECT COUNT(*), COALESCE(SUM(active), 0), COALESCE(AVG(total_requests), 0.0), \
             COALESCE(AVG(CASE WHEN successful_requests + failed_requests > 0 THEN \
             total_response_secs / (successful_requests + failed_requests) END), 0.0) FROM \
             sessions WHERE created_at_ms >= ?1",
            params![window_start],
            |row| {
                Ok(SessionSummary {
                    total_sessions: column_u64(row, 0)?,
                    active_sessions: column_u64(row, 1)?,
                    avg_requests_per_session: row.get(2)?,
                    avg_session_response_secs: row.get(3)?,
                })
            },
        )
        .map_err(map_read_error)
}

/// Mean of a weighted sum over `count` items (0 when empty).
#[allow(clippy::cast_precision_loss, reason = "Request counts stay far below 2^52.")]
fn weighted_mean(weighted_sum: f64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { weighted_sum / count as f64 }
}
