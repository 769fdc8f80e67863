// crates/apiledger-core/src/core/report.rs
// ============================================================================
// Module: API Ledger Analytics Types
// Description: Hourly rollup buckets and the trailing-window analytics report.
// Purpose: Define the shapes produced by the analytics aggregator.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`AnalyticsBucket`] is a cache of a pure function over raw request and
//! response records for one UTC hour. [`AnalyticsReport`] summarizes buckets
//! and raw records over a trailing number of days.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Buckets
// ============================================================================

/// Hourly rollup of request/response outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsBucket {
    /// UTC date `YYYY-MM-DD`.
    pub date: String,
    /// UTC hour `0..=23`.
    pub hour: u8,
    /// Bucket start (unix ms).
    pub bucket_start_ms: i64,
    /// Responses logged in the hour.
    pub total_requests: u64,
    /// Successful responses.
    pub successful_requests: u64,
    /// Failed responses.
    pub failed_requests: u64,
    /// Distinct sessions with a request in the hour.
    pub unique_sessions: u64,
    /// Mean processing time in seconds (0 when empty).
    pub avg_processing_secs: f64,
    /// Sum of response sizes in bytes.
    pub total_bytes: u64,
}

// ============================================================================
// SECTION: Report
// ============================================================================

/// Reporting window covered by an [`AnalyticsReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    /// First date included.
    pub start_date: String,
    /// Last date included (today).
    pub end_date: String,
    /// Requested trailing days.
    pub days: u32,
}

/// Per-day totals aggregated from hourly buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTotals {
    /// UTC date.
    pub date: String,
    /// Responses logged that day.
    pub total_requests: u64,
    /// Successful responses.
    pub successful_requests: u64,
    /// Failed responses.
    pub failed_requests: u64,
    /// Sum of hourly distinct-session counts.
    pub session_hours: u64,
    /// Request-weighted mean processing time in seconds.
    pub avg_processing_secs: f64,
    /// Bytes transferred.
    pub total_bytes: u64,
}

/// Per-hour totals for the current day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyTotals {
    /// UTC hour.
    pub hour: u8,
    /// Responses logged in the hour.
    pub total_requests: u64,
    /// Successful responses.
    pub successful_requests: u64,
    /// Failed responses.
    pub failed_requests: u64,
}

/// Request count for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCount {
    /// Endpoint path.
    pub endpoint: String,
    /// Requests in the window.
    pub request_count: u64,
}

/// Session-level summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Sessions created in the window.
    pub total_sessions: u64,
    /// Of those, still active.
    pub active_sessions: u64,
    /// Mean requests per session.
    pub avg_requests_per_session: f64,
    /// Mean of each session's average response time, in seconds.
    pub avg_session_response_secs: f64,
}

/// Trailing-window analytics report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    /// Covered period.
    pub period: ReportPeriod,
    /// Per-day totals, oldest first.
    pub daily: Vec<DailyTotals>,
    /// Per-hour totals for the current day, ascending hour.
    pub hourly: Vec<HourlyTotals>,
    /// Busiest endpoints, descending.
    pub top_endpoints: Vec<EndpointCount>,
    /// Session statistics.
    pub sessions: SessionSummary,
    /// Generation time (unix ms).
    pub generated_at_ms: i64,
}
