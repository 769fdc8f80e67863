// crates/apiledger/tests/ledger_flow.rs
// ============================================================================
// Module: API Ledger Flow Tests
// Description: End-to-end behavior of the ledger facade.
// Purpose: Validate request/response bookkeeping, archive snapshots, cache
//          TTLs, admission headers, exports, stats, and retention sweeps.
// ============================================================================

//! ## Overview
//! Integration tests for [`ApiLedger`] driven by a manual clock:
//! - Logging a request counts it against its session and archives it
//! - Logging a response updates session counters and the hourly rollup
//! - Cache entries live exactly `ttl` minutes
//! - Session counters commit with the record they count, or not at all
//! - Archive write failures never fail the structured write
//! - Sweeps keep active sessions and their snapshots

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::float_cmp,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use apiledger::ApiLedger;
use apiledger::ArchiveKind;
use apiledger::SessionExport;
use apiledger_config::ApiLedgerConfig;
use apiledger_core::ClientInfo;
use apiledger_core::EndSessionOutcome;
use apiledger_core::HttpMethod;
use apiledger_core::LedgerError;
use apiledger_core::MILLIS_PER_DAY;
use apiledger_core::ManualClock;
use apiledger_core::NewRequest;
use apiledger_core::NewResponse;
use apiledger_core::RequestId;
use apiledger_core::SessionId;
use proptest::prelude::*;
use rusqlite::Connection;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// 2024-03-05T10:00:05Z
const TEN_OH_FIVE: i64 = 1_709_632_805_000;

fn open_ledger(temp: &TempDir, clock: &ManualClock) -> ApiLedger {
    let mut config = ApiLedgerConfig::default();
    config.storage.root_dir = temp.path().join("api_storage");
    ApiLedger::open_with_clock(&config, Arc::new(clock.clone())).expect("open ledger")
}

fn chat_request(session: &str) -> NewRequest {
    NewRequest::new("/chat", HttpMethod::Post)
        .with_session(SessionId::new(session))
        .with_query_text("orders placed last week")
        .with_client(ClientInfo::new("1.2.3.4", "test-agent"))
}

fn reject_session_writes(temp: &TempDir, event: &str) {
    let database = temp.path().join("api_storage").join("api_data.sqlite");
    let connection = Connection::open(database).unwrap();
    connection
        .execute_batch(&format!(
            "CREATE TRIGGER reject_session_{event} BEFORE {event} ON sessions BEGIN SELECT \
             RAISE(ABORT, 'sessions unavailable'); END;"
        ))
        .unwrap();
}

fn replace_dir_with_file(ledger: &ApiLedger, kind: ArchiveKind) {
    let dir = ledger.archive().dir(kind);
    fs::remove_dir_all(&dir).unwrap();
    fs::write(&dir, b"not a directory").unwrap();
}

fn json_files(ledger: &ApiLedger, kind: ArchiveKind) -> usize {
    fs::read_dir(ledger.archive().dir(kind))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
        .count()
}

// ============================================================================
// SECTION: Requests, Responses, Sessions
// ============================================================================

#[test]
fn request_and_response_update_session_archive_and_rollup() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);

    let request = ledger.log_request(&chat_request("s1")).unwrap();
    let response = ledger
        .log_response(&request.request_id, &NewResponse::success(512), Duration::from_millis(500))
        .unwrap();
    assert_eq!(response.request_id, request.request_id);
    assert_eq!(response.session_id, Some(SessionId::new("s1")));

    let session = ledger.get_session(&SessionId::new("s1")).unwrap().unwrap();
    assert_eq!(session.total_requests, 1);
    assert_eq!(session.successful_requests, 1);
    assert_eq!(session.failed_requests, 0);
    assert!((session.total_response_secs - 0.5).abs() < 1e-9);

    assert!(ledger.archive().request_path(&request.request_id).is_file());
    assert!(ledger.archive().response_path(&response.response_id).is_file());
    assert!(ledger.archive().session_path(&SessionId::new("s1")).is_file());

    let report = ledger.report(Some(1)).unwrap();
    let ten = report.hourly.iter().find(|hour| hour.hour == 10).expect("hour 10 rolled up");
    assert_eq!(ten.total_requests, 1);
    assert_eq!(ten.successful_requests, 1);
}

#[test]
fn response_for_unknown_request_is_a_validation_error() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    let err = ledger
        .log_response(&RequestId::new("missing"), &NewResponse::success(1), Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)), "got {err:?}");
    assert_eq!(json_files(&ledger, ArchiveKind::Responses), 0);
}

#[test]
fn malformed_request_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    let err = ledger.log_request(&NewRequest::new("", HttpMethod::Get)).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(ledger.stats().unwrap().database.requests, 0);
    assert_eq!(json_files(&ledger, ArchiveKind::Requests), 0);
}

#[test]
fn repeated_session_requests_accumulate_on_one_record() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    ledger.log_request(&chat_request("s1")).unwrap();
    clock.advance(Duration::from_secs(3));
    ledger.log_request(&chat_request("s1")).unwrap();

    let stats = ledger.stats().unwrap();
    assert_eq!(stats.database.sessions, 1);
    let session = ledger.get_session(&SessionId::new("s1")).unwrap().unwrap();
    assert_eq!(session.total_requests, 2);
    assert_eq!(session.last_activity_ms, TEN_OH_FIVE + 3_000);
}

#[test]
fn concurrent_requests_on_one_session_are_all_counted() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    let handles: Vec<_> = (0 .. 6)
        .map(|_| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                for _ in 0 .. 5 {
                    ledger.log_request(&chat_request("shared")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let session = ledger.get_session(&SessionId::new("shared")).unwrap().unwrap();
    assert_eq!(session.total_requests, 30);
}

#[test]
fn failed_session_upsert_leaves_no_request_behind() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    reject_session_writes(&temp, "INSERT");
    let err = ledger.log_request(&chat_request("s1")).unwrap_err();
    assert!(matches!(err, LedgerError::StorageIo(_)));
    let stats = ledger.stats().unwrap();
    assert_eq!(stats.database.requests, 0);
    assert_eq!(stats.database.sessions, 0);
    assert_eq!(json_files(&ledger, ArchiveKind::Requests), 0);
    assert_eq!(json_files(&ledger, ArchiveKind::Sessions), 0);
}

#[test]
fn failed_session_outcome_leaves_no_response_behind() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    let request = ledger.log_request(&chat_request("s1")).unwrap();
    reject_session_writes(&temp, "UPDATE");
    let err = ledger
        .log_response(&request.request_id, &NewResponse::success(16), Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, LedgerError::StorageIo(_)));
    let stats = ledger.stats().unwrap();
    assert_eq!(stats.database.responses, 0);
    assert_eq!(stats.database.analytics_buckets, 0);
    assert_eq!(json_files(&ledger, ArchiveKind::Responses), 0);
    let session = ledger.get_session(&SessionId::new("s1")).unwrap().unwrap();
    assert_eq!(session.total_requests, 1);
    assert_eq!(session.outcome_count(), 0);
}

#[test]
fn archive_failures_never_fail_logging() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    for kind in [ArchiveKind::Requests, ArchiveKind::Responses, ArchiveKind::Sessions] {
        replace_dir_with_file(&ledger, kind);
    }
    let request = ledger.log_request(&chat_request("s1")).unwrap();
    let response = ledger
        .log_response(&request.request_id, &NewResponse::success(32), Duration::from_millis(100))
        .unwrap();
    assert_eq!(ledger.get_request(&request.request_id).unwrap(), Some(request));
    assert_eq!(ledger.get_response(&response.response_id).unwrap(), Some(response));
    let session = ledger.get_session(&SessionId::new("s1")).unwrap().unwrap();
    assert_eq!(session.successful_requests, 1);
    assert_eq!(ledger.end_session(&SessionId::new("s1")).unwrap(), EndSessionOutcome::Ended);
}

#[test]
fn concurrent_logging_keeps_hourly_rollup_current() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    for _ in 0 .. 5 {
        let handles: Vec<_> = (0 .. 8)
            .map(|worker| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    let session = format!("w{worker}");
                    for _ in 0 .. 10 {
                        let request = ledger.log_request(&chat_request(&session)).unwrap();
                        let response = NewResponse::success(1);
                        ledger.log_response(&request.request_id, &response, Duration::ZERO).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let raw = ledger.stats().unwrap().database.responses;
        let report = ledger.report(Some(1)).unwrap();
        assert_eq!(report.hourly.len(), 1);
        assert_eq!(report.hourly[0].total_requests, raw);
    }
    assert_eq!(ledger.stats().unwrap().database.responses, 400);
}

#[test]
fn session_ends_exactly_once_and_snapshot_is_rewritten() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    let id = SessionId::new("s1");
    ledger.upsert_session(&id, &ClientInfo::new("1.2.3.4", "test-agent")).unwrap();
    ledger.record_session_outcome(&id, true, Duration::from_millis(1_200)).unwrap();
    clock.advance(Duration::from_secs(10));

    assert_eq!(ledger.end_session(&id).unwrap(), EndSessionOutcome::Ended);
    clock.advance(Duration::from_secs(10));
    assert_eq!(ledger.end_session(&id).unwrap(), EndSessionOutcome::AlreadyEnded);

    let session = ledger.get_session(&id).unwrap().unwrap();
    assert!(!session.active);
    assert_eq!(session.ended_at_ms, Some(TEN_OH_FIVE + 10_000));
    assert_eq!(session.successful_requests, 1);

    let snapshot = fs::read_to_string(ledger.archive().session_path(&id)).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
    assert_eq!(snapshot["active"], json!(false));
}

#[test]
fn outcome_for_unknown_session_is_not_found() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    let err = ledger
        .record_session_outcome(&SessionId::new("ghost"), true, Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    assert_eq!(
        ledger.end_session(&SessionId::new("ghost")).unwrap(),
        EndSessionOutcome::NotFound
    );
}

#[test]
fn export_contains_session_requests_and_responses() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    let first = ledger.log_request(&chat_request("s1")).unwrap();
    ledger
        .log_response(&first.request_id, &NewResponse::failure("timeout"), Duration::from_secs(2))
        .unwrap();
    clock.advance(Duration::from_secs(1));
    ledger.log_request(&chat_request("s1")).unwrap();

    let path = ledger.export_session(&SessionId::new("s1")).unwrap().expect("export written");
    assert!(path.starts_with(ledger.archive().dir(ArchiveKind::Exports)));
    let export: SessionExport = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(export.requests.len(), 2);
    assert_eq!(export.responses.len(), 1);
    assert!(!export.responses[0].success);
    assert_eq!(export.session.failed_requests, 1);
    assert_eq!(export.exported_at_ms, TEN_OH_FIVE + 1_000);

    assert_eq!(ledger.export_session(&SessionId::new("nobody")).unwrap(), None);
}

// ============================================================================
// SECTION: Rate Limiting
// ============================================================================

#[test]
fn fourth_call_in_window_is_blocked_with_headers() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    for expected in 1 ..= 3 {
        let decision = ledger.check_and_admit("1.2.3.4", "/chat", Some(3)).unwrap();
        assert!(decision.admitted);
        assert_eq!(decision.info.current_count, expected);
    }
    let rejected = ledger.check_and_admit("1.2.3.4", "/chat", Some(3)).unwrap();
    assert!(!rejected.admitted);
    assert!(rejected.info.blocked);
    assert_eq!(rejected.info.remaining(), 0);
    let headers = rejected.info.header_pairs(ledger.now_millis());
    assert!(headers.iter().any(|(name, value)| *name == "X-RateLimit-Limit" && value == "3"));
    assert!(headers.iter().any(|(name, _)| *name == "Retry-After"));

    clock.advance(Duration::from_secs(61));
    let reopened = ledger.check_and_admit("1.2.3.4", "/chat", Some(3)).unwrap();
    assert!(reopened.admitted);
    assert_eq!(reopened.info.current_count, 1);
}

#[test]
fn default_limit_comes_from_config() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let mut config = ApiLedgerConfig::default();
    config.storage.root_dir = temp.path().join("api_storage");
    config.rate_limit.default_limit = 2;
    let ledger = ApiLedger::open_with_clock(&config, Arc::new(clock)).unwrap();
    assert!(ledger.check_and_admit("9.9.9.9", "/report", None).unwrap().admitted);
    assert!(ledger.check_and_admit("9.9.9.9", "/report", None).unwrap().admitted);
    let third = ledger.check_and_admit("9.9.9.9", "/report", None).unwrap();
    assert!(!third.admitted);
    assert_eq!(third.info.limit, 2);
}

#[test]
fn zero_limit_is_rejected_not_admitted() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    let err = ledger.check_and_admit("1.2.3.4", "/chat", Some(0)).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

// ============================================================================
// SECTION: Cache
// ============================================================================

#[test]
fn cached_entry_expires_after_ttl() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    assert!(ledger.cache_put("k1", &json!({"x": 1}), Some(1)));
    assert_eq!(ledger.cache_get("k1"), Some(json!({"x": 1})));
    clock.advance(Duration::from_secs(61));
    assert_eq!(ledger.cache_get("k1"), None);
    assert_eq!(ledger.cache_get("never-written"), None);
}

#[test]
fn cache_put_failure_returns_false() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    assert!(!ledger.cache_put("", &json!(1), Some(5)));
    assert!(!ledger.cache_put("k", &json!(1), Some(0)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn cache_hit_iff_within_ttl(ttl in 1_u32 .. 120, elapsed_ms in 0_i64 .. 8_000_000) {
        let temp = TempDir::new().unwrap();
        let clock = ManualClock::new(TEN_OH_FIVE);
        let ledger = open_ledger(&temp, &clock);
        prop_assert!(ledger.cache_put("key", &json!("payload"), Some(ttl)));
        clock.set(TEN_OH_FIVE + elapsed_ms);
        let live = elapsed_ms < i64::from(ttl) * 60_000;
        prop_assert_eq!(ledger.cache_get("key").is_some(), live);
    }
}

// ============================================================================
// SECTION: Stats and Retention
// ============================================================================

#[test]
fn stats_cover_database_and_every_directory() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    let request = ledger.log_request(&chat_request("s1")).unwrap();
    ledger.log_response(&request.request_id, &NewResponse::success(64), Duration::ZERO).unwrap();
    assert!(ledger.cache_put("k", &json!([1, 2, 3]), None));

    let stats = ledger.stats().unwrap();
    assert_eq!(stats.database.requests, 1);
    assert_eq!(stats.database.responses, 1);
    assert_eq!(stats.database.active_sessions, 1);
    assert_eq!(stats.database.analytics_buckets, 1);
    let names: Vec<&str> = stats.directories.iter().map(|dir| dir.name.as_str()).collect();
    assert_eq!(names, ["requests", "responses", "sessions", "exports", "cache"]);
    for dir in &stats.directories {
        let expected = u64::from(dir.name != "exports");
        assert_eq!(dir.file_count, expected, "{}", dir.name);
    }
    assert!(stats.database_bytes > 0);
    assert!(stats.total_bytes > stats.database_bytes);
}

#[test]
fn purge_keeps_records_newer_than_cutoff() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    let old = ledger.log_request(&chat_request("old")).unwrap();
    ledger.end_session(&SessionId::new("old")).unwrap();
    clock.advance(Duration::from_millis(u64::try_from(10 * MILLIS_PER_DAY).unwrap()));
    let new = ledger.log_request(&chat_request("new")).unwrap();

    let report = ledger.purge(Some(7));
    assert!(report.records.errors.is_empty());
    assert_eq!(report.cutoff_ms, TEN_OH_FIVE + 3 * MILLIS_PER_DAY);
    assert_eq!(report.records.requests, 1);
    assert_eq!(report.records.sessions, 1);
    assert!(ledger.get_request(&old.request_id).unwrap().is_none());
    assert!(ledger.get_request(&new.request_id).unwrap().is_some());
    assert!(ledger.get_session(&SessionId::new("new")).unwrap().is_some());
}

#[test]
fn purge_zero_drops_rate_limit_window_still_open() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let ledger = open_ledger(&temp, &clock);
    ledger.check_and_admit("1.2.3.4", "/chat", Some(5)).unwrap();
    clock.advance(Duration::from_secs(10));
    let report = ledger.purge(Some(0));
    assert_eq!(report.records.rate_limit_windows, 1);
    assert_eq!(ledger.stats().unwrap().database.rate_limit_windows, 0);
}

#[test]
fn purge_zero_leaves_only_active_sessions() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let ledger = open_ledger(&temp, &clock);
    let done = ledger.log_request(&chat_request("done")).unwrap();
    ledger.log_response(&done.request_id, &NewResponse::success(8), Duration::ZERO).unwrap();
    ledger.end_session(&SessionId::new("done")).unwrap();
    ledger.log_request(&chat_request("live")).unwrap();
    ledger.check_and_admit("1.2.3.4", "/chat", Some(5)).unwrap();
    assert!(ledger.cache_put("k", &json!(1), Some(600)));
    ledger.export_session(&SessionId::new("done")).unwrap();

    clock.advance(Duration::from_secs(3_600));
    let report = ledger.purge(Some(0));
    assert_eq!(report.error_count(), 0, "{:?}", report.errors);

    let stats = ledger.stats().unwrap();
    assert_eq!(stats.database.requests, 0);
    assert_eq!(stats.database.responses, 0);
    assert_eq!(stats.database.sessions, 1);
    assert_eq!(stats.database.active_sessions, 1);
    assert_eq!(stats.database.rate_limit_windows, 0);
    assert_eq!(stats.database.analytics_buckets, 0);
    assert_eq!(ledger.active_session_ids().unwrap(), vec![SessionId::new("live")]);

    for dir in &stats.directories {
        let expected = u64::from(dir.name == "sessions");
        assert_eq!(dir.file_count, expected, "{}", dir.name);
    }
    assert!(ledger.archive().session_path(&SessionId::new("live")).is_file());
    assert!(report.files_deleted() >= 6);
}
