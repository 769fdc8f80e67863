// crates/apiledger-store-sqlite/tests/ledger_store.rs
// ============================================================================
// Module: SQLite Ledger Store Tests
// Description: Record, session, rate-limit, analytics, and retention behavior.
// Purpose: Validate referential integrity, atomic counters, admission
//          ceilings, rollup idempotence, and purge cutoffs.
// ============================================================================

//! ## Overview
//! Integration tests for [`SqliteLedgerStore`]:
//! - Response records must reference a logged request
//! - Session upserts are idempotent by id and end exactly once
//! - Session counters move in the same transaction as the record they count
//! - Rate-limit windows admit exactly `limit` calls, including under threads
//! - Rollups are pure recomputations of raw records
//! - Retention honours the cutoff and never removes active sessions; a
//!   window's age is its start

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

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use apiledger_core::ClientInfo;
use apiledger_core::Clock;
use apiledger_core::EndSessionOutcome;
use apiledger_core::HttpMethod;
use apiledger_core::MILLIS_PER_DAY;
use apiledger_core::ManualClock;
use apiledger_core::NewRequest;
use apiledger_core::NewResponse;
use apiledger_core::RequestId;
use apiledger_core::SessionId;
use apiledger_store_sqlite::RATE_LIMIT_WINDOW_MS;
use apiledger_store_sqlite::SqliteLedgerStore;
use apiledger_store_sqlite::SqliteStoreConfig;
use apiledger_store_sqlite::SqliteStoreError;
use proptest::prelude::*;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// 2024-03-05T10:00:05Z
const TEN_OH_FIVE: i64 = 1_709_632_805_000;

fn open_store(temp: &TempDir, clock: &ManualClock) -> SqliteLedgerStore {
    let config = SqliteStoreConfig::for_path(temp.path().join("ledger.sqlite"));
    SqliteLedgerStore::with_clock(config, Arc::new(clock.clone())).expect("open store")
}

fn chat_request(session: &str) -> NewRequest {
    NewRequest::new("/chat", HttpMethod::Post)
        .with_session(SessionId::new(session))
        .with_query_text("top customers by revenue")
        .with_client(ClientInfo::new("1.2.3.4", "test-agent"))
}

// ============================================================================
// SECTION: Requests and Responses
// ============================================================================

#[test]
fn response_requires_logged_request() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let err = store
        .log_response(&RequestId::new("missing"), &NewResponse::success(10), Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
    assert_eq!(store.record_counts().unwrap().responses, 0);
}

#[test]
fn response_copies_session_and_is_unique_per_request() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let request = store.log_request(&chat_request("s1")).unwrap().request;
    assert!(request.request_bytes > 0);
    let logged = store
        .log_response(
            &request.request_id,
            &NewResponse::success(42).with_result_count(3).with_component("sql"),
            Duration::from_millis(250),
        )
        .unwrap();
    let response = logged.response;
    assert_eq!(response.session_id, Some(SessionId::new("s1")));
    assert_eq!(logged.session.unwrap().successful_requests, 1);
    assert_eq!(response.status_code, 200);
    assert_eq!(store.get_response(&response.response_id).unwrap(), Some(response.clone()));
    assert_eq!(store.get_request(&request.request_id).unwrap(), Some(request.clone()));

    let duplicate =
        store.log_response(&request.request_id, &NewResponse::success(1), Duration::ZERO);
    assert!(matches!(duplicate, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn malformed_request_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let bad = NewRequest::new("chat", HttpMethod::Get);
    assert!(matches!(store.log_request(&bad), Err(SqliteStoreError::Invalid(_))));
    let bad_session = NewRequest::new("/chat", HttpMethod::Get).with_session(SessionId::new("../x"));
    assert!(matches!(store.log_request(&bad_session), Err(SqliteStoreError::Invalid(_))));
    assert_eq!(store.record_counts().unwrap().requests, 0);
}

// ============================================================================
// SECTION: Sessions
// ============================================================================

#[test]
fn upsert_twice_yields_one_session_with_accumulated_counters() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let id = SessionId::new("s1");
    let client = ClientInfo::new("1.2.3.4", "agent");
    let first = store.upsert_session(&id, &client).unwrap();
    clock.advance(Duration::from_secs(5));
    let second = store.upsert_session(&id, &ClientInfo::default()).unwrap();
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(second.session.total_requests, 2);
    assert_eq!(second.session.created_at_ms, TEN_OH_FIVE);
    assert_eq!(second.session.last_activity_ms, TEN_OH_FIVE + 5_000);
    assert_eq!(second.session.client_address.as_deref(), Some("1.2.3.4"));
    assert_eq!(store.record_counts().unwrap().sessions, 1);
}

#[test]
fn session_ends_exactly_once() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let id = SessionId::new("s1");
    store.upsert_session(&id, &ClientInfo::default()).unwrap();
    let after_outcome =
        store.record_session_outcome(&id, true, Duration::from_millis(1_200)).unwrap();
    assert_eq!(after_outcome.successful_requests, 1);
    assert!((after_outcome.total_response_secs - 1.2).abs() < 1e-9);

    assert_eq!(store.end_session(&id).unwrap(), EndSessionOutcome::Ended);
    let ended = store.get_session(&id).unwrap().unwrap();
    clock.advance(Duration::from_secs(30));
    assert_eq!(store.end_session(&id).unwrap(), EndSessionOutcome::AlreadyEnded);
    let again = store.get_session(&id).unwrap().unwrap();
    assert!(!again.active);
    assert_eq!(again.ended_at_ms, Some(TEN_OH_FIVE));
    assert_eq!(again, ended);
    assert!(store.active_session_ids().unwrap().is_empty());
}

#[test]
fn unknown_sessions_are_reported_not_created() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let id = SessionId::new("ghost");
    assert_eq!(store.end_session(&id).unwrap(), EndSessionOutcome::NotFound);
    let err = store.record_session_outcome(&id, false, Duration::ZERO).unwrap_err();
    assert!(matches!(err, SqliteStoreError::NotFound(_)));
    assert!(store.get_session(&id).unwrap().is_none());
}

#[test]
fn session_lookups_return_records_in_order() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let first = store.log_request(&chat_request("s1")).unwrap().request;
    clock.advance(Duration::from_secs(1));
    let second = store.log_request(&chat_request("s1")).unwrap().request;
    store.log_request(&chat_request("other")).unwrap();
    store.log_response(&second.request_id, &NewResponse::failure("timeout"), Duration::ZERO).unwrap();
    let requests = store.session_requests(&SessionId::new("s1")).unwrap();
    assert_eq!(
        requests.iter().map(|r| r.request_id.clone()).collect::<Vec<_>>(),
        vec![first.request_id, second.request_id]
    );
    let responses = store.session_responses(&SessionId::new("s1")).unwrap();
    assert_eq!(responses.len(), 1);
    assert!(!responses[0].success);
    assert_eq!(responses[0].status_code, 500);
}

#[test]
fn concurrent_upserts_never_lose_counts() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let mut handles = Vec::new();
    for _ in 0 .. 8 {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            for _ in 0 .. 10 {
                store.upsert_session(&SessionId::new("shared"), &ClientInfo::default()).unwrap();
                store
                    .record_session_outcome(&SessionId::new("shared"), true, Duration::from_millis(10))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    let session = store.get_session(&SessionId::new("shared")).unwrap().unwrap();
    assert_eq!(session.total_requests, 80);
    assert_eq!(session.outcome_count(), 80);
}

#[test]
fn logging_counts_session_in_same_write() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let first = store.log_request(&chat_request("s1")).unwrap();
    let created = first.session.unwrap();
    assert!(created.created);
    assert_eq!(created.session.total_requests, 1);
    assert_eq!(created.session.client_address.as_deref(), Some("1.2.3.4"));

    let second = store.log_request(&chat_request("s1")).unwrap();
    let bumped = second.session.unwrap();
    assert!(!bumped.created);
    assert_eq!(bumped.session.total_requests, 2);

    let answered = store
        .log_response(
            &second.request.request_id,
            &NewResponse::failure("timeout"),
            Duration::from_secs(2),
        )
        .unwrap();
    let session = answered.session.unwrap();
    assert_eq!(session.failed_requests, 1);
    assert_eq!(session.outcome_count(), 1);
    assert_eq!(store.get_session(&SessionId::new("s1")).unwrap(), Some(session));

    let anonymous = store.log_request(&NewRequest::new("/health", HttpMethod::Get)).unwrap();
    assert!(anonymous.session.is_none());
    let anonymous_response = store
        .log_response(&anonymous.request.request_id, &NewResponse::success(2), Duration::ZERO)
        .unwrap();
    assert!(anonymous_response.session.is_none());
    assert_eq!(store.record_counts().unwrap().sessions, 1);
}

#[test]
fn session_write_failure_rolls_back_request() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let connection = Connection::open(temp.path().join("ledger.sqlite")).unwrap();
    connection
        .execute_batch(
            "CREATE TRIGGER reject_session_insert BEFORE INSERT ON sessions BEGIN SELECT \
             RAISE(ABORT, 'sessions unavailable'); END;",
        )
        .unwrap();
    let err = store.log_request(&chat_request("s1")).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Db(_)));
    let counts = store.record_counts().unwrap();
    assert_eq!(counts.requests, 0);
    assert_eq!(counts.sessions, 0);
}

#[test]
fn session_outcome_failure_rolls_back_response() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let request = store.log_request(&chat_request("s1")).unwrap().request;
    let connection = Connection::open(temp.path().join("ledger.sqlite")).unwrap();
    connection
        .execute_batch(
            "CREATE TRIGGER reject_session_update BEFORE UPDATE ON sessions BEGIN SELECT \
             RAISE(ABORT, 'sessions unavailable'); END;",
        )
        .unwrap();
    let err = store
        .log_response(&request.request_id, &NewResponse::success(1), Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, SqliteStoreError::Db(_)));
    assert_eq!(store.record_counts().unwrap().responses, 0);
    let session = store.get_session(&SessionId::new("s1")).unwrap().unwrap();
    assert_eq!(session.outcome_count(), 0);

    connection.execute_batch("DROP TRIGGER reject_session_update;").unwrap();
    let retried =
        store.log_response(&request.request_id, &NewResponse::success(1), Duration::ZERO).unwrap();
    assert_eq!(retried.session.unwrap().successful_requests, 1);
}

// ============================================================================
// SECTION: Rate Limiting
// ============================================================================

#[test]
fn fourth_call_in_window_is_rejected() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    for expected in 1 ..= 3 {
        let decision = store.check_and_admit("1.2.3.4", "/chat", 3).unwrap();
        assert!(decision.admitted);
        assert_eq!(decision.info.current_count, expected);
        assert!(!decision.info.blocked);
    }
    let fourth = store.check_and_admit("1.2.3.4", "/chat", 3).unwrap();
    assert!(!fourth.admitted);
    assert!(fourth.info.blocked);
    assert_eq!(fourth.info.current_count, 3);
    assert_eq!(fourth.info.reset_at_ms, TEN_OH_FIVE + RATE_LIMIT_WINDOW_MS);
}

#[test]
fn new_window_resets_count() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    for _ in 0 .. 4 {
        store.check_and_admit("1.2.3.4", "/chat", 3).unwrap();
    }
    clock.advance(Duration::from_secs(61));
    let decision = store.check_and_admit("1.2.3.4", "/chat", 3).unwrap();
    assert!(decision.admitted);
    assert_eq!(decision.info.current_count, 1);
    assert!(!decision.info.blocked);
}

#[test]
fn concurrent_callers_never_exceed_limit() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let mut handles = Vec::new();
    for _ in 0 .. 8 {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            (0 .. 5)
                .filter(|_| store.check_and_admit("9.9.9.9", "/chat", 10).unwrap().admitted)
                .count()
        }));
    }
    let admitted: usize = handles.into_iter().map(|handle| handle.join().unwrap()).sum();
    assert_eq!(admitted, 10);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn admissions_never_exceed_limit(limit in 1_u32 .. 8, calls in 0_usize .. 20) {
        let temp = TempDir::new().unwrap();
        let clock = ManualClock::new(TEN_OH_FIVE);
        let store = open_store(&temp, &clock);
        let admitted = (0 .. calls)
            .filter(|_| store.check_and_admit("1.2.3.4", "/chat", limit).unwrap().admitted)
            .count();
        prop_assert_eq!(admitted, calls.min(usize::try_from(limit).unwrap()));
    }
}

// ============================================================================
// SECTION: Analytics
// ============================================================================

#[test]
fn rollup_counts_single_successful_response() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let request = store.log_request(&chat_request("s1")).unwrap().request;
    store
        .log_response(&request.request_id, &NewResponse::success(128), Duration::from_millis(500))
        .unwrap();
    let bucket = store.rollup(TEN_OH_FIVE).unwrap();
    assert_eq!(bucket.date, "2024-03-05");
    assert_eq!(bucket.hour, 10);
    assert_eq!(bucket.total_requests, 1);
    assert_eq!(bucket.successful_requests, 1);
    assert_eq!(bucket.failed_requests, 0);
    assert_eq!(bucket.unique_sessions, 1);
    assert_eq!(bucket.avg_processing_secs, 0.5);
    assert_eq!(bucket.total_bytes, 128);
}

#[test]
fn rollup_twice_is_identical() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    for (index, ok) in [true, false, true].into_iter().enumerate() {
        let request = store.log_request(&chat_request(&format!("s{index}"))).unwrap().request;
        let response = if ok { NewResponse::success(10) } else { NewResponse::failure("bad") };
        store.log_response(&request.request_id, &response, Duration::from_millis(300)).unwrap();
    }
    let once = store.rollup(TEN_OH_FIVE).unwrap();
    let twice = store.rollup(TEN_OH_FIVE + 1_000).unwrap();
    assert_eq!(once, twice);
    assert_eq!(store.get_bucket("2024-03-05", 10).unwrap(), Some(once));
    assert_eq!(store.record_counts().unwrap().analytics_buckets, 1);
}

#[test]
fn concurrent_rollups_match_raw_records() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let mut handles = Vec::new();
    for worker in 0 .. 8 {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            for _ in 0 .. 10 {
                let logged = store.log_request(&chat_request(&format!("w{worker}"))).unwrap();
                let response = store
                    .log_response(
                        &logged.request.request_id,
                        &NewResponse::success(4),
                        Duration::from_millis(20),
                    )
                    .unwrap()
                    .response;
                store.rollup(response.timestamp_ms).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    let stored = store.get_bucket("2024-03-05", 10).unwrap().unwrap();
    assert_eq!(stored.total_requests, 80);
    assert_eq!(stored.unique_sessions, 8);
    assert_eq!(stored.total_bytes, 320);
    assert_eq!(store.rollup(TEN_OH_FIVE).unwrap(), stored);
}

#[test]
fn report_summarizes_window() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE - MILLIS_PER_DAY);
    let store = open_store(&temp, &clock);
    let yesterday = store.log_request(&chat_request("old")).unwrap().request;
    store.log_response(&yesterday.request_id, &NewResponse::success(5), Duration::from_secs(1)).unwrap();
    store.rollup(clock.now_millis()).unwrap();

    clock.set(TEN_OH_FIVE);
    for endpoint in ["/chat", "/chat", "/schema"] {
        let request = store
            .log_request(&NewRequest::new(endpoint, HttpMethod::Get).with_session(SessionId::new("new")))
            .unwrap()
            .request;
        store.log_response(&request.request_id, &NewResponse::success(1), Duration::from_secs(3)).unwrap();
    }
    store.rollup(TEN_OH_FIVE).unwrap();

    let report = store.report(2, 10).unwrap();
    assert_eq!(report.period.start_date, "2024-03-04");
    assert_eq!(report.period.end_date, "2024-03-05");
    assert_eq!(report.daily.len(), 2);
    assert_eq!(report.daily[0].total_requests, 1);
    assert_eq!(report.daily[1].total_requests, 3);
    assert_eq!(report.daily[1].avg_processing_secs, 3.0);
    assert_eq!(report.hourly.len(), 1);
    assert_eq!(report.hourly[0].hour, 10);
    assert_eq!(report.top_endpoints[0].endpoint, "/chat");
    assert_eq!(report.top_endpoints[0].request_count, 3);
    assert_eq!(report.sessions.total_sessions, 2);
    assert_eq!(report.sessions.active_sessions, 2);

    let today_only = store.report(1, 1).unwrap();
    assert_eq!(today_only.daily.len(), 1);
    assert_eq!(today_only.top_endpoints.len(), 1);
    assert_eq!(today_only.top_endpoints[0].request_count, 2);
    assert!(matches!(store.report(0, 10), Err(SqliteStoreError::Invalid(_))));
}

// ============================================================================
// SECTION: Retention
// ============================================================================

#[test]
fn purge_respects_cutoff_and_active_sessions() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE - 10 * MILLIS_PER_DAY);
    let store = open_store(&temp, &clock);
    let old = store.log_request(&chat_request("ended")).unwrap().request;
    store.log_response(&old.request_id, &NewResponse::success(1), Duration::ZERO).unwrap();
    store.upsert_session(&SessionId::new("live"), &ClientInfo::default()).unwrap();
    store.end_session(&SessionId::new("ended")).unwrap();
    store.check_and_admit("1.2.3.4", "/chat", 5).unwrap();
    store.rollup(TEN_OH_FIVE - 10 * MILLIS_PER_DAY).unwrap();

    clock.set(TEN_OH_FIVE);
    let fresh = store.log_request(&chat_request("live")).unwrap().request;

    let counts = store.purge_records_before(TEN_OH_FIVE - 7 * MILLIS_PER_DAY);
    assert!(counts.errors.is_empty());
    assert_eq!(counts.responses, 1);
    assert_eq!(counts.requests, 1);
    assert_eq!(counts.sessions, 1);
    assert_eq!(counts.rate_limit_windows, 1);
    assert_eq!(counts.analytics_buckets, 1);
    assert!(store.get_request(&fresh.request_id).unwrap().is_some());
    assert!(store.get_session(&SessionId::new("live")).unwrap().is_some());
}

#[test]
fn purge_to_now_leaves_only_active_sessions() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    let request = store.log_request(&chat_request("live")).unwrap().request;
    store.log_response(&request.request_id, &NewResponse::success(1), Duration::ZERO).unwrap();
    store.upsert_session(&SessionId::new("done"), &ClientInfo::default()).unwrap();
    store.end_session(&SessionId::new("done")).unwrap();
    store.check_and_admit("1.2.3.4", "/chat", 5).unwrap();
    store.rollup(TEN_OH_FIVE).unwrap();

    clock.advance(Duration::from_secs(10));
    let counts = store.purge_records_before(clock.now_millis());
    assert!(counts.errors.is_empty());
    assert_eq!(counts.rate_limit_windows, 1);
    let remaining = store.record_counts().unwrap();
    assert_eq!(remaining.requests, 0);
    assert_eq!(remaining.responses, 0);
    assert_eq!(remaining.rate_limit_windows, 0);
    assert_eq!(remaining.analytics_buckets, 0);
    assert_eq!(remaining.sessions, 1);
    assert_eq!(remaining.active_sessions, 1);
}

#[test]
fn purge_to_now_drops_live_rate_limit_window() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(TEN_OH_FIVE);
    let store = open_store(&temp, &clock);
    store.check_and_admit("1.2.3.4", "/chat", 5).unwrap();
    store.check_and_admit("1.2.3.4", "/chat", 5).unwrap();
    clock.advance(Duration::from_secs(10));
    let counts = store.purge_records_before(clock.now_millis());
    assert_eq!(counts.rate_limit_windows, 1);
    assert_eq!(store.record_counts().unwrap().rate_limit_windows, 0);
    let decision = store.check_and_admit("1.2.3.4", "/chat", 5).unwrap();
    assert!(decision.admitted);
    assert_eq!(decision.info.current_count, 1);
}

// ============================================================================
// SECTION: Schema
// ============================================================================

#[test]
fn unknown_schema_version_fails_closed() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ledger.sqlite");
    let clock = ManualClock::new(TEN_OH_FIVE);
    drop(open_store(&temp, &clock));
    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = ?1", params![99]).unwrap();
    drop(connection);
    let result = SqliteLedgerStore::new(SqliteStoreConfig::for_path(path));
    assert!(matches!(result, Err(SqliteStoreError::VersionMismatch(_))));
}

#[test]
fn directory_path_is_rejected() {
    let temp = TempDir::new().unwrap();
    let result = SqliteLedgerStore::new(SqliteStoreConfig::for_path(temp.path()));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}
