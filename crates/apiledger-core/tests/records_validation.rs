// crates/apiledger-core/tests/records_validation.rs
// ============================================================================
// Module: Record Validation Tests
// Description: Boundary validation for request, response, and session inputs.
// Purpose: Ensure malformed records are rejected before any store write.
// ============================================================================

//! ## Overview
//! Exercises the validation rules on `New*` inputs and session identifiers,
//! plus the derived values callers put in client-facing headers.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use apiledger_core::ClientInfo;
use apiledger_core::HttpMethod;
use apiledger_core::LedgerError;
use apiledger_core::MAX_ENDPOINT_LENGTH;
use apiledger_core::MAX_HEADER_COUNT;
use apiledger_core::NewRequest;
use apiledger_core::NewResponse;
use apiledger_core::RateLimitInfo;
use apiledger_core::SessionId;
use apiledger_core::StatusCategory;
use proptest::prelude::*;

// ============================================================================
// SECTION: Requests
// ============================================================================

#[test]
fn well_formed_request_validates() {
    let request = NewRequest::new("/chat", HttpMethod::Post)
        .with_session(SessionId::new("s1"))
        .with_query_text("how many orders shipped last week")
        .with_client(ClientInfo::new("1.2.3.4", "curl/8.0"))
        .with_header("content-type", "application/json");
    request.validate().expect("valid request");
    assert!(request.snapshot_bytes() > 0);
}

#[test]
fn endpoint_must_be_absolute_and_bounded() {
    let relative = NewRequest::new("chat", HttpMethod::Get);
    assert_eq!(relative.validate().unwrap_err().field, "endpoint");

    let spaced = NewRequest::new("/chat now", HttpMethod::Get);
    assert_eq!(spaced.validate().unwrap_err().field, "endpoint");

    let long = format!("/{}", "a".repeat(MAX_ENDPOINT_LENGTH));
    assert_eq!(NewRequest::new(long, HttpMethod::Get).validate().unwrap_err().field, "endpoint");
}

#[test]
fn header_count_is_capped() {
    let mut request = NewRequest::new("/chat", HttpMethod::Get);
    for index in 0 ..= MAX_HEADER_COUNT {
        request = request.with_header(format!("x-h{index}"), "v");
    }
    assert_eq!(request.validate().unwrap_err().field, "headers");
}

#[test]
fn method_parses_case_insensitively() {
    assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
    assert!("BREW".parse::<HttpMethod>().is_err());
}

// ============================================================================
// SECTION: Responses
// ============================================================================

#[test]
fn response_status_defaults_follow_success_flag() {
    assert_eq!(NewResponse::success(10).effective_status_code(), 200);
    assert_eq!(NewResponse::failure("boom").effective_status_code(), 500);
    assert_eq!(StatusCategory::from_status(429), StatusCategory::Throttled);
    assert_eq!(StatusCategory::from_status(404), StatusCategory::ClientError);
    assert_eq!(StatusCategory::from_status(503), StatusCategory::ServerError);
}

#[test]
fn response_rejects_bad_status_and_error_on_success() {
    let bad_status = NewResponse::success(0).with_status_code(700);
    assert_eq!(bad_status.validate().unwrap_err().field, "status_code");

    let mut contradictory = NewResponse::success(0);
    contradictory.error_text = Some("oops".to_string());
    assert_eq!(contradictory.validate().unwrap_err().field, "error_text");
}

#[test]
fn validation_error_maps_to_ledger_validation() {
    let error = NewResponse::success(0).with_status_code(42).validate().unwrap_err();
    let ledger: LedgerError = error.into();
    assert_eq!(ledger.kind(), "validation");
}

// ============================================================================
// SECTION: Sessions
// ============================================================================

#[test]
fn session_ids_reject_path_like_values() {
    for bad in ["", ".", "..", "a/b", "a b", "../../etc"] {
        assert!(SessionId::new(bad).validate().is_err(), "accepted {bad:?}");
    }
    SessionId::new("client-42:tab.1_x").validate().expect("valid id");
    SessionId::generate().validate().expect("generated id");
}

proptest! {
    #[test]
    fn allowed_charset_always_validates(raw in "[A-Za-z0-9_:-][A-Za-z0-9_.:-]{0,100}") {
        prop_assert!(SessionId::new(raw).validate().is_ok());
    }
}

// ============================================================================
// SECTION: Rate-Limit Headers
// ============================================================================

#[test]
fn blocked_window_emits_retry_after() {
    let info = RateLimitInfo {
        current_count: 3,
        limit: 3,
        window_start_ms: 1_000,
        reset_at_ms: 61_000,
        blocked: true,
    };
    let headers = info.header_pairs(59_500);
    assert!(headers.contains(&("X-RateLimit-Remaining", "0".to_string())));
    assert!(headers.contains(&("X-RateLimit-Reset", "61".to_string())));
    assert!(headers.contains(&("Retry-After", "2".to_string())));
}

#[test]
fn open_window_has_no_retry_after() {
    let info = RateLimitInfo {
        current_count: 1,
        limit: 3,
        window_start_ms: 0,
        reset_at_ms: 60_000,
        blocked: false,
    };
    let headers = info.header_pairs(1_000);
    assert_eq!(info.remaining(), 2);
    assert!(headers.iter().all(|(name, _)| *name != "Retry-After"));
}
