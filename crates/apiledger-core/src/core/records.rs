// crates/apiledger-core/src/core/records.rs
// ============================================================================
// Module: API Ledger Records
// Description: Typed request, response, session, and rate-limit records.
// Purpose: Replace loosely-typed blobs with explicit, validated record types.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Inputs (`New*`) are validated at the store boundary and rejected before
//! any write when malformed. Stored records (`*Record`) are what the store
//! hands back; request and response records are immutable once written,
//! session records change only through additive counter updates.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::RequestId;
use crate::core::identifiers::ResponseId;
use crate::core::identifiers::SessionId;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum endpoint path length.
pub const MAX_ENDPOINT_LENGTH: usize = 512;
/// Maximum query text / generated query length in bytes.
pub const MAX_QUERY_TEXT_BYTES: usize = 64 * 1024;
/// Maximum client address length.
pub const MAX_CLIENT_ADDRESS_LENGTH: usize = 256;
/// Maximum client agent length.
pub const MAX_CLIENT_AGENT_LENGTH: usize = 1024;
/// Maximum number of captured headers per request.
pub const MAX_HEADER_COUNT: usize = 128;
/// Maximum header name length.
pub const MAX_HEADER_NAME_LENGTH: usize = 256;
/// Maximum header value length.
pub const MAX_HEADER_VALUE_LENGTH: usize = 8 * 1024;
/// Maximum producing-component tag length.
pub const MAX_COMPONENT_LENGTH: usize = 128;
/// Maximum error text length in bytes.
pub const MAX_ERROR_TEXT_BYTES: usize = 16 * 1024;

// ============================================================================
// SECTION: Validation Errors
// ============================================================================

/// A record field failed boundary validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct RecordValidationError {
    /// Offending field name.
    pub field: &'static str,
    /// Human-readable reason.
    pub reason: String,
}

impl RecordValidationError {
    /// Creates a validation error for `field`.
    #[must_use]
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Rejects text longer than `max` bytes.
fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), RecordValidationError> {
    if value.len() > max {
        return Err(RecordValidationError::new(field, format!("exceeds {max} bytes")));
    }
    Ok(())
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// HTTP method of an inbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// PATCH.
    Patch,
    /// DELETE.
    Delete,
    /// HEAD.
    Head,
    /// OPTIONS.
    Options,
}

impl HttpMethod {
    /// Returns the canonical upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = RecordValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            other => Err(RecordValidationError::new(
                "method",
                format!("unsupported http method: {other}"),
            )),
        }
    }
}

/// Originating client of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client network address.
    pub address: Option<String>,
    /// Client agent string.
    pub agent: Option<String>,
}

impl ClientInfo {
    /// Creates client info from an address and agent.
    #[must_use]
    pub fn new(address: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            agent: Some(agent.into()),
        }
    }

    /// Validates field lengths.
    ///
    /// # Errors
    ///
    /// Returns [`RecordValidationError`] when a field exceeds its limit.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if let Some(address) = &self.address {
            check_len("client_address", address, MAX_CLIENT_ADDRESS_LENGTH)?;
        }
        if let Some(agent) = &self.agent {
            check_len("client_agent", agent, MAX_CLIENT_AGENT_LENGTH)?;
        }
        Ok(())
    }
}

/// Inbound call to be logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    /// Endpoint path (must start with `/`).
    pub endpoint: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Natural-language query text, when the call carried one.
    pub query_text: Option<String>,
    /// Session the call belongs to.
    pub session_id: Option<SessionId>,
    /// Originating client.
    pub client: ClientInfo,
    /// Header snapshot.
    pub headers: BTreeMap<String, String>,
}

impl NewRequest {
    /// Creates a request with no session, client, query text, or headers.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            query_text: None,
            session_id: None,
            client: ClientInfo::default(),
            headers: BTreeMap::new(),
        }
    }

    /// Attaches the session identifier.
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attaches the originating query text.
    #[must_use]
    pub fn with_query_text(mut self, query_text: impl Into<String>) -> Self {
        self.query_text = Some(query_text.into());
        self
    }

    /// Attaches client address and agent.
    #[must_use]
    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// Adds a header to the snapshot.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Size of the serialized request snapshot in bytes.
    #[must_use]
    pub fn snapshot_bytes(&self) -> usize {
        serde_json::to_vec(self).map_or(0, |bytes| bytes.len())
    }

    /// Validates all fields.
    ///
    /// # Errors
    ///
    /// Returns [`RecordValidationError`] for the first field that fails.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        validate_endpoint(&self.endpoint)?;
        if let Some(query_text) = &self.query_text {
            check_len("query_text", query_text, MAX_QUERY_TEXT_BYTES)?;
        }
        if let Some(session_id) = &self.session_id {
            session_id.validate()?;
        }
        self.client.validate()?;
        if self.headers.len() > MAX_HEADER_COUNT {
            return Err(RecordValidationError::new(
                "headers",
                format!("more than {MAX_HEADER_COUNT} headers"),
            ));
        }
        for (name, value) in &self.headers {
            if name.is_empty() {
                return Err(RecordValidationError::new("headers", "empty header name"));
            }
            check_len("headers", name, MAX_HEADER_NAME_LENGTH)?;
            check_len("headers", value, MAX_HEADER_VALUE_LENGTH)?;
        }
        Ok(())
    }
}

/// Validates an endpoint path.
///
/// # Errors
///
/// Returns [`RecordValidationError`] when the endpoint is empty, relative,
/// overlong, or contains whitespace/control characters.
pub fn validate_endpoint(endpoint: &str) -> Result<(), RecordValidationError> {
    if !endpoint.starts_with('/') {
        return Err(RecordValidationError::new("endpoint", "must start with '/'"));
    }
    check_len("endpoint", endpoint, MAX_ENDPOINT_LENGTH)?;
    if endpoint.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(RecordValidationError::new("endpoint", "contains whitespace"));
    }
    Ok(())
}

/// Stored request record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Request identifier.
    pub request_id: RequestId,
    /// Session reference.
    pub session_id: Option<SessionId>,
    /// Endpoint path.
    pub endpoint: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Originating query text.
    pub query_text: Option<String>,
    /// Serialized request size in bytes.
    pub request_bytes: u64,
    /// Client address.
    pub client_address: Option<String>,
    /// Client agent string.
    pub client_agent: Option<String>,
    /// Header snapshot.
    pub headers: BTreeMap<String, String>,
    /// Unix milliseconds when the request was logged.
    pub timestamp_ms: i64,
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Coarse outcome class derived from the status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    /// Status below 400.
    Success,
    /// 4xx other than 429.
    ClientError,
    /// 429.
    Throttled,
    /// 5xx.
    ServerError,
}

impl StatusCategory {
    /// Classifies an HTTP-style status code.
    #[must_use]
    pub const fn from_status(status_code: u16) -> Self {
        match status_code {
            429 => Self::Throttled,
            400 ..= 499 => Self::ClientError,
            500 ..= 599 => Self::ServerError,
            _ => Self::Success,
        }
    }
}

/// Outcome of a request to be logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResponse {
    /// Whether the call succeeded.
    pub success: bool,
    /// Explicit status code; defaults to 200/500 from `success`.
    pub status_code: Option<u16>,
    /// Response payload size in bytes.
    pub response_bytes: u64,
    /// Generated query text, if any.
    pub generated_query: Option<String>,
    /// Result cardinality.
    pub result_count: u64,
    /// Tag of the component that produced the response.
    pub component: Option<String>,
    /// Error text for failed calls.
    pub error_text: Option<String>,
}

impl NewResponse {
    /// Creates a successful response of `response_bytes` bytes.
    #[must_use]
    pub const fn success(response_bytes: u64) -> Self {
        Self {
            success: true,
            status_code: None,
            response_bytes,
            generated_query: None,
            result_count: 0,
            component: None,
            error_text: None,
        }
    }

    /// Creates a failed response carrying `error_text`.
    #[must_use]
    pub fn failure(error_text: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: None,
            response_bytes: 0,
            generated_query: None,
            result_count: 0,
            component: None,
            error_text: Some(error_text.into()),
        }
    }

    /// Overrides the status code.
    #[must_use]
    pub const fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Sets the response size.
    #[must_use]
    pub const fn with_response_bytes(mut self, response_bytes: u64) -> Self {
        self.response_bytes = response_bytes;
        self
    }

    /// Attaches generated query text.
    #[must_use]
    pub fn with_generated_query(mut self, query: impl Into<String>) -> Self {
        self.generated_query = Some(query.into());
        self
    }

    /// Sets the result cardinality.
    #[must_use]
    pub const fn with_result_count(mut self, result_count: u64) -> Self {
        self.result_count = result_count;
        self
    }

    /// Tags the producing component.
    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Effective status code.
    #[must_use]
    pub const fn effective_status_code(&self) -> u16 {
        match self.status_code {
            Some(code) => code,
            None if self.success => 200,
            None => 500,
        }
    }

    /// Validates all fields.
    ///
    /// # Errors
    ///
    /// Returns [`RecordValidationError`] for the first field that fails.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        let status = self.effective_status_code();
        if !(100 ..= 599).contains(&status) {
            return Err(RecordValidationError::new("status_code", "must be within 100..=599"));
        }
        if i64::try_from(self.response_bytes).is_err() {
            return Err(RecordValidationError::new("response_bytes", "out of range"));
        }
        if i64::try_from(self.result_count).is_err() {
            return Err(RecordValidationError::new("result_count", "out of range"));
        }
        if let Some(query) = &self.generated_query {
            check_len("generated_query", query, MAX_QUERY_TEXT_BYTES)?;
        }
        if let Some(component) = &self.component {
            check_len("component", component, MAX_COMPONENT_LENGTH)?;
        }
        if let Some(error_text) = &self.error_text {
            if self.success {
                return Err(RecordValidationError::new(
                    "error_text",
                    "successful responses must not carry error text",
                ));
            }
            check_len("error_text", error_text, MAX_ERROR_TEXT_BYTES)?;
        }
        Ok(())
    }
}

/// Stored response record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Response identifier.
    pub response_id: ResponseId,
    /// The request this response answers.
    pub request_id: RequestId,
    /// Session reference, copied from the request.
    pub session_id: Option<SessionId>,
    /// Unix milliseconds when the response was logged.
    pub timestamp_ms: i64,
    /// Whether the call succeeded.
    pub success: bool,
    /// Status code.
    pub status_code: u16,
    /// Response size in bytes.
    pub response_bytes: u64,
    /// Processing duration in seconds.
    pub duration_secs: f64,
    /// Generated query text.
    pub generated_query: Option<String>,
    /// Result cardinality.
    pub result_count: u64,
    /// Producing component tag.
    pub component: Option<String>,
    /// Error text for failed calls.
    pub error_text: Option<String>,
}

impl ResponseRecord {
    /// Status class of this response.
    #[must_use]
    pub const fn status_category(&self) -> StatusCategory {
        StatusCategory::from_status(self.status_code)
    }
}

// ============================================================================
// SECTION: Sessions
// ============================================================================

/// Stored session aggregate.
///
/// # Invariants
/// - `total_requests` equals the number of upserts for this session.
/// - `successful_requests + failed_requests` equals the number of recorded outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier.
    pub session_id: SessionId,
    /// Creation time (unix ms).
    pub created_at_ms: i64,
    /// Last activity time (unix ms).
    pub last_activity_ms: i64,
    /// Requests seen in this session.
    pub total_requests: u64,
    /// Successful outcomes.
    pub successful_requests: u64,
    /// Failed outcomes.
    pub failed_requests: u64,
    /// Cumulative processing time in seconds.
    pub total_response_secs: f64,
    /// Client address observed at creation.
    pub client_address: Option<String>,
    /// Client agent observed at creation.
    pub client_agent: Option<String>,
    /// False once the session has been ended.
    pub active: bool,
    /// End time (unix ms), set exactly once.
    pub ended_at_ms: Option<i64>,
}

impl SessionRecord {
    /// Number of recorded outcomes.
    #[must_use]
    pub const fn outcome_count(&self) -> u64 {
        self.successful_requests.saturating_add(self.failed_requests)
    }

    /// Mean processing time per recorded outcome, if any.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "Outcome counts stay far below 2^52.")]
    pub fn average_response_secs(&self) -> Option<f64> {
        let outcomes = self.outcome_count();
        (outcomes > 0).then(|| self.total_response_secs / outcomes as f64)
    }
}

/// Result of ending a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndSessionOutcome {
    /// The session was active and is now ended.
    Ended,
    /// The session had already been ended; nothing changed.
    AlreadyEnded,
    /// No session with that identifier exists.
    NotFound,
}

// ============================================================================
// SECTION: Rate Limiting
// ============================================================================

/// Window state reported to the caller for client-facing headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Admitted requests counted in the current window.
    pub current_count: u32,
    /// Configured ceiling.
    pub limit: u32,
    /// Window start (unix ms).
    pub window_start_ms: i64,
    /// Window end / reset time (unix ms).
    pub reset_at_ms: i64,
    /// Whether the window has rejected at least one call.
    pub blocked: bool,
}

impl RateLimitInfo {
    /// Requests still admissible in this window.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.current_count)
    }

    /// Whole seconds until the window resets, rounded up.
    #[must_use]
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let remaining_ms = self.reset_at_ms.saturating_sub(now_ms).max(0);
        u64::try_from(remaining_ms).unwrap_or(0).div_ceil(1_000)
    }

    /// Standard rate-limit response headers.
    #[must_use]
    pub fn header_pairs(&self, now_ms: i64) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining().to_string()),
            ("X-RateLimit-Reset", (self.reset_at_ms.div_euclid(1_000)).to_string()),
        ];
        if self.blocked {
            headers.push(("Retry-After", self.retry_after_secs(now_ms).to_string()));
        }
        headers
    }
}

/// Admission decision from the rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the call was admitted.
    pub admitted: bool,
    /// Window state after the decision.
    pub info: RateLimitInfo,
}
