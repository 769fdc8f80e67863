// crates/apiledger/src/ledger.rs
// ============================================================================
// Module: API Ledger Facade
// Description: Explicit ledger instance exposing every boundary operation.
// Purpose: Apply the fail-open policy over store, archive, and cache.
// Dependencies: apiledger-config, apiledger-core, apiledger-store-sqlite, tracing
// ============================================================================

//! ## Overview
//! [`ApiLedger`] is constructed once and shared by reference (or cheap clone)
//! with every request handler. The structured store is the source of truth:
//! archive snapshots, session bookkeeping, and the analytics rollup that
//! follow a primary write are best-effort and only logged on failure.
//!
//! Failure policy at this boundary:
//! - Request and response logging return `Err` for the caller to branch on;
//!   nothing here panics or blocks the caller's primary flow.
//! - Rate-limit storage failures admit the call; a lost race guard rejects.
//! - Cache failures degrade to `false` on write and a miss on read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use apiledger_config::AnalyticsConfig;
use apiledger_config::ApiLedgerConfig;
use apiledger_config::CacheConfig;
use apiledger_config::RateLimitConfig;
use apiledger_config::RetentionConfig;
use apiledger_core::AnalyticsBucket;
use apiledger_core::AnalyticsReport;
use apiledger_core::ClientInfo;
use apiledger_core::Clock;
use apiledger_core::EndSessionOutcome;
use apiledger_core::LedgerError;
use apiledger_core::NewRequest;
use apiledger_core::NewResponse;
use apiledger_core::RateLimitDecision;
use apiledger_core::RateLimitInfo;
use apiledger_core::RequestId;
use apiledger_core::RequestRecord;
use apiledger_core::ResponseId;
use apiledger_core::ResponseRecord;
use apiledger_core::SessionId;
use apiledger_core::SessionRecord;
use apiledger_core::SystemClock;
use apiledger_store_sqlite::RATE_LIMIT_WINDOW_MS;
use apiledger_store_sqlite::SessionUpsert;
use apiledger_store_sqlite::SqliteLedgerStore;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::archive::ArchiveError;
use crate::archive::ArchiveLog;
use crate::archive::SessionExport;
use crate::cache::ResponseCache;
use crate::stats;
use crate::stats::StorageStats;
use crate::sweeper;
use crate::sweeper::PurgeReport;

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// API telemetry ledger.
///
/// # Invariants
/// - Every timestamp, TTL check, window check, and cutoff reads `clock`.
/// - Clones share the same store connections, directories, and clock.
#[derive(Clone)]
pub struct ApiLedger {
    /// Structured store (source of truth).
    store: SqliteLedgerStore,
    /// Best-effort JSON snapshots.
    archive: ArchiveLog,
    /// TTL response cache.
    cache: ResponseCache,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Root directory for the database, archive, and cache.
    storage_root: PathBuf,
    /// Rate limiter defaults.
    rate_limit: RateLimitConfig,
    /// Cache defaults.
    cache_defaults: CacheConfig,
    /// Report defaults.
    analytics: AnalyticsConfig,
    /// Retention defaults.
    retention: RetentionConfig,
}

impl ApiLedger {
    /// Opens the ledger using wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageIo`] when the database or a storage
    /// directory cannot be opened.
    pub fn open(config: &ApiLedgerConfig) -> Result<Self, LedgerError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Opens the ledger using the supplied clock.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageIo`] when the database or a storage
    /// directory cannot be opened.
    pub fn open_with_clock(
        config: &ApiLedgerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LedgerError> {
        let storage_root = config.storage.root_dir.clone();
        let store =
            SqliteLedgerStore::with_clock(config.storage.sqlite_config(), Arc::clone(&clock))?;
        let archive = ArchiveLog::open(&storage_root)?;
        let cache =
            ResponseCache::open(&storage_root, Arc::clone(&clock), config.cache.max_payload_bytes)?;
        info!(root = %storage_root.display(), "api ledger opened");
        Ok(Self {
            store,
            archive,
            cache,
            clock,
            storage_root,
            rate_limit: config.rate_limit,
            cache_defaults: config.cache,
            analytics: config.analytics,
            retention: config.retention,
        })
    }

    /// Root directory for the database, archive, and cache.
    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Archival log handle.
    #[must_use]
    pub const fn archive(&self) -> &ArchiveLog {
        &self.archive
    }

    /// Current time from the ledger clock.
    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    // ------------------------------------------------------------------------
    // Requests and responses
    // ------------------------------------------------------------------------

    /// Records an inbound request, counts it against its session, and
    /// archives a snapshot.
    ///
    /// The request insert and the session upsert are one store transaction.
    /// Archive writes run after the commit; their failures are logged and do
    /// not fail this call.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for malformed input or
    /// [`LedgerError::StorageIo`] when the transaction fails; nothing is
    /// written in either case.
    pub fn log_request(&self, request: &NewRequest) -> Result<RequestRecord, LedgerError> {
        let logged = self.store.log_request(request).map_err(|err| degraded("log_request", err))?;
        if let Some(upsert) = &logged.session
            && upsert.created
        {
            archive_best_effort("session", self.archive.write_session(&upsert.session));
        }
        archive_best_effort("request", self.archive.write_request(&logged.request));
        Ok(logged.request)
    }

    /// Records the outcome of a logged request together with its session
    /// counters, archives a snapshot, and refreshes the hour's rollup.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] when the input is malformed, the
    /// request is unknown, or it already has a response;
    /// [`LedgerError::StorageIo`] when the transaction fails.
    pub fn log_response(
        &self,
        request_id: &RequestId,
        response: &NewResponse,
        duration: Duration,
    ) -> Result<ResponseRecord, LedgerError> {
        let logged = self
            .store
            .log_response(request_id, response, duration)
            .map_err(|err| degraded("log_response", err))?;
        let record = logged.response;
        archive_best_effort("response", self.archive.write_response(&record));
        if let Err(err) = self.store.rollup(record.timestamp_ms) {
            warn!(timestamp_ms = record.timestamp_ms, error = %err, "analytics rollup skipped");
        }
        Ok(record)
    }

    /// Looks up a request.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageIo`] when the read fails.
    pub fn get_request(&self, request_id: &RequestId) -> Result<Option<RequestRecord>, LedgerError> {
        Ok(self.store.get_request(request_id)?)
    }

    /// Looks up a response.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageIo`] when the read fails.
    pub fn get_response(
        &self,
        response_id: &ResponseId,
    ) -> Result<Option<ResponseRecord>, LedgerError> {
        Ok(self.store.get_response(response_id)?)
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Creates the session or counts one more request against it.
    ///
    /// A newly created session gets an archive snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for a malformed id or client, or
    /// [`LedgerError::StorageIo`] when the write fails.
    pub fn upsert_session(
        &self,
        session_id: &SessionId,
        client: &ClientInfo,
    ) -> Result<SessionUpsert, LedgerError> {
        let upsert = self
            .store
            .upsert_session(session_id, client)
            .map_err(|err| degraded("upsert_session", err))?;
        if upsert.created {
            archive_best_effort("session", self.archive.write_session(&upsert.session));
        }
        Ok(upsert)
    }

    /// Adds one outcome to a session's counters.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown session or a storage
    /// error when the update fails.
    pub fn record_session_outcome(
        &self,
        session_id: &SessionId,
        success: bool,
        duration: Duration,
    ) -> Result<SessionRecord, LedgerError> {
        self.store
            .record_session_outcome(session_id, success, duration)
            .map_err(|err| degraded("record_session_outcome", err))
    }

    /// Ends a session once; repeated calls are no-ops.
    ///
    /// The session snapshot is rewritten when this call ended it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageIo`] when the update fails.
    pub fn end_session(&self, session_id: &SessionId) -> Result<EndSessionOutcome, LedgerError> {
        let outcome =
            self.store.end_session(session_id).map_err(|err| degraded("end_session", err))?;
        if outcome == EndSessionOutcome::Ended {
            match self.store.get_session(session_id) {
                Ok(Some(session)) => {
                    archive_best_effort("session", self.archive.write_session(&session));
                }
                Ok(None) => {}
                Err(err) => warn!(session_id = %session_id, error = %err, "session snapshot skipped"),
            }
        }
        Ok(outcome)
    }

    /// Looks up a session.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageIo`] when the read fails.
    pub fn get_session(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, LedgerError> {
        Ok(self.store.get_session(session_id)?)
    }

    /// Ids of sessions still active.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageIo`] when the read fails.
    pub fn active_session_ids(&self) -> Result<Vec<SessionId>, LedgerError> {
        Ok(self.store.active_session_ids()?)
    }

    /// Writes a session with all its requests and responses to `exports/`.
    ///
    /// Returns `None` for an unknown session.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageIo`] when a read or the export write
    /// fails.
    pub fn export_session(&self, session_id: &SessionId) -> Result<Option<PathBuf>, LedgerError> {
        let Some(session) = self.store.get_session(session_id)? else {
            return Ok(None);
        };
        let export = SessionExport {
            requests: self.store.session_requests(session_id)?,
            responses: self.store.session_responses(session_id)?,
            session,
            exported_at_ms: self.now_millis(),
        };
        let path = self.archive.write_export(&export)?;
        info!(
            session_id = %session_id,
            requests = export.requests.len(),
            responses = export.responses.len(),
            "session exported"
        );
        Ok(Some(path))
    }

    // ------------------------------------------------------------------------
    // Rate limiting
    // ------------------------------------------------------------------------

    /// Admits or rejects one call for `(client_address, endpoint)`.
    ///
    /// `limit` defaults to the configured per-window limit. Storage failures
    /// admit the call; a lost race guard rejects it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for a zero limit or malformed key.
    pub fn check_and_admit(
        &self,
        client_address: &str,
        endpoint: &str,
        limit: Option<u32>,
    ) -> Result<RateLimitDecision, LedgerError> {
        let limit = limit.unwrap_or(self.rate_limit.default_limit);
        let err = match self.store.check_and_admit(client_address, endpoint, limit) {
            Ok(decision) => return Ok(decision),
            Err(err) => LedgerError::from(err),
        };
        let now = self.now_millis();
        match err {
            LedgerError::StorageIo(message) => {
                warn!(client_address, endpoint, error = %message, "rate limiter unavailable; admitting");
                Ok(synthetic_decision(true, limit, now))
            }
            LedgerError::RaceGuard(message) => {
                warn!(client_address, endpoint, error = %message, "rate-limit race guard lost; rejecting");
                Ok(synthetic_decision(false, limit, now))
            }
            other => Err(other),
        }
    }

    // ------------------------------------------------------------------------
    // Cache
    // ------------------------------------------------------------------------

    /// Caches `payload` under `key`. Returns `false` (logged) on failure.
    ///
    /// `ttl_minutes` defaults to the configured TTL.
    #[must_use]
    pub fn cache_put(&self, key: &str, payload: &Value, ttl_minutes: Option<u32>) -> bool {
        let ttl = ttl_minutes.unwrap_or(self.cache_defaults.default_ttl_minutes);
        match self.cache.put(key, payload, ttl) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "cache write failed");
                false
            }
        }
    }

    /// Returns the live cached payload for `key`; failures read as a miss.
    #[must_use]
    pub fn cache_get(&self, key: &str) -> Option<Value> {
        match self.cache.get(key) {
            Ok(hit) => {
                debug!(hit = hit.is_some(), "cache lookup");
                hit
            }
            Err(err) => {
                warn!(error = %err, "cache read failed; treating as miss");
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Analytics, stats, and retention
    // ------------------------------------------------------------------------

    /// Recomputes the analytics bucket for the hour containing `timestamp_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageIo`] when the read or upsert fails.
    pub fn rollup(&self, timestamp_ms: i64) -> Result<AnalyticsBucket, LedgerError> {
        Ok(self.store.rollup(timestamp_ms)?)
    }

    /// Builds an analytics report over the trailing `days` (configured
    /// default when `None`).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] when `days` is out of range or
    /// [`LedgerError::StorageIo`] when a query fails.
    pub fn report(&self, days: Option<u32>) -> Result<AnalyticsReport, LedgerError> {
        let days = days.unwrap_or(self.analytics.default_report_days);
        Ok(self.store.report(days, self.analytics.top_endpoints)?)
    }

    /// Record counts and byte sizes across every store.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageIo`] when the database or a directory
    /// cannot be read.
    pub fn stats(&self) -> Result<StorageStats, LedgerError> {
        stats::collect(&self.store, &self.archive, &self.storage_root, self.now_millis())
    }

    /// Purges everything older than `days_to_keep` (configured default when
    /// `None`). Never fails as a whole; see [`PurgeReport::errors`].
    #[must_use]
    pub fn purge(&self, days_to_keep: Option<u32>) -> PurgeReport {
        let days = days_to_keep.unwrap_or(self.retention.days_to_keep);
        sweeper::sweep(&self.store, &self.archive, &self.storage_root, days, self.now_millis())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts a store error and logs the degradation.
fn degraded(operation: &'static str, err: impl Into<LedgerError>) -> LedgerError {
    let err = err.into();
    warn!(operation, kind = err.kind(), error = %err, "ledger write not recorded");
    err
}

/// Logs an archive failure without propagating it.
fn archive_best_effort(kind: &'static str, result: Result<PathBuf, ArchiveError>) {
    match result {
        Ok(path) => debug!(kind, path = %path.display(), "archive snapshot written"),
        Err(err) => warn!(kind, error = %err, "archive snapshot skipped"),
    }
}

/// Decision returned when the limiter could not consult its window.
const fn synthetic_decision(admitted: bool, limit: u32, now_ms: i64) -> RateLimitDecision {
    RateLimitDecision {
        admitted,
        info: RateLimitInfo {
            current_count: if admitted { 0 } else { limit },
            limit,
            window_start_ms: now_ms,
            reset_at_ms: now_ms.saturating_add(RATE_LIMIT_WINDOW_MS),
            blocked: !admitted,
        },
    }
}
