// crates/apiledger-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Ledger Store
// Description: Durable request, response, and session records backed by SQLite.
// Purpose: Provide the transactional source of truth for API telemetry.
// Dependencies: apiledger-core, rusqlite, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! This module owns the `SQLite` connections, the schema, and the record
//! operations of the structured store. Writes go through one mutex-guarded
//! connection and each operation is a single statement or a single
//! transaction, so a record is either fully written or not at all. Reads use
//! a round-robin pool of connections; in WAL mode each read sees a committed
//! snapshot and never blocks writers.
//! Database contents are treated as untrusted: rows that fail to decode are
//! reported as errors rather than silently coerced.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use apiledger_core::ClientInfo;
use apiledger_core::Clock;
use apiledger_core::EndSessionOutcome;
use apiledger_core::HttpMethod;
use apiledger_core::LedgerError;
use apiledger_core::NewRequest;
use apiledger_core::NewResponse;
use apiledger_core::RecordValidationError;
use apiledger_core::RequestId;
use apiledger_core::RequestRecord;
use apiledger_core::ResponseId;
use apiledger_core::ResponseRecord;
use apiledger_core::SessionId;
use apiledger_core::SessionRecord;
use apiledger_core::SystemClock;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use rusqlite::types::Type;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length for a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum length for the full store path.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum read connection pool size.
pub const MAX_READ_POOL_SIZE: usize = 64;

/// Column list shared by request queries.
const SELECT_REQUEST: &str = "SELECT request_id, session_id, endpoint, method, query_text, \
                              request_bytes, client_address, client_agent, headers_json, \
                              timestamp_ms FROM requests";
/// Column list shared by response queries.
const SELECT_RESPONSE: &str = "SELECT response_id, request_id, session_id, timestamp_ms, success, \
                               status_code, response_bytes, duration_secs, generated_query, \
                               result_count, component, error_text FROM responses";
/// Column list shared by session queries.
const SELECT_SESSION: &str = "SELECT session_id, created_at_ms, last_activity_ms, \
                              total_requests, successful_requests, failed_requests, \
                              total_response_secs, client_address, client_agent, active, \
                              ended_at_ms FROM sessions";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended; readers never block the writer).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` ledger store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `read_pool_size` is within `1..=64`.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of connections used for read path isolation.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl SqliteStoreConfig {
    /// Returns a configuration with defaults for everything but the path.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: default_read_pool_size(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    4
}

/// Validates runtime limits in the store configuration.
fn validate_runtime_limits(config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    if config.read_pool_size == 0 || config.read_pool_size > MAX_READ_POOL_SIZE {
        return Err(SqliteStoreError::Invalid(format!(
            "read_pool_size out of range: {} (1..={MAX_READ_POOL_SIZE})",
            config.read_pool_size
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw query text or header values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored row could not be decoded.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Input rejected before any write.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Referenced record does not exist.
    #[error("sqlite store record not found: {0}")]
    NotFound(String),
    /// A guarded update lost its precondition.
    #[error("sqlite store race guard: {0}")]
    RaceGuard(String),
}

impl From<RecordValidationError> for SqliteStoreError {
    fn from(error: RecordValidationError) -> Self {
        Self::Invalid(error.to_string())
    }
}

impl From<SqliteStoreError> for LedgerError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message)
            | SqliteStoreError::Db(message)
            | SqliteStoreError::Corrupt(message)
            | SqliteStoreError::VersionMismatch(message) => Self::StorageIo(message),
            SqliteStoreError::Invalid(message) => Self::Validation(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::RaceGuard(message) => Self::RaceGuard(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed ledger store.
///
/// # Invariants
/// - All writes are serialized through one mutex-guarded connection.
/// - Reads rotate across `read_pool_size` connections.
/// - Every timestamp the store assigns comes from the injected [`Clock`].
#[derive(Clone)]
pub struct SqliteLedgerStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared write connection.
    write_connection: Arc<Mutex<Connection>>,
    /// Read-only connection pool used for analytics and lookups.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
    /// Time source.
    clock: Arc<dyn Clock>,
}

/// Result of [`SqliteLedgerStore::upsert_session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpsert {
    /// True when this call created the session.
    pub created: bool,
    /// Session state after the upsert.
    pub session: SessionRecord,
}

/// Result of [`SqliteLedgerStore::log_request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedRequest {
    /// The stored request.
    pub request: RequestRecord,
    /// Session state after counting this request; `None` for anonymous calls.
    pub session: Option<SessionUpsert>,
}

/// Result of [`SqliteLedgerStore::log_response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedResponse {
    /// The stored response.
    pub response: ResponseRecord,
    /// Session counters after this outcome; `None` when the request had no
    /// session or its session row has been purged.
    pub session: Option<SessionRecord>,
}

/// Row counts per table, used by storage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRecordCounts {
    /// Request records.
    pub requests: u64,
    /// Response records.
    pub responses: u64,
    /// Session records.
    pub sessions: u64,
    /// Sessions still active.
    pub active_sessions: u64,
    /// Live rate-limit windows.
    pub rate_limit_windows: u64,
    /// Analytics buckets.
    pub analytics_buckets: u64,
}

impl SqliteLedgerStore {
    /// Opens a store that reads wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Opens a store using the supplied clock.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn with_clock(
        config: SqliteStoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        validate_runtime_limits(&config)?;
        let mut write_connection = open_connection(&config)?;
        initialize_schema(&mut write_connection)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(open_connection(&config)?));
        }
        info!(
            path = %config.path.display(),
            read_pool_size = config.read_pool_size,
            journal_mode = config.journal_mode.pragma_value(),
            "ledger store opened"
        );
        Ok(Self {
            config,
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
            clock,
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Current time from the injected clock.
    pub(crate) fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Locks the write connection.
    pub(crate) fn lock_writer(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.write_connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("write mutex poisoned".to_string()))
    }

    /// Locks the next read connection using round-robin selection.
    pub(crate) fn lock_reader(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        let len = self.read_connections.len();
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % len;
        self.read_connections[index]
            .lock()
            .map_err(|_| SqliteStoreError::Db("read mutex poisoned".to_string()))
    }

    // ------------------------------------------------------------------------
    // Requests and responses
    // ------------------------------------------------------------------------

    /// Validates and durably records an inbound request.
    ///
    /// When the request names a session, the session is created or its
    /// request counter bumped in the same transaction as the insert.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for malformed input or a storage
    /// error when either write fails; in both cases nothing is written.
    pub fn log_request(&self, request: &NewRequest) -> Result<LoggedRequest, SqliteStoreError> {
        request.validate()?;
        let headers_json = serde_json::to_string(&request.headers)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let record = RequestRecord {
            request_id: RequestId::generate(),
            session_id: request.session_id.clone(),
            endpoint: request.endpoint.clone(),
            method: request.method,
            query_text: request.query_text.clone(),
            request_bytes: u64::try_from(request.snapshot_bytes()).unwrap_or(u64::MAX),
            client_address: request.client.address.clone(),
            client_agent: request.client.agent.clone(),
            headers: request.headers.clone(),
            timestamp_ms: self.now_millis(),
        };
        let request_bytes = to_sql_i64(record.request_bytes, "request_bytes")?;
        let mut guard = self.lock_writer()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "INSERT INTO requests (request_id, session_id, endpoint, method, query_text, \
             request_bytes, client_address, client_agent, headers_json, timestamp_ms) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.request_id.as_str(),
                record.session_id.as_ref().map(SessionId::as_str),
                record.endpoint,
                record.method.as_str(),
                record.query_text,
                request_bytes,
                record.client_address,
                record.client_agent,
                headers_json,
                record.timestamp_ms
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let session = match &record.session_id {
            Some(session_id) => {
                Some(upsert_session_in_tx(&tx, session_id, &request.client, record.timestamp_ms)?)
            }
            None => None,
        };
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        debug!(
            request_id = %record.request_id,
            endpoint = %record.endpoint,
            method = record.method.as_str(),
            session_created = session.as_ref().is_some_and(|upsert| upsert.created),
            "request logged"
        );
        Ok(LoggedRequest {
            request: record,
            session,
        })
    }

    /// Records the outcome of a previously logged request.
    ///
    /// The session reference is copied from the request, and the session's
    /// outcome counters are updated, inside the same transaction that inserts
    /// the response.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the input is malformed, the
    /// request id is unknown, or the request already has a response; a
    /// storage error when any write fails. Nothing is written on error.
    pub fn log_response(
        &self,
        request_id: &RequestId,
        response: &NewResponse,
        duration: Duration,
    ) -> Result<LoggedResponse, SqliteStoreError> {
        response.validate()?;
        let response_bytes = to_sql_i64(response.response_bytes, "response_bytes")?;
        let result_count = to_sql_i64(response.result_count, "result_count")?;
        let now = self.now_millis();
        let mut guard = self.lock_writer()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let session_raw: Option<Option<String>> = tx
            .query_row(
                "SELECT session_id FROM requests WHERE request_id = ?1",
                params![request_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let Some(session_raw) = session_raw else {
            return Err(SqliteStoreError::Invalid(format!("unknown request id: {request_id}")));
        };
        let answered: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM responses WHERE request_id = ?1",
                params![request_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if answered.is_some() {
            return Err(SqliteStoreError::Invalid(format!(
                "request already has a response: {request_id}"
            )));
        }
        let record = ResponseRecord {
            response_id: ResponseId::generate(),
            request_id: request_id.clone(),
            session_id: session_raw.map(SessionId::new),
            timestamp_ms: now,
            success: response.success,
            status_code: response.effective_status_code(),
            response_bytes: response.response_bytes,
            duration_secs: duration.as_secs_f64(),
            generated_query: response.generated_query.clone(),
            result_count: response.result_count,
            component: response.component.clone(),
            error_text: response.error_text.clone(),
        };
        tx.execute(
            "INSERT INTO responses (response_id, request_id, session_id, timestamp_ms, success, \
             status_code, response_bytes, duration_secs, generated_query, result_count, \
             component, error_text) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.response_id.as_str(),
                record.request_id.as_str(),
                record.session_id.as_ref().map(SessionId::as_str),
                record.timestamp_ms,
                record.success,
                record.status_code,
                response_bytes,
                record.duration_secs,
                record.generated_query,
                result_count,
                record.component,
                record.error_text
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let session = match &record.session_id {
            Some(session_id) => {
                apply_session_outcome(&tx, session_id, record.success, duration, now)?
            }
            None => None,
        };
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        if session.is_none()
            && let Some(session_id) = &record.session_id
        {
            debug!(session_id = %session_id, "session row missing; outcome not counted");
        }
        debug!(
            response_id = %record.response_id,
            request_id = %record.request_id,
            success = record.success,
            status_code = record.status_code,
            "response logged"
        );
        Ok(LoggedResponse {
            response: record,
            session,
        })
    }

    /// Loads a request record.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or the row is corrupt.
    pub fn get_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<RequestRecord>, SqliteStoreError> {
        let guard = self.lock_reader()?;
        let record = guard
            .query_row(
                &format!("{SELECT_REQUEST} WHERE request_id = ?1"),
                params![request_id.as_str()],
                map_request_row,
            )
            .optional()
            .map_err(map_read_error)?;
        drop(guard);
        Ok(record)
    }

    /// Loads a response record.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or the row is corrupt.
    pub fn get_response(
        &self,
        response_id: &ResponseId,
    ) -> Result<Option<ResponseRecord>, SqliteStoreError> {
        let guard = self.lock_reader()?;
        let record = guard
            .query_row(
                &format!("{SELECT_RESPONSE} WHERE response_id = ?1"),
                params![response_id.as_str()],
                map_response_row,
            )
            .optional()
            .map_err(map_read_error)?;
        drop(guard);
        Ok(record)
    }

    /// Lists the requests logged under a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or a row is corrupt.
    pub fn session_requests(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<RequestRecord>, SqliteStoreError> {
        let guard = self.lock_reader()?;
        let mut stmt = guard
            .prepare(&format!(
                "{SELECT_REQUEST} WHERE session_id = ?1 ORDER BY timestamp_ms ASC, rowid ASC"
            ))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![session_id.as_str()], map_request_row)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(map_read_error)?);
        }
        drop(stmt);
        drop(guard);
        Ok(records)
    }

    /// Lists the responses logged under a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or a row is corrupt.
    pub fn session_responses(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ResponseRecord>, SqliteStoreError> {
        let guard = self.lock_reader()?;
        let mut stmt = guard
            .prepare(&format!(
                "{SELECT_RESPONSE} WHERE session_id = ?1 ORDER BY timestamp_ms ASC, rowid ASC"
            ))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![session_id.as_str()], map_response_row)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(map_read_error)?);
        }
        drop(stmt);
        drop(guard);
        Ok(records)
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Creates the session on first call; later calls bump activity time and
    /// the request counter.
    ///
    /// The client address/agent are only recorded at creation.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for a malformed session id or
    /// client info, or a storage error when the transaction fails.
    pub fn upsert_session(
        &self,
        session_id: &SessionId,
        client: &ClientInfo,
    ) -> Result<SessionUpsert, SqliteStoreError> {
        session_id.validate()?;
        client.validate()?;
        let now = self.now_millis();
        let mut guard = self.lock_writer()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let upsert = upsert_session_in_tx(&tx, session_id, client, now)?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        debug!(
            session_id = %session_id,
            created = upsert.created,
            total_requests = upsert.session.total_requests,
            "session upserted"
        );
        Ok(upsert)
    }

    /// Adds one outcome to the session counters in a single guarded update.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the session does not exist.
    pub fn record_session_outcome(
        &self,
        session_id: &SessionId,
        success: bool,
        duration: Duration,
    ) -> Result<SessionRecord, SqliteStoreError> {
        let now = self.now_millis();
        let mut guard = self.lock_writer()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let Some(session) = apply_session_outcome(&tx, session_id, success, duration, now)? else {
            return Err(SqliteStoreError::NotFound(format!("session {session_id}")));
        };
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        Ok(session)
    }

    /// Marks a session inactive exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the transaction fails.
    pub fn end_session(
        &self,
        session_id: &SessionId,
    ) -> Result<EndSessionOutcome, SqliteStoreError> {
        let now = self.now_millis();
        let mut guard = self.lock_writer()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let changed = tx
            .execute(
                "UPDATE sessions SET active = 0, ended_at_ms = ?2 WHERE session_id = ?1 AND \
                 active = 1",
                params![session_id.as_str(), now],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let outcome = if changed == 1 {
            EndSessionOutcome::Ended
        } else {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM sessions WHERE session_id = ?1",
                    params![session_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            if exists.is_some() {
                EndSessionOutcome::AlreadyEnded
            } else {
                EndSessionOutcome::NotFound
            }
        };
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        if outcome == EndSessionOutcome::Ended {
            info!(session_id = %session_id, "session ended");
        }
        Ok(outcome)
    }

    /// Loads a session record.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or the row is corrupt.
    pub fn get_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>, SqliteStoreError> {
        let guard = self.lock_reader()?;
        let record = guard
            .query_row(
                &format!("{SELECT_SESSION} WHERE session_id = ?1"),
                params![session_id.as_str()],
                map_session_row,
            )
            .optional()
            .map_err(map_read_error)?;
        drop(guard);
        Ok(record)
    }

    /// Lists identifiers of sessions that are still active.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn active_session_ids(&self) -> Result<Vec<SessionId>, SqliteStoreError> {
        let guard = self.lock_reader()?;
        let mut stmt = guard
            .prepare("SELECT session_id FROM sessions WHERE active = 1 ORDER BY session_id")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(SessionId::new(row.map_err(|err| SqliteStoreError::Db(err.to_string()))?));
        }
        drop(stmt);
        drop(guard);
        Ok(ids)
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    /// Counts rows in every table.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when a count query fails.
    pub fn record_counts(&self) -> Result<StoreRecordCounts, SqliteStoreError> {
        let guard = self.lock_reader()?;
        let count = |sql: &str| -> Result<u64, SqliteStoreError> {
            let value: i64 = guard
                .query_row(sql, [], |row| row.get(0))
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            u64::try_from(value)
                .map_err(|_| SqliteStoreError::Corrupt(format!("negative row count: {value}")))
        };
        let counts = StoreRecordCounts {
            requests: count("SELECT COUNT(*) FROM requests")?,
            responses: count("SELECT COUNT(*) FROM responses")?,
            sessions: count("SELECT COUNT(*) FROM sessions")?,
            active_sessions: count("SELECT COUNT(*) FROM sessions WHERE active = 1")?,
            rate_limit_windows: count("SELECT COUNT(*) FROM rate_limits")?,
            analytics_buckets: count("SELECT COUNT(*) FROM analytics_buckets")?,
        };
        drop(guard);
        Ok(counts)
    }

    /// On-disk size of the database, including its WAL and shared-memory files.
    #[must_use]
    pub fn database_bytes(&self) -> u64 {
        ["", "-wal", "-shm"]
            .iter()
            .map(|suffix| {
                let mut raw = self.config.path.clone().into_os_string();
                raw.push(suffix);
                std::fs::metadata(PathBuf::from(raw)).map_or(0, |meta| meta.len())
            })
            .sum()
    }
}

// ============================================================================
// SECTION: Session Writes
// ============================================================================

/// Creates `session_id` or counts one more request against it, inside the
/// caller's transaction. Client info is only recorded at creation.
fn upsert_session_in_tx(
    tx: &Connection,
    session_id: &SessionId,
    client: &ClientInfo,
    now: i64,
) -> Result<SessionUpsert, SqliteStoreError> {
    let inserted = tx
        .execute(
            "INSERT INTO sessions (session_id, created_at_ms, last_activity_ms, total_requests, \
             successful_requests, failed_requests, total_response_secs, client_address, \
             client_agent, active, ended_at_ms) VALUES (?1, ?2, ?2, 1, 0, 0, 0.0, ?3, ?4, 1, \
             NULL) ON CONFLICT(session_id) DO NOTHING",
            params![session_id.as_str(), now, client.address, client.agent],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let created = inserted == 1;
    if !created {
        tx.execute(
            "UPDATE sessions SET total_requests = total_requests + 1, last_activity_ms = \
             MAX(last_activity_ms, ?2) WHERE session_id = ?1",
            params![session_id.as_str(), now],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    let session = tx
        .query_row(
            &format!("{SELECT_SESSION} WHERE session_id = ?1"),
            params![session_id.as_str()],
            map_session_row,
        )
        .map_err(map_read_error)?;
    Ok(SessionUpsert {
        created,
        session,
    })
}

/// Adds one outcome to the session counters in a single guarded update.
/// Returns `None` when the session row does not exist.
fn apply_session_outcome(
    tx: &Connection,
    session_id: &SessionId,
    success: bool,
    duration: Duration,
    now: i64,
) -> Result<Option<SessionRecord>, SqliteStoreError> {
    let (successful, failed) = if success { (1_i64, 0_i64) } else { (0, 1) };
    let changed = tx
        .execute(
            "UPDATE sessions SET successful_requests = successful_requests + ?2, failed_requests \
             = failed_requests + ?3, total_response_secs = total_response_secs + ?4, \
             last_activity_ms = MAX(last_activity_ms, ?5) WHERE session_id = ?1",
            params![session_id.as_str(), successful, failed, duration.as_secs_f64(), now],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    if changed == 0 {
        return Ok(None);
    }
    tx.query_row(
        &format!("{SELECT_SESSION} WHERE session_id = ?1"),
        params![session_id.as_str()],
        map_session_row,
    )
    .map(Some)
    .map_err(map_read_error)
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Decodes a request row selected with [`SELECT_REQUEST`].
fn map_request_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RequestRecord> {
    let method_raw: String = row.get(3)?;
    let method = method_raw.parse::<HttpMethod>().map_err(|err| conversion_error(3, err))?;
    let headers_raw: String = row.get(8)?;
    let headers = serde_json::from_str(&headers_raw).map_err(|err| conversion_error(8, err))?;
    Ok(RequestRecord {
        request_id: RequestId::new(row.get::<_, String>(0)?),
        session_id: row.get::<_, Option<String>>(1)?.map(SessionId::new),
        endpoint: row.get(2)?,
        method,
        query_text: row.get(4)?,
        request_bytes: column_u64(row, 5)?,
        client_address: row.get(6)?,
        client_agent: row.get(7)?,
        headers,
        timestamp_ms: row.get(9)?,
    })
}

/// Decodes a response row selected with [`SELECT_RESPONSE`].
fn map_response_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResponseRecord> {
    Ok(ResponseRecord {
        response_id: ResponseId::new(row.get::<_, String>(0)?),
        request_id: RequestId::new(row.get::<_, String>(1)?),
        session_id: row.get::<_, Option<String>>(2)?.map(SessionId::new),
        timestamp_ms: row.get(3)?,
        success: row.get(4)?,
        status_code: row.get(5)?,
        response_bytes: column_u64(row, 6)?,
        duration_secs: row.get(7)?,
        generated_query: row.get(8)?,
        result_count: column_u64(row, 9)?,
        component: row.get(10)?,
        error_text: row.get(11)?,
    })
}

/// Decodes a session row selected with [`SELECT_SESSION`].
fn map_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        session_id: SessionId::new(row.get::<_, String>(0)?),
        created_at_ms: row.get(1)?,
        last_activity_ms: row.get(2)?,
        total_requests: column_u64(row, 3)?,
        successful_requests: column_u64(row, 4)?,
        failed_requests: column_u64(row, 5)?,
        total_response_secs: row.get(6)?,
        client_address: row.get(7)?,
        client_agent: row.get(8)?,
        active: row.get(9)?,
        ended_at_ms: row.get(10)?,
    })
}

/// Reads a non-negative integer column.
pub(crate) fn column_u64(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(index)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(index, value))
}

/// Wraps a decode failure for a text column.
fn conversion_error<E>(index: usize, error: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
}

/// Maps row-read errors, separating undecodable rows from engine failures.
pub(crate) fn map_read_error(error: rusqlite::Error) -> SqliteStoreError {
    match error {
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..)
        | rusqlite::Error::InvalidColumnType(..) => SqliteStoreError::Corrupt(error.to_string()),
        other => SqliteStoreError::Db(other.to_string()),
    }
}

/// Converts an unsigned value into an `SQLite` integer.
pub(crate) fn to_sql_i64(value: u64, field: &str) -> Result<i64, SqliteStoreError> {
    i64::try_from(value).map_err(|_| SqliteStoreError::Invalid(format!("{field} out of range")))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS requests (
                    request_id TEXT PRIMARY KEY,
                    session_id TEXT,
                    endpoint TEXT NOT NULL,
                    method TEXT NOT NULL,
                    query_text TEXT,
                    request_bytes INTEGER NOT NULL,
                    client_address TEXT,
                    client_agent TEXT,
                    headers_json TEXT NOT NULL,
                    timestamp_ms INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_requests_timestamp ON requests (timestamp_ms);
                CREATE INDEX IF NOT EXISTS idx_requests_session ON requests (session_id);
                CREATE TABLE IF NOT EXISTS responses (
                    response_id TEXT PRIMARY KEY,
                    request_id TEXT NOT NULL UNIQUE REFERENCES requests (request_id),
                    session_id TEXT,
                    timestamp_ms INTEGER NOT NULL,
                    success INTEGER NOT NULL,
                    status_code INTEGER NOT NULL,
                    response_bytes INTEGER NOT NULL,
                    duration_secs REAL NOT NULL,
                    generated_query TEXT,
                    result_count INTEGER NOT NULL,
                    component TEXT,
                    error_text TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_responses_timestamp ON responses (timestamp_ms);
                CREATE INDEX IF NOT EXISTS idx_responses_session ON responses (session_id);
                CREATE TABLE IF NOT EXISTS sessions (
                    session_id TEXT PRIMARY KEY,
                    created_at_ms INTEGER NOT NULL,
                    last_activity_ms INTEGER NOT NULL,
                    total_requests INTEGER NOT NULL,
                    successful_requests INTEGER NOT NULL,
                    failed_requests INTEGER NOT NULL,
                    total_response_secs REAL NOT NULL,
                    client_address TEXT,
                    client_agent TEXT,
                    active INTEGER NOT NULL,
                    ended_at_ms INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_sessions_activity
                    ON sessions (active, last_activity_ms);
                CREATE TABLE IF NOT EXISTS rate_limits (
                    client_address TEXT NOT NULL,
                    endpoint TEXT NOT NULL,
                    request_count INTEGER NOT NULL,
                    window_start_ms INTEGER NOT NULL,
                    window_end_ms INTEGER NOT NULL,
                    blocked INTEGER NOT NULL,
                    PRIMARY KEY (client_address, endpoint)
                );
                CREATE TABLE IF NOT EXISTS analytics_buckets (
                    date TEXT NOT NULL,
                    hour INTEGER NOT NULL,
                    bucket_start_ms INTEGER NOT NULL,
                    total_requests INTEGER NOT NULL,
                    successful_requests INTEGER NOT NULL,
                    failed_requests INTEGER NOT NULL,
                    unique_sessions INTEGER NOT NULL,
                    avg_processing_secs REAL NOT NULL,
                    total_bytes INTEGER NOT NULL,
                    PRIMARY KEY (date, hour)
                );
                CREATE INDEX IF NOT EXISTS idx_analytics_buckets_start
                    ON analytics_buckets (bucket_start_ms);",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
