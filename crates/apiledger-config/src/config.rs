// crates/apiledger-config/src/config.rs
// ============================================================================
// Module: API Ledger Configuration
// Description: Configuration loading and validation for the API ledger.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: apiledger-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Resolution order: explicit path, then `APILEDGER_CONFIG`, then
//! `apiledger.toml` in the working directory. Only the implicit default file
//! may be absent (defaults apply); an explicit or environment path that does
//! not exist is an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use apiledger_store_sqlite::MAX_READ_POOL_SIZE;
use apiledger_store_sqlite::MAX_REPORT_DAYS;
use apiledger_store_sqlite::MAX_TOP_ENDPOINTS;
use apiledger_store_sqlite::SqliteStoreConfig;
use apiledger_store_sqlite::SqliteStoreMode;
use apiledger_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "apiledger.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "APILEDGER_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum busy timeout in milliseconds.
const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Maximum requests per rate-limit window.
pub const MAX_RATE_LIMIT: u32 = 100_000;
/// Maximum cache TTL in minutes (one week).
pub const MAX_CACHE_TTL_MINUTES: u32 = 7 * 24 * 60;
/// Maximum cached payload size in bytes.
pub const MAX_CACHE_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;
/// Maximum retention period in days.
pub const MAX_RETENTION_DAYS: u32 = 3_650;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Top-level API ledger configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiLedgerConfig {
    /// Storage layout and `SQLite` tuning.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Rate limiter defaults.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Response cache defaults.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Analytics report defaults.
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    /// Retention defaults.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// File the configuration was loaded from, if any (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl ApiLedgerConfig {
    /// Loads configuration using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path)?;
        validate_path(&resolved)?;
        if !explicit && !resolved.exists() {
            let mut config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.source_path = Some(resolved);
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.rate_limit.validate()?;
        self.cache.validate()?;
        self.analytics.validate()?;
        self.retention.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// Storage layout and `SQLite` tuning.
///
/// # Invariants
/// - `database_file` is a relative path without parent-directory segments.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory for the database, archives, and cache.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Database filename, relative to `root_dir`.
    #[serde(default = "default_database_file")]
    pub database_file: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Read connection pool size.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            database_file: default_database_file(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: default_read_pool_size(),
        }
    }
}

impl StorageConfig {
    /// Full path of the database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.root_dir.join(&self.database_file)
    }

    /// Builds the `SQLite` store configuration.
    #[must_use]
    pub fn sqlite_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.database_path(),
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
            read_pool_size: self.read_pool_size,
        }
    }

    /// Validates storage settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("storage.root_dir", &self.root_dir.to_string_lossy())?;
        validate_path_string("storage.database_file", &self.database_file.to_string_lossy())?;
        let relative = self
            .database_file
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !relative {
            return Err(ConfigError::Invalid(
                "storage.database_file must be a relative path inside root_dir".to_string(),
            ));
        }
        if self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "storage.busy_timeout_ms must be <= {MAX_BUSY_TIMEOUT_MS}"
            )));
        }
        if self.read_pool_size == 0 || self.read_pool_size > MAX_READ_POOL_SIZE {
            return Err(ConfigError::Invalid(format!(
                "storage.read_pool_size must be within 1..={MAX_READ_POOL_SIZE}"
            )));
        }
        Ok(())
    }
}

/// Returns the default storage root directory.
fn default_root_dir() -> PathBuf {
    PathBuf::from("api_storage")
}

/// Returns the default database filename.
fn default_database_file() -> PathBuf {
    PathBuf::from("api_data.sqlite")
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Returns the default read pool size.
const fn default_read_pool_size() -> usize {
    4
}

// ============================================================================
// SECTION: Rate Limit
// ============================================================================

/// Rate limiter defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests admitted per client and endpoint per window.
    #[serde(default = "default_rate_limit")]
    pub default_limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit: default_rate_limit(),
        }
    }
}

impl RateLimitConfig {
    /// Validates rate limit settings.
    fn validate(self) -> Result<(), ConfigError> {
        if self.default_limit == 0 || self.default_limit > MAX_RATE_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "rate_limit.default_limit must be within 1..={MAX_RATE_LIMIT}"
            )));
        }
        Ok(())
    }
}

/// Returns the default per-window request limit.
const fn default_rate_limit() -> u32 {
    60
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Response cache defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// TTL applied when the caller does not pass one.
    #[serde(default = "default_ttl_minutes")]
    pub default_ttl_minutes: u32,
    /// Largest serialized payload accepted by `put`.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_minutes: default_ttl_minutes(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl CacheConfig {
    /// Validates cache settings.
    fn validate(self) -> Result<(), ConfigError> {
        if self.default_ttl_minutes == 0 || self.default_ttl_minutes > MAX_CACHE_TTL_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "cache.default_ttl_minutes must be within 1..={MAX_CACHE_TTL_MINUTES}"
            )));
        }
        if self.max_payload_bytes == 0 || self.max_payload_bytes > MAX_CACHE_PAYLOAD_BYTES {
            return Err(ConfigError::Invalid(format!(
                "cache.max_payload_bytes must be within 1..={MAX_CACHE_PAYLOAD_BYTES}"
            )));
        }
        Ok(())
    }
}

/// Returns the default cache TTL in minutes.
const fn default_ttl_minutes() -> u32 {
    30
}

/// Returns the default maximum cached payload size.
const fn default_max_payload_bytes() -> usize {
    1024 * 1024
}

// ============================================================================
// SECTION: Analytics
// ============================================================================

/// Analytics report defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyticsConfig {
    /// Endpoints ranked in reports.
    #[serde(default = "default_top_endpoints")]
    pub top_endpoints: u32,
    /// Trailing days covered when none are requested.
    #[serde(default = "default_report_days")]
    pub default_report_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            top_endpoints: default_top_endpoints(),
            default_report_days: default_report_days(),
        }
    }
}

impl AnalyticsConfig {
    /// Validates analytics settings.
    fn validate(self) -> Result<(), ConfigError> {
        if self.top_endpoints == 0 || self.top_endpoints > MAX_TOP_ENDPOINTS {
            return Err(ConfigError::Invalid(format!(
                "analytics.top_endpoints must be within 1..={MAX_TOP_ENDPOINTS}"
            )));
        }
        if self.default_report_days == 0 || self.default_report_days > MAX_REPORT_DAYS {
            return Err(ConfigError::Invalid(format!(
                "analytics.default_report_days must be within 1..={MAX_REPORT_DAYS}"
            )));
        }
        Ok(())
    }
}

/// Returns the default number of ranked endpoints.
const fn default_top_endpoints() -> u32 {
    10
}

/// Returns the default report window in days.
const fn default_report_days() -> u32 {
    7
}

// ============================================================================
// SECTION: Retention
// ============================================================================

/// Retention defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Days of history kept by `purge` when none are requested.
    #[serde(default = "default_days_to_keep")]
    pub days_to_keep: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days_to_keep: default_days_to_keep(),
        }
    }
}

impl RetentionConfig {
    /// Validates retention settings.
    fn validate(self) -> Result<(), ConfigError> {
        if self.days_to_keep > MAX_RETENTION_DAYS {
            return Err(ConfigError::Invalid(format!(
                "retention.days_to_keep must be <= {MAX_RETENTION_DAYS}"
            )));
        }
        Ok(())
    }
}

/// Returns the default retention period in days.
const fn default_days_to_keep() -> u32 {
    30
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Logging output configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Minimum level emitted.
    #[serde(default)]
    pub level: LogLevel,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Everything.
    Trace,
    /// Debug and above.
    Debug,
    /// Info and above.
    #[default]
    Info,
    /// Warnings and errors.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Filter directive for this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
///
/// Returns the path and whether it was explicitly requested.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
