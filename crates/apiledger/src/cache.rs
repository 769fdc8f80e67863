// crates/apiledger/src/cache.rs
// ============================================================================
// Module: Response Cache
// Description: TTL-bounded JSON payload cache stored as one file per key.
// Purpose: Let callers skip expensive work for recently answered inputs.
// Dependencies: apiledger-core, serde_json, sha2, hex, tracing
// ============================================================================

//! ## Overview
//! Entries are content-addressed: the file name is the SHA-256 of the
//! caller-supplied key, so lookups are deterministic and key text never
//! reaches the filesystem. Expiry is checked on read against the injected
//! clock; an expired entry is deleted by the read that observes it. A
//! concurrent delete racing a read only turns a hit into a miss.
//!
//! ## Invariants
//! - An entry is served iff `now < expires_at_ms`.
//! - `expires_at_ms = created_at_ms + ttl_minutes * 60_000`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use apiledger_core::Clock;
use apiledger_core::LedgerError;
use apiledger_core::MILLIS_PER_MINUTE;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::files::remove_if_present;
use crate::files::write_json_atomic;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Cache directory name under the storage root.
pub const CACHE_DIR_NAME: &str = "cache";
/// Maximum cache key length in bytes.
pub const MAX_CACHE_KEY_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure.
    #[error("cache io error: {0}")]
    Io(String),
    /// Rejected key, ttl, or payload.
    #[error("cache entry invalid: {0}")]
    Invalid(String),
}

impl From<CacheError> for LedgerError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::Io(message) => Self::StorageIo(message),
            CacheError::Invalid(message) => Self::Validation(message),
        }
    }
}

/// On-disk cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Caller-supplied key, kept to detect digest collisions.
    pub cache_key: String,
    /// Cached payload.
    pub payload: Value,
    /// Creation time in unix milliseconds.
    pub created_at_ms: i64,
    /// Expiry time in unix milliseconds (exclusive).
    pub expires_at_ms: i64,
    /// TTL the entry was written with.
    pub ttl_minutes: u32,
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// File-backed TTL cache.
#[derive(Clone)]
pub struct ResponseCache {
    /// Directory holding `cache_<digest>.json` files.
    dir: PathBuf,
    /// Time source for creation and expiry.
    clock: Arc<dyn Clock>,
    /// Largest serialized entry accepted by [`ResponseCache::put`].
    max_payload_bytes: usize,
}

impl ResponseCache {
    /// Opens the cache under `root/cache`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] when the directory cannot be created.
    pub fn open(
        root: &Path,
        clock: Arc<dyn Clock>,
        max_payload_bytes: usize,
    ) -> Result<Self, CacheError> {
        let dir = root.join(CACHE_DIR_NAME);
        fs::create_dir_all(&dir).map_err(|err| CacheError::Io(err.to_string()))?;
        Ok(Self {
            dir,
            clock,
            max_payload_bytes,
        })
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry for `key`.
    #[must_use]
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("cache_{}.json", cache_digest(key)))
    }

    /// Stores `payload` under `key` for `ttl_minutes`, replacing any entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Invalid`] for an empty or oversized key, a zero
    /// TTL, or an oversized payload; [`CacheError::Io`] when the write fails.
    pub fn put(&self, key: &str, payload: &Value, ttl_minutes: u32) -> Result<(), CacheError> {
        validate_key(key)?;
        if ttl_minutes == 0 {
            return Err(CacheError::Invalid("ttl_minutes must be greater than zero".to_string()));
        }
        let created_at_ms = self.clock.now_millis();
        let entry = CacheEntry {
            cache_key: key.to_string(),
            payload: payload.clone(),
            created_at_ms,
            expires_at_ms: created_at_ms
                .saturating_add(i64::from(ttl_minutes).saturating_mul(MILLIS_PER_MINUTE)),
            ttl_minutes,
        };
        let encoded =
            serde_json::to_vec(&entry).map_err(|err| CacheError::Invalid(err.to_string()))?;
        if encoded.len() > self.max_payload_bytes {
            return Err(CacheError::Invalid(format!(
                "cache entry exceeds {} bytes",
                self.max_payload_bytes
            )));
        }
        let bytes = write_json_atomic(&self.entry_path(key), &entry)
            .map_err(|err| CacheError::Io(err.to_string()))?;
        debug!(ttl_minutes, bytes, "cache entry stored");
        Ok(())
    }

    /// Returns the live payload for `key`, deleting it if expired.
    ///
    /// Unreadable or foreign entries read as a miss.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Invalid`] for a malformed key or
    /// [`CacheError::Io`] when the entry exists but cannot be read.
    pub fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        validate_key(key)?;
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::Io(err.to_string())),
        };
        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable cache entry treated as miss");
                return Ok(None);
            }
        };
        if entry.cache_key != key {
            return Ok(None);
        }
        if self.clock.now_millis() >= entry.expires_at_ms {
            remove_if_present(&path).map_err(|err| CacheError::Io(err.to_string()))?;
            debug!(expires_at_ms = entry.expires_at_ms, "expired cache entry removed");
            return Ok(None);
        }
        Ok(Some(entry.payload))
    }
}

/// Hex SHA-256 of a cache key.
#[must_use]
pub fn cache_digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Rejects empty or oversized keys.
fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() || key.len() > MAX_CACHE_KEY_LENGTH {
        return Err(CacheError::Invalid(format!(
            "cache key must be 1..={MAX_CACHE_KEY_LENGTH} bytes"
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
