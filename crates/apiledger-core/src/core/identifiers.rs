// crates/apiledger-core/src/core/identifiers.rs
// ============================================================================
// Module: API Ledger Identifiers
// Description: Opaque identifiers for request, response, and session records.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Identifiers are opaque strings. Request and response identifiers are
//! always generated by the store; session identifiers may be supplied by the
//! client and are validated at the store boundary (see
//! [`SessionId::validate`]).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::core::records::RecordValidationError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a client-supplied session identifier.
pub const MAX_SESSION_ID_LENGTH: usize = 128;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Identifier of a stored request record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates a request identifier from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random request identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a stored response record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(String);

impl ResponseId {
    /// Creates a response identifier from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random response identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ResponseId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Client-declared (or generated) session identifier.
///
/// # Invariants
/// - Stored identifiers satisfy [`SessionId::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session identifier. Validation happens at the store boundary.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh session identifier for clients that did not supply one.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("session_{}", Uuid::new_v4().simple()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks length and character set.
    ///
    /// Session identifiers name archive files, so only `[A-Za-z0-9_.:-]` is
    /// accepted and `.`/`..` are rejected outright.
    ///
    /// # Errors
    ///
    /// Returns [`RecordValidationError`] when the identifier is empty,
    /// overlong, or contains characters outside the allowed set.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.0.is_empty() {
            return Err(RecordValidationError::new("session_id", "must be non-empty"));
        }
        if self.0.len() > MAX_SESSION_ID_LENGTH {
            return Err(RecordValidationError::new(
                "session_id",
                format!("exceeds {MAX_SESSION_ID_LENGTH} characters"),
            ));
        }
        if self.0 == "." || self.0 == ".." {
            return Err(RecordValidationError::new("session_id", "must not be a path segment"));
        }
        let allowed = |ch: char| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | ':');
        if !self.0.chars().all(allowed) {
            return Err(RecordValidationError::new(
                "session_id",
                "contains characters outside [A-Za-z0-9_.:-]",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
