// crates/apiledger-core/src/core/mod.rs
// ============================================================================
// Module: API Ledger Core Types
// Description: Identifiers, records, time helpers, and analytics report types.
// Purpose: Group the canonical data model shared by store and service crates.
// Dependencies: serde, time, uuid
// ============================================================================

//! ## Overview
//! Core data model for the ledger. Records are explicit tagged structs that
//! are validated at the store boundary before any write.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod identifiers;
pub mod records;
pub mod report;
pub mod timestamps;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::identifiers::*;
pub use self::records::*;
pub use self::report::*;
pub use self::timestamps::*;
