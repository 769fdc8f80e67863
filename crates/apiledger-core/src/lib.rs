// crates/apiledger-core/src/lib.rs
// ============================================================================
// Module: API Ledger Core Library
// Description: Public API surface for the API Ledger core.
// Purpose: Expose record types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! API Ledger core defines the typed records persisted by the request
//! telemetry store: inbound requests, their responses, client sessions,
//! rate-limit windows, and hourly analytics buckets. It is backend-agnostic;
//! storage crates consume these types and report failures through the
//! [`LedgerError`] taxonomy.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::Clock;
pub use interfaces::LedgerError;
pub use runtime::ManualClock;
pub use runtime::SystemClock;
