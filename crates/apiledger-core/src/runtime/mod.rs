// crates/apiledger-core/src/runtime/mod.rs
// ============================================================================
// Module: API Ledger Runtime Helpers
// Description: Concrete clock implementations.
// Purpose: Provide wall-clock time for production and settable time for tests.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! Runtime helpers that implement core interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod clock;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use clock::ManualClock;
pub use clock::SystemClock;
