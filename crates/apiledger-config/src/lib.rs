// crates/apiledger-config/src/lib.rs
// ============================================================================
// Module: API Ledger Config Library
// Description: Configuration model, loading, and validation.
// Purpose: Single source of truth for apiledger.toml semantics.
// Dependencies: apiledger-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `apiledger-config` defines the configuration model for the API ledger:
//! storage layout and `SQLite` tuning, rate-limit, cache, analytics, and
//! retention defaults, and logging. Validation is strict and fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
