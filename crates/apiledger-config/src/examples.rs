// crates/apiledger-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and the `config example` command.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for API ledger configuration. Every value shown is the
//! default, so the output doubles as a reference for the built-in settings.

/// Returns a canonical example `apiledger.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[storage]
root_dir = "api_storage"
database_file = "api_data.sqlite"
busy_timeout_ms = 5000
journal_mode = "wal"
sync_mode = "full"
read_pool_size = 4

[rate_limit]
default_limit = 60

[cache]
default_ttl_minutes = 30
max_payload_bytes = 1048576

[analytics]
top_endpoints = 10
default_report_days = 7

[retention]
days_to_keep = 30

[logging]
level = "info"
format = "text"
"#,
    )
}
