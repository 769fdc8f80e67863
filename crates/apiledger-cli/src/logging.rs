// crates/apiledger-cli/src/logging.rs
// ============================================================================
// Module: CLI Logging
// Description: tracing-subscriber installation for the operator CLI.
// Purpose: Route ledger diagnostics to stderr in text or JSON form.
// Dependencies: apiledger-config, tracing-subscriber
// ============================================================================

//! ## Overview
//! The filter is seeded from `[logging] level`; a `RUST_LOG` directive, when
//! present and valid, replaces it. Output always goes to stderr so stdout
//! stays machine-readable.

use apiledger_config::LogFormat;
use apiledger_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Builds the active filter for `config`.
///
/// # Errors
///
/// Returns a message when neither `RUST_LOG` nor the configured level parse.
pub(crate) fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, String> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.as_str()))
        .map_err(|err| format!("invalid log filter: {err}"))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns a message when the filter is invalid or a subscriber is already
/// installed.
pub(crate) fn init(config: &LoggingConfig) -> Result<(), String> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(config)?)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| format!("logging init failed: {err}"))
}
