// crates/apiledger-cli/src/main.rs
// ============================================================================
// Module: API Ledger CLI Entry Point
// Description: Operator command dispatcher for the API ledger.
// Purpose: Inspect, aggregate, export, and purge ledger data on a schedule.
// Dependencies: apiledger, apiledger-config, clap, serde_json, tracing-subscriber
// ============================================================================

//! ## Overview
//! The request path of the surrounding service uses the ledger in-process;
//! this binary covers the operator side: storage stats, analytics reports
//! and rollups, retention sweeps, session inspection and export, cache
//! lookups, and configuration checks. Structured output goes to stdout,
//! diagnostics to stderr.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod logging;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use apiledger::ApiLedger;
use apiledger::PurgeReport;
use apiledger::StorageStats;
use apiledger_config::ApiLedgerConfig;
use apiledger_config::config_toml_example;
use apiledger_core::AnalyticsReport;
use apiledger_core::EndSessionOutcome;
use apiledger_core::SessionId;
use apiledger_core::format_rfc3339;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "apiledger", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (defaults to apiledger.toml or `APILEDGER_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Output format for command results.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Result rendering.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Human-readable summary.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Record counts and byte sizes per store.
    Stats,
    /// Analytics report over trailing days.
    Report(ReportCommand),
    /// Recompute the analytics bucket for one hour.
    Rollup(RollupCommand),
    /// Delete data older than the retention period.
    Purge(PurgeCommand),
    /// Session utilities.
    Session {
        /// Selected session subcommand.
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// Response cache utilities.
    Cache {
        /// Selected cache subcommand.
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `report`.
#[derive(Args, Debug)]
struct ReportCommand {
    /// Trailing days to cover (config default when omitted).
    #[arg(long, value_name = "DAYS")]
    days: Option<u32>,
}

/// Arguments for `rollup`.
#[derive(Args, Debug)]
struct RollupCommand {
    /// Any unix millisecond inside the target hour (current hour when omitted).
    #[arg(long, value_name = "MILLIS")]
    at_ms: Option<i64>,
}

/// Arguments for `purge`.
#[derive(Args, Debug)]
struct PurgeCommand {
    /// Days of history to keep (config default when omitted; 0 keeps nothing).
    #[arg(long, value_name = "DAYS")]
    days: Option<u32>,
}

/// Session subcommands.
#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Print a session record.
    Show(SessionTarget),
    /// Mark a session ended.
    End(SessionTarget),
    /// Export a session with its requests and responses.
    Export(SessionTarget),
    /// List active session ids.
    Active,
}

/// Session selector.
#[derive(Args, Debug)]
struct SessionTarget {
    /// Session identifier.
    session_id: String,
}

/// Cache subcommands.
#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Print the live payload cached under a key.
    Get {
        /// Caller-supplied cache key.
        key: String,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration.
    Check,
    /// Print a configuration file with every default spelled out.
    Example,
}

/// Summary printed by `config check`.
#[derive(Debug, Serialize)]
struct ConfigSummary {
    /// File the configuration came from, if any.
    source: Option<PathBuf>,
    /// Database location.
    database_path: PathBuf,
    /// Storage root.
    root_dir: PathBuf,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run(cli: Cli) -> CliResult<ExitCode> {
    let config = ApiLedgerConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("config load failed: {err}")))?;
    if let Commands::Config {
        command,
    } = &cli.command
    {
        return command_config(command, &config, cli.format);
    }
    logging::init(&config.logging).map_err(CliError::new)?;
    let ledger = ApiLedger::open(&config)
        .map_err(|err| CliError::new(format!("ledger open failed: {err}")))?;
    match cli.command {
        Commands::Stats => command_stats(&ledger, cli.format),
        Commands::Report(command) => command_report(&ledger, &command, cli.format),
        Commands::Rollup(command) => command_rollup(&ledger, &command),
        Commands::Purge(command) => command_purge(&ledger, &command, cli.format),
        Commands::Session {
            command,
        } => command_session(&ledger, &command, cli.format),
        Commands::Cache {
            command,
        } => command_cache(&ledger, &command),
        // Dispatched above, before logging and the ledger are initialized.
        Commands::Config {
            ..
        } => Ok(ExitCode::SUCCESS),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `stats`.
fn command_stats(ledger: &ApiLedger, format: OutputFormat) -> CliResult<ExitCode> {
    let stats = ledger.stats().map_err(|err| CliError::new(format!("stats failed: {err}")))?;
    match format {
        OutputFormat::Json => write_json(&stats)?,
        OutputFormat::Text => write_stdout(&render_stats(&stats))?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `report`.
fn command_report(
    ledger: &ApiLedger,
    command: &ReportCommand,
    format: OutputFormat,
) -> CliResult<ExitCode> {
    let report =
        ledger.report(command.days).map_err(|err| CliError::new(format!("report failed: {err}")))?;
    match format {
        OutputFormat::Json => write_json(&report)?,
        OutputFormat::Text => write_stdout(&render_report(&report))?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `rollup`; always prints the bucket as JSON.
fn command_rollup(ledger: &ApiLedger, command: &RollupCommand) -> CliResult<ExitCode> {
    let at_ms = command.at_ms.unwrap_or_else(|| ledger.now_millis());
    let bucket =
        ledger.rollup(at_ms).map_err(|err| CliError::new(format!("rollup failed: {err}")))?;
    write_json(&bucket)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `purge`. Exits non-zero when any item failed.
fn command_purge(
    ledger: &ApiLedger,
    command: &PurgeCommand,
    format: OutputFormat,
) -> CliResult<ExitCode> {
    let report = ledger.purge(command.days);
    match format {
        OutputFormat::Json => write_json(&report)?,
        OutputFormat::Text => write_stdout(&render_purge(&report))?,
    }
    if report.error_count() == 0 { Ok(ExitCode::SUCCESS) } else { Ok(ExitCode::FAILURE) }
}

/// Executes `session` subcommands.
fn command_session(
    ledger: &ApiLedger,
    command: &SessionCommand,
    format: OutputFormat,
) -> CliResult<ExitCode> {
    match command {
        SessionCommand::Show(target) => {
            let session_id = parse_session_id(&target.session_id)?;
            let session = ledger
                .get_session(&session_id)
                .map_err(|err| CliError::new(format!("session lookup failed: {err}")))?
                .ok_or_else(|| CliError::new(format!("session not found: {session_id}")))?;
            write_json(&session)?;
            Ok(ExitCode::SUCCESS)
        }
        SessionCommand::End(target) => {
            let session_id = parse_session_id(&target.session_id)?;
            let outcome = ledger
                .end_session(&session_id)
                .map_err(|err| CliError::new(format!("session end failed: {err}")))?;
            let label = match outcome {
                EndSessionOutcome::Ended => "ended",
                EndSessionOutcome::AlreadyEnded => "already ended",
                EndSessionOutcome::NotFound => {
                    return Err(CliError::new(format!("session not found: {session_id}")));
                }
            };
            write_stdout(&format!("session {session_id}: {label}\n"))?;
            Ok(ExitCode::SUCCESS)
        }
        SessionCommand::Export(target) => {
            let session_id = parse_session_id(&target.session_id)?;
            let path = ledger
                .export_session(&session_id)
                .map_err(|err| CliError::new(format!("session export failed: {err}")))?
                .ok_or_else(|| CliError::new(format!("session not found: {session_id}")))?;
            write_stdout(&format!("{}\n", path.display()))?;
            Ok(ExitCode::SUCCESS)
        }
        SessionCommand::Active => {
            let ids = ledger
                .active_session_ids()
                .map_err(|err| CliError::new(format!("session listing failed: {err}")))?;
            match format {
                OutputFormat::Json => write_json(&ids)?,
                OutputFormat::Text => {
                    let mut output = String::new();
                    for id in &ids {
                        let _ = writeln!(output, "{id}");
                    }
                    write_stdout(&output)?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Executes `cache` subcommands. A miss exits non-zero.
fn command_cache(ledger: &ApiLedger, command: &CacheCommand) -> CliResult<ExitCode> {
    match command {
        CacheCommand::Get {
            key,
        } => match ledger.cache_get(key) {
            Some(payload) => {
                write_json(&payload)?;
                Ok(ExitCode::SUCCESS)
            }
            None => {
                write_stderr("cache miss\n");
                Ok(ExitCode::FAILURE)
            }
        },
    }
}

/// Executes `config` subcommands.
fn command_config(
    command: &ConfigCommand,
    config: &ApiLedgerConfig,
    format: OutputFormat,
) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Check => {
            let summary = ConfigSummary {
                source: config.source_path.clone(),
                database_path: config.storage.database_path(),
                root_dir: config.storage.root_dir.clone(),
            };
            match format {
                OutputFormat::Json => write_json(&summary)?,
                OutputFormat::Text => {
                    write_stdout(&render_config_summary(&summary))?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        ConfigCommand::Example => {
            write_stdout(&config_toml_example())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Validates a session id argument.
fn parse_session_id(raw: &str) -> CliResult<SessionId> {
    let session_id = SessionId::new(raw);
    session_id.validate().map_err(|err| CliError::new(err.to_string()))?;
    Ok(session_id)
}

/// Renders `stats` as text.
fn render_stats(stats: &StorageStats) -> String {
    let db = &stats.database;
    let mut output = String::new();
    let _ = writeln!(output, "database: {} bytes", stats.database_bytes);
    let _ = writeln!(output, "  requests: {}", db.requests);
    let _ = writeln!(output, "  responses: {}", db.responses);
    let _ = writeln!(output, "  sessions: {} ({} active)", db.sessions, db.active_sessions);
    let _ = writeln!(output, "  rate-limit windows: {}", db.rate_limit_windows);
    let _ = writeln!(output, "  analytics buckets: {}", db.analytics_buckets);
    for dir in &stats.directories {
        let _ = writeln!(output, "{}: {} files, {} bytes", dir.name, dir.file_count, dir.bytes);
    }
    let _ = writeln!(output, "total: {} bytes", stats.total_bytes);
    output
}

/// Renders `report` as text.
fn render_report(report: &AnalyticsReport) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "period: {} .. {} ({} days)",
        report.period.start_date, report.period.end_date, report.period.days
    );
    for day in &report.daily {
        let _ = writeln!(
            output,
            "  {}: {} requests ({} ok, {} failed), avg {:.3}s, {} bytes",
            day.date,
            day.total_requests,
            day.successful_requests,
            day.failed_requests,
            day.avg_processing_secs,
            day.total_bytes
        );
    }
    let _ = writeln!(output, "today by hour:");
    for hour in &report.hourly {
        let _ = writeln!(
            output,
            "  {:02}:00 {} requests ({} ok, {} failed)",
            hour.hour, hour.total_requests, hour.successful_requests, hour.failed_requests
        );
    }
    let _ = writeln!(output, "top endpoints:");
    for endpoint in &report.top_endpoints {
        let _ = writeln!(output, "  {} {}", endpoint.request_count, endpoint.endpoint);
    }
    let sessions = &report.sessions;
    let _ = writeln!(
        output,
        "sessions: {} ({} active), {:.2} requests/session, avg {:.3}s",
        sessions.total_sessions,
        sessions.active_sessions,
        sessions.avg_requests_per_session,
        sessions.avg_session_response_secs
    );
    let _ = writeln!(output, "generated: {}", format_rfc3339(report.generated_at_ms));
    output
}

/// Renders `purge` as text.
fn render_purge(report: &PurgeReport) -> String {
    let records = &report.records;
    let mut output = String::new();
    let _ = writeln!(
        output,
        "cutoff: {} (keep {} days)",
        format_rfc3339(report.cutoff_ms),
        report.days_to_keep
    );
    let _ = writeln!(
        output,
        "records: {} responses, {} requests, {} sessions, {} windows, {} buckets",
        records.responses,
        records.requests,
        records.sessions,
        records.rate_limit_windows,
        records.analytics_buckets
    );
    for files in &report.files {
        let _ = writeln!(output, "{}: {} files", files.directory, files.deleted);
    }
    for failure in records.errors.iter().chain(&report.errors) {
        let _ = writeln!(output, "error: {}: {}", failure.target, failure.message);
    }
    output
}

/// Renders `config check` as text.
fn render_config_summary(summary: &ConfigSummary) -> String {
    let source =
        summary.source.as_deref().map_or_else(|| "built-in defaults".to_string(), display_path);
    format!(
        "config ok ({source})\nroot: {}\ndatabase: {}\n",
        summary.root_dir.display(),
        summary.database_path.display()
    )
}

/// Displays a path as an owned string.
fn display_path(path: &Path) -> String {
    path.display().to_string()
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Writes text to stdout.
fn write_stdout(text: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    stdout
        .write_all(text.as_bytes())
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes pretty JSON plus a newline to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    text.push('\n');
    write_stdout(&text)
}

/// Writes text to stderr, ignoring failures.
fn write_stderr(text: &str) {
    let mut stderr = std::io::stderr();
    let _ = stderr.write_all(text.as_bytes());
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    write_stderr(&format!("{message}\n"));
    ExitCode::FAILURE
}
