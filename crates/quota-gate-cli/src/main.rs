// crates/quota-gate-cli/src/main.rs
// ============================================================================
// Module: Quota Gate CLI Entry Point
// Description: Command dispatcher for the Quota Gate server and store tools.
// Purpose: Provide a safe CLI for serving, config checks, and catalog import.
// Dependencies: clap, quota-gate-config, quota-gate-core, quota-gate-server, tokio
// ============================================================================

//! ## Overview
//! `quota-gate serve` runs the HTTP surface. The remaining commands work
//! directly against the configured store: `catalog import` loads a JSON
//! catalog snapshot, `access` runs one decision, and `usage` reports the
//! summed usage for an (entity, api) pair. Inputs are size-limited and every
//! user-facing string goes through the [`t!`] catalog.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use quota_gate_cli::t;
use quota_gate_config::QuotaGateConfig;
use quota_gate_config::StoreType;
use quota_gate_core::ApiName;
use quota_gate_core::CatalogSnapshot;
use quota_gate_core::EntityId;
use quota_gate_core::MAX_CATALOG_BYTES;
use quota_gate_core::SharedAccessEngine;
use quota_gate_core::Timestamp;
use quota_gate_server::AccessServer;
use quota_gate_server::build_store;
use quota_gate_server::ErrorEnvelope;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "quota-gate", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", short = 'V')]
    show_version: bool,
    /// Command to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Catalog utilities.
    Catalog {
        /// Selected catalog subcommand.
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Run one access decision against the configured store.
    Access(PairCommand),
    /// Print summed usage for an (entity, api) pair.
    Usage(PairCommand),
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Config file path (defaults to `QUOTA_GATE_CONFIG` or quota-gate.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Permit a non-loopback bind address.
    #[arg(long)]
    allow_non_loopback: bool,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a configuration file.
    Validate(ConfigPathArgs),
}

/// Shared `--config` argument.
#[derive(Args, Debug)]
struct ConfigPathArgs {
    /// Config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Catalog subcommands.
#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Apply a JSON catalog snapshot to the configured store.
    Import(CatalogImportCommand),
}

/// Arguments for `catalog import`.
#[derive(Args, Debug)]
struct CatalogImportCommand {
    /// Catalog snapshot JSON file.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
    /// Config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments naming one (entity, api) pair.
#[derive(Args, Debug)]
struct PairCommand {
    /// Entity identifier.
    #[arg(long, value_name = "ID")]
    entity: String,
    /// Meterable API name (e.g. `/users/`).
    #[arg(long, value_name = "NAME")]
    api: String,
    /// Config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// Successful `access` output.
#[derive(Debug, Serialize)]
struct AccessOutput {
    /// Entity display name.
    display_name: String,
    /// Confirmation message.
    message: String,
    /// Usage including this call.
    used: u64,
    /// Allowance in effect.
    allowed: u64,
}

/// `usage` output.
#[derive(Debug, Serialize)]
struct UsageOutput {
    /// Entity identifier.
    entity_id: EntityId,
    /// API name.
    api: ApiName,
    /// Summed usage.
    used: u64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for catalog messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a catalog message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Errors raised by bounded file reads.
#[derive(Debug, Error)]
enum ReadLimitError {
    /// I/O failure.
    #[error("{0}")]
    Io(std::io::Error),
    /// File exceeds the size limit.
    #[error("file too large ({size} > {limit})")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    init_tracing(matches!(command, Commands::Serve(_)));
    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => command_config(command),
        Commands::Catalog {
            command,
        } => command_catalog(command).await,
        Commands::Access(command) => command_access(command).await,
        Commands::Usage(command) => command_usage(command).await,
    }
}

/// Installs the tracing subscriber; `RUST_LOG` overrides the default level.
fn init_tracing(serving: bool) {
    let default_level = if serving { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let mut config = QuotaGateConfig::read(command.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    if command.allow_non_loopback {
        config.server.allow_non_loopback = true;
    }
    config.validate().map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    if !config.server.admin.enabled() {
        write_stderr_line(&t!("serve.warn.no_admin_tokens"))
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }

    let server = tokio::task::spawn_blocking(move || AccessServer::from_config(&config))
        .await
        .map_err(|err| {
            CliError::new(t!("serve.init_failed", error = format!("init join failed: {err}")))
        })?
        .map_err(|err| CliError::new(t!("serve.init_failed", error = err)))?;
    if !server.bind_addr().ip().is_loopback() {
        write_stderr_line(&t!("serve.warn.network", bind = server.bind_addr()))
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    server.serve().await.map_err(|err| CliError::new(t!("serve.failed", error = err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Emits the top-level help message.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(args) => {
            let _config = load_config(args.config.as_deref())?;
            write_stdout_line(&t!("config.validate.ok"))
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Loads and validates configuration.
fn load_config(path: Option<&Path>) -> CliResult<QuotaGateConfig> {
    QuotaGateConfig::load(path).map_err(|err| CliError::new(t!("config.load_failed", error = err)))
}

// ============================================================================
// SECTION: Catalog Commands
// ============================================================================

/// Dispatches catalog subcommands.
async fn command_catalog(command: CatalogCommand) -> CliResult<ExitCode> {
    match command {
        CatalogCommand::Import(command) => command_catalog_import(command).await,
    }
}

/// Applies a catalog snapshot to the configured durable store.
async fn command_catalog_import(command: CatalogImportCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    if config.store.store_type == StoreType::Memory {
        return Err(CliError::new(t!("catalog.import.memory_store")));
    }
    let bytes = read_bytes_with_limit(&command.input, MAX_CATALOG_BYTES)
        .map_err(|err| read_error("catalog", &command.input, err))?;
    let snapshot = CatalogSnapshot::from_json_slice(&bytes)
        .map_err(|err| CliError::new(t!("catalog.import.invalid", error = err)))?;
    let summary = tokio::task::spawn_blocking(move || {
        let store = build_store(&config.store)
            .map_err(|err| CliError::new(t!("store.open_failed", error = err)))?;
        snapshot
            .apply_to(&store)
            .map_err(|err| CliError::new(t!("catalog.import.failed", error = err)))
    })
    .await
    .map_err(|err| CliError::new(t!("catalog.import.failed", error = err)))??;
    tracing::info!(
        input = %command.input.display(),
        plans = summary.plans,
        "catalog snapshot imported"
    );
    write_stdout_line(&t!(
        "catalog.import.ok",
        entities = summary.entities,
        plans = summary.plans,
        subscriptions = summary.subscriptions
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Access Commands
// ============================================================================

/// Runs one access decision and prints the JSON outcome.
async fn command_access(command: PairCommand) -> CliResult<ExitCode> {
    let (config, entity_id, api) = resolve_pair(&command)?;
    let decision = tokio::task::spawn_blocking(move || {
        let store = build_store(&config.store)
            .map_err(|err| CliError::new(t!("store.open_failed", error = err)))?;
        let engine = SharedAccessEngine::from_store(&store);
        Ok::<_, CliError>(engine.decide(&entity_id, &api, now_timestamp()))
    })
    .await
    .map_err(|err| CliError::new(t!("access.task_failed", error = err)))??;

    match decision {
        Ok(result) => {
            let output = AccessOutput {
                message: result.message(),
                display_name: result.display_name,
                used: result.used_after,
                allowed: result.allowed,
            };
            write_json(&output)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            write_json(&ErrorEnvelope::from_access_error(&err))?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Prints summed usage for one pair.
async fn command_usage(command: PairCommand) -> CliResult<ExitCode> {
    let (config, entity_id, api) = resolve_pair(&command)?;
    let output = tokio::task::spawn_blocking(move || {
        let store = build_store(&config.store)
            .map_err(|err| CliError::new(t!("store.open_failed", error = err)))?;
        let engine = SharedAccessEngine::from_store(&store);
        let used = engine
            .usage(&entity_id, &api)
            .map_err(|err| CliError::new(t!("usage.failed", error = err)))?;
        Ok::<_, CliError>(UsageOutput {
            entity_id,
            api,
            used,
        })
    })
    .await
    .map_err(|err| CliError::new(t!("usage.failed", error = err)))??;
    write_json(&output)?;
    Ok(ExitCode::SUCCESS)
}

/// Loads config and checks the store is durable and the API is configured.
///
/// A memory store would start empty on every run, so it is refused.
fn resolve_pair(command: &PairCommand) -> CliResult<(QuotaGateConfig, EntityId, ApiName)> {
    let config = load_config(command.config.as_deref())?;
    if config.store.store_type == StoreType::Memory {
        return Err(CliError::new(t!("store.memory_unsupported")));
    }
    let apis =
        config.meterable_apis().map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    let api = ApiName::new(command.api.as_str());
    if !apis.contains(&api) {
        return Err(CliError::new(t!("access.unknown_api", api = api)));
    }
    Ok((config, EntityId::new(command.entity.as_str()), api))
}

/// Returns the wall-clock time used to stamp usage events.
fn now_timestamp() -> Timestamp {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    Timestamp::UnixMillis(i64::try_from(millis).unwrap_or(i64::MAX))
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let metadata = file.metadata().map_err(ReadLimitError::Io)?;
    let size = metadata.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        let actual = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        return Err(ReadLimitError::TooLarge {
            size: actual,
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Formats a bounded-read failure.
fn read_error(kind: &str, path: &Path, err: ReadLimitError) -> CliError {
    let path = path.display();
    match err {
        ReadLimitError::Io(error) => {
            CliError::new(t!("input.read_failed", kind = kind, path = path, error = error))
        }
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(t!(
            "input.read_too_large",
            kind = kind,
            path = path,
            size = size,
            limit = limit
        )),
    }
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Writes a value as one JSON line to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let payload = serde_json::to_string(value)
        .map_err(|err| CliError::new(t!("output.serialize_failed", error = err)))?;
    write_stdout_line(&payload).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    let stream_label = match stream {
        "stdout" => t!("output.stream.stdout"),
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.unknown"),
    };
    t!("output.write_failed", stream = stream_label, error = error)
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
