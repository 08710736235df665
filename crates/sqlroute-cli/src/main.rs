// crates/sqlroute-cli/src/main.rs
// ============================================================================
// Module: SQL Route CLI Entry Point
// Description: Command dispatcher for serving, migrating, and inspecting routes.
// Purpose: Provide the `sqlroute` binary around the server and store crates.
// Dependencies: clap, sqlroute-config, sqlroute-core, sqlroute-server, tokio.
// ============================================================================

//! ## Overview
//! `sqlroute serve` runs the HTTP router. The remaining commands work offline
//! against the same configuration: apply or list migrations, print the route
//! table with ambiguity warnings, and validate the config file. Errors go to
//! stderr and the process exits non-zero.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use serde::Serialize;
use sqlroute_config::SqlRouteConfig;
use sqlroute_core::RouteTable;
use sqlroute_core::TemplateStore;
use sqlroute_server::RouterServer;
use sqlroute_store_sqlite::SqliteRouteStore;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "sqlroute", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP router.
    Serve(ConfigArgs),
    /// Apply pending migrations, or list them with `--pending`.
    Migrate(MigrateCommand),
    /// Print the route table and ambiguity warnings.
    Routes(RoutesCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Shared `--config` argument.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Config file path (defaults to `SQLROUTE_CONFIG`, then sqlroute.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for the `migrate` command.
#[derive(Args, Debug)]
struct MigrateCommand {
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
    /// List pending migrations without applying them.
    #[arg(long)]
    pending: bool,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

/// Arguments for the `routes` command.
#[derive(Args, Debug)]
struct RoutesCommand {
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the config file.
    Validate(ConfigArgs),
}

/// Output format for inspection commands.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Human-readable lines.
    Text,
    /// One JSON document.
    Json,
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// One route table entry.
#[derive(Debug, Serialize)]
struct RouteEntry {
    /// Normalized route pattern.
    pattern: String,
    /// Template file backing the route.
    source: String,
}

/// One shadowing pair.
#[derive(Debug, Serialize)]
struct AmbiguityEntry {
    /// Pattern that wins for overlapping paths.
    winner: String,
    /// Pattern that never sees overlapping paths.
    shadowed: String,
}

/// `routes` command output.
#[derive(Debug, Serialize)]
struct RoutesOutput {
    /// Routes in match order.
    routes: Vec<RouteEntry>,
    /// Ambiguous pattern pairs.
    ambiguities: Vec<AmbiguityEntry>,
}

/// `migrate` command output.
#[derive(Debug, Serialize)]
struct MigrateOutput {
    /// True when migrations were applied, false for `--pending`.
    applied: bool,
    /// Migration names, in order.
    migrations: Vec<String>,
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
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Serve(args) => command_serve(args).await,
        Commands::Migrate(command) => command_migrate(&command),
        Commands::Routes(command) => command_routes(&command),
        Commands::Config {
            command: ConfigCommand::Validate(args),
        } => command_config_validate(&args),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(args: ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    let server = tokio::task::spawn_blocking(move || RouterServer::from_config(config))
        .await
        .map_err(|err| CliError::new(format!("server init failed: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `migrate` command.
fn command_migrate(command: &MigrateCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.config.as_deref())?;
    let Some(dir) = config.migrations.dir.as_deref() else {
        return Err(CliError::new(
            "no migrations directory configured ([migrations] dir)".to_string(),
        ));
    };
    let store = SqliteRouteStore::open(config.database.store_config())
        .map_err(|err| CliError::new(format!("database open failed: {err}")))?;
    let output = if command.pending {
        let migrations = store
            .pending_migrations(dir)
            .map_err(|err| CliError::new(format!("migration listing failed: {err}")))?;
        MigrateOutput {
            applied: false,
            migrations,
        }
    } else {
        let migrations = store
            .run_migrations(dir)
            .map_err(|err| CliError::new(format!("migration failed: {err}")))?;
        MigrateOutput {
            applied: true,
            migrations,
        }
    };
    match command.format {
        OutputFormat::Text => write_stdout_text(&render_migrate_text(&output))?,
        OutputFormat::Json => write_stdout_json(&output)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes the `routes` command.
fn command_routes(command: &RoutesCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.config.as_deref())?;
    let table = TemplateStore::new(&config.templates.root)
        .load()
        .map_err(|err| CliError::new(format!("template load failed: {err}")))?;
    let output = routes_output(&table);
    match command.format {
        OutputFormat::Text => {
            write_stdout_text(&render_routes_text(&output))?;
            for ambiguity in &output.ambiguities {
                write_stderr_line(&format!(
                    "warning: {} shadows {} for overlapping paths",
                    ambiguity.winner, ambiguity.shadowed
                ))
                .map_err(|err| CliError::new(output_error("stderr", &err)))?;
            }
        }
        OutputFormat::Json => write_stdout_json(&output)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes the config validation command.
fn command_config_validate(args: &ConfigArgs) -> CliResult<ExitCode> {
    let _config = load_config(args.config.as_deref())?;
    write_stdout_line("config ok").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads configuration, mapping errors to CLI errors.
fn load_config(path: Option<&Path>) -> CliResult<SqlRouteConfig> {
    SqlRouteConfig::load(path).map_err(|err| CliError::new(format!("config load failed: {err}")))
}

/// Collects the route table and its ambiguities for output.
fn routes_output(table: &RouteTable) -> RoutesOutput {
    RoutesOutput {
        routes: table
            .iter()
            .map(|template| RouteEntry {
                pattern: template.pattern().to_string(),
                source: template.source().display().to_string(),
            })
            .collect(),
        ambiguities: table
            .ambiguities()
            .into_iter()
            .map(|ambiguity| AmbiguityEntry {
                winner: ambiguity.winner.to_string(),
                shadowed: ambiguity.shadowed.to_string(),
            })
            .collect(),
    }
}

/// Renders the route table as text.
fn render_routes_text(output: &RoutesOutput) -> String {
    if output.routes.is_empty() {
        return "no routes".to_string();
    }
    let width = output.routes.iter().map(|route| route.pattern.len()).max().unwrap_or(0);
    output
        .routes
        .iter()
        .map(|route| format!("{:<width$}  {}", route.pattern, route.source))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders migration results as text.
fn render_migrate_text(output: &MigrateOutput) -> String {
    if output.migrations.is_empty() {
        return "no pending migrations".to_string();
    }
    let verb = if output.applied { "applied" } else { "pending" };
    output
        .migrations
        .iter()
        .map(|name| format!("{verb} {name}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Writes text to stdout with a trailing newline.
fn write_stdout_text(text: &str) -> CliResult<()> {
    write_stdout_line(text).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes pretty JSON to stdout.
fn write_stdout_json<T: Serialize>(value: &T) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("output serialization failed: {err}")))?;
    write_stdout_text(&rendered)
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write {stream}: {error}")
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
