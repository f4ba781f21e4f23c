//! Fleetform CLI entrypoint.
//!
//! This is the main entrypoint for the fleetform command-line tool.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use fleetform::cli::{Cli, Commands, OutputFormatter, UnitStatusRow};
use fleetform::clients::Clients;
use fleetform::config::{
    find_config_file, ConfigHasher, ConfigParser, ConfigValidator, FleetConfig,
};
use fleetform::custom::{builtin_registry, InvocationRequest, InvocationResponse};
use fleetform::error::{FleetError, Result};
use fleetform::migration::MigrationEngine;
use fleetform::reconciler::Reconciler;
use fleetform::teardown::TeardownEngine;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if e.is_credential_expiry() {
                eprintln!("Refresh your credentials and run the same command again.");
            }
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins over the verbosity flag when set.
fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.format);

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings),
        Commands::Deploy => cmd_deploy(cli.config.as_ref(), &formatter).await,
        Commands::Status => cmd_status(cli.config.as_ref(), &formatter).await,
        Commands::Teardown { yes } => cmd_teardown(cli.config.as_ref(), yes, &formatter).await,
        Commands::Migrate => cmd_migrate(cli.config.as_ref(), &formatter).await,
        Commands::Invoke { request } => {
            cmd_invoke(cli.config.as_ref(), request.as_deref()).await
        }
    }
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let config = ConfigParser::new().load(&config_file)?;

    let result = ConfigValidator::new().validate(&config)?;

    eprintln!("Configuration is valid!");
    if show_warnings && !result.warnings.is_empty() {
        eprintln!("\nWarnings:");
        for warning in &result.warnings {
            eprintln!("  - {warning}");
        }
    }

    eprintln!("\nConfiguration summary:");
    eprintln!("  Project: {}", config.project.name);
    eprintln!("  Environment: {}", config.project.environment);
    eprintln!("  Units: {}", config.units.len());
    eprintln!("  Custom resource types: {}", config.custom_resources.types.len());
    eprintln!(
        "  Migrations: {} shapes, {} tables",
        config.migrations.obsolete.len(),
        config.migrations.retired_tables.len()
    );

    let hasher = ConfigHasher::new();
    eprintln!("  Desired-state hash: {}", hasher.short_hash(&hasher.hash_config(&config)));

    Ok(())
}

/// Migrate, then deploy every unit.
async fn cmd_deploy(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let config = load_config(config_path)?;
    let clients = Clients::connect(&config).await?;

    let report = Reconciler::new(&clients, &config).reconcile().await?;
    eprintln!("{}", formatter.format_deploy(&report));

    report.into_result().map(|_| ())
}

/// Show the live status of every unit.
async fn cmd_status(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let config = load_config(config_path)?;
    let clients = Clients::connect(&config).await?;

    let mut rows = Vec::with_capacity(config.units.len());
    for unit in config.unit_names() {
        let full_name = config.unit_full_name(unit);
        debug!("Describing {full_name}");
        let live = clients.engine.describe_unit(&full_name).await?;
        rows.push(UnitStatusRow::new(unit, live.as_ref()));
    }

    eprintln!("{}", formatter.format_status(&config.qualified_name(), &rows));
    Ok(())
}

/// Delete every unit and clean up what the engine leaves behind.
async fn cmd_teardown(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;

    eprintln!("The following units will be deleted:");
    for unit in config.unit_names() {
        eprintln!("  - {}", config.unit_full_name(unit));
    }

    if !auto_approve {
        let expected = config.qualified_name();
        eprint!("\nThis action is IRREVERSIBLE. Type '{expected}' to confirm: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim() != expected {
            eprintln!("Teardown cancelled.");
            return Ok(());
        }
    }

    let clients = Clients::connect(&config).await?;
    let report = TeardownEngine::new(&clients, &config).run().await?;
    eprintln!("{}", formatter.format_teardown(&report));

    report.into_result().map(|_| ())
}

/// Run the configured migrations only.
async fn cmd_migrate(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let config = load_config(config_path)?;
    let clients = Clients::connect(&config).await?;

    let report = MigrationEngine::new(&clients, &config).run().await?;
    eprintln!("{}", formatter.format_migration(&report));

    Ok(())
}

/// Handle one custom resource invocation.
///
/// A response always goes to stdout, even when the request could not be
/// read or served, so the engine never waits on a missing reply.
async fn cmd_invoke(config_path: Option<&PathBuf>, request_path: Option<&Path>) -> Result<()> {
    let (response, outcome) = match read_request(request_path) {
        Ok(raw) => match serve_invocation(config_path, &raw).await {
            Ok(response) => (response, Ok(())),
            Err(e) => (InvocationResponse::unserved(&raw, e.to_string()), Err(e)),
        },
        Err(e) => (InvocationResponse::unserved("", e.to_string()), Err(e)),
    };

    let body = serde_json::to_string(&response)
        .map_err(|e| FleetError::internal(format!("Failed to encode response: {e}")))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{body}")?;

    outcome
}

/// Reads the invocation request from a file or stdin.
fn read_request(request_path: Option<&Path>) -> Result<String> {
    match request_path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            Ok(raw)
        }
    }
}

/// Decodes a request and dispatches it to the built-in handlers.
async fn serve_invocation(
    config_path: Option<&PathBuf>,
    raw: &str,
) -> Result<InvocationResponse> {
    let request: InvocationRequest = serde_json::from_str(raw)
        .map_err(|e| FleetError::internal(format!("Invalid invocation request: {e}")))?;

    let config = load_config(config_path)?;
    let clients = Clients::connect(&config).await?;
    let registry = builtin_registry(&clients)?;

    Ok(registry.dispatch(&request).await)
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads, overrides from the environment, and validates the configuration.
fn load_config(config_path: Option<&PathBuf>) -> Result<FleetConfig> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let config = ConfigParser::new().load(&config_file)?;
    let result = ConfigValidator::new().validate(&config)?;
    for warning in &result.warnings {
        debug!("Configuration warning: {warning}");
    }

    Ok(config)
}
