//! cloudscale CLI entrypoint.
//!
//! Result envelopes and reports go to stdout, logs go to stderr.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cloudscale_reconcile::api::CloudscaleClient;
use cloudscale_reconcile::cli::{Cli, Commands, LogFormat, OutputFormatter};
use cloudscale_reconcile::config::{find_config_file, ConfigParser, ConfigValidator, Manifest};
use cloudscale_reconcile::error::{CloudscaleError, ConfigError, Result};
use cloudscale_reconcile::inventory::Inventory;
use cloudscale_reconcile::reconciler::Reconciler;
use cloudscale_reconcile::report::RunSummary;
use cloudscale_reconcile::resources::Registry;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let formatter = OutputFormatter::new(cli.output);
    match runtime.block_on(run(cli, &formatter)) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            let _ = emit(&formatter.error(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, format: LogFormat) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli, formatter: &OutputFormatter) -> Result<ExitCode> {
    let registry = Registry::builtin();
    let config = cli.config.as_deref();
    let token = cli.api_token.as_deref();

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(config, &registry, warnings, formatter),
        Commands::Plan { detailed } => {
            cmd_plan(config, token, &registry, detailed, formatter).await
        }
        Commands::Apply { check, keep_going } => {
            cmd_apply(config, token, &registry, check, keep_going, formatter).await
        }
        Commands::Module { kind, args, check } => {
            cmd_module(config, token, &registry, &kind, &args, check, formatter).await
        }
        Commands::Inventory { host, .. } => {
            cmd_inventory(config, token, &registry, host.as_deref(), formatter).await
        }
        Commands::Kinds => {
            emit(&formatter.format_kinds(&registry))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Validate the manifest.
fn cmd_validate(
    config_path: Option<&Path>,
    registry: &Registry,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let manifest = load_manifest(config_path)?;
    let result = ConfigValidator::new(registry).check(&manifest);

    emit(&formatter.format_validation(&result, show_warnings))?;
    Ok(if result.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Show what apply would change.
async fn cmd_plan(
    config_path: Option<&Path>,
    token: Option<&str>,
    registry: &Registry,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let manifest = load_manifest(config_path)?;
    let resources = ConfigValidator::new(registry).validate(&manifest)?.resources;
    let client = create_client(&manifest, token)?;

    let reconciler = Reconciler::new(&client, registry)
        .with_options(manifest.api.reconcile_options(true));

    let mut results = Vec::with_capacity(resources.len());
    for spec in &resources {
        results.push(reconciler.reconcile(spec).await);
    }

    emit(&formatter.format_plan(&results, detailed))?;
    Ok(if results.iter().any(|r| r.failed()) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Reconcile every manifest resource.
async fn cmd_apply(
    config_path: Option<&Path>,
    token: Option<&str>,
    registry: &Registry,
    check: bool,
    keep_going: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let manifest = load_manifest(config_path)?;
    let resources = ConfigValidator::new(registry).validate(&manifest)?.resources;
    let client = create_client(&manifest, token)?;

    let reconciler = Reconciler::new(&client, registry)
        .with_options(manifest.api.reconcile_options(check));

    let mut summary = RunSummary::start(check);
    info!("Reconciling {} resource(s)", resources.len());

    for spec in &resources {
        let result = reconciler.reconcile(spec).await;
        debug!("Result: {}", formatter.logged_envelope(&result));
        emit(&formatter.format_result(&result))?;
        summary.record(&result);

        if result.failed() && !keep_going {
            info!("Stopping after the first failure; use --keep-going to continue");
            break;
        }
    }

    summary.finish();
    emit(&formatter.format_summary(&summary))?;
    Ok(if summary.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Reconcile a single resource given as JSON.
async fn cmd_module(
    config_path: Option<&Path>,
    token: Option<&str>,
    registry: &Registry,
    kind: &str,
    args: &str,
    check: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let manifest = load_optional_manifest(config_path)?;

    let params: serde_json::Value = serde_json::from_str(args).map_err(|e| ConfigError::ParseError {
        message: format!("Invalid JSON arguments: {e}"),
        location: Some(String::from("--args")),
    })?;
    let spec = registry.parse_kind(kind, params)?;
    let client = create_client(&manifest, token)?;

    let result = Reconciler::new(&client, registry)
        .with_options(manifest.api.reconcile_options(check))
        .reconcile(&spec)
        .await;

    debug!("Result: {}", formatter.logged_envelope(&result));
    emit(&formatter.format_result(&result))?;
    Ok(if result.failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Export servers as a dynamic inventory.
async fn cmd_inventory(
    config_path: Option<&Path>,
    token: Option<&str>,
    registry: &Registry,
    host: Option<&str>,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let manifest = load_optional_manifest(config_path)?;
    let client = create_client(&manifest, token)?;
    let inventory = Inventory::load(&client, registry, manifest.inventory).await?;
    info!("Inventory contains {} host(s)", inventory.len());

    let document = match host {
        Some(name) => inventory
            .host(name)
            .unwrap_or_else(|| serde_json::json!({})),
        None => inventory.to_json(),
    };
    emit(&formatter.format_inventory(&document))?;
    Ok(ExitCode::SUCCESS)
}

/// Writes one block of output to stdout.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", text.trim_end())?;
    Ok(())
}

/// Resolves the manifest path.
fn resolve_config_path(config_path: Option<&Path>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |p| Ok(p.to_path_buf()))
}

/// Loads the manifest, its `.env` file and environment overrides.
fn load_manifest(config_path: Option<&Path>) -> Result<Manifest> {
    let config_file = resolve_config_path(config_path)?;

    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| Path::new(".")),
    );
    parser.load_dotenv()?;

    let mut manifest = parser.load_file(&config_file)?;
    ConfigParser::apply_env_overrides(&mut manifest, |name| std::env::var(name).ok())?;
    Ok(manifest)
}

/// Loads the manifest when one exists; single-resource commands work without.
fn load_optional_manifest(config_path: Option<&Path>) -> Result<Manifest> {
    match load_manifest(config_path) {
        Err(CloudscaleError::Config(ConfigError::FileNotFound { .. })) if config_path.is_none() => {
            debug!("No manifest found, using defaults");
            ConfigParser::new().load_dotenv()?;
            let mut manifest = Manifest::default();
            ConfigParser::apply_env_overrides(&mut manifest, |name| std::env::var(name).ok())?;
            Ok(manifest)
        }
        other => other,
    }
}

/// Creates the API client.
fn create_client(manifest: &Manifest, token: Option<&str>) -> Result<CloudscaleClient> {
    let token = ConfigParser::api_token(token, |name| std::env::var(name).ok())?;
    CloudscaleClient::with_options(&token, &manifest.api.url, manifest.api.timeout_secs)
}
