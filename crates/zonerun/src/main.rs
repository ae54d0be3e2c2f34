//! zonerun - scheduled task agent
//!
//! Loads a task manifest, runs it, reports to the endpoint and prints the report
//! response as JSON on stdout. Logs go to stderr.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::Parser;
use eyre::WrapErr;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use zonerun::AgentConfig;
use zonerun_core::{report, Config, GroupId, Manifest};

#[derive(Parser)]
#[command(name = "zonerun", about = "Run a task manifest and report the results", version)]
struct Cli {
    /// Group identifier (sent as group_id, substituted for %GRUP%)
    group_id: String,

    /// Path to the task manifest (JSON)
    tasks: PathBuf,

    /// Report endpoint; https:// is assumed when no scheme is given
    endpoint: String,

    /// Config file (key=value)
    #[arg(long, env = "ZONERUN_CONFIG")]
    config: Option<PathBuf>,

    /// Skip TLS certificate validation (unsafe, testing only)
    #[arg(long)]
    insecure: bool,

    /// Include status counts in the report body
    #[arg(long)]
    include_counts: bool,

    /// Per-command timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    command_timeout_sec: Option<u32>,

    /// Report request timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    request_timeout_sec: Option<u32>,

    /// Shell used to run commands
    #[arg(long)]
    shell: Option<PathBuf>,

    /// Extra placeholder token, e.g. --token %USER%=alumne (repeatable)
    #[arg(long = "token", value_parser = parse_token)]
    tokens: Vec<(String, String)>,

    /// Append per-task results to this TSV file
    #[arg(long)]
    results_log: Option<PathBuf>,
}

fn parse_token(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((token, value)) if !token.is_empty() => Ok((token.to_string(), value.to_string())),
        _ => Err(format!("expected TOKEN=VALUE, got '{s}'")),
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    if let Err(e) = runtime.block_on(run(cli)) {
        error!("{e:?}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> eyre::Result<()> {
    let config = load_config(&cli)?;
    let manifest = load_manifest(&cli.tasks)?;
    let group_id = GroupId::new(cli.group_id);

    info!(
        group_id = %group_id,
        tasks = manifest.task_count(),
        manifest = %cli.tasks.display(),
        "loaded manifest"
    );

    let outcome = zonerun::run(
        manifest,
        &group_id,
        &cli.endpoint,
        &AgentConfig::from_config(&config),
    )
    .await?;

    if let Some(path) = &config.results_log {
        if let Err(e) = report::append_records(path, &group_id, &outcome.records) {
            warn!(path = %path.display(), error = %e, "failed to write results log");
        }
    }

    println!("{}", serde_json::to_string_pretty(&outcome.response)?);
    Ok(())
}

/// Defaults, then the config file, then CLI flags.
fn load_config(cli: &Cli) -> eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .wrap_err_with(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    if cli.insecure {
        config.insecure = true;
    }
    if cli.include_counts {
        config.include_counts = true;
    }
    if let Some(secs) = cli.command_timeout_sec {
        config.command_timeout_sec = secs;
    }
    if let Some(secs) = cli.request_timeout_sec {
        config.request_timeout_sec = secs;
    }
    if let Some(shell) = &cli.shell {
        config.shell.clone_from(shell);
    }
    for (token, value) in &cli.tokens {
        config.set_token(token.clone(), value.clone());
    }
    if let Some(path) = &cli.results_log {
        config.results_log = Some(path.clone());
    }

    Ok(config)
}

fn load_manifest(path: &Path) -> eyre::Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read manifest {}", path.display()))?;
    serde_json::from_str(&content)
        .wrap_err_with(|| format!("failed to parse manifest {}", path.display()))
}
