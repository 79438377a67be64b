use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use cache_reclaim_core::{
    discover_targets, effective_uid, ensure_privileged, human_bytes, probe_for,
    render_run_report, run_reclaim, CancellationController, Discovery, DiscoveryOptions, FsEraser,
    ReclaimConfig, SizeBackendKind, DEFAULT_CACHE_DIR_NAME,
};
use clap::ArgAction;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sysinfo::Disks;
use tracing::warn;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Exit status used when a run ends because of SIGINT/SIGTERM.
const INTERRUPTED_EXIT_CODE: u8 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "cache-reclaim",
    version,
    about = "Clear per-account cache directories in parallel and report the space reclaimed."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Clear (or with --dry-run, measure) every discovered cache directory.
    Run(RunArgs),
    /// List the cache directories a run would process.
    Discover(DiscoverArgs),
    /// Show privilege status and free space for the partitions being cleaned.
    Doctor(DoctorArgs),
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliBackendKind {
    Native,
    #[value(name = "pdu_library", alias = "pdu-library", alias = "pdu")]
    PduLibrary,
}

impl From<CliBackendKind> for SizeBackendKind {
    fn from(value: CliBackendKind) -> Self {
        match value {
            CliBackendKind::Native => SizeBackendKind::Native,
            CliBackendKind::PduLibrary => SizeBackendKind::PduLibrary,
        }
    }
}

#[derive(Debug, Args)]
struct DiscoveryArgs {
    /// Directories holding one sub-directory per account.
    #[arg(
        long = "roots",
        value_name = "PATH",
        num_args = 1..,
        action = ArgAction::Append,
        default_value = "/home"
    )]
    roots: Vec<PathBuf>,

    /// Name of the cache directory inside each account directory.
    #[arg(long, default_value = DEFAULT_CACHE_DIR_NAME, value_name = "NAME")]
    cache_dir: String,

    /// Account names to leave alone (glob or substring, repeatable).
    #[arg(long = "exclude", value_name = "PATTERN", num_args = 1.., action = ArgAction::Append)]
    exclude: Vec<String>,
}

impl DiscoveryArgs {
    fn options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            roots: self.roots.clone(),
            cache_dir_name: self.cache_dir.clone(),
            excludes: self.exclude.clone(),
        }
    }
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    discovery: DiscoveryArgs,

    /// Measure only; nothing is deleted.
    #[arg(long)]
    dry_run: bool,

    /// Erase attempts per directory before giving up.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    attempts: u32,

    /// Directories processed concurrently.
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u64).range(1..))]
    parallel: u64,

    /// Pause between two erase attempts.
    #[arg(long, default_value_t = 1000, value_name = "MS")]
    backoff_ms: u64,

    /// After an interruption, abort in-flight work once this many seconds pass.
    #[arg(long, value_name = "SECONDS")]
    grace_secs: Option<u64>,

    /// Size measurement backend (`native` or `pdu-library`).
    #[arg(long, default_value = "native")]
    backend: CliBackendKind,

    /// Append warnings and errors to this file.
    #[arg(long, value_name = "FILE")]
    error_log: Option<PathBuf>,

    /// Append the rendered summary to this file.
    #[arg(long, value_name = "FILE")]
    summary_log: Option<PathBuf>,

    /// Write the full run report as JSON.
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Run without root (only caches the current user can delete are cleared).
    #[arg(long)]
    skip_privilege_check: bool,
}

#[derive(Debug, Args)]
struct DiscoverArgs {
    #[command(flatten)]
    discovery: DiscoveryArgs,

    /// Print the listing as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct DoctorArgs {
    /// Roots whose disks should be reported.
    #[arg(
        long = "roots",
        value_name = "PATH",
        num_args = 1..,
        action = ArgAction::Append,
        default_value = "/home"
    )]
    roots: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct DiscoveryListing {
    targets: Vec<ListedTarget>,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ListedTarget {
    partition: String,
    account: String,
    path: PathBuf,
}

impl From<Discovery> for DiscoveryListing {
    fn from(discovery: Discovery) -> Self {
        Self {
            targets: discovery
                .targets
                .iter()
                .map(|target| ListedTarget {
                    partition: target.partition().to_string(),
                    account: target.account().to_string(),
                    path: target.path().to_path_buf(),
                })
                .collect(),
            warnings: discovery.warnings,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_reclaim_command(args),
        Commands::Discover(args) => {
            init_tracing(None)?;
            run_discover_command(args)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Doctor(args) => {
            init_tracing(None)?;
            run_doctor_command(args);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_reclaim_command(args: RunArgs) -> Result<ExitCode> {
    init_tracing(args.error_log.as_deref())?;

    if !args.skip_privilege_check {
        ensure_privileged().context("refusing to clear other accounts' caches")?;
    }

    let config = ReclaimConfig {
        dry_run: args.dry_run,
        attempts: args.attempts,
        parallel: usize::try_from(args.parallel).context("--parallel is too large")?,
        backoff: Duration::from_millis(args.backoff_ms),
        shutdown_grace: args.grace_secs.map(Duration::from_secs),
    };
    config.validate()?;

    let discovery = discover_targets(&args.discovery.options())?;
    for warning in &discovery.warnings {
        warn!("{warning}");
    }
    let mut warnings = Vec::new();
    let probe = probe_for(args.backend.into(), &mut warnings);
    for warning in &warnings {
        warn!("{warning}");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let controller = CancellationController::new(config.shutdown_grace);
    let report = runtime.block_on(async {
        let listener = controller.spawn_signal_listener();
        let report = run_reclaim(
            &config,
            discovery.targets,
            probe,
            Arc::new(FsEraser),
            &controller,
        )
        .await;
        listener.abort();
        report
    })?;
    // Aborted workers may still sit in a blocking erase call.
    runtime.shutdown_timeout(Duration::from_secs(1));

    let rendered = render_run_report(&report);
    print!("{rendered}");

    if let Some(path) = &args.summary_log {
        append_to(path, &rendered)
            .with_context(|| format!("failed to append summary to {}", path.display()))?;
    }
    if let Some(path) = &args.json {
        let payload =
            serde_json::to_string_pretty(&report).context("failed to serialize run report")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write run report to {}", path.display()))?;
        println!("Run report written to {}", path.display());
    }

    if report.interrupted {
        Ok(ExitCode::from(INTERRUPTED_EXIT_CODE))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn run_discover_command(args: DiscoverArgs) -> Result<()> {
    let listing = DiscoveryListing::from(discover_targets(&args.discovery.options())?);

    if args.json {
        let payload =
            serde_json::to_string_pretty(&listing).context("failed to serialize listing")?;
        println!("{payload}");
        return Ok(());
    }

    if listing.targets.is_empty() {
        println!("No cache directories found.");
    }
    for target in &listing.targets {
        println!(
            "{}\t{}\t{}",
            target.partition,
            target.account,
            target.path.display()
        );
    }
    for warning in &listing.warnings {
        println!("Warning: {warning}");
    }
    Ok(())
}

fn run_doctor_command(args: DoctorArgs) {
    match effective_uid() {
        Some(uid) => println!("Effective uid: {uid}"),
        None => println!("Effective uid: n/a on this platform"),
    }
    match ensure_privileged() {
        Ok(()) => println!("Privilege check: ok"),
        Err(err) => println!("Privilege check: {err}"),
    }

    let disks = Disks::new_with_refreshed_list();
    for root in &args.roots {
        let disk = disks
            .list()
            .iter()
            .filter(|disk| root.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len());
        match disk {
            Some(disk) => println!(
                "- {} on {} [{}]: free={} total={}",
                root.display(),
                disk.mount_point().display(),
                disk.name().to_string_lossy(),
                human_bytes(disk.available_space()),
                human_bytes(disk.total_space())
            ),
            None => println!("- {}: no matching disk detected", root.display()),
        }
    }
}

fn append_to(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())
}

fn init_tracing(error_log: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let file_layer = match error_log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open error log {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::WARN),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    Ok(())
}
