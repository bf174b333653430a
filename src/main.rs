// SPDX-License-Identifier: MIT

use clap::builder::ArgGroup;
use clap::Parser;
use pdns_migrate::batch::{BatchDriver, BatchOptions, BatchReport, OnError};
use pdns_migrate::client::PowerDnsClient;
use pdns_migrate::config::{read_zones_file, ConnectionConfig, DEFAULT_SERVER_ID};
use pdns_migrate::errors::MigrateError;
use pdns_migrate::migrator::{MigrateOptions, ZoneMigrator};
use pdns_migrate::retry::RetryPolicy;
use pdns_migrate::sanitize::SanitizeOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Every zone succeeded (or was already in sync).
const EXIT_OK: u8 = 0;

/// One or more zones failed under the `continue` policy.
const EXIT_ZONE_FAILURES: u8 = 1;

/// The batch stopped early under the `stop` policy.
const EXIT_STOPPED: u8 = 2;

/// An interrupt cancelled the run and the grace period expired.
const EXIT_CANCELLED: u8 = 3;

/// Invalid command line or configuration.
const EXIT_USAGE: u8 = 64;

/// Migrate authoritative DNS zones between two PowerDNS servers.
#[derive(Parser, Debug)]
#[command(name = "pdns-migrate")]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("zones_input").required(true)))]
struct Args {
    /// Source PowerDNS API base URL, e.g. https://pdns:8081
    #[arg(long)]
    source_url: String,

    /// API key for the source server
    #[arg(long)]
    source_key: String,

    /// Source server id
    #[arg(long, default_value = DEFAULT_SERVER_ID)]
    source_server_id: String,

    /// Target PowerDNS API base URL
    #[arg(long)]
    target_url: String,

    /// API key for the target server
    #[arg(long)]
    target_key: String,

    /// Target server id
    #[arg(long, default_value = DEFAULT_SERVER_ID)]
    target_server_id: String,

    /// Zone name (with or without trailing dot)
    #[arg(long, group = "zones_input")]
    zone: Option<String>,

    /// File with zone names, one per line; blank lines and '#' comments
    /// are skipped
    #[arg(long, group = "zones_input")]
    zones_file: Option<PathBuf>,

    /// Delete and recreate the zone if it already differs on the target
    #[arg(long)]
    recreate: bool,

    /// Fetch and compare, but do not write to the target
    #[arg(long)]
    dry_run: bool,

    /// Do not verify TLS for the source server
    #[arg(long)]
    insecure_source: bool,

    /// Do not verify TLS for the target server
    #[arg(long)]
    insecure_target: bool,

    /// HTTP timeout per attempt, in seconds
    #[arg(long, default_value_t = 10.0)]
    timeout: f64,

    /// Retry count for transient API errors
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Base backoff seconds between retries
    #[arg(long, default_value_t = 0.5)]
    retry_backoff: f64,

    /// Maximum backoff seconds between retries
    #[arg(long, default_value_t = 5.0)]
    retry_max_backoff: f64,

    /// Maximum random jitter seconds added to each backoff
    #[arg(long, default_value_t = 0.1)]
    retry_jitter: f64,

    /// Ignore SOA serial differences when comparing zones
    #[arg(long)]
    ignore_soa_serial: bool,

    /// Resolve CNAME conflicts automatically (apex keeps the others,
    /// elsewhere the CNAME wins)
    #[arg(long)]
    auto_fix_cname_conflicts: bool,

    /// Trim multi-record CNAME record sets to their first record
    #[arg(long)]
    auto_fix_double_cname_conflicts: bool,

    /// Normalize backslash escapes in TXT/SPF records before comparing
    #[arg(long)]
    normalize_txt_escapes: bool,

    /// Batch behavior when a zone fails
    #[arg(long, value_enum, default_value_t = OnError::Continue)]
    on_error: OnError,

    /// Parallel zone migrations
    #[arg(long, default_value_t = 10)]
    concurrency: usize,

    /// Seconds to wait after a stop for in-flight zones to finish
    /// (0 = wait indefinitely)
    #[arg(long, default_value_t = 0.0)]
    graceful_timeout: f64,

    /// Progress log interval in seconds for batch runs (0 = disable)
    #[arg(long, default_value_t = 30.0)]
    progress_interval: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Enable debug logging (alias for --log-level debug)
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            use clap::error::ErrorKind;
            let code = if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                EXIT_OK
            } else {
                EXIT_USAGE
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    initialize_logging(&args);

    // Zone pipelines are pure I/O multiplexing; they share one thread.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to build Tokio runtime: {e}");
            return ExitCode::from(EXIT_ZONE_FAILURES);
        }
    };

    ExitCode::from(runtime.block_on(run(args)))
}

/// Initialize logging with custom format.
///
/// Respects `RUST_LOG` if set, otherwise uses `--log-level` /
/// `--verbose`, defaulting to INFO.
fn initialize_logging(args: &Args) {
    let default_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| if args.verbose { "debug".into() } else { "info".into() });

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

async fn run(args: Args) -> u8 {
    match try_run(args).await {
        Ok(code) => code,
        Err(e @ MigrateError::Config(_)) => {
            error!("{e}");
            EXIT_USAGE
        }
        Err(e) => {
            error!("{e}");
            EXIT_ZONE_FAILURES
        }
    }
}

async fn try_run(args: Args) -> Result<u8, MigrateError> {
    validate_args(&args)?;

    let zones = match (&args.zone, &args.zones_file) {
        (Some(zone), None) => vec![zone.clone()],
        (None, Some(path)) => read_zones_file(path)?,
        _ => unreachable!("clap enforces exactly one zone input"),
    };

    let retry = RetryPolicy {
        retries: args.retries,
        backoff: Duration::from_secs_f64(args.retry_backoff),
        max_backoff: Duration::from_secs_f64(args.retry_max_backoff),
        jitter: Duration::from_secs_f64(args.retry_jitter),
    };
    let timeout = Duration::from_secs_f64(args.timeout);

    let source = ConnectionConfig {
        base_url: args.source_url.clone(),
        api_key: args.source_key.clone(),
        server_id: args.source_server_id.clone(),
        verify_tls: !args.insecure_source,
        timeout,
        retry,
    };
    let target = ConnectionConfig {
        base_url: args.target_url.clone(),
        api_key: args.target_key.clone(),
        server_id: args.target_server_id.clone(),
        verify_tls: !args.insecure_target,
        timeout,
        retry,
    };

    let cancel = CancellationToken::new();
    let forced = CancellationToken::new();
    spawn_signal_handler(cancel.clone(), forced.clone());

    let source_client = Arc::new(PowerDnsClient::new(source, cancel.clone())?);
    let target_client = Arc::new(PowerDnsClient::new(target, cancel.clone())?);

    let migrator = Arc::new(ZoneMigrator::new(
        source_client,
        target_client,
        MigrateOptions {
            recreate: args.recreate,
            dry_run: args.dry_run,
            ignore_soa_serial: args.ignore_soa_serial,
            sanitize: SanitizeOptions {
                normalize_txt_escapes: args.normalize_txt_escapes,
                auto_fix_cname_conflicts: args.auto_fix_cname_conflicts,
                auto_fix_double_cname_conflicts: args.auto_fix_double_cname_conflicts,
            },
        },
    ));

    let driver = BatchDriver::new(
        migrator,
        BatchOptions {
            concurrency: args.concurrency,
            on_error: args.on_error,
            progress_interval: Duration::from_secs_f64(args.progress_interval),
            graceful_timeout: Duration::from_secs_f64(args.graceful_timeout),
        },
    );

    info!(
        zones = zones.len(),
        concurrency = args.concurrency,
        dry_run = args.dry_run,
        recreate = args.recreate,
        "Starting zone migration"
    );

    let report = driver.run(zones, &cancel, &forced).await;
    log_summary(&report);
    Ok(exit_code_for(&report))
}

/// Pre-flight checks clap cannot express.
fn validate_args(args: &Args) -> Result<(), MigrateError> {
    if args.concurrency == 0 {
        return Err(MigrateError::Config("--concurrency must be at least 1".into()));
    }
    if args.timeout <= 0.0 {
        return Err(MigrateError::Config("--timeout must be positive".into()));
    }
    for (name, value) in [
        ("--retry-backoff", args.retry_backoff),
        ("--retry-max-backoff", args.retry_max_backoff),
        ("--retry-jitter", args.retry_jitter),
        ("--graceful-timeout", args.graceful_timeout),
        ("--progress-interval", args.progress_interval),
    ] {
        if value < 0.0 {
            return Err(MigrateError::Config(format!("{name} must not be negative")));
        }
    }
    Ok(())
}

/// First SIGINT/SIGTERM requests a graceful stop; a second interrupt
/// forces immediate abandonment.
fn spawn_signal_handler(cancel: CancellationToken, forced: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("Cannot install SIGTERM handler: {e}");
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Received SIGINT; stopping gracefully (interrupt again to abort)");
            }
            _ = sigterm.recv() => {
                warn!("Received SIGTERM; stopping gracefully");
            }
        }
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt; abandoning in-flight zones");
            forced.cancel();
        }
    });
}

fn log_summary(report: &BatchReport) {
    info!(
        total = report.results.len(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        elapsed = ?report.elapsed,
        "Batch complete"
    );
    for (action, count) in report.action_totals() {
        info!(action = action, zones = count, "Zones by action");
    }
    for (kind, count) in report.error_totals() {
        warn!(kind = kind, zones = count, "Failures by error kind");
    }
}

fn exit_code_for(report: &BatchReport) -> u8 {
    if report.interrupted && report.grace_expired {
        EXIT_CANCELLED
    } else if report.stopped_by_policy {
        EXIT_STOPPED
    } else if report.all_succeeded() {
        EXIT_OK
    } else {
        EXIT_ZONE_FAILURES
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod main_tests;
