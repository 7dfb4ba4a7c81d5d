#![forbid(unsafe_code)]

//! `devloop` — watch, rebuild, relaunch.
//!
//! Bootstraps configuration, performs an initial pipeline run, then keeps
//! watching the source tree: every settled burst of changes rebuilds the
//! artifact and swaps the running debug session for a fresh one.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use devloop::build::{BuildRequest, Builder};
use devloop::config::GlobalConfig;
use devloop::orchestrator::pipeline::{trigger_channel, PipelineCoordinator};
use devloop::orchestrator::supervisor::SessionSupervisor;
use devloop::watcher::{ChangeWatcher, WatcherSettings};
use devloop::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "devloop",
    about = "Watch sources, rebuild, and relaunch the debug server",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file. Built-in defaults apply when
    /// omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the source root to watch and build from.
    #[arg(long)]
    source_root: Option<PathBuf>,

    /// Override the built artifact destination.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Override the debug server listen address (host:port).
    #[arg(long)]
    listen: Option<String>,

    /// Override the debounce window in milliseconds.
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Force the polling watch backend.
    #[arg(long)]
    poll: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("devloop orchestrator bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;
    info!(
        source_root = %config.source_root.display(),
        output = %config.output_path.display(),
        listen = %config.debug.listen_address,
        "configuration loaded"
    );

    // ── Assemble the pipeline ───────────────────────────
    let ct = CancellationToken::new();
    let builder = Builder::new(BuildRequest::from_config(&config));
    let supervisor = SessionSupervisor::new(config.debug.clone());
    let coordinator = PipelineCoordinator::new(builder, supervisor);

    let (trigger, trigger_rx) = trigger_channel();
    let coordinator_handle = coordinator.spawn(trigger_rx, ct.clone());

    // Initial run so a session exists before the first change arrives.
    info!("performing initial build");
    trigger.fire();

    // ── Start watching ──────────────────────────────────
    let settings = WatcherSettings::from_config(&config);
    let (_watcher, debounce_handle) =
        ChangeWatcher::spawn(&config.source_root, &settings, trigger, ct.clone())?;
    info!("watching for source changes");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = tokio::join!(coordinator_handle, debounce_handle);
    info!("devloop shut down");

    Ok(())
}

/// Apply CLI overrides on top of the loaded configuration. Paths are left
/// raw here; `GlobalConfig::validate` normalizes them afterwards.
fn apply_overrides(config: &mut GlobalConfig, args: &Cli) {
    if let Some(root) = &args.source_root {
        config.source_root.clone_from(root);
    }
    if let Some(output) = &args.output {
        config.output_path.clone_from(output);
    }
    if let Some(listen) = &args.listen {
        config.debug.listen_address.clone_from(listen);
    }
    if let Some(ms) = args.debounce_ms {
        config.watch.debounce_ms = ms;
    }
    if args.poll {
        config.watch.polling = true;
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
