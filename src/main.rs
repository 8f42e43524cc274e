#![forbid(unsafe_code)]

//! `boxwatch`: watches an item in a box through a device camera.
//!
//! Bootstraps configuration and credentials, wires the monitor capture,
//! vision analyzer, history store, and chat notifier into the poller, and
//! runs it until SIGINT/SIGTERM (or once, with `--once`).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use boxwatch::analysis::openai::OpenAiAnalyzer;
use boxwatch::capture::MonitorCapture;
use boxwatch::config::GlobalConfig;
use boxwatch::history::JsonFileStore;
use boxwatch::notify::{DisabledNotifier, MattermostNotifier, Notifier};
use boxwatch::orchestrator::{IterationOutcome, Poller, PollerSettings};
use boxwatch::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "boxwatch", about = "Camera-based item change watcher", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Run a single iteration and exit.
    #[arg(long)]
    once: bool,

    /// Override the capture timeout, in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Override the change-detection threshold (Hamming distance).
    #[arg(long)]
    threshold: Option<u32>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("boxwatch bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(timeout) = args.timeout {
        config.monitor.capture_timeout_seconds = timeout;
    }
    if let Some(threshold) = args.threshold {
        config.detector.threshold = threshold;
    }
    config.validate()?;

    config.load_credentials().await?;
    info!(
        timeout_seconds = config.monitor.capture_timeout_seconds,
        threshold = config.detector.threshold,
        "configuration loaded"
    );

    // ── Wire collaborators ──────────────────────────────
    let capture = Arc::new(MonitorCapture::from_config(&config));
    let analyzer = Arc::new(OpenAiAnalyzer::new(config.analysis.clone())?);
    let notifier: Arc<dyn Notifier> = if config.notify.enabled {
        Arc::new(MattermostNotifier::new(&config.notify)?)
    } else {
        info!("notifications disabled; running in log-only mode");
        Arc::new(DisabledNotifier)
    };
    let store = Arc::new(JsonFileStore::new(config.history_path.clone()));
    info!(path = %store.path().display(), "history store ready");

    let poller = Arc::new(Poller::new(
        capture,
        analyzer,
        notifier,
        store,
        PollerSettings::from(&config),
    ));

    if args.once {
        let outcome = Arc::clone(&poller).run_once().await;
        info!(?outcome, "single iteration finished");
        return match outcome {
            IterationOutcome::Skipped(err) => Err(err),
            IterationOutcome::Panicked(msg) => Err(AppError::Io(format!("iteration panicked: {msg}"))),
            _ => Ok(()),
        };
    }

    // ── Run until a shutdown signal ─────────────────────
    let ct = CancellationToken::new();
    let poller_handle = tokio::spawn(Arc::clone(&poller).run(ct.clone()));
    info!("poller started");

    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    if let Err(err) = poller_handle.await {
        warn!(%err, "poller task ended abnormally");
    }
    info!("boxwatch shut down");

    Ok(())
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
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
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
