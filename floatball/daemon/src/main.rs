//! Floatball Daemon - Overlay Coordinator Host
//!
//! Runs the dual-surface overlay coordinator as a standalone process.
//! Presentation clients (the ball and the input panel) connect over a Unix
//! socket, attach to their surface, and exchange channel messages.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! floatball-daemon
//!
//! # Custom socket path
//! floatball-daemon --socket-path /tmp/floatball.sock
//!
//! # Larger client cap, faster drag sampling
//! floatball-daemon --max-connections 8 --drag-interval-ms 8
//!
//! # With config file
//! floatball-daemon --config ~/.config/floatball/overlay.toml
//!
//! # Daemonize (run in background)
//! floatball-daemon --daemonize
//!
//! # Verbose logging, including forwarded client logs
//! RUST_LOG=debug,surface=trace floatball-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod server;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use floatball_core::{default_config_path, load_config_from_path, ConfigOverrides, OverlayConfig};
use server::DaemonServer;

/// Floatball Daemon - hosts the overlay coordinator for presentation clients
#[derive(Parser, Debug)]
#[command(name = "floatball-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Unix socket path for client connections
    #[arg(short = 's', long, value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Maximum concurrent client connections
    #[arg(long, value_name = "N")]
    max_connections: Option<usize>,

    /// Drag sampling interval in milliseconds
    #[arg(long, value_name = "MS")]
    drag_interval_ms: Option<u64>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "FLOATBALL_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run as daemon (fork to background)
    #[arg(short = 'd', long)]
    daemonize: bool,

    /// PID file path (defaults to the socket path with a `.pid` extension)
    #[arg(long, env = "FLOATBALL_PID_FILE", value_name = "PATH")]
    pid_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "FLOATBALL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Resolve configuration: file, then environment, then CLI
fn resolve_config(args: &Args) -> Result<OverlayConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref socket_path) = args.socket_path {
        overrides = overrides.with_socket_path(socket_path.clone());
    }
    if let Some(max) = args.max_connections {
        overrides = overrides.with_max_connections(max);
    }
    if let Some(ms) = args.drag_interval_ms {
        overrides = overrides.with_drag_interval_ms(ms);
    }
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

/// Write PID file
fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create PID directory: {parent:?}"))?;
    }

    let pid = std::process::id();
    let mut file =
        fs::File::create(path).with_context(|| format!("Failed to create PID file: {path:?}"))?;
    writeln!(file, "{pid}")?;

    info!(pid = pid, path = ?path, "PID file created");
    Ok(())
}

/// Remove PID file
fn remove_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, path = ?path, "Failed to remove PID file");
        } else {
            info!(path = ?path, "PID file removed");
        }
    }
}

/// Refuse to start if a live daemon owns the PID file; clear a stale one
fn check_existing_daemon(pid_path: &Path) -> Result<()> {
    if !pid_path.exists() {
        return Ok(());
    }

    let pid_str = fs::read_to_string(pid_path)
        .with_context(|| format!("Failed to read PID file: {pid_path:?}"))?;

    let pid: i32 = pid_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid PID in {pid_path:?}"))?;

    // SAFETY: signal 0 only checks that the process exists.
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        anyhow::bail!(
            "Another floatball-daemon is already running (PID: {pid}). \
             Stop it first or remove {pid_path:?} if it's stale."
        );
    }

    warn!(pid = pid, "Removing stale PID file");
    fs::remove_file(pid_path)?;
    Ok(())
}

/// Initialize logging with the specified level
///
/// Client logs arrive under the `surface` target.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "floatball_daemon={level},floatball_core={level},surface={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Fork to the background
///
/// Must run before the async runtime starts: forking a process with live
/// runtime threads leaves the child with only the forking thread.
fn daemonize() -> Result<()> {
    use nix::unistd::{fork, setsid, ForkResult};

    // SAFETY: single-threaded at this point; the runtime is not built yet.
    match unsafe { fork() }.context("First fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().context("setsid failed")?;

    // Second fork so the daemon can never reacquire a controlling terminal
    // SAFETY: still single-threaded.
    match unsafe { fork() }.context("Second fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Floatball daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args)?;
    let pid_path = args
        .pid_file
        .clone()
        .unwrap_or_else(|| config.socket_path.with_extension("pid"));

    info!(
        socket_path = ?config.socket_path,
        pid_path = ?pid_path,
        config_source = %config.source(),
        config_file = ?config.config_file_path,
        "Configuration resolved"
    );

    check_existing_daemon(&pid_path)?;

    if args.daemonize {
        info!("Daemonizing...");
        daemonize()?;
        info!("Daemonized, new PID: {}", std::process::id());
    }

    write_pid_file(&pid_path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;
    let result = runtime.block_on(serve(&config));

    info!("Shutting down...");
    remove_pid_file(&pid_path);

    if config.socket_path.exists() {
        if let Err(e) = fs::remove_file(&config.socket_path) {
            warn!(error = %e, "Failed to remove socket file");
        }
    }

    match result {
        Ok(()) => {
            info!("Floatball daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}

async fn serve(config: &OverlayConfig) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    let shutdown_clone = Arc::clone(&shutdown);
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
        }
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    let mut server = DaemonServer::new(config);
    server.run(shutdown).await
}
