//! tracesnoop - runs your shell and forwards Python tracebacks to a panel.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;
use tracesnoop_core::{PtyLauncher, SessionEvent};
use tracesnoop_server::{config, logging, routes, state, terminal};

use config::Config;
use logging::{LogConfig, LogFormat};
use state::AppState;

/// Run a shell and snoop its output for tracebacks.
#[derive(Parser, Debug)]
#[command(name = "tracesnoop")]
#[command(about = "Run a shell and forward tracebacks to a debugging panel")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override panel hub port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the shell to run
    #[arg(short, long)]
    shell: Option<String>,

    /// Enable verbose logging (extracted tracebacks and matched commands)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (includes every PTY chunk)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g. "snooper=debug").
    /// Targets are prefixed with "tracesnoop::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(shell) = cli.shell {
        config.shell = shell;
    }

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config, &config.log_file)
        .with_context(|| format!("Failed to open log file {}", config.log_file.display()))?;

    tracing::info!(
        target: "tracesnoop::startup",
        "Loaded configuration (shell: {}, port: {})",
        config.shell,
        config.port
    );

    let (rows, cols) = terminal::window_size().unwrap_or((24, 80));
    let launcher = PtyLauncher::new(config.session_options(rows, cols), || {
        Box::new(std::io::stdout())
    });
    let state = Arc::new(AppState::new(config.clone(), launcher));

    let api_routes = Router::new()
        .route("/health", get(routes::health))
        .route("/session", get(routes::session));
    let ws_routes = Router::new().route("/events", get(routes::ws::events));

    let app = Router::new()
        .nest("/api", api_routes)
        .nest("/ws", ws_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind panel hub to {}", addr))?;
    tracing::info!(target: "tracesnoop::startup", "Panel hub listening on {}", addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(target: "tracesnoop::startup", "Panel hub stopped: {}", e);
        }
    });

    let mut events = state.registry.subscribe();
    state.dispatcher.clone().spawn(state.registry.subscribe());

    let session_id = state.registry.open().await?;

    let exit_code = {
        let _raw_mode = terminal::RawModeGuard::enable()?;
        let (input_tx, mut input_rx) = mpsc::unbounded_channel();
        terminal::spawn_stdin_reader(input_tx);
        let mut resized = signal(SignalKind::window_change())?;

        loop {
            tokio::select! {
                Some(data) = input_rx.recv() => {
                    if let Err(e) = state.registry.send_input(&data).await {
                        tracing::warn!(target: "tracesnoop::session", "Dropped input: {}", e);
                    }
                }
                Some(()) = resized.recv() => {
                    if let Some((rows, cols)) = terminal::window_size() {
                        if let Err(e) = state.registry.resize(rows, cols).await {
                            tracing::debug!(target: "tracesnoop::session", "Resize failed: {}", e);
                        }
                    }
                }
                event = events.recv() => match event {
                    Ok(SessionEvent::Exited { session_id: id, exit_code }) if id == session_id => {
                        break exit_code;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break None,
                }
            }
        }
    };

    state.registry.reap(session_id).await;
    tracing::info!(target: "tracesnoop::startup", "Shell exited with code {:?}", exit_code);

    let code = exit_code.map_or(0, |c| u8::try_from(c).unwrap_or(1));
    Ok(ExitCode::from(code))
}
