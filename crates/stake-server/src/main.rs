//! stake-server: HTTP service ranking the highest stakes per bet offer.
//!
//! Usage:
//!   stake-server [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>         Config file path (default: config/server.toml)
//!   --host <HOST>               Interface to bind (overrides config)
//!   -p, --port <PORT>           Port to bind (overrides config)
//!   -l, --log-level <LEVEL>     Log level (overrides config)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use stake_server::api;
use stake_server::config::ServerConfig;
use stake_server::session::SessionSweeper;
use stake_server::state::AppState;

/// CLI arguments for stake-server.
#[derive(Parser, Debug)]
#[command(name = "stake-server")]
#[command(about = "HTTP service ranking the highest stakes per bet offer")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/server.toml")]
    config: PathBuf,

    /// Interface to bind (overrides config file)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // Load environment variables from .env file (if present)
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    let args = Args::parse();

    let config_found = args.config.exists();
    let mut config = if config_found {
        ServerConfig::from_file(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    } else {
        ServerConfig::default()
    };

    config.apply_env_overrides();
    config.apply_cli_overrides(args.host, args.port, args.log_level);

    init_logging(&config.log_level)?;

    if !config_found {
        warn!("Config file not found at {:?}, using defaults", args.config);
    }

    config.validate().context("Configuration validation failed")?;

    info!("Starting stake-server");
    info!(
        capacity = config.leaderboard.capacity,
        top_limit = config.leaderboard.top_limit,
        locking = %config.leaderboard.locking,
        session_timeout_secs = config.session.timeout.as_secs(),
        "Configuration loaded"
    );

    let state = Arc::new(AppState::from_config(&config)?);
    let sweeper = SessionSweeper::spawn(Arc::clone(&state.sessions), config.session.sweep_interval);

    let addr = config.http.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let result = api::serve(listener, Arc::clone(&state), shutdown_signal()).await;

    info!("Shutting down session sweeper...");
    sweeper.shutdown().await;

    let metrics = state.metrics.snapshot();
    info!(
        sessions = metrics.sessions_requested,
        stakes = metrics.stakes_submitted,
        queries = metrics.queries_served,
        "stake-server stopped"
    );

    result
}

fn init_logging(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(e) => {
            // Without a signal handler, run until the process is killed.
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
