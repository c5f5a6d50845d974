use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use teleop_relay::config::ConfigStore;
use teleop_relay::events::StatusBus;
use teleop_relay::state::AppState;
use teleop_relay::teleop::{LoopbackRobot, NullSolver, TeleopController};
use teleop_relay::utils::parse_bind_addr;
use teleop_relay::video::{source_from_config, spawn_capture, CaptureHandle, VideoSinks};
use teleop_relay::web;
use teleop_relay::webrtc::{SessionManager, WebRtcService};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// teleop-relay command line arguments
#[derive(Parser, Debug)]
#[command(name = "teleop-relay")]
#[command(version, about = "Camera relay and teleoperation bridge over WebRTC", long_about = None)]
struct CliArgs {
    /// Listen address (overrides config file)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config file)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// TOML configuration file (defaults apply when omitted)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the operator UI (overrides config file)
    #[arg(short = 's', long, value_name = "DIR")]
    static_dir: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting teleop-relay v{}", env!("CARGO_PKG_VERSION"));

    // Config file first, then CLI overrides
    let config_store = ConfigStore::load(args.config.as_deref()).await?;
    config_store.update(|config| {
        if let Some(address) = args.address.clone() {
            config.web.bind_address = address;
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(dir) = &args.static_dir {
            config.web.static_dir = dir.to_string_lossy().to_string();
        }
    })?;
    let config = config_store.get();

    let status = StatusBus::new();
    let sinks = Arc::new(VideoSinks::new());

    // No hardware robot is linked into this binary; the loopback robot lets
    // the operator UI be exercised end to end on a bench.
    let controller = TeleopController::spawn(
        Arc::new(LoopbackRobot::new()),
        Arc::new(NullSolver),
        status.clone(),
        config.teleop.clone(),
    );
    tracing::warn!("No pose solver linked, hand observations will report markers not visible");

    let manager = Arc::new(SessionManager::new(
        controller.clone(),
        sinks.clone(),
        status.clone(),
    ));
    let webrtc = Arc::new(WebRtcService::new(manager, &config));

    // One capture thread per configured camera
    let mut captures: Vec<CaptureHandle> = Vec::new();
    for capture in &config.video.streams {
        let Some(source) = source_from_config(capture) else {
            tracing::info!("Capture for {} disabled", capture.stream);
            continue;
        };
        tracing::info!("Capturing {} from {}", capture.stream, source.describe());
        match spawn_capture(capture.stream, source, sinks.clone(), status.clone()) {
            Ok(handle) => captures.push(handle),
            Err(e) => tracing::error!("Failed to start capture for {}: {}", capture.stream, e),
        }
    }

    let state = AppState::new(config_store.clone(), webrtc, controller, status);
    let app = web::create_router(state, &PathBuf::from(&config.web.static_dir));

    let addr = parse_bind_addr(&config.web.bind_address, config.web.port)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting HTTP server on {}", listener.local_addr()?);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install CTRL+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
    {
        tracing::error!("HTTP server error: {}", e);
    }

    cleanup(captures).await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "teleop_relay=error,tower_http=error,webrtc=error",
        LogLevel::Warn => "teleop_relay=warn,tower_http=warn,webrtc=warn",
        LogLevel::Info => "teleop_relay=info,tower_http=info,webrtc=warn",
        LogLevel::Verbose => "teleop_relay=debug,tower_http=info,webrtc=warn",
        LogLevel::Debug => "teleop_relay=debug,tower_http=debug,webrtc=info",
        LogLevel::Trace => "teleop_relay=trace,tower_http=debug,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Stop capture threads; each exits after at most one capture timeout
async fn cleanup(captures: Vec<CaptureHandle>) {
    for handle in &captures {
        handle.stop();
    }
    let joined = tokio::task::spawn_blocking(move || {
        for handle in captures {
            handle.join();
        }
    })
    .await;
    if let Err(e) = joined {
        tracing::warn!("Failed to join capture threads: {}", e);
    }
}
