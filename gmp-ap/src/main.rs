//! GMP Audio Player (gmp-ap) - Main entry point
//!
//! Loads the bootstrap configuration, wires the resolver, transport, search
//! provider and event bus into a `PlaybackEngine`, and serves the HTTP/SSE
//! control interface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gmp_ap::api::{self, AppContext};
use gmp_ap::config::PlayerSettings;
use gmp_ap::playback::{AudioSourceResolver, PlaybackEngine, ResolverStrategy, SessionDeps};
use gmp_ap::playback::resolver::{DirectUrlStrategy, SegmentedStreamStrategy};
use gmp_ap::search::YtDlpSearch;
use gmp_ap::transport::NullSinkTransport;
use gmp_ap::ytdlp::YtDlp;
use gmp_common::config::{resolve_config_path, TomlConfig};
use gmp_common::EventBus;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for gmp-ap
#[derive(Parser, Debug)]
#[command(name = "gmp-ap")]
#[command(about = "Group Music Player playback service")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "GMP_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "GMP_AP_PORT")]
    port: Option<u16>,

    /// Log level (overrides the config file; RUST_LOG wins over both)
    #[arg(long, env = "GMP_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing is up so the configured level applies
    let config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("gmp_ap={level},gmp_common={level},tower_http=debug").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match resolve_config_path(args.config.as_deref()).filter(|p| p.exists()) {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    let port = args.port.unwrap_or(config.port);
    info!("Starting GMP playback service on port {}", port);

    let settings = PlayerSettings::from(&config);
    info!(
        max_resolve_attempts = settings.max_resolve_attempts,
        retry_base_delay_ms = settings.retry_base_delay.as_millis() as u64,
        "Playback settings loaded"
    );

    let ytdlp = YtDlp::from_config(&config.ytdlp);
    let strategies: Vec<Arc<dyn ResolverStrategy>> = vec![
        Arc::new(DirectUrlStrategy::new(ytdlp.clone())),
        Arc::new(SegmentedStreamStrategy::new(ytdlp)),
    ];
    let resolver = AudioSourceResolver::new(strategies, settings.resolve_attempt_timeout);
    info!(strategies = ?resolver.strategy_names(), "Resolver initialized");

    let event_bus = EventBus::new(config.playback.event_bus_capacity);

    let deps = SessionDeps {
        resolver: Arc::new(resolver),
        transport: Arc::new(NullSinkTransport::default()),
        publisher: Arc::new(event_bus.clone()),
        settings,
    };
    let engine = Arc::new(PlaybackEngine::new(
        deps,
        Arc::new(YtDlpSearch::new(&config.ytdlp)),
    ));
    info!("Playback engine initialized");

    let ctx = AppContext { engine, event_bus };

    api::run(&config.bind_address, port, ctx, shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
