//! qforge-gen - Content Generation Service
//!
//! Fills topics with multiple-choice tests and flashcards from an external
//! candidate generator, deduplicated by content hash and gated by a corpus
//! audit. Serves an HTTP API with SSE progress on port 5790 by default.

use anyhow::{Context, Result};
use clap::Parser;
use qforge_common::config::{
    default_config_path, load_toml_config, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use qforge_common::events::EventBus;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use qforge_gen::AppState;

const SERVICE_NAME: &str = "qforge-gen";
const DEFAULT_LOG_FILTER: &str = "qforge_gen=info,tower_http=info";
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for qforge-gen
#[derive(Parser, Debug)]
#[command(name = "qforge-gen")]
#[command(about = "Content generation service for qforge")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5790", env = "QFORGE_GEN_PORT")]
    port: u16,

    /// Root folder holding qforge.db
    #[arg(short, long)]
    root_folder: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config load happens before logging exists; a broken file is reported after init
    let (toml_config, toml_error) = match default_config_path(SERVICE_NAME).and_then(|p| load_toml_config(&p)) {
        Ok(config) => (config, None),
        Err(e) => (TomlConfig::default(), Some(e)),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&toml_config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(e) = toml_error {
        warn!("Ignoring config file: {}", e);
    }

    info!("Starting {} (Content Generation) on port {}", SERVICE_NAME, args.port);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new(SERVICE_NAME).resolve(args.root_folder.as_deref(), Some(&toml_config));
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = qforge_gen::db::init_database_pool(&db_path).await?;

    let config = qforge_gen::config::resolve_generation_config(&db_pool, &toml_config).await?;
    let endpoint = qforge_gen::config::resolve_generator_endpoint(&db_pool, &toml_config).await?;
    let generator = qforge_gen::config::build_generator(&endpoint, &config)?;

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let state = AppState::new(db_pool, event_bus, generator, config);
    let tokens = state.cancellation_tokens.clone();
    let app = qforge_gen::build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Active runs see the cancellation at their next batch boundary
    for token in tokens.read().await.values() {
        token.cancel();
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
