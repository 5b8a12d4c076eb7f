use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parkslot::cli::{self, Cli, Commands};
use parkslot::config::Config;
use parkslot::ledger::SlotCatalogue;
use parkslot::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --log-level is folded into config.logging.level here
    let config = cli.load_config()?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(_) => cli::run_command(&cli, &config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting parkslot v{}", env!("CARGO_PKG_VERSION"));

    let db = parkslot::db::init(&config.server.data_dir).await?;
    let metrics_handle = parkslot::api::metrics::init_metrics()?;

    let state = Arc::new(
        AppState::new(config.clone(), db.clone(), SlotCatalogue::standard())
            .with_metrics(metrics_handle),
    );

    if let Some(offset) = config.clock.offset_label() {
        tracing::info!(offset = %offset, "Using fixed lot clock offset");
    }

    parkslot::engine::spawn_cleanup_task(db.clone(), config.cleanup.clone());
    if config.rate_limit.enabled {
        parkslot::api::rate_limit::spawn_cleanup_task(
            state.rate_limiter.clone(),
            config.rate_limit.cleanup_interval,
        );
    }

    let app = parkslot::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
