#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use pixelcanvas::{Canvas, MemoryBroker, MemoryStore, SystemClock, TimeSource};
use server::config::{CliArgs, ServerConfig};
use server::pump::{provision_topics, spawn_pumps};
use server::service::handler::{AppState, router};
use server::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let clock: Arc<dyn TimeSource> = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::new(
        &config.project_id,
        &config.database,
        Arc::clone(&clock),
    ));
    let broker = Arc::new(MemoryBroker::new(Arc::clone(&clock)));
    provision_topics(&broker, &config.canvas);

    let canvas = Canvas::new(config.canvas.clone(), store.clone(), broker.clone(), clock)?;

    let shutdown = CancellationToken::new();
    let mut pumps = if config.pumps {
        spawn_pumps(&canvas, &store, &broker, &shutdown)?
    } else {
        JoinSet::new()
    };

    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config.server_addr, &config);

    axum::serve(listener, router(AppState::new(canvas, broker)))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // The signal already cancelled the token; this covers serve errors.
    shutdown.cancel();
    while let Some(joined) = pumps.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Pump task failed: {e}");
        }
    }

    tracing::info!("Service shut down successfully");
    providers.shutdown();
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting canvas service on {} with full config: {:#?}",
            addr,
            config
        );
    } else {
        tracing::info!(
            "Starting canvas service on {} (chunk size {}, cooldown {}, pumps {})",
            addr,
            config.canvas.chunk_size,
            humantime::format_duration(config.canvas.cooldown),
            if config.pumps { "on" } else { "off" }
        );
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                core::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = core::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            core::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    shutdown.cancel();
}
