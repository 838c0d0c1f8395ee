//! Tubewatch server - main entry point

use anyhow::Result;
use std::{net::SocketAddr, time::Duration};
use tokio::signal;
use tracing::{error, info};
use tubewatch_common::logging::{init_logging, LogConfig};

use tubewatch_server::{
    api,
    config::Config,
    db,
    ingest::{IngestConfig, IngestOrchestrator, ScheduleError},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env().unwrap_or_else(|_| {
        LogConfig::builder()
            .log_file_prefix("tubewatch-server".to_string())
            .filter_directives(
                "tubewatch_server=debug,tower_http=debug,lapin=warn,sqlx=warn".to_string(),
            )
            .build()
    });
    init_logging(&log_config)?;

    info!("Starting Tubewatch server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let ingest_config = IngestConfig::from_env()?;
    let mut ingest = if ingest_config.enabled {
        info!(?ingest_config, "Ingestion is enabled, starting pipeline");
        let handles = IngestOrchestrator::new(ingest_config, pool.clone())
            .start()
            .await?;
        Some(handles)
    } else {
        info!("Ingestion is disabled (INGEST_ENABLED=false)");
        None
    };

    if let Some(scheduler) = ingest.as_mut().and_then(|h| h.take_scheduler()) {
        tokio::spawn(watch_scheduler(scheduler));
    }

    let app = api::create_router(pool.clone(), &config);

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    if let Some(handles) = ingest {
        handles.shutdown().await;
    }
    pool.close().await;

    info!("Server shut down gracefully");

    Ok(())
}

/// Exit the process when the scheduler stops on a fatal error.
async fn watch_scheduler(scheduler: tokio::task::JoinHandle<Result<(), ScheduleError>>) {
    match scheduler.await {
        Ok(Ok(())) => info!("Fetch scheduler finished"),
        Ok(Err(e)) => {
            error!(error = %e, "Fetch scheduler stopped, exiting");
            std::process::exit(1);
        },
        Err(e) if e.is_cancelled() => {},
        Err(e) => {
            error!(error = %e, "Fetch scheduler panicked, exiting");
            std::process::exit(1);
        },
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
