use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use block_scanner::api::start_api_server;
use block_scanner::indexer::reconciler::CatchUpReconciler;
use block_scanner::indexer::supervisor::SubscriptionSupervisor;
use block_scanner::indexer::{AlloyChainReader, ChainReader};
use block_scanner::metrics::Metrics;
use block_scanner::storage::connect_store;
use block_scanner::utils::{init_tracing, load_config};

const CONFIG_PATH_ENV: &str = "SCANNER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path)?;

    init_tracing(&config.log);

    println!();
    info!("=========================== INITIALIZING ===========================");
    info!("Config loaded from {}", config_path);

    // Initialize optional metrics
    let metrics = if config.metrics.enabled {
        Some(Arc::new(Metrics::new(config.network.name.clone())?))
    } else {
        info!("Metrics are disabled");
        None
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(shutdown.clone()));

    if let Some(metrics) = &metrics {
        metrics
            .start_metrics_server(
                &config.metrics.address,
                config.metrics.port,
                shutdown.clone(),
            )
            .await?;
    }

    let store = connect_store(&config.database, metrics.clone())
        .await
        .context("failed to connect to the document store")?;

    let chain: Arc<dyn ChainReader> = Arc::new(
        AlloyChainReader::dial(
            &config.network.url,
            Duration::from_millis(config.network.request_timeout_ms),
            metrics.clone(),
        )
        .await
        .context("failed to dial the chain node")?,
    );

    if config.api.enabled {
        start_api_server(
            store.clone(),
            &config.api.address,
            config.api.port,
            shutdown.clone(),
        )
        .await?;
    } else {
        info!("Read API is disabled");
    }

    let reconciler = CatchUpReconciler::new(
        chain.clone(),
        store,
        config.reconciler.clone(),
        shutdown.clone(),
        metrics.clone(),
    );
    let supervisor = SubscriptionSupervisor::new(
        chain,
        reconciler,
        config.subscription.clone(),
        shutdown.clone(),
        metrics,
    );

    println!();
    info!("========================= STARTING SCANNER =========================");

    if let Err(e) = supervisor.run().await {
        // Keep serving reads until the operator stops the process
        error!("Head notifications stopped: {}", e);
        shutdown.cancelled().await;
    }

    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal, initiating shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating shutdown..."),
    }

    shutdown.cancel();
}
