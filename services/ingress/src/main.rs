//! mcgate
//!
//! Transparent TCP proxy that routes block-game clients by the hostname in
//! their login handshake.
//!
//! This service:
//! - Loads hostname routes from a JSON file and reloads it on change
//! - Accepts TCP connections on one listener
//! - Sniffs the handshake to learn the requested hostname
//! - Bridges the client to the matching backend, replaying the sniffed bytes
//! - Sends a disconnect frame to clients it cannot route

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use mcgate_ingress::config::Config;
use mcgate_ingress::routes::JsonFileSource;
use mcgate_ingress::{logging, watcher, Gateway};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    logging::init(config.effective_log_level(), config.log_format);

    info!("Starting mcgate");
    info!(
        listen = %config.listen,
        routes = %config.routes.display(),
        watch = config.watch,
        reject_mode = ?config.reject_mode,
        max_connections = config.max_connections,
        "Configuration loaded"
    );

    let source = Arc::new(JsonFileSource::new(config.routes.clone()));
    let gateway = Arc::new(Gateway::start(config.listener_config(), source).await?);

    info!(
        generation = gateway.routes().generation(),
        routes = gateway.routes().snapshot().len(),
        "Routing table loaded"
    );

    let reload_task = config.watch.then(|| {
        let gateway = Arc::clone(&gateway);
        watcher::spawn_route_watcher(config.routes.clone(), move || {
            // Failures are logged by the routing table; the old generation stays.
            let _ = gateway.reload();
        })
    });

    {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            gateway.shutdown();
        });
    }

    let result = gateway.serve().await;

    if let Some(handle) = reload_task {
        handle.abort();
    }

    match result {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Listener error");
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
