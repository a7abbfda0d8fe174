use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

use task_dispatch::api;
use task_dispatch::config::{LogConfig, PoolConfig, ServerConfig};
use task_dispatch::error::TransportError;
use task_dispatch::logging;
use task_dispatch::pool::Coordinator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_config = LogConfig::from_env().context("invalid log configuration")?;
    let _log_guard = logging::init(&log_config).context("failed to initialise logging")?;

    let pool_config = PoolConfig::from_env().context("invalid pool configuration")?;
    let server_config = ServerConfig::from_env().context("invalid server configuration")?;

    eprintln!("⚙️  Task Dispatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Workers: {}", pool_config.num_workers);
    eprintln!("   HTTP: http://{}", server_config.bind_addr);
    eprintln!("   Events: ws://{}/ws/events", server_config.bind_addr);
    eprintln!("   Logs: {}\n", log_config.dir.display());

    // ── Worker pool ─────────────────────────────────────────────────────
    let coordinator = Coordinator::start(pool_config)?;

    // ── HTTP server ─────────────────────────────────────────────────────
    let app = api::router(Arc::clone(&coordinator));
    let listener = TcpListener::bind(&server_config.bind_addr)
        .await
        .map_err(|source| TransportError::Bind {
            addr: server_config.bind_addr.clone(),
            source,
        })?;
    info!(addr = %server_config.bind_addr, "HTTP server listening");

    let (drain_tx, drain_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = drain_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            // The server ended without a shutdown request.
            coordinator.stop().await;
            result
                .context("HTTP server task panicked")?
                .map_err(TransportError::Serve)?;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        }
    }

    info!("Shutting down server...");
    let _ = drain_tx.send(());
    coordinator.stop().await;

    let drained = tokio::time::timeout(server_config.shutdown_timeout, async {
        let served = server.await;
        coordinator.join().await;
        served
    })
    .await;

    match drained {
        Ok(served) => {
            served
                .context("HTTP server task panicked")?
                .map_err(TransportError::Serve)?;
            info!("Server stopped gracefully");
            Ok(())
        }
        Err(_) => {
            let timeout_secs = server_config.shutdown_timeout.as_secs();
            error!(timeout_secs, "Graceful shutdown timed out");
            Err(TransportError::ShutdownTimeout { timeout_secs }.into())
        }
    }
}
