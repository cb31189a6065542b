//! rendezvousd: WebSocket rendezvous and signaling daemon.

use anyhow::Result;

use rendezvous_api::ApiState;
use rendezvous_core::config::RendezvousConfig;
use rendezvous_services::{ConnectionManager, HeartbeatMonitor, PeerRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = RendezvousConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RendezvousConfig::default()
    });
    let addr = config.listen_addr();
    tracing::info!(%addr, "rendezvousd starting");

    let registry = PeerRegistry::new();
    let manager = ConnectionManager::new(registry.clone());

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────
    let heartbeat_task = tokio::spawn(
        HeartbeatMonitor::with_defaults(registry.clone()).run(shutdown_tx.subscribe()),
    );

    let server_task = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let state = ApiState::new(manager);
        tokio::spawn(async move {
            let graceful = async move {
                let _ = shutdown_rx.recv().await;
            };
            rendezvous_api::serve(state, addr, graceful).await
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────
    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = heartbeat_task     => tracing::error!("heartbeat monitor exited: {:?}", r),
        r = server_task        => match r {
            Ok(Ok(()))  => tracing::info!("server stopped"),
            Ok(Err(e))  => return Err(e),
            Err(e)      => tracing::error!("server task panicked: {:?}", e),
        },
    }

    let (total, online) = registry.counts().await;
    tracing::info!(total, online, "rendezvousd stopped");
    Ok(())
}
