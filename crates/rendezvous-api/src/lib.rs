//! rendezvous-api: WebSocket endpoint and read-only monitoring surface.
//!
//! Peers and monitors share one listener: `/` and `/ws` upgrade to a peer
//! session, everything else is plain JSON over HTTP.

pub mod handlers;
pub mod ws;

use std::future::Future;
use std::net::SocketAddr;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(ws::handle_upgrade))
        .route("/ws", get(ws::handle_upgrade))
        .route("/status", get(handlers::handle_status))
        .route("/peers", get(handlers::handle_peers))
        .route("/health", get(handlers::handle_health))
        .with_state(state)
        .layer(cors)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    state: ApiState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve_listener(state, listener, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_listener(
    state: ApiState,
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let local = listener.local_addr().context("listener has no local address")?;
    tracing::info!(addr = %local, "rendezvous listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("server error")?;
    Ok(())
}
