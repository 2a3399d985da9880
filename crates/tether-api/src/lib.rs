//! tether-api: the discovery registry over HTTP.
//!
//! `serve` exposes a `MemoryDiscovery` under `/api`; `HttpDiscovery` is the
//! matching `DiscoveryClient` nodes use to reach a remote registry.

pub mod client;
pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use client::HttpDiscovery;
pub use handlers::{ApiState, ErrorBody, ErrorKind};

/// Build the registry router. Routes are nested under `/api`.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/transports", post(handlers::handle_register))
        .route("/statuses", post(handlers::handle_statuses))
        .route("/transports/id/{id}", get(handlers::handle_get_by_id))
        .route("/transports/edge/{node_id}", get(handlers::handle_get_by_edge))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!(port, "discovery API listening on 0.0.0.0");
    serve_listener(listener, state).await
}

/// Serve on an already bound listener. Tests bind port 0 and read it back.
pub async fn serve_listener(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}
