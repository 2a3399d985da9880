//! tetherd: Tether transport settlement daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use tether_api::{ApiState, HttpDiscovery};
use tether_core::config::TetherConfig;
use tether_services::{DiscoveryClient, Manager, MemoryDiscovery};

mod dialer;
mod identity;
mod listener;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = TetherConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = TetherConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        TetherConfig::default()
    });

    // Identity
    let secret = identity::load_or_create(&config.identity.secret_key_path)?;
    tracing::info!(node_id = %secret.public(), "identity ready");

    // Discovery: remote registry if configured, otherwise in-process
    let (discovery, embedded): (Arc<dyn DiscoveryClient>, Option<MemoryDiscovery>) =
        if config.discovery.url.is_empty() {
            let memory = MemoryDiscovery::new();
            (Arc::new(memory.clone()), Some(memory))
        } else {
            let remote = HttpDiscovery::new(&config.discovery.url)
                .context("failed to build discovery client")?;
            tracing::info!(url = %config.discovery.url, "using remote discovery");
            (Arc::new(remote), None)
        };

    let serve_port = config.discovery.serve_port;
    match (&embedded, serve_port) {
        (_, 0) => {}
        (Some(memory), port) => {
            let state = ApiState::new(memory.clone());
            tokio::spawn(async move {
                if let Err(e) = tether_api::serve(state, port).await {
                    tracing::error!(error = %e, "discovery API failed");
                }
            });
        }
        (None, port) => {
            tracing::warn!(port, "discovery.serve_port ignored while discovery.url is set");
        }
    }

    let manager = match Manager::bootstrap(secret.clone(), discovery.clone()).await {
        Ok(m) => Arc::new(m),
        Err(e) => {
            tracing::warn!(error = %e, "could not load known transports, starting empty");
            Arc::new(Manager::new(secret, discovery))
        }
    };

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

    let tcp = TcpListener::bind(&config.network.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.network.listen_addr))?;
    tracing::info!(
        addr = %config.network.listen_addr,
        transport_type = %config.network.transport_type,
        "accepting transports"
    );

    let listener_task = tokio::spawn(
        listener::TransportListener::new(
            tcp,
            manager.clone(),
            config.network.transport_type.clone(),
            shutdown_tx.clone(),
        )
        .run(),
    );

    dialer::PeerDialer::new(
        manager.clone(),
        config.network.transport_type.clone(),
        config.settlement.public,
        shutdown_tx.clone(),
    )
    .spawn_all(config.peers.clone());

    let entry_printer = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let entries = manager.entries().await;
                tracing::info!(count = entries.len(), "entry table snapshot");
                for e in entries {
                    tracing::debug!(
                        id = %e.id,
                        public = e.public,
                        transport_type = %e.transport_type,
                        "  entry"
                    );
                }
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = listener_task      => tracing::error!("transport listener exited: {:?}", r),
        r = entry_printer      => tracing::error!("entry printer exited: {:?}", r),
    }

    Ok(())
}
