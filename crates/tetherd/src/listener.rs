//! Inbound transports.
//!
//! Every accepted TCP connection swaps identities, runs settlement as
//! responder, and is then held open. When it closes the transport is
//! reported down.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use tether_core::Entry;
use tether_services::{FramedTransport, SharedManager};

/// Upper bound on identity exchange plus settlement for one connection.
pub const SETTLEMENT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TransportListener {
    listener: TcpListener,
    manager: SharedManager,
    transport_type: String,
    shutdown_tx: broadcast::Sender<()>,
}

impl TransportListener {
    pub fn new(
        listener: TcpListener,
        manager: SharedManager,
        transport_type: String,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            listener,
            manager,
            transport_type,
            shutdown_tx,
        }
    }

    pub async fn run(self) -> Result<()> {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("transport listener shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let manager = self.manager.clone();
                    let transport_type = self.transport_type.clone();
                    let shutdown = self.shutdown_tx.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_inbound(stream, peer_addr, manager, transport_type, shutdown).await
                        {
                            tracing::warn!(peer = %peer_addr, error = %e, "inbound transport failed");
                        }
                    });
                }
            }
        }
    }
}

async fn handle_inbound(
    stream: TcpStream,
    peer_addr: SocketAddr,
    manager: SharedManager,
    transport_type: String,
    shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    tracing::debug!(peer = %peer_addr, "inbound connection");
    let settle = async {
        let mut transport =
            FramedTransport::exchange_identities(stream, manager.local_id(), &transport_type)
                .await?;
        let entry = manager.respond(&mut transport).await?;
        anyhow::Ok((transport, entry))
    };
    let (transport, entry) = tokio::time::timeout(SETTLEMENT_TIMEOUT, settle)
        .await
        .context("settlement timed out")??;

    hold_until_closed(transport.into_inner(), manager, entry, shutdown).await;
    Ok(())
}

/// Keep a settled connection open until the peer goes away or the daemon
/// shuts down, then mark the transport down in discovery.
pub(crate) async fn hold_until_closed(
    mut stream: TcpStream,
    manager: SharedManager,
    entry: Entry,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = [0u8; 64];
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            read = stream.read(&mut buf) => match read {
                Ok(0) | Err(_) => break,
                // Nothing is expected after settlement
                Ok(_) => continue,
            },
        }
    }

    tracing::info!(id = %entry.id, "transport down");
    if let Err(e) = manager.set_status(entry.id, false).await {
        tracing::warn!(id = %entry.id, error = %e, "failed to report transport down");
    }
}
