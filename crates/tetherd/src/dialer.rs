//! Outbound transports to configured peers.
//!
//! Each peer is dialed once at startup. A failed dial or handshake is logged
//! and left alone; restarting the daemon tries again.

use anyhow::{bail, Context, Result};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use tether_core::config::PeerConfig;
use tether_core::{sort_pair, NodeId, TransportId};
use tether_services::{FramedTransport, SharedManager, Transport};

use crate::listener::{hold_until_closed, SETTLEMENT_TIMEOUT};

pub struct PeerDialer {
    manager: SharedManager,
    transport_type: String,
    default_public: bool,
    shutdown_tx: broadcast::Sender<()>,
}

impl PeerDialer {
    pub fn new(
        manager: SharedManager,
        transport_type: String,
        default_public: bool,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            manager,
            transport_type,
            default_public,
            shutdown_tx,
        }
    }

    /// Spawn one settlement task per peer.
    pub fn spawn_all(&self, peers: Vec<PeerConfig>) {
        for peer in peers {
            let manager = self.manager.clone();
            let transport_type = self.transport_type.clone();
            let public = peer.public.unwrap_or(self.default_public);
            let shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                if let Err(e) = dial_peer(&peer, manager, transport_type, public, shutdown).await {
                    tracing::warn!(addr = %peer.addr, error = %e, "outbound transport failed");
                }
            });
        }
    }
}

async fn dial_peer(
    peer: &PeerConfig,
    manager: SharedManager,
    transport_type: String,
    public: bool,
    shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let expected: NodeId = peer
        .public_key
        .parse()
        .with_context(|| format!("peer {} has an invalid public_key", peer.addr))?;

    let settle = async {
        let stream = TcpStream::connect(&peer.addr)
            .await
            .with_context(|| format!("failed to connect to {}", peer.addr))?;
        let mut transport =
            FramedTransport::exchange_identities(stream, manager.local_id(), &transport_type)
                .await?;
        if transport.remote_id() != expected {
            bail!(
                "peer at {} presented {} but config expects {}",
                peer.addr,
                transport.remote_id(),
                expected
            );
        }

        let existing_id = known_id(&manager, expected, &transport_type).await;
        let entry = manager
            .initiate(&mut transport, existing_id, public)
            .await?;
        anyhow::Ok((transport, entry))
    };
    let (transport, entry) = tokio::time::timeout(SETTLEMENT_TIMEOUT, settle)
        .await
        .context("settlement timed out")??;

    hold_until_closed(transport.into_inner(), manager, entry, shutdown).await;
    Ok(())
}

/// Id of an entry already settled with `remote` over this transport type,
/// or nil to derive a fresh one.
async fn known_id(manager: &SharedManager, remote: NodeId, transport_type: &str) -> TransportId {
    let edges = sort_pair(manager.local_id(), remote);
    manager
        .entries()
        .await
        .into_iter()
        .find(|e| e.edges == edges && e.transport_type == transport_type)
        .map(|e| e.id)
        .unwrap_or_else(TransportId::nil)
}
