//! Tether integration test harness.
//!
//! Everything runs in-process: nodes are `Manager`s, transports are either
//! in-memory pipes or real TCP connections on 127.0.0.1, and the registry is
//! either a shared `MemoryDiscovery` or one served over HTTP on an ephemeral
//! port.
//!
//!   cargo test --test integration

mod http_discovery;
mod settlement;
mod tcp;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};

use tether_api::{ApiState, HttpDiscovery};
use tether_core::{Entry, SecretKey, TransportId};
use tether_services::{
    pipe, DiscoveryClient, FramedTransport, Manager, MemoryDiscovery, SettlementError,
};

// ── Harness ───────────────────────────────────────────────────────────────────

pub const TRANSPORT_TYPE: &str = "tcp";

pub type Outcome = (Result<Entry, SettlementError>, Result<Entry, SettlementError>);

/// A node with a fresh identity backed by `discovery`.
pub fn node(discovery: Arc<dyn DiscoveryClient>) -> Arc<Manager> {
    Arc::new(Manager::new(SecretKey::generate(), discovery))
}

/// Settle `a` (initiator) with `b` (responder) over an in-memory pipe.
pub async fn settle_in_memory(
    a: &Manager,
    b: &Manager,
    existing_id: TransportId,
    public: bool,
) -> Outcome {
    let (mut ta, mut tb) = pipe(a.local_id(), b.local_id(), TRANSPORT_TYPE);
    tokio::join!(
        async move { a.initiate(&mut ta, existing_id, public).await },
        async move { b.respond(&mut tb).await },
    )
}

/// Serve a fresh registry on 127.0.0.1 and return it with its API base URL.
pub async fn spawn_registry() -> Result<(MemoryDiscovery, String)> {
    let discovery = MemoryDiscovery::new();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(tether_api::serve_listener(
        listener,
        ApiState::new(discovery.clone()),
    ));
    Ok((discovery, format!("http://{}/api", addr)))
}

pub fn http_client(base_url: &str) -> Result<Arc<dyn DiscoveryClient>> {
    let client = HttpDiscovery::new(base_url).context("failed to build discovery client")?;
    Ok(Arc::new(client))
}

/// Accept one TCP connection and run the responder on it.
pub async fn respond_once(listener: TcpListener, node: Arc<Manager>) -> Result<Entry> {
    let (stream, _) = listener.accept().await?;
    let mut transport =
        FramedTransport::exchange_identities(stream, node.local_id(), TRANSPORT_TYPE).await?;
    Ok(node.respond(&mut transport).await?)
}

/// Dial `addr` and run the initiator on the connection.
pub async fn initiate_to(
    addr: SocketAddr,
    node: Arc<Manager>,
    existing_id: TransportId,
    public: bool,
) -> Result<Entry> {
    let stream = TcpStream::connect(addr).await?;
    let mut transport =
        FramedTransport::exchange_identities(stream, node.local_id(), TRANSPORT_TYPE).await?;
    Ok(node.initiate(&mut transport, existing_id, public).await?)
}
