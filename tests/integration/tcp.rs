use crate::*;

use tether_services::{Transport, TransportError};
use uuid::Uuid;

#[tokio::test]
async fn test_settlement_over_tcp() -> Result<()> {
    let (registry, url) = spawn_registry().await?;
    let a = node(http_client(&url)?);
    let b = node(http_client(&url)?);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let responder = tokio::spawn(respond_once(listener, b.clone()));

    let ea = initiate_to(addr, a.clone(), Uuid::nil(), true).await?;
    let eb = responder.await??;

    assert_eq!(ea, eb);
    assert_eq!(a.entry(ea.id).await, Some(ea.clone()));
    assert_eq!(b.entry(ea.id).await, Some(ea.clone()));
    assert_eq!(registry.get_transport_by_id(ea.id).await?.entry, ea);
    Ok(())
}

#[tokio::test]
async fn test_private_settlement_over_tcp() -> Result<()> {
    let discovery = MemoryDiscovery::new();
    let a = node(Arc::new(discovery.clone()));
    let b = node(Arc::new(discovery.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let responder = tokio::spawn(respond_once(listener, b));

    let ea = initiate_to(addr, a, Uuid::nil(), false).await?;
    assert_eq!(responder.await??, ea);
    assert!(!ea.public);
    assert!(discovery.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_identity_exchange_over_tcp_learns_peer() -> Result<()> {
    let (pk_a, _) = tether_core::generate_keypair();
    let (pk_b, _) = tether_core::generate_keypair();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        FramedTransport::exchange_identities(stream, pk_b, TRANSPORT_TYPE)
            .await
            .map_err(anyhow::Error::from)
    });

    let stream = TcpStream::connect(addr).await?;
    let dialer = FramedTransport::exchange_identities(stream, pk_a, TRANSPORT_TYPE).await?;
    let acceptor = accept.await??;

    assert_eq!(dialer.remote_id(), pk_b);
    assert_eq!(acceptor.remote_id(), pk_a);
    assert_eq!(dialer.edges(), acceptor.edges());
    Ok(())
}

#[tokio::test]
async fn test_transport_type_mismatch_over_tcp() -> Result<()> {
    let (pk_a, _) = tether_core::generate_keypair();
    let (pk_b, _) = tether_core::generate_keypair();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        FramedTransport::exchange_identities(stream, pk_b, "quic").await
    });

    let stream = TcpStream::connect(addr).await?;
    let dialed = FramedTransport::exchange_identities(stream, pk_a, TRANSPORT_TYPE).await;

    assert!(matches!(dialed, Err(TransportError::TypeMismatch { .. })));
    assert!(matches!(
        accept.await?,
        Err(TransportError::TypeMismatch { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_peer_hanging_up_mid_handshake() -> Result<()> {
    let discovery = MemoryDiscovery::new();
    let b = node(Arc::new(discovery.clone()));
    let (pk_a, _) = tether_core::generate_keypair();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let responder = tokio::spawn(respond_once(listener, b.clone()));

    // Swap identities, then leave without proposing
    let stream = TcpStream::connect(addr).await?;
    let transport = FramedTransport::exchange_identities(stream, pk_a, TRANSPORT_TYPE).await?;
    drop(transport);

    let err = responder.await?.unwrap_err();
    let settlement = err.downcast_ref::<SettlementError>().context("not a settlement error")?;
    assert!(matches!(
        settlement,
        SettlementError::TransportIO(TransportError::Closed)
    ));
    assert!(b.entries().await.is_empty());
    assert!(discovery.is_empty());
    Ok(())
}
