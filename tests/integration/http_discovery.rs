use crate::*;

use tether_services::DiscoveryError;
use uuid::Uuid;

#[tokio::test]
async fn test_settlement_through_remote_registry() -> Result<()> {
    let (registry, url) = spawn_registry().await?;
    // Each node talks to the registry through its own HTTP client
    let a = node(http_client(&url)?);
    let b = node(http_client(&url)?);

    let (ra, rb) = settle_in_memory(&a, &b, Uuid::nil(), true).await;
    let (ea, eb) = (ra?, rb?);
    assert_eq!(ea, eb);

    let record = registry.get_transport_by_id(ea.id).await?;
    assert_eq!(record.entry, ea);
    assert!(record.is_up);
    Ok(())
}

#[tokio::test]
async fn test_remote_registry_sees_status_changes() -> Result<()> {
    let (registry, url) = spawn_registry().await?;
    let a = node(http_client(&url)?);
    let b = node(http_client(&url)?);

    let (ra, _) = settle_in_memory(&a, &b, Uuid::nil(), true).await;
    let id = ra?.id;

    a.set_status(id, false).await?;
    assert!(!registry.get_transport_by_id(id).await?.is_up);

    let (ra, rb) = settle_in_memory(&b, &a, id, true).await;
    assert_eq!(ra?.id, id);
    assert_eq!(rb?.id, id);
    assert!(registry.get_transport_by_id(id).await?.is_up);
    assert_eq!(registry.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_private_settlement_registers_nothing() -> Result<()> {
    let (registry, url) = spawn_registry().await?;
    let a = node(http_client(&url)?);
    let b = node(http_client(&url)?);

    let (ra, rb) = settle_in_memory(&a, &b, Uuid::nil(), false).await;
    assert_eq!(ra?, rb?);
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_health_endpoint_json_shape() -> Result<()> {
    let (registry, url) = spawn_registry().await?;
    let a = node(Arc::new(registry.clone()));
    let b = node(Arc::new(registry));
    let (ra, _) = settle_in_memory(&a, &b, Uuid::nil(), true).await;
    ra?;

    let health = HttpDiscovery::new(&url)?.health().await?;
    let body = serde_json::to_value(health)?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["transports"], 1);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_registry_fails_public_settlement() -> Result<()> {
    // Nothing listens on a port we bound and released
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}/api", listener.local_addr()?);
    drop(listener);

    let a = node(http_client(&url)?);
    let b = node(http_client(&url)?);
    let (ra, rb) = settle_in_memory(&a, &b, Uuid::nil(), true).await;

    assert!(matches!(
        rb,
        Err(SettlementError::Discovery(DiscoveryError::Unavailable(_)))
    ));
    assert!(ra.is_err());
    assert!(b.entries().await.is_empty());
    Ok(())
}
