use crate::*;

use tether_core::derive_id;
use tether_services::Status;
use tokio::task::JoinSet;
use uuid::Uuid;

fn shared() -> (MemoryDiscovery, Arc<dyn DiscoveryClient>) {
    let discovery = MemoryDiscovery::new();
    let client: Arc<dyn DiscoveryClient> = Arc::new(discovery.clone());
    (discovery, client)
}

#[tokio::test]
async fn test_end_to_end_public_settlement() {
    let (discovery, client) = shared();
    let (a, b) = (node(client.clone()), node(client));

    let (ra, rb) = settle_in_memory(&a, &b, Uuid::nil(), true).await;
    let (ea, eb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(ea, eb);
    assert_eq!(ea.id, derive_id(a.local_id(), b.local_id(), TRANSPORT_TYPE));
    assert_eq!(ea.id, derive_id(b.local_id(), a.local_id(), TRANSPORT_TYPE));

    let record = discovery.get_transport_by_id(ea.id).await.unwrap();
    assert_eq!(record.entry, ea);
    assert!(record.is_up);
}

#[tokio::test]
async fn test_private_settlement_never_reaches_discovery() {
    let (discovery, client) = shared();
    let (a, b) = (node(client.clone()), node(client));

    let (ra, rb) = settle_in_memory(&a, &b, Uuid::nil(), false).await;
    assert_eq!(ra.unwrap(), rb.unwrap());
    assert!(discovery.is_empty());
    assert!(discovery
        .get_transports_by_edge(a.local_id())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_resettling_existing_transport_updates_status_only() {
    let (discovery, client) = shared();
    let (a, b) = (node(client.clone()), node(client));

    let (ra, _) = settle_in_memory(&a, &b, Uuid::nil(), true).await;
    let id = ra.unwrap().id;
    a.set_status(id, false).await.unwrap();
    assert!(!discovery.get_transport_by_id(id).await.unwrap().is_up);

    let (ra, rb) = settle_in_memory(&a, &b, id, true).await;
    assert_eq!(ra.unwrap().id, id);
    assert_eq!(rb.unwrap().id, id);
    assert_eq!(discovery.len(), 1);
    assert!(discovery.get_transport_by_id(id).await.unwrap().is_up);
}

#[tokio::test]
async fn test_either_side_may_initiate() {
    let (discovery, client) = shared();
    let (a, b) = (node(client.clone()), node(client));

    let (forward, _) = settle_in_memory(&a, &b, Uuid::nil(), true).await;
    let (backward, _) = settle_in_memory(&b, &a, Uuid::nil(), true).await;
    assert_eq!(forward.unwrap(), backward.unwrap());
    assert_eq!(discovery.len(), 1);
}

#[tokio::test]
async fn test_concurrent_handshakes_converge() {
    let (discovery, client) = shared();
    let (a, b) = (node(client.clone()), node(client));

    let mut set = JoinSet::new();
    for i in 0..8 {
        let (a, b) = (a.clone(), b.clone());
        // Alternate who initiates
        let (init, resp) = if i % 2 == 0 { (a, b) } else { (b, a) };
        set.spawn(async move {
            let (ri, rr) = settle_in_memory(&init, &resp, Uuid::nil(), true).await;
            (ri.unwrap(), rr.unwrap())
        });
    }

    let mut settled = Vec::new();
    while let Some(joined) = set.join_next().await {
        let (ei, er) = joined.unwrap();
        assert_eq!(ei, er);
        settled.push(ei);
    }
    assert!(settled.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(discovery.len(), 1);
    assert_eq!(a.entries().await.len(), 1);
    assert_eq!(b.entries().await.len(), 1);
}

#[tokio::test]
async fn test_star_topology_settles_distinct_ids() {
    let (discovery, client) = shared();
    let hub = node(client.clone());
    let spokes: Vec<_> = (0..4).map(|_| node(client.clone())).collect();

    for spoke in &spokes {
        let (rs, rh) = settle_in_memory(spoke, &hub, Uuid::nil(), true).await;
        assert_eq!(rs.unwrap(), rh.unwrap());
    }

    assert_eq!(discovery.len(), spokes.len());
    assert_eq!(hub.entries().await.len(), spokes.len());
    let around_hub = discovery.get_transports_by_edge(hub.local_id()).await.unwrap();
    assert_eq!(around_hub.len(), spokes.len());
    for spoke in &spokes {
        assert_eq!(
            discovery
                .get_transports_by_edge(spoke.local_id())
                .await
                .unwrap()
                .len(),
            1
        );
    }
}

#[tokio::test]
async fn test_mismatched_signer_is_rejected_by_responder() {
    let (discovery, client) = shared();
    let (a, b) = (node(client.clone()), node(client));
    let impostor = SecretKey::generate().public();

    // The transport claims `impostor` but `a` signs with its own key
    let (mut ta, mut tb) = pipe(impostor, b.local_id(), TRANSPORT_TYPE);
    let (ra, rb) = tokio::join!(
        async move { a.initiate(&mut ta, Uuid::nil(), true).await },
        async move { b.respond(&mut tb).await },
    );

    assert!(rb.unwrap_err().is_signature_mismatch());
    assert!(ra.is_err());
    assert!(discovery.is_empty());
}

#[tokio::test]
async fn test_mismatched_signer_is_rejected_by_initiator() {
    let (discovery, client) = shared();
    let (a, b) = (node(client.clone()), node(client));
    let impostor = SecretKey::generate().public();

    let (mut ta, mut tb) = pipe(a.local_id(), impostor, TRANSPORT_TYPE);
    let (ra, rb) = tokio::join!(
        async move { a.initiate(&mut ta, Uuid::nil(), true).await },
        async move { b.respond(&mut tb).await },
    );

    assert!(ra.unwrap_err().is_signature_mismatch());
    assert!(rb.unwrap_err().is_signature_mismatch());
    assert!(discovery.is_empty());
}

#[tokio::test]
async fn test_restarted_node_reuses_registered_id() {
    let (discovery, client) = shared();
    let (a, b) = (node(client.clone()), node(client.clone()));

    let (ra, _) = settle_in_memory(&a, &b, Uuid::nil(), true).await;
    let settled = ra.unwrap();
    discovery
        .update_statuses(&[Status { id: settled.id, is_up: false }])
        .await
        .unwrap();

    let restarted = Arc::new(
        Manager::bootstrap(a.secret_key().clone(), client)
            .await
            .unwrap(),
    );
    assert_eq!(restarted.entry(settled.id).await, Some(settled.clone()));

    let (ra, rb) = settle_in_memory(&restarted, &b, settled.id, true).await;
    assert_eq!(ra.unwrap(), settled);
    assert_eq!(rb.unwrap(), settled);
    assert!(discovery.get_transport_by_id(settled.id).await.unwrap().is_up);
}

#[tokio::test]
async fn test_private_reproposal_converges_on_public_record() {
    let (discovery, client) = shared();
    let (a, b) = (node(client.clone()), node(client.clone()));

    let (ra, _) = settle_in_memory(&a, &b, Uuid::nil(), true).await;
    let first = ra.unwrap();

    // `a` restarts without bootstrapping and asks for the id as private
    let forgetful = Arc::new(Manager::new(a.secret_key().clone(), client));
    let (ra, rb) = settle_in_memory(&forgetful, &b, first.id, false).await;
    let (ea, eb) = (ra.unwrap(), rb.unwrap());

    let record = discovery.get_transport_by_id(first.id).await.unwrap();
    assert_eq!(ea, eb);
    assert_eq!(ea, record.entry);
    assert_eq!(ea, first);
    assert!(ea.public);
    assert_eq!(forgetful.entry(first.id).await, Some(first.clone()));
    assert_eq!(b.entry(first.id).await, Some(first));
    assert_eq!(discovery.len(), 1);
}
