//! Transport manager: the node-side owner of settled entries.
//!
//! Holds this node's secret key, the entries it has settled, and a handle to
//! the discovery registry. Any number of handshakes may run against one
//! manager at once. Settlement of a given id is serialized by a per-id lock
//! held from reconcile to commit, discovery calls included. The entry table
//! has its own short-lived lock, so a slow registry only stalls handshakes
//! for the id it is working on.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use tether_core::{Entry, NodeId, SecretKey, SignedEntry, TransportId};

use crate::discovery::{DiscoveryClient, DiscoveryError, Status};
use crate::settlement::{SettlementError, SettlementInitiator, SettlementResponder};
use crate::transport::Transport;

pub type SharedManager = Arc<Manager>;

pub struct Manager {
    local: NodeId,
    secret: SecretKey,
    entries: Mutex<HashMap<TransportId, Entry>>,
    settling: DashMap<TransportId, Arc<Mutex<()>>>,
    discovery: Arc<dyn DiscoveryClient>,
}

/// A proposal checked against what this node and the registry already hold.
///
/// Owns the settlement lock for the id until it is committed or dropped.
pub(crate) struct Reconciled {
    existing: Option<Entry>,
    _guard: OwnedMutexGuard<()>,
}

impl Reconciled {
    /// The earlier settled entry for this id, if there is one.
    pub(crate) fn existing(&self) -> Option<&Entry> {
        self.existing.as_ref()
    }
}

impl Manager {
    pub fn new(secret: SecretKey, discovery: Arc<dyn DiscoveryClient>) -> Self {
        Self {
            local: secret.public(),
            secret,
            entries: Mutex::new(HashMap::new()),
            settling: DashMap::new(),
            discovery,
        }
    }

    /// Build a manager and seed it with the entries discovery already holds
    /// for this node, so a restart re-settles under the same ids.
    pub async fn bootstrap(
        secret: SecretKey,
        discovery: Arc<dyn DiscoveryClient>,
    ) -> Result<Self, DiscoveryError> {
        let manager = Self::new(secret, discovery);
        let known = manager
            .discovery
            .get_transports_by_edge(manager.local)
            .await?;
        {
            let mut entries = manager.entries.lock().await;
            for record in known {
                entries.insert(record.entry.id, record.entry);
            }
            tracing::info!(count = entries.len(), "loaded entries from discovery");
        }
        Ok(manager)
    }

    pub fn local_id(&self) -> NodeId {
        self.local
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn discovery(&self) -> &Arc<dyn DiscoveryClient> {
        &self.discovery
    }

    pub async fn entry(&self, id: TransportId) -> Option<Entry> {
        self.entries.lock().await.get(&id).cloned()
    }

    pub async fn entries(&self) -> Vec<Entry> {
        self.entries.lock().await.values().cloned().collect()
    }

    /// Report liveness of a known public transport to discovery.
    /// Private and unknown transports are left alone.
    pub async fn set_status(&self, id: TransportId, is_up: bool) -> Result<(), DiscoveryError> {
        let public = match self.entry(id).await {
            Some(entry) => entry.public,
            None => return Ok(()),
        };
        if public {
            self.discovery
                .update_statuses(&[Status { id, is_up }])
                .await?;
        }
        Ok(())
    }

    /// Run the initiating side of settlement over `transport`.
    pub async fn initiate<T>(
        &self,
        transport: &mut T,
        existing_id: TransportId,
        public: bool,
    ) -> Result<Entry, SettlementError>
    where
        T: Transport + ?Sized,
    {
        SettlementInitiator::new(existing_id, public)
            .run(self, transport)
            .await
    }

    /// Run the responding side of settlement over `transport`.
    pub async fn respond<T>(&self, transport: &mut T) -> Result<Entry, SettlementError>
    where
        T: Transport + ?Sized,
    {
        SettlementResponder.run(self, transport).await
    }

    fn settle_lock(&self, id: TransportId) -> Arc<Mutex<()>> {
        Arc::clone(&self.settling.entry(id).or_default())
    }

    /// Take the settlement lock for `proposed.id` and find the entry already
    /// settled under it, locally or in discovery.
    ///
    /// An existing entry for other edges or another type is a conflict. One
    /// that differs only in `public` is returned as is: it was committed
    /// first, so it is what both sides settle on.
    pub(crate) async fn reconcile(&self, proposed: &Entry) -> Result<Reconciled, SettlementError> {
        let guard = self.settle_lock(proposed.id).lock_owned().await;
        let existing = match self.entry(proposed.id).await {
            Some(known) => Some(known),
            None => self.lookup_registered(proposed.id).await?,
        };

        if let Some(existing) = &existing {
            if existing.edges != proposed.edges || existing.transport_type != proposed.transport_type {
                return Err(SettlementError::ConflictingEntry(proposed.id));
            }
        }
        Ok(Reconciled {
            existing,
            _guard: guard,
        })
    }

    /// Register or refresh a reconciled, countersigned entry in discovery and
    /// record it locally. New public entries are registered; existing public
    /// ones only get a status update.
    pub(crate) async fn commit_settled(
        &self,
        reconciled: Reconciled,
        settled: &SignedEntry,
    ) -> Result<Entry, SettlementError> {
        let id = settled.entry.id;
        match reconciled.existing() {
            None if settled.entry.public => {
                self.discovery
                    .register_transports(std::slice::from_ref(settled))
                    .await?;
            }
            Some(existing) if existing.public => {
                self.discovery
                    .update_statuses(&[Status { id, is_up: true }])
                    .await?;
            }
            _ => {}
        }
        self.entries.lock().await.insert(id, settled.entry.clone());
        Ok(settled.entry.clone())
    }

    /// Record the entry a handshake settled on, replacing whatever this node
    /// held under the same id.
    pub(crate) async fn record_settled(&self, entry: Entry) -> Entry {
        let lock = self.settle_lock(entry.id);
        let _guard = lock.lock().await;
        let previous = self.entries.lock().await.insert(entry.id, entry.clone());
        if let Some(previous) = previous.filter(|p| *p != entry) {
            tracing::warn!(
                id = %entry.id,
                was_public = previous.public,
                now_public = entry.public,
                "local entry replaced by the settled one"
            );
        }
        entry
    }

    async fn lookup_registered(&self, id: TransportId) -> Result<Option<Entry>, DiscoveryError> {
        match self.discovery.get_transport_by_id(id).await {
            Ok(record) => Ok(Some(record.entry)),
            Err(DiscoveryError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
