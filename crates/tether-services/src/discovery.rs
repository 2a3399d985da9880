//! Discovery client: where settled transports are registered and looked up.
//!
//! The registry maps a transport id to its fully signed entry and a liveness
//! flag. `DiscoveryClient` is the seam: the in-memory `MemoryDiscovery` below
//! backs tests and the daemon's embedded registry, and tether-api provides an
//! HTTP client for a remote one.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use tether_core::{validate_entry, Entry, NodeId, SignedEntry, TransportId};

/// Liveness report for one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: TransportId,
    pub is_up: bool,
}

/// A registered entry together with its last reported liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryWithStatus {
    pub entry: Entry,
    pub is_up: bool,
    /// Unix seconds at first registration.
    pub registered: u64,
}

#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Register fully signed entries. The first registration of an id wins.
    async fn register_transports(&self, entries: &[SignedEntry]) -> Result<(), DiscoveryError>;

    /// Update liveness for registered ids, returning the updated records.
    async fn update_statuses(
        &self,
        statuses: &[Status],
    ) -> Result<Vec<EntryWithStatus>, DiscoveryError>;

    async fn get_transport_by_id(&self, id: TransportId) -> Result<EntryWithStatus, DiscoveryError>;

    async fn get_transports_by_edge(
        &self,
        node: NodeId,
    ) -> Result<Vec<EntryWithStatus>, DiscoveryError>;
}

// ── In-memory registry ────────────────────────────────────────────────────────

/// Registry held in process memory. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryDiscovery {
    entries: Arc<DashMap<TransportId, EntryWithStatus>>,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every registered record, in no particular order.
    pub fn list(&self) -> Vec<EntryWithStatus> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }
}

/// Both slots must be populated and recover to their edges.
fn check_registrable(signed: &SignedEntry) -> Result<(), DiscoveryError> {
    if !signed.is_fully_signed() {
        return Err(DiscoveryError::InvalidEntry(format!(
            "entry {} is not fully signed",
            signed.entry.id
        )));
    }
    let entry = &signed.entry;
    validate_entry(signed, entry.edges, &entry.transport_type, &entry.edges[0])
        .map_err(|e| DiscoveryError::InvalidEntry(format!("entry {}: {}", entry.id, e)))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl DiscoveryClient for MemoryDiscovery {
    /// All-or-nothing for conflicts: the batch is checked against the
    /// registry and against itself before anything is inserted.
    async fn register_transports(&self, entries: &[SignedEntry]) -> Result<(), DiscoveryError> {
        for (i, signed) in entries.iter().enumerate() {
            check_registrable(signed)?;
            let id = signed.entry.id;
            if let Some(existing) = self.entries.get(&id) {
                if existing.entry != signed.entry {
                    return Err(DiscoveryError::AlreadyRegistered(id));
                }
            }
            if entries[..i]
                .iter()
                .any(|earlier| earlier.entry.id == id && earlier.entry != signed.entry)
            {
                return Err(DiscoveryError::AlreadyRegistered(id));
            }
        }

        for signed in entries {
            let id = signed.entry.id;
            match self.entries.entry(id) {
                MapEntry::Occupied(existing) => {
                    if existing.get().entry != signed.entry {
                        return Err(DiscoveryError::AlreadyRegistered(id));
                    }
                    tracing::debug!(%id, "entry already registered, unchanged");
                }
                MapEntry::Vacant(slot) => {
                    slot.insert(EntryWithStatus {
                        entry: signed.entry.clone(),
                        is_up: true,
                        registered: unix_now(),
                    });
                    tracing::info!(%id, public = signed.entry.public, "transport registered");
                }
            }
        }
        Ok(())
    }

    async fn update_statuses(
        &self,
        statuses: &[Status],
    ) -> Result<Vec<EntryWithStatus>, DiscoveryError> {
        if let Some(missing) = statuses.iter().find(|s| !self.entries.contains_key(&s.id)) {
            return Err(DiscoveryError::NotFound(missing.id));
        }
        let mut updated = Vec::with_capacity(statuses.len());
        for status in statuses {
            let mut record = self
                .entries
                .get_mut(&status.id)
                .ok_or(DiscoveryError::NotFound(status.id))?;
            record.is_up = status.is_up;
            tracing::debug!(id = %status.id, is_up = status.is_up, "status updated");
            updated.push(record.clone());
        }
        Ok(updated)
    }

    async fn get_transport_by_id(&self, id: TransportId) -> Result<EntryWithStatus, DiscoveryError> {
        self.entries
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(DiscoveryError::NotFound(id))
    }

    async fn get_transports_by_edge(
        &self,
        node: NodeId,
    ) -> Result<Vec<EntryWithStatus>, DiscoveryError> {
        Ok(self
            .entries
            .iter()
            .filter(|r| r.value().entry.edges.contains(&node))
            .map(|r| r.value().clone())
            .collect())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("transport {0} not found")]
    NotFound(TransportId),

    #[error("transport {0} is already registered with a different entry")]
    AlreadyRegistered(TransportId),

    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error("discovery service unavailable: {0}")]
    Unavailable(String),
}
