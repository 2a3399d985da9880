//! Transport entries: the record two nodes co-sign to describe a transport.
//!
//! An `Entry` names the two edges of a transport (in canonical order), the
//! transport type, and whether it is listed publicly. Its id is derived from
//! that content, so both peers compute the same id without negotiating it.
//!
//! A `SignedEntry` carries one signature slot per edge. Slot `i` belongs to
//! `edges[i]`; there is no map from identity to signature.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::{CryptoError, Hasher, NodeId, SecretKey, Signature};
use crate::wire::MAX_TYPE_LEN;

/// Transport identifier. Derived, never random.
pub type TransportId = Uuid;

// ── Canonical ordering ────────────────────────────────────────────────────────

/// Order two identities byte-lexicographically.
///
/// `sort_pair(x, y) == sort_pair(y, x)` for every pair.
pub fn sort_pair(a: NodeId, b: NodeId) -> [NodeId; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}

/// Derive the id of a transport between `a` and `b` of the given type.
///
///   id = UUIDv5(nil, edge0 || edge1 || type)
///
/// The pair is sorted first, so argument order does not matter.
pub fn derive_id(a: NodeId, b: NodeId, transport_type: &str) -> TransportId {
    let [first, second] = sort_pair(a, b);
    let mut name = Vec::with_capacity(2 * first.as_bytes().len() + transport_type.len());
    name.extend_from_slice(first.as_bytes());
    name.extend_from_slice(second.as_bytes());
    name.extend_from_slice(transport_type.as_bytes());
    Uuid::new_v5(&Uuid::nil(), &name)
}

// ── Entry ─────────────────────────────────────────────────────────────────────

/// Unsigned description of a transport between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub id: TransportId,
    /// The two endpoints, always in canonical order.
    pub edges: [NodeId; 2],
    #[serde(rename = "type")]
    pub transport_type: String,
    /// Listed in public discovery queries when true.
    pub public: bool,
}

impl Entry {
    /// Build a fresh entry. The id is derived from the edges and type.
    pub fn new(local: NodeId, remote: NodeId, transport_type: &str, public: bool) -> Self {
        Self {
            id: derive_id(local, remote, transport_type),
            edges: sort_pair(local, remote),
            transport_type: transport_type.to_string(),
            public,
        }
    }

    /// Build an entry that continues negotiation under an existing id.
    pub fn with_id(
        id: TransportId,
        local: NodeId,
        remote: NodeId,
        transport_type: &str,
        public: bool,
    ) -> Self {
        Self {
            id,
            edges: sort_pair(local, remote),
            transport_type: transport_type.to_string(),
            public,
        }
    }

    /// Position of `node` in `edges`, if it is one of them.
    pub fn edge_index(&self, node: &NodeId) -> Option<usize> {
        self.edges.iter().position(|e| e == node)
    }

    /// True when edges are sorted (a freshly built entry always is).
    pub fn has_canonical_edges(&self) -> bool {
        self.edges[0] <= self.edges[1]
    }

    /// False when the type is too long to sign or put on the wire.
    pub fn has_valid_type_len(&self) -> bool {
        self.transport_type.len() <= MAX_TYPE_LEN
    }

    /// Canonical encoding the signatures are computed over.
    ///
    ///   id (16) || edge0 (33) || edge1 (33) || public (1) || type_len (u16 BE) || type
    ///
    /// Only meaningful for entries within `MAX_TYPE_LEN`; signing and
    /// validation refuse longer types before they get here.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let type_bytes = self.transport_type.as_bytes();
        let mut out = Vec::with_capacity(16 + 33 + 33 + 1 + 2 + type_bytes.len());
        out.extend_from_slice(self.id.as_bytes());
        out.extend_from_slice(self.edges[0].as_bytes());
        out.extend_from_slice(self.edges[1].as_bytes());
        out.push(self.public as u8);
        out.extend_from_slice(&(type_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(type_bytes);
        out
    }

    /// BLAKE3 digest of `signing_bytes`, domain-separated.
    pub fn digest(&self) -> [u8; 32] {
        let mut h = Hasher::new();
        h.update(b"tether.entry.v1");
        h.update(&self.signing_bytes());
        h.finalize()
    }
}

// ── SignedEntry ───────────────────────────────────────────────────────────────

/// An entry plus one signature slot per edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEntry {
    pub entry: Entry,
    /// Slot `i` holds the signature of `entry.edges[i]`.
    pub signatures: [Option<Signature>; 2],
}

impl SignedEntry {
    /// Wrap an entry with both slots empty.
    pub fn unsigned(entry: Entry) -> Self {
        Self {
            entry,
            signatures: [None, None],
        }
    }

    /// Wrap an entry and sign it as `signer`.
    ///
    /// `signer` picks the slot; `secret` produces the signature. Nothing checks
    /// that they belong together here; the validator does that.
    pub fn new(entry: Entry, signer: &NodeId, secret: &SecretKey) -> Result<Self, EntryError> {
        let mut signed = Self::unsigned(entry);
        signed.set_signature(signer, secret)?;
        Ok(signed)
    }

    /// Sign into `signer`'s slot. Overwrites whatever was there.
    pub fn set_signature(&mut self, signer: &NodeId, secret: &SecretKey) -> Result<(), EntryError> {
        if !self.entry.has_valid_type_len() {
            return Err(EntryError::TypeTooLong(self.entry.transport_type.len()));
        }
        let slot = self
            .entry
            .edge_index(signer)
            .ok_or(EntryError::UnknownSigner(*signer))?;
        self.signatures[slot] = Some(secret.sign(&self.entry.digest())?);
        Ok(())
    }

    /// The signature in `node`'s slot, if `node` is an edge and has signed.
    pub fn signature(&self, node: &NodeId) -> Option<&Signature> {
        self.entry
            .edge_index(node)
            .and_then(|i| self.signatures[i].as_ref())
    }

    pub fn is_fully_signed(&self) -> bool {
        self.signatures.iter().all(Option::is_some)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntryError {
    #[error("signer {0} is not an edge of this entry")]
    UnknownSigner(NodeId),

    #[error("transport type length {0} exceeds maximum {}", MAX_TYPE_LEN)]
    TypeTooLong(usize),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
