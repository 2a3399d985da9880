//! Settlement: the two-message handshake that turns a raw transport into a
//! jointly signed entry.
//!
//! ```text
//!   initiator                                responder
//!   ─────────                                ─────────
//!   Propose ── entry + own signature ──────▶ AwaitProposal
//!                                            Verify
//!                                            Reconcile  (local table, then discovery)
//!                                            CounterSign
//!                                            Register   (discovery, public only)
//!   AwaitCounterSignature ◀── countersigned ─ Reply
//!   Verify
//!   Commit
//! ```
//!
//! Each side runs as an explicit state machine over a `Transport`. Nothing is
//! recorded locally or in discovery until the entry has been checked on both
//! sides. An id settled earlier keeps its first entry: the responder replies
//! with it and the initiator adopts it.

mod initiator;
mod responder;

pub use initiator::SettlementInitiator;
pub use responder::SettlementResponder;

use tether_core::{validate_entry, EntryError, NodeId, SignedEntry, TransportId, ValidationError};

use crate::discovery::DiscoveryError;
use crate::transport::{Transport, TransportError};

/// Check an entry received over `transport` against the transport's own
/// edges and type. `expected_signer` must have a populated, valid slot.
pub(crate) fn verify_received<T>(
    transport: &T,
    signed: &SignedEntry,
    expected_signer: &NodeId,
) -> Result<(), ValidationError>
where
    T: Transport + ?Sized,
{
    validate_entry(
        signed,
        transport.edges(),
        transport.transport_type(),
        expected_signer,
    )
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("entry rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("signing failed: {0}")]
    Entry(#[from] EntryError),

    #[error("transport I/O failed: {0}")]
    TransportIO(#[from] TransportError),

    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("peer returned an entry that differs from the proposal")]
    InvalidEntry,

    #[error("transport {0} is already settled with different edges or type")]
    ConflictingEntry(TransportId),
}

impl SettlementError {
    /// True when the peer or our own key produced a signature that does not
    /// recover to the identity it sits under.
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(
            self,
            SettlementError::Validation(ValidationError::SignatureMismatch { .. })
        )
    }
}
