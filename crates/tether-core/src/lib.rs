//! tether-core: node identities, transport entries, signatures, validation,
//! and the canonical wire format. All other Tether crates depend on this one.

pub mod config;
pub mod crypto;
pub mod entry;
pub mod validate;
pub mod wire;

pub use crypto::{generate_keypair, NodeId, SecretKey, Signature};
pub use entry::{derive_id, sort_pair, Entry, EntryError, SignedEntry, TransportId};
pub use validate::{validate_entry, ValidationError};
