//! Entry validation.
//!
//! Checks a signed entry received from a peer against what the local transport
//! knows: its type, its two edges, and the signatures in each populated slot.
//! Pure: never mutates the entry and never touches the network.

use thiserror::Error;

use crate::crypto::NodeId;
use crate::entry::{sort_pair, SignedEntry};

/// Validate `signed` against the local transport's edges and type.
///
/// Checks, in order:
///   1. the entry's type fits on the wire and equals `local_type`
///   2. the entry's edges are the canonical form of `local_edges`
///   3. every populated slot recovers to the edge it sits under
///   4. `expected_signer` has a populated slot
pub fn validate_entry(
    signed: &SignedEntry,
    local_edges: [NodeId; 2],
    local_type: &str,
    expected_signer: &NodeId,
) -> Result<(), ValidationError> {
    let entry = &signed.entry;

    if !entry.has_valid_type_len() {
        return Err(ValidationError::TypeTooLong(entry.transport_type.len()));
    }
    if entry.transport_type != local_type {
        return Err(ValidationError::InvalidType {
            expected: local_type.to_string(),
            found: entry.transport_type.clone(),
        });
    }

    // Comparing against the sorted local pair also rejects entries whose own
    // edges are out of canonical order.
    if entry.edges != sort_pair(local_edges[0], local_edges[1]) {
        return Err(ValidationError::InvalidEdges);
    }

    let digest = entry.digest();
    for (slot, sig) in signed.signatures.iter().enumerate() {
        let Some(sig) = sig else { continue };
        match sig.recover(&digest) {
            Ok(recovered) if recovered == entry.edges[slot] => {}
            _ => return Err(ValidationError::SignatureMismatch { slot }),
        }
    }

    if signed.signature(expected_signer).is_none() {
        return Err(ValidationError::MissingSignature(*expected_signer));
    }

    Ok(())
}

/// Why a signed entry was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid entry type: expected {expected:?}, found {found:?}")]
    InvalidType { expected: String, found: String },

    #[error("transport type length {0} exceeds maximum {}", crate::wire::MAX_TYPE_LEN)]
    TypeTooLong(usize),

    #[error("invalid entry edges")]
    InvalidEdges,

    #[error("recovered identity does not match claimed identity in slot {slot}")]
    SignatureMismatch { slot: usize },

    #[error("missing signature from {0}")]
    MissingSignature(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_keypair, Signature};
    use crate::entry::{Entry, SignedEntry};

    struct Fixture {
        pk1: NodeId,
        sk1: crate::crypto::SecretKey,
        pk2: NodeId,
        sk2: crate::crypto::SecretKey,
        pk3: NodeId,
        sk3: crate::crypto::SecretKey,
    }

    fn fixture() -> Fixture {
        let (pk1, sk1) = generate_keypair();
        let (pk2, sk2) = generate_keypair();
        let (pk3, sk3) = generate_keypair();
        Fixture { pk1, sk1, pk2, sk2, pk3, sk3 }
    }

    fn fully_signed(f: &Fixture) -> SignedEntry {
        let mut signed = SignedEntry::new(Entry::new(f.pk1, f.pk2, "mock", true), &f.pk1, &f.sk1).unwrap();
        signed.set_signature(&f.pk2, &f.sk2).unwrap();
        signed
    }

    #[test]
    fn fully_signed_entry_passes_for_either_signer() {
        let f = fixture();
        let signed = fully_signed(&f);
        assert_eq!(validate_entry(&signed, [f.pk1, f.pk2], "mock", &f.pk1), Ok(()));
        assert_eq!(validate_entry(&signed, [f.pk2, f.pk1], "mock", &f.pk2), Ok(()));
    }

    #[test]
    fn half_signed_entry_passes_for_its_signer() {
        let f = fixture();
        let signed = SignedEntry::new(Entry::new(f.pk1, f.pk2, "mock", true), &f.pk1, &f.sk1).unwrap();
        assert_eq!(validate_entry(&signed, [f.pk2, f.pk1], "mock", &f.pk1), Ok(()));
        assert_eq!(
            validate_entry(&signed, [f.pk2, f.pk1], "mock", &f.pk2),
            Err(ValidationError::MissingSignature(f.pk2))
        );
    }

    #[test]
    fn wrong_type_is_rejected_first() {
        let f = fixture();
        let mut signed = fully_signed(&f);
        signed.entry.transport_type = "foo".into();
        signed.entry.edges = sort_pair(f.pk1, f.pk3);
        assert!(matches!(
            validate_entry(&signed, [f.pk1, f.pk2], "mock", &f.pk2),
            Err(ValidationError::InvalidType { .. })
        ));
    }

    #[test]
    fn oversized_type_is_rejected_before_recovery() {
        let f = fixture();
        let mut signed = fully_signed(&f);
        let long = "y".repeat(crate::wire::MAX_TYPE_LEN + 1);
        signed.entry.transport_type = long.clone();
        assert_eq!(
            validate_entry(&signed, [f.pk1, f.pk2], &long, &f.pk1),
            Err(ValidationError::TypeTooLong(long.len()))
        );
    }

    #[test]
    fn foreign_edges_are_rejected_regardless_of_signatures() {
        let f = fixture();
        let mut signed = SignedEntry::new(Entry::new(f.pk1, f.pk3, "mock", true), &f.pk1, &f.sk1).unwrap();
        signed.set_signature(&f.pk3, &f.sk3).unwrap();
        assert_eq!(
            validate_entry(&signed, [f.pk1, f.pk2], "mock", &f.pk1),
            Err(ValidationError::InvalidEdges)
        );
    }

    #[test]
    fn unsorted_edges_are_rejected() {
        let f = fixture();
        let mut signed = fully_signed(&f);
        signed.entry.edges.swap(0, 1);
        assert_eq!(
            validate_entry(&signed, [f.pk1, f.pk2], "mock", &f.pk1),
            Err(ValidationError::InvalidEdges)
        );
    }

    #[test]
    fn unsigned_entry_is_missing_signature() {
        let f = fixture();
        let signed = SignedEntry::unsigned(Entry::new(f.pk1, f.pk2, "mock", true));
        assert_eq!(
            validate_entry(&signed, [f.pk1, f.pk2], "mock", &f.pk2),
            Err(ValidationError::MissingSignature(f.pk2))
        );
    }

    #[test]
    fn swapped_keys_are_a_mismatch() {
        let f = fixture();
        let mut signed = SignedEntry::unsigned(Entry::new(f.pk1, f.pk2, "mock", true));
        signed.set_signature(&f.pk1, &f.sk2).unwrap();
        signed.set_signature(&f.pk2, &f.sk1).unwrap();
        assert!(matches!(
            validate_entry(&signed, [f.pk1, f.pk2], "mock", &f.pk2),
            Err(ValidationError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn third_party_signature_in_either_slot_is_detected() {
        let f = fixture();
        for slot in 0..2 {
            let mut signed = fully_signed(&f);
            let forged = f.sk3.sign(&signed.entry.digest()).unwrap();
            signed.signatures[slot] = Some(forged);
            assert_eq!(
                validate_entry(&signed, [f.pk1, f.pk2], "mock", &f.pk1),
                Err(ValidationError::SignatureMismatch { slot })
            );
        }
    }

    #[test]
    fn garbage_signature_is_a_mismatch() {
        let f = fixture();
        let mut signed = fully_signed(&f);
        signed.signatures[1] = Some(Signature::from_bytes([0xff; 65]));
        assert_eq!(
            validate_entry(&signed, [f.pk1, f.pk2], "mock", &f.pk1),
            Err(ValidationError::SignatureMismatch { slot: 1 })
        );
    }

    #[test]
    fn tampered_public_flag_breaks_both_signatures() {
        let f = fixture();
        let mut signed = fully_signed(&f);
        signed.entry.public = !signed.entry.public;
        assert_eq!(
            validate_entry(&signed, [f.pk1, f.pk2], "mock", &f.pk1),
            Err(ValidationError::SignatureMismatch { slot: 0 })
        );
    }
}
