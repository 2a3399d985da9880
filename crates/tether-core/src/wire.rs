//! Tether wire format: the canonical byte form of a signed entry.
//!
//! These types ARE the protocol. A signed entry travels as a fixed 216-byte
//! packed header followed by the UTF-8 transport type. Decoding accepts only
//! bytes that re-encode identically, so a value that survives a round trip
//! through a peer still verifies against the same signatures.
//!
//! The header uses zerocopy derives for allocation-free serialization. There
//! is no unsafe code in this module.

use static_assertions::assert_eq_size;
use uuid::Uuid;
use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::crypto::{NodeId, Signature, NODE_ID_LEN, SIGNATURE_LEN};
use crate::entry::{Entry, SignedEntry};

// ── Header ────────────────────────────────────────────────────────────────────

/// Fixed-size prefix of every signed entry on the wire.
///
/// Wire size: 216 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct SignedEntryHeader {
    /// Wire format version. Currently 0x01.
    pub version: u8,

    /// Bit flags:
    ///   bit 0: entry is public
    ///   bit 1: signature slot 0 is populated
    ///   bit 2: signature slot 1 is populated
    ///   bits 3-7: reserved, must be zero
    pub flags: u8,

    /// Length of the transport type that follows the header.
    pub type_len: U16<BigEndian>,

    /// Transport id (UUID bytes).
    pub id: [u8; 16],

    /// Canonically ordered edges.
    pub edge0: [u8; NODE_ID_LEN],
    pub edge1: [u8; NODE_ID_LEN],

    /// Signature slots. An empty slot is all zero.
    pub sig0: [u8; SIGNATURE_LEN],
    pub sig1: [u8; SIGNATURE_LEN],
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(SignedEntryHeader, [u8; HEADER_LEN]);

// ── Constants ─────────────────────────────────────────────────────────────────

/// Current wire format version.
pub const WIRE_VERSION: u8 = 0x01;

/// Size of `SignedEntryHeader`.
pub const HEADER_LEN: usize = 216;

/// Longest transport type accepted on the wire.
pub const MAX_TYPE_LEN: usize = 255;

/// Largest frame a signed entry can occupy.
pub const MAX_FRAME: usize = HEADER_LEN + MAX_TYPE_LEN;

pub const FLAG_PUBLIC: u8 = 0x01;
pub const FLAG_SIG0: u8 = 0x02;
pub const FLAG_SIG1: u8 = 0x04;
const FLAGS_KNOWN: u8 = FLAG_PUBLIC | FLAG_SIG0 | FLAG_SIG1;

// ── Encode / decode ───────────────────────────────────────────────────────────

/// Encode a signed entry into its canonical bytes.
pub fn encode(signed: &SignedEntry) -> Result<Vec<u8>, WireError> {
    let entry = &signed.entry;
    let type_bytes = entry.transport_type.as_bytes();
    if type_bytes.len() > MAX_TYPE_LEN {
        return Err(WireError::TypeTooLong(type_bytes.len()));
    }

    let mut flags = 0u8;
    if entry.public {
        flags |= FLAG_PUBLIC;
    }
    if signed.signatures[0].is_some() {
        flags |= FLAG_SIG0;
    }
    if signed.signatures[1].is_some() {
        flags |= FLAG_SIG1;
    }

    let header = SignedEntryHeader {
        version: WIRE_VERSION,
        flags,
        type_len: U16::new(type_bytes.len() as u16),
        id: *entry.id.as_bytes(),
        edge0: *entry.edges[0].as_bytes(),
        edge1: *entry.edges[1].as_bytes(),
        sig0: slot_bytes(&signed.signatures[0]),
        sig1: slot_bytes(&signed.signatures[1]),
    };

    let mut out = Vec::with_capacity(HEADER_LEN + type_bytes.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(type_bytes);
    Ok(out)
}

/// Decode canonical bytes into a signed entry.
///
/// Rejects anything that would not re-encode to exactly `bytes`.
pub fn decode(bytes: &[u8]) -> Result<SignedEntry, WireError> {
    let header = SignedEntryHeader::read_from_prefix(bytes).ok_or(WireError::Truncated {
        needed: HEADER_LEN,
        found: bytes.len(),
    })?;

    if header.version != WIRE_VERSION {
        return Err(WireError::UnknownVersion(header.version));
    }
    if header.flags & !FLAGS_KNOWN != 0 {
        return Err(WireError::ReservedFlagsSet(header.flags));
    }

    let type_len = header.type_len.get() as usize;
    if type_len > MAX_TYPE_LEN {
        return Err(WireError::TypeTooLong(type_len));
    }
    let body = &bytes[HEADER_LEN..];
    if body.len() < type_len {
        return Err(WireError::Truncated {
            needed: HEADER_LEN + type_len,
            found: bytes.len(),
        });
    }
    if body.len() > type_len {
        return Err(WireError::TrailingBytes(body.len() - type_len));
    }
    let transport_type = std::str::from_utf8(body)
        .map_err(|_| WireError::InvalidType)?
        .to_string();

    let sig0 = read_slot(header.sig0, header.flags & FLAG_SIG0 != 0, 0)?;
    let sig1 = read_slot(header.sig1, header.flags & FLAG_SIG1 != 0, 1)?;

    Ok(SignedEntry {
        entry: Entry {
            id: Uuid::from_bytes(header.id),
            edges: [NodeId::from_bytes(header.edge0), NodeId::from_bytes(header.edge1)],
            transport_type,
            public: header.flags & FLAG_PUBLIC != 0,
        },
        signatures: [sig0, sig1],
    })
}

fn slot_bytes(sig: &Option<Signature>) -> [u8; SIGNATURE_LEN] {
    sig.map(|s| *s.as_bytes()).unwrap_or([0u8; SIGNATURE_LEN])
}

fn read_slot(
    bytes: [u8; SIGNATURE_LEN],
    present: bool,
    slot: usize,
) -> Result<Option<Signature>, WireError> {
    let zero = bytes == [0u8; SIGNATURE_LEN];
    match (present, zero) {
        (true, false) => Ok(Some(Signature::from_bytes(bytes))),
        (false, true) => Ok(None),
        _ => Err(WireError::InconsistentSlot(slot)),
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("frame truncated: need {needed} bytes, found {found}")]
    Truncated { needed: usize, found: usize },

    #[error("unknown wire version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("reserved flags are non-zero: 0x{0:02x}")]
    ReservedFlagsSet(u8),

    #[error("transport type length {0} exceeds maximum {}", MAX_TYPE_LEN)]
    TypeTooLong(usize),

    #[error("transport type is not valid UTF-8")]
    InvalidType,

    #[error("{0} trailing bytes after transport type")]
    TrailingBytes(usize),

    #[error("signature slot {0} disagrees with its presence flag")]
    InconsistentSlot(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
