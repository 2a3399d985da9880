//! Cryptographic primitives for Tether.
//!
//! Provides two things:
//!   1. BLAKE3 hashing: the digest every entry signature is computed over
//!   2. secp256k1 node identities: keypairs, recoverable signatures, and
//!      recovery of the signer identity from a signature
//!
//! A node's identity is its 33-byte compressed public key. Signatures carry a
//! recovery id so the validator can derive the signer from the signature
//! alone and compare it against the identity the entry claims.
//!
//! Secret key material derives ZeroizeOnDrop and is wiped from memory when dropped.
//! There is no unsafe code in this module.

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length of a compressed secp256k1 public key.
pub const NODE_ID_LEN: usize = 33;

/// Length of a secret scalar.
pub const SECRET_KEY_LEN: usize = 32;

/// Length of a recoverable signature: r (32) || s (32) || recovery id (1).
pub const SIGNATURE_LEN: usize = 65;

// ── BLAKE3 ────────────────────────────────────────────────────────────────────

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Incremental BLAKE3 hasher for payloads assembled from several fields.
///
/// # Example
/// ```
/// use tether_core::crypto::Hasher;
/// let mut h = Hasher::new();
/// h.update(b"hello ");
/// h.update(b"world");
/// let digest = h.finalize();
/// assert_eq!(digest, tether_core::crypto::hash(b"hello world"));
/// ```
pub struct Hasher(blake3::Hasher);

impl Hasher {
    pub fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> [u8; 32] {
        *self.0.finalize().as_bytes()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

// ── NodeId ────────────────────────────────────────────────────────────────────

/// A node's public identity: a compressed secp256k1 public key.
///
/// Ordering is byte-lexicographic over the 33 encoded bytes. Both peers of a
/// transport rely on this order to agree on which edge is edge 0.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    /// Wrap raw bytes without checking that they encode a curve point.
    pub const fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse and check a SEC1-encoded public key.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; NODE_ID_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            expected: NODE_ID_LEN,
            found: bytes.len(),
        })?;
        let id = Self(arr);
        id.verifying_key()?;
        Ok(id)
    }

    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Decode into a curve point. Fails for bytes that are not a valid key.
    pub fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        VerifyingKey::from_sec1_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)
    }

    fn from_verifying_key(key: &VerifyingKey) -> Result<Self, CryptoError> {
        let point = key.to_encoded_point(true);
        let arr: [u8; NODE_ID_LEN] = point
            .as_bytes()
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(&self.0[..8]))
    }
}

impl FromStr for NodeId {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&hex::decode(s)?)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── SecretKey ─────────────────────────────────────────────────────────────────

/// A node's long-term secp256k1 secret key.
///
/// Generated once per node and stored persistently. The matching public
/// identity is derived on construction and kept alongside.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    /// Secret scalar. Zeroized on drop, never exposed directly.
    private: [u8; SECRET_KEY_LEN],
    #[zeroize(skip)]
    public: NodeId,
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        let key = SigningKey::random(&mut OsRng);
        let mut private = [0u8; SECRET_KEY_LEN];
        private.copy_from_slice(&key.to_bytes());
        let public = NodeId::from_verifying_key(key.verifying_key())
            .expect("compressed secp256k1 point is 33 bytes");
        Self { private, public }
    }

    /// Reconstruct a secret key from stored bytes.
    /// The public identity is derived deterministically from the scalar.
    pub fn from_bytes(bytes: [u8; SECRET_KEY_LEN]) -> Result<Self, CryptoError> {
        let key = SigningKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        let public = NodeId::from_verifying_key(key.verifying_key())?;
        Ok(Self {
            private: bytes,
            public,
        })
    }

    /// Parse a hex-encoded secret key, as written to the identity file.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(hex::decode(s.trim())?);
        let arr: [u8; SECRET_KEY_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidLength {
                    expected: SECRET_KEY_LEN,
                    found: bytes.len(),
                })?;
        Self::from_bytes(arr)
    }

    /// Hex-encode the scalar for persistent storage.
    ///
    /// Store these bytes securely (mode 0600). The public identity need not be
    /// stored; it is always derived on load.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.private))
    }

    /// The identity this key signs as.
    pub fn public(&self) -> NodeId {
        self.public
    }

    /// Sign a 32-byte digest, producing a recoverable signature.
    pub fn sign(&self, digest: &[u8; 32]) -> Result<Signature, CryptoError> {
        let key = SigningKey::from_slice(&self.private).map_err(|_| CryptoError::InvalidSecretKey)?;
        let (sig, recovery_id): (EcdsaSignature, RecoveryId) = key
            .sign_prehash_recoverable(digest)
            .map_err(|_| CryptoError::SigningFailed)?;

        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte();
        Ok(Signature(out))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Generate a fresh identity and its secret key.
pub fn generate_keypair() -> (NodeId, SecretKey) {
    let secret = SecretKey::generate();
    (secret.public(), secret)
}

// ── Signature ─────────────────────────────────────────────────────────────────

/// Recoverable ECDSA signature over a BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    pub const fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Recover the identity that produced this signature over `digest`.
    pub fn recover(&self, digest: &[u8; 32]) -> Result<NodeId, CryptoError> {
        let sig = EcdsaSignature::from_slice(&self.0[..64])
            .map_err(|_| CryptoError::MalformedSignature)?;
        let recovery_id =
            RecoveryId::from_byte(self.0[64]).ok_or(CryptoError::MalformedSignature)?;
        let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
            .map_err(|_| CryptoError::RecoveryFailed)?;
        NodeId::from_verifying_key(&key)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..8]))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 65 bytes"))?;
        Ok(Signature(arr))
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CryptoError {
    #[error("secret key is not a valid secp256k1 scalar")]
    InvalidSecretKey,

    #[error("public key is not a valid secp256k1 point")]
    InvalidPublicKey,

    #[error("signature bytes are malformed")]
    MalformedSignature,

    #[error("failed to sign digest")]
    SigningFailed,

    #[error("failed to recover public key from signature")]
    RecoveryFailed,

    #[error("invalid length: expected {expected}, found {found}")]
    InvalidLength { expected: usize, found: usize },

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
