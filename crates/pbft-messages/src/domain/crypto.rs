//! # Digest / Crypto Contract Types
//!
//! Fixed-size values every message is built from: batch digests, merkle
//! roots, signature buffers, MAC tags, and the attested tuple that prepare
//! votes and receipt proofs sign.

use super::errors::{MessageError, MessageResult};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;

/// SHA-256 digest length.
pub const DIGEST_SIZE: usize = 32;

/// Merkle root length.
pub const MERKLE_ROOT_SIZE: usize = 32;

/// HMAC-SHA256 tag length.
pub const MAC_SIZE: usize = shared_crypto::MAC_LEN;

/// Capacity of a [`PbftSignature`] buffer.
pub const MAX_SIGNATURE_SIZE: usize = 96;

/// Domain tag prefixed to the attested tuple.
pub const DOMAIN_PREPARE: &[u8] = b"PREPARE";

/// Merkle root of the replicated state after executing a batch.
pub type MerkleRoot = [u8; MERKLE_ROOT_SIZE];

/// Pairwise MAC tag.
pub type Mac = [u8; MAC_SIZE];

/// Hash of a per-vote random nonce.
pub type NonceHash = u64;

// =============================================================================
// DIGEST
// =============================================================================

/// Cryptographic hash of a batch or message. Equality is byte-exact.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Wrap raw digest bytes.
    pub const fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Digest of `data`.
    pub fn of(data: &[u8]) -> Self {
        Self(shared_crypto::sha256(data))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Integer summary: the first 8 bytes read little-endian.
    pub fn hash(&self) -> u64 {
        let mut head = [0u8; 8];
        head.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(head)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(&self.0[..8]))
    }
}

/// Hash of a vote nonce: the integer summary of `Digest::of(nonce)`.
pub fn nonce_hash(nonce: u64) -> NonceHash {
    Digest::of(&nonce.to_le_bytes()).hash()
}

// =============================================================================
// SIGNATURE BUFFER
// =============================================================================

/// Fixed-capacity signature buffer with its actual length.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PbftSignature {
    #[serde_as(as = "Bytes")]
    bytes: [u8; MAX_SIGNATURE_SIZE],
    len: u32,
}

impl PbftSignature {
    /// An empty (zero-length, zero-filled) buffer.
    pub const fn empty() -> Self {
        Self {
            bytes: [0u8; MAX_SIGNATURE_SIZE],
            len: 0,
        }
    }

    /// Copy `sig` into a buffer, rejecting signatures longer than the capacity.
    pub fn from_slice(sig: &[u8]) -> MessageResult<Self> {
        if sig.len() > MAX_SIGNATURE_SIZE {
            return Err(MessageError::SignatureTooLong {
                len: sig.len(),
                max: MAX_SIGNATURE_SIZE,
            });
        }
        let mut bytes = [0u8; MAX_SIGNATURE_SIZE];
        bytes[..sig.len()].copy_from_slice(sig);
        Ok(Self {
            bytes,
            len: sig.len() as u32,
        })
    }

    /// Rebuild from a full wire buffer and a declared length.
    pub fn from_parts(bytes: [u8; MAX_SIGNATURE_SIZE], len: u32) -> MessageResult<Self> {
        if len as usize > MAX_SIGNATURE_SIZE {
            return Err(MessageError::DeclaredSizeExceedsBuffer {
                field: "signature",
                declared: len as usize,
                limit: MAX_SIGNATURE_SIZE,
            });
        }
        Ok(Self { bytes, len })
    }

    /// The signature bytes (`len` long).
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// The whole fixed-capacity buffer, as laid out on the wire.
    pub fn buffer(&self) -> &[u8; MAX_SIGNATURE_SIZE] {
        &self.bytes
    }

    /// Actual signature length.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True when no signature is stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for PbftSignature {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for PbftSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.len().min(8);
        write!(
            f,
            "PbftSignature(len={}, {}..)",
            self.len,
            hex::encode(&self.bytes[..shown])
        )
    }
}

// =============================================================================
// ATTESTED TUPLE
// =============================================================================

/// The `(digest, merkle root, hashed nonce)` triple a replica signs to vouch
/// that it executed a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttestedTuple {
    pub digest: Digest,
    pub merkle_root: MerkleRoot,
    pub hashed_nonce: NonceHash,
}

impl AttestedTuple {
    /// Encoded length of [`Self::signing_bytes`].
    pub const SIGNING_LEN: usize = DOMAIN_PREPARE.len() + DIGEST_SIZE + MERKLE_ROOT_SIZE + 8;

    pub fn new(digest: Digest, merkle_root: MerkleRoot, hashed_nonce: NonceHash) -> Self {
        Self {
            digest,
            merkle_root,
            hashed_nonce,
        }
    }

    /// Bytes covered by the signature.
    ///
    /// Format: `PREPARE` || digest || merkle_root || hashed_nonce (LE)
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(Self::SIGNING_LEN);
        message.extend_from_slice(DOMAIN_PREPARE);
        message.extend_from_slice(self.digest.as_bytes());
        message.extend_from_slice(&self.merkle_root);
        message.extend_from_slice(&self.hashed_nonce.to_le_bytes());
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hash_is_le_prefix() {
        let mut bytes = [0u8; DIGEST_SIZE];
        bytes[0] = 0x01;
        bytes[1] = 0x02;
        assert_eq!(Digest::from_bytes(bytes).hash(), 0x0201);
    }

    #[test]
    fn test_nonce_hash_deterministic() {
        assert_eq!(nonce_hash(42), nonce_hash(42));
        assert_ne!(nonce_hash(42), nonce_hash(43));
    }

    #[test]
    fn test_signature_capacity_enforced() {
        assert!(PbftSignature::from_slice(&[7u8; MAX_SIGNATURE_SIZE]).is_ok());
        assert_eq!(
            PbftSignature::from_slice(&[7u8; MAX_SIGNATURE_SIZE + 1]),
            Err(MessageError::SignatureTooLong {
                len: MAX_SIGNATURE_SIZE + 1,
                max: MAX_SIGNATURE_SIZE
            })
        );
    }

    #[test]
    fn test_signature_slice_matches_len() {
        let sig = PbftSignature::from_slice(&[9u8; 64]).unwrap();
        assert_eq!(sig.len(), 64);
        assert_eq!(sig.as_slice(), &[9u8; 64][..]);
        assert!(sig.buffer()[64..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_from_parts_rejects_oversized_length() {
        let result = PbftSignature::from_parts([0u8; MAX_SIGNATURE_SIZE], 97);
        assert!(matches!(
            result,
            Err(MessageError::DeclaredSizeExceedsBuffer { declared: 97, .. })
        ));
    }

    #[test]
    fn test_attested_tuple_layout() {
        let tuple = AttestedTuple::new(Digest::of(b"batch"), [3u8; 32], 0xAABB);
        let bytes = tuple.signing_bytes();
        assert_eq!(bytes.len(), AttestedTuple::SIGNING_LEN);
        assert_eq!(&bytes[..7], b"PREPARE");
        assert_eq!(&bytes[bytes.len() - 8..], &0xAABBu64.to_le_bytes());
    }
}
