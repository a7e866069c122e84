//! # Hashing
//!
//! SHA-256 for message digests, BLAKE3 for key derivation.
//!
//! ## Usage
//!
//! - `sha256`: batch and message digests carried on the wire
//! - `blake3_derive_key`: pairwise MAC keys derived from a deployment secret

use sha2::{Digest, Sha256};

/// 256-bit hash output.
pub type Hash = [u8; 32];

/// Hash data with SHA-256 (one-shot).
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Derive key from context and input key material.
pub fn blake3_derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let hash = sha256(b"abc");
        assert_eq!(
            hex::encode(hash),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(sha256(b"test"), sha256(b"test"));
        assert_ne!(sha256(b"input1"), sha256(b"input2"));
    }

    #[test]
    fn test_derive_key_context_separation() {
        let k1 = blake3_derive_key("pbft pairwise mac", b"material");
        let k2 = blake3_derive_key("pbft other context", b"material");
        assert_ne!(k1, k2);
        assert_eq!(k1, blake3_derive_key("pbft pairwise mac", b"material"));
    }
}
