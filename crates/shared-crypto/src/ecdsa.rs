//! # Replica Signatures (secp256k1)
//!
//! Every replica holds one secp256k1 key. Peers know it through a
//! certificate carrying the compressed SEC1 encoding.
//!
//! Signing is RFC 6979 deterministic and low-S normalized, so the same
//! attested tuple always yields the same 64 bytes.

use crate::CryptoError;
use k256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};

/// Compact `r || s` signature length.
pub const SIGNATURE_LEN: usize = 64;

/// Compressed SEC1 public key length.
pub const PUBLIC_KEY_LEN: usize = 33;

/// A replica's certificate key, stored compressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Secp256k1PublicKey([u8; PUBLIC_KEY_LEN]);

impl Secp256k1PublicKey {
    fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(true);
        let mut compressed = [0u8; PUBLIC_KEY_LEN];
        compressed.copy_from_slice(point.as_bytes());
        Self(compressed)
    }

    /// Compressed encoding.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Check `signature` over `message`. High-S signatures are rejected.
    pub fn verify(&self, message: &[u8], signature: &Secp256k1Signature) -> Result<(), CryptoError> {
        let key =
            VerifyingKey::from_sec1_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = Signature::from_slice(&signature.0)
            .map_err(|_| CryptoError::SignatureVerificationFailed)?;
        key.verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

/// Compact ECDSA signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Secp256k1Signature([u8; SIGNATURE_LEN]);

impl Secp256k1Signature {
    /// Wrap exactly [`SIGNATURE_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        <[u8; SIGNATURE_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidSignatureFormat {
                expected: SIGNATURE_LEN,
                actual: bytes.len(),
            })
    }

    /// Raw `r || s` bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

/// A replica's signing key with its public half cached.
pub struct Secp256k1KeyPair {
    signing_key: SigningKey,
    public_key: Secp256k1PublicKey,
}

impl Secp256k1KeyPair {
    /// Fresh key from the thread RNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    /// Key from a 32-byte scalar. Zero and out-of-range scalars are rejected.
    pub fn from_secret(secret: &[u8; 32]) -> Result<Self, CryptoError> {
        SigningKey::from_bytes(secret.into())
            .map(Self::from_signing_key)
            .map_err(|_| CryptoError::InvalidPrivateKey)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = Secp256k1PublicKey::from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            public_key,
        }
    }

    /// Certificate key for peers.
    pub fn public_key(&self) -> Secp256k1PublicKey {
        self.public_key
    }

    /// Deterministic signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Secp256k1Signature {
        let sig: Signature = self.signing_key.sign(message);
        Secp256k1Signature(sig.to_bytes().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_signature_verifies_under_certificate() {
        let replica = Secp256k1KeyPair::generate();
        let tuple = b"PREPARE view=1 seqno=7";

        let signature = replica.sign(tuple);
        assert!(replica.public_key().verify(tuple, &signature).is_ok());
        assert_eq!(
            replica.public_key().verify(b"PREPARE view=1 seqno=8", &signature),
            Err(CryptoError::SignatureVerificationFailed)
        );
    }

    #[test]
    fn test_certificate_of_another_replica_rejects() {
        let signer = Secp256k1KeyPair::generate();
        let peer = Secp256k1KeyPair::generate();
        let signature = signer.sign(b"batch");
        assert!(peer.public_key().verify(b"batch", &signature).is_err());
    }

    #[test]
    fn test_fixed_secret_signs_deterministically() {
        let replica = Secp256k1KeyPair::from_secret(&[0x42; 32]).unwrap();
        assert_eq!(replica.sign(b"tuple"), replica.sign(b"tuple"));
        assert_ne!(replica.sign(b"tuple"), replica.sign(b"other"));
    }

    #[test]
    fn test_zero_secret_rejected() {
        assert!(matches!(
            Secp256k1KeyPair::from_secret(&[0u8; 32]),
            Err(CryptoError::InvalidPrivateKey)
        ));
    }

    #[test]
    fn test_signature_length_checked() {
        assert_eq!(
            Secp256k1Signature::from_slice(&[0u8; 63]),
            Err(CryptoError::InvalidSignatureFormat {
                expected: SIGNATURE_LEN,
                actual: 63
            })
        );
        assert!(Secp256k1Signature::from_slice(&[0u8; SIGNATURE_LEN]).is_ok());
    }

    #[test]
    fn test_certificate_is_compressed() {
        let replica = Secp256k1KeyPair::generate();
        assert!(matches!(replica.public_key().as_bytes()[0], 0x02 | 0x03));
    }

    #[test]
    fn test_same_secret_same_certificate() {
        let a = Secp256k1KeyPair::from_secret(&[0x11; 32]).unwrap();
        let b = Secp256k1KeyPair::from_secret(&[0x11; 32]).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }
}
