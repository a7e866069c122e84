//! # Keyring Identity
//!
//! In-memory [`IdentityService`]: a secp256k1 keypair, a table of peer
//! certificates, and pairwise MAC keys derived from a deployment secret.
//!
//! ## Pairwise Keys
//!
//! `blake3_derive_key(PAIRWISE_CONTEXT, secret || min(a, b) || max(a, b))`,
//! so both ends of a link derive the same key without a handshake.

use crate::domain::{Mac, NodeId, PbftSignature, MAX_SIGNATURE_SIZE};
use crate::ports::outbound::{IdentityService, PrincipalRef};
use shared_crypto::ecdsa::SIGNATURE_LEN;
use shared_crypto::{
    blake3_derive_key, hmac_sha256, verify_hmac_sha256, CryptoError, Secp256k1KeyPair,
    Secp256k1PublicKey, Secp256k1Signature,
};
use std::collections::HashMap;
use tracing::debug;
use zeroize::Zeroize;

/// Key-derivation context for pairwise MAC keys.
const PAIRWISE_CONTEXT: &str = "pbft-messages 2024 pairwise mac key";

/// Identity service backed by keys held in memory.
pub struct KeyringIdentity {
    local_id: NodeId,
    fault_threshold: usize,
    local_fault_threshold: usize,
    replica_count: usize,
    keypair: Secp256k1KeyPair,
    certificates: HashMap<NodeId, Secp256k1PublicKey>,
    mac_secret: [u8; 32],
}

impl KeyringIdentity {
    /// Identity for `local_id` in a group of `replica_count` replicas.
    /// The fault threshold defaults to `(n - 1) / 3`.
    pub fn new(
        local_id: NodeId,
        replica_count: usize,
        keypair: Secp256k1KeyPair,
        mac_secret: [u8; 32],
    ) -> Self {
        let fault_threshold = replica_count.saturating_sub(1) / 3;
        Self {
            local_id,
            fault_threshold,
            local_fault_threshold: fault_threshold,
            replica_count,
            keypair,
            certificates: HashMap::new(),
            mac_secret,
        }
    }

    /// A full group of `n` replicas sharing each other's certificates.
    pub fn deployment(n: usize, mac_secret: [u8; 32]) -> Vec<Self> {
        let mut group: Vec<Self> = (0..n)
            .map(|id| Self::new(id as NodeId, n, Secp256k1KeyPair::generate(), mac_secret))
            .collect();

        let certificates: Vec<(NodeId, Secp256k1PublicKey)> = group
            .iter()
            .map(|identity| (identity.local_id, identity.public_key()))
            .collect();
        for identity in &mut group {
            for (id, key) in &certificates {
                if *id != identity.local_id {
                    identity.register_certificate(*id, *key);
                }
            }
        }
        group
    }

    /// Override the fault threshold, for the group and this node alike.
    pub fn with_fault_threshold(mut self, f: usize) -> Self {
        self.fault_threshold = f;
        self.local_fault_threshold = f;
        self
    }

    /// Override only this node's own fault threshold.
    pub fn with_local_fault_threshold(mut self, f: usize) -> Self {
        self.local_fault_threshold = f;
        self
    }

    /// Install or replace a peer's certificate.
    pub fn register_certificate(&mut self, id: NodeId, key: Secp256k1PublicKey) {
        debug!(id, "Registered certificate");
        self.certificates.insert(id, key);
    }

    /// Forget a peer's certificate.
    pub fn remove_certificate(&mut self, id: NodeId) -> Option<Secp256k1PublicKey> {
        self.certificates.remove(&id)
    }

    /// Local public key.
    pub fn public_key(&self) -> Secp256k1PublicKey {
        self.keypair.public_key()
    }

    fn pairwise_key(&self, a: NodeId, b: NodeId) -> [u8; 32] {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut material = [0u8; 40];
        material[..32].copy_from_slice(&self.mac_secret);
        material[32..36].copy_from_slice(&lo.to_le_bytes());
        material[36..].copy_from_slice(&hi.to_le_bytes());
        let key = blake3_derive_key(PAIRWISE_CONTEXT, &material);
        material.zeroize();
        key
    }

    fn certificate(&self, id: NodeId) -> Option<Secp256k1PublicKey> {
        if id == self.local_id {
            Some(self.public_key())
        } else {
            self.certificates.get(&id).copied()
        }
    }
}

impl Drop for KeyringIdentity {
    fn drop(&mut self) {
        self.mac_secret.zeroize();
    }
}

impl std::fmt::Debug for KeyringIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringIdentity")
            .field("local_id", &self.local_id)
            .field("fault_threshold", &self.fault_threshold)
            .field("local_fault_threshold", &self.local_fault_threshold)
            .field("replica_count", &self.replica_count)
            .field("certificates", &self.certificates.len())
            .finish_non_exhaustive()
    }
}

impl IdentityService for KeyringIdentity {
    fn local_id(&self) -> NodeId {
        self.local_id
    }

    fn fault_threshold(&self) -> usize {
        self.fault_threshold
    }

    fn local_fault_threshold(&self) -> usize {
        self.local_fault_threshold
    }

    fn replica_count(&self) -> usize {
        self.replica_count
    }

    fn lookup_principal(&self, id: NodeId) -> Option<PrincipalRef> {
        if !self.is_replica(id) {
            return None;
        }
        Some(PrincipalRef {
            id,
            has_certificate: self.certificate(id).is_some(),
        })
    }

    fn sign(&self, bytes: &[u8]) -> Result<PbftSignature, CryptoError> {
        let signature = self.keypair.sign(bytes);
        PbftSignature::from_slice(signature.as_bytes()).map_err(|_| {
            CryptoError::InvalidSignatureFormat {
                expected: MAX_SIGNATURE_SIZE,
                actual: SIGNATURE_LEN,
            }
        })
    }

    fn verify(&self, principal: &PrincipalRef, bytes: &[u8], signature: &PbftSignature) -> bool {
        let Some(key) = self.certificate(principal.id) else {
            return false;
        };
        match Secp256k1Signature::from_slice(signature.as_slice()) {
            Ok(sig) => key.verify(bytes, &sig).is_ok(),
            Err(_) => false,
        }
    }

    fn gen_mac(&self, dst: NodeId, bytes: &[u8]) -> Option<Mac> {
        if !self.is_replica(dst) {
            return None;
        }
        Some(hmac_sha256(&self.pairwise_key(self.local_id, dst), bytes))
    }

    fn verify_mac(&self, src: NodeId, bytes: &[u8], mac: &[u8]) -> bool {
        self.is_replica(src) && verify_hmac_sha256(&self.pairwise_key(src, self.local_id), bytes, mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_parameters() {
        let group = KeyringIdentity::deployment(7, [0u8; 32]);
        assert_eq!(group.len(), 7);
        assert_eq!(group[3].local_id(), 3);
        assert_eq!(group[3].fault_threshold(), 2);
        assert_eq!(group[3].local_fault_threshold(), 2);
        assert!(group[3].is_replica(6));
        assert!(!group[3].is_replica(7));
        assert!(!group[3].is_replica(-1));
    }

    #[test]
    fn test_principal_lookup() {
        let mut group = KeyringIdentity::deployment(4, [0u8; 32]);
        assert_eq!(
            group[0].lookup_principal(2),
            Some(PrincipalRef {
                id: 2,
                has_certificate: true
            })
        );
        assert_eq!(group[0].lookup_principal(9), None);

        group[0].remove_certificate(2);
        assert!(!group[0].lookup_principal(2).unwrap().has_certificate);
        assert!(group[0].local_principal().has_certificate);
    }

    #[test]
    fn test_signatures_cross_verify() {
        let group = KeyringIdentity::deployment(4, [0u8; 32]);
        let signature = group[1].sign(b"payload").unwrap();
        assert_eq!(signature.len(), SIGNATURE_LEN);

        let signer = group[0].lookup_principal(1).unwrap();
        assert!(group[0].verify(&signer, b"payload", &signature));
        assert!(!group[0].verify(&signer, b"other", &signature));

        let wrong = group[0].lookup_principal(2).unwrap();
        assert!(!group[0].verify(&wrong, b"payload", &signature));
    }

    #[test]
    fn test_pairwise_macs_are_symmetric() {
        let group = KeyringIdentity::deployment(4, [9u8; 32]);
        let mac = group[1].gen_mac(2, b"msg").unwrap();
        assert!(group[2].verify_mac(1, b"msg", &mac));
        assert!(!group[3].verify_mac(1, b"msg", &mac));
        assert!(group[1].gen_mac(4, b"msg").is_none());
    }

    #[test]
    fn test_secret_separates_deployments() {
        let a = KeyringIdentity::deployment(2, [1u8; 32]);
        let b = KeyringIdentity::deployment(2, [2u8; 32]);
        let mac = a[0].gen_mac(1, b"msg").unwrap();
        assert!(!b[1].verify_mac(0, b"msg", &mac));
    }
}
