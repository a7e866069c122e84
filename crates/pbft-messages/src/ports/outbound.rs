//! # Outbound Ports (Driven Ports / SPI)
//!
//! The cryptographic identity service this layer calls into. Key
//! generation, certificate distribution and the primitives themselves live
//! behind this trait.

use crate::domain::{Mac, NodeId, PbftSignature};
use crate::domain::{MAC_SIZE, MAX_SIGNATURE_SIZE};
use shared_crypto::CryptoError;

/// A remote replica's verification capability, as seen by the local node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PrincipalRef {
    /// Replica id
    pub id: NodeId,
    /// Whether a certificate (public key) is on file for this principal
    pub has_certificate: bool,
}

/// This replica's signing and verifying capability plus quorum parameters.
///
/// All calls are synchronous and may block on cryptographic work.
/// Implementations must be thread-safe (`Send + Sync`).
pub trait IdentityService: Send + Sync {
    /// Id of the local replica.
    fn local_id(&self) -> NodeId;

    /// Fault threshold `f`.
    fn fault_threshold(&self) -> usize;

    /// Fault threshold this node was started with. Differs from
    /// [`fault_threshold`](Self::fault_threshold) while the node is still
    /// bootstrapping against a group it has no certificates for.
    fn local_fault_threshold(&self) -> usize {
        self.fault_threshold()
    }

    /// Number of replicas `n` (at least `3f + 1`).
    fn replica_count(&self) -> usize;

    /// True iff `id` names a replica of this deployment.
    fn is_replica(&self, id: NodeId) -> bool {
        id >= 0 && (id as usize) < self.replica_count()
    }

    /// Look up a principal by id.
    fn lookup_principal(&self, id: NodeId) -> Option<PrincipalRef>;

    /// The local replica as a principal.
    fn local_principal(&self) -> PrincipalRef {
        self.lookup_principal(self.local_id())
            .unwrap_or(PrincipalRef {
                id: self.local_id(),
                has_certificate: true,
            })
    }

    /// Sign `bytes` with the local key.
    fn sign(&self, bytes: &[u8]) -> Result<PbftSignature, CryptoError>;

    /// Verify `signature` over `bytes` against `principal`'s certificate.
    fn verify(&self, principal: &PrincipalRef, bytes: &[u8], signature: &PbftSignature) -> bool;

    /// MAC `bytes` with the key shared between the local replica and `dst`.
    fn gen_mac(&self, dst: NodeId, bytes: &[u8]) -> Option<Mac>;

    /// Check a MAC that `src` computed for the local replica.
    fn verify_mac(&self, src: NodeId, bytes: &[u8], mac: &[u8]) -> bool;

    /// Size of the broadcast MAC authenticator a message from `for_id` must
    /// carry: one MAC slot per replica.
    fn mac_size(&self, _for_id: NodeId) -> usize {
        self.replica_count() * MAC_SIZE
    }

    /// Largest signature the service can produce.
    fn max_signature_size(&self) -> usize {
        MAX_SIGNATURE_SIZE
    }
}
