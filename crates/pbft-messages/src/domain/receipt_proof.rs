//! # Receipt Proof
//!
//! Per-replica signatures over one attested tuple for a single sequence
//! number. Once a quorum of valid entries is collected the receipt proves,
//! after the fact, that the batch was agreed and executed.
//!
//! ## Record Layout (184 bytes, little-endian)
//!
//! ```text
//! id i32 | seqno i64 | digest [32] | merkle_root [32] | hashed_nonce u64
//!        | signature [96] | signature_len u32
//! ```

use super::context::ReplicaContext;
use super::crypto::{AttestedTuple, Digest, MerkleRoot, NonceHash, PbftSignature};
use super::errors::{MessageError, MessageResult};
use super::wire::{WireReader, WireWriter};
use super::{NodeId, Seqno};
use std::collections::BTreeMap;
use tracing::warn;

/// One replica's signature over the attested tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Proof {
    pub id: NodeId,
    pub seqno: Seqno,
    pub digest: Digest,
    pub merkle_root: MerkleRoot,
    pub hashed_nonce: NonceHash,
    pub signature: PbftSignature,
}

impl Proof {
    /// Serialized record size.
    pub const RECORD_SIZE: usize = 4 + 8 + 32 + 32 + 8 + super::MAX_SIGNATURE_SIZE + 4;

    pub fn tuple(&self) -> AttestedTuple {
        AttestedTuple::new(self.digest, self.merkle_root, self.hashed_nonce)
    }

    fn write(&self, w: &mut WireWriter) {
        w.put_i32(self.id)
            .put_i64(self.seqno)
            .put_bytes(self.digest.as_bytes())
            .put_bytes(&self.merkle_root)
            .put_u64(self.hashed_nonce)
            .put_bytes(self.signature.buffer())
            .put_u32(self.signature.len() as u32);
    }

    fn read(r: &mut WireReader<'_>) -> MessageResult<Self> {
        let id = r.i32("proof.id")?;
        let seqno = r.i64("proof.seqno")?;
        let digest = Digest::from_bytes(r.array("proof.digest")?);
        let merkle_root = r.array("proof.merkle_root")?;
        let hashed_nonce = r.u64("proof.hashed_nonce")?;
        let buffer = r.array("proof.signature")?;
        let len = r.u32("proof.signature_len")?;
        Ok(Self {
            id,
            seqno,
            digest,
            merkle_root,
            hashed_nonce,
            signature: PbftSignature::from_parts(buffer, len)?,
        })
    }
}

/// Signatures collected for one sequence number, keyed by replica id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReceiptProof {
    seqno: Seqno,
    proofs: BTreeMap<NodeId, Proof>,
}

impl ReceiptProof {
    pub fn new(seqno: Seqno) -> Self {
        Self {
            seqno,
            proofs: BTreeMap::new(),
        }
    }

    /// Record `id`'s signature. A second proof for a known id replaces only
    /// the stored signature (bytes and length).
    pub fn add_proof(
        &mut self,
        id: NodeId,
        seqno: Seqno,
        tuple: AttestedTuple,
        signature: PbftSignature,
    ) {
        self.proofs
            .entry(id)
            .and_modify(|proof| proof.signature = signature)
            .or_insert(Proof {
                id,
                seqno,
                digest: tuple.digest,
                merkle_root: tuple.merkle_root,
                hashed_nonce: tuple.hashed_nonce,
                signature,
            });
    }

    /// True iff every entry verifies. Entries must also agree with the
    /// receipt's seqno and with each other's attested tuple. Empty receipts
    /// are vacuously valid; use [`ReceiptProof::has_quorum`] for the count.
    pub fn verify_proofs(&self, ctx: &ReplicaContext<'_>) -> bool {
        let identity = ctx.identity();
        let expected = self.proofs.values().next().map(Proof::tuple);
        let mut result = true;

        for (id, proof) in &self.proofs {
            if proof.seqno != self.seqno || Some(proof.tuple()) != expected {
                warn!(
                    id,
                    seqno = proof.seqno,
                    receipt_seqno = self.seqno,
                    "Receipt proof entry does not match the receipt"
                );
                result = false;
                continue;
            }

            let principal = if *id == ctx.local_id() {
                Some(identity.local_principal())
            } else {
                identity.lookup_principal(*id)
            };
            let valid = match principal {
                Some(principal) => {
                    identity.verify(&principal, &proof.tuple().signing_bytes(), &proof.signature)
                }
                None => false,
            };
            if !valid {
                warn!(id, seqno = self.seqno, "Receipt proof signature invalid");
            }
            result = result && valid;
        }

        result
    }

    /// At least `2f + 1` entries, all valid.
    pub fn has_quorum(&self, ctx: &ReplicaContext<'_>) -> bool {
        self.count() >= ctx.quorum() && self.verify_proofs(ctx)
    }

    /// Exact size of [`ReceiptProof::copy_out_proofs`] output.
    pub fn get_size_of_proofs(&self) -> usize {
        self.proofs.len() * Proof::RECORD_SIZE
    }

    /// Serialize every entry into `dest` in id order. Returns bytes written.
    pub fn copy_out_proofs(&self, dest: &mut [u8]) -> MessageResult<usize> {
        let size = self.get_size_of_proofs();
        if dest.len() < size {
            return Err(MessageError::DeclaredSizeExceedsBuffer {
                field: "proofs",
                declared: size,
                limit: dest.len(),
            });
        }

        let mut w = WireWriter::with_capacity(size);
        for proof in self.proofs.values() {
            proof.write(&mut w);
        }
        dest[..size].copy_from_slice(&w.into_bytes());
        Ok(size)
    }

    /// Rebuild a receipt from [`ReceiptProof::copy_out_proofs`] output.
    pub fn decode_proofs(seqno: Seqno, bytes: &[u8]) -> MessageResult<Self> {
        let trailing = bytes.len() % Proof::RECORD_SIZE;
        if trailing != 0 {
            return Err(MessageError::TrailingBytes(trailing));
        }

        let mut receipt = Self::new(seqno);
        let mut r = WireReader::new(bytes);
        while r.remaining() > 0 {
            let proof = Proof::read(&mut r)?;
            receipt.proofs.insert(proof.id, proof);
        }
        Ok(receipt)
    }

    /// Number of distinct replicas with a proof.
    pub fn count(&self) -> usize {
        self.proofs.len()
    }

    pub fn seqno(&self) -> Seqno {
        self.seqno
    }

    pub fn proof(&self, id: NodeId) -> Option<&Proof> {
        self.proofs.get(&id)
    }

    /// Entries in id order.
    pub fn proofs(&self) -> impl Iterator<Item = &Proof> {
        self.proofs.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::KeyringIdentity;
    use crate::domain::config::ProtocolConfig;
    use crate::domain::crypto::nonce_hash;
    use crate::domain::prepare::Prepare;

    fn tuple() -> AttestedTuple {
        AttestedTuple::new(Digest::of(b"batch-42"), [9u8; 32], nonce_hash(5))
    }

    fn signed(identity: &KeyringIdentity, config: &ProtocolConfig) -> PbftSignature {
        let ctx = ReplicaContext::new(identity, config).unwrap();
        let t = tuple();
        Prepare::sign(&ctx, &t.merkle_root, t.hashed_nonce, &t.digest).unwrap()
    }

    #[test]
    fn test_add_proof_overwrites_signature() {
        let ids = KeyringIdentity::deployment(4, [1u8; 32]);
        let config = ProtocolConfig::default();
        let ctx = ReplicaContext::new(&ids[0], &config).unwrap();

        let mut receipt = ReceiptProof::new(42);
        receipt.add_proof(3, 42, tuple(), PbftSignature::from_slice(&[1u8; 64]).unwrap());
        assert!(!receipt.verify_proofs(&ctx));

        let good = signed(&ids[3], &config);
        receipt.add_proof(3, 42, tuple(), good);
        assert_eq!(receipt.count(), 1);
        assert_eq!(receipt.proof(3).unwrap().signature, good);
        assert!(receipt.verify_proofs(&ctx));
    }

    #[test]
    fn test_local_entry_cannot_mask_remote_failure() {
        let ids = KeyringIdentity::deployment(4, [1u8; 32]);
        let config = ProtocolConfig::default();
        let ctx = ReplicaContext::new(&ids[3], &config).unwrap();

        let mut receipt = ReceiptProof::new(42);
        receipt.add_proof(0, 42, tuple(), PbftSignature::from_slice(&[2u8; 64]).unwrap());
        receipt.add_proof(3, 42, tuple(), signed(&ids[3], &config));
        assert!(!receipt.verify_proofs(&ctx));
    }

    #[test]
    fn test_mismatched_entries_rejected() {
        let ids = KeyringIdentity::deployment(4, [1u8; 32]);
        let config = ProtocolConfig::default();
        let ctx = ReplicaContext::new(&ids[0], &config).unwrap();

        let mut receipt = ReceiptProof::new(42);
        receipt.add_proof(1, 43, tuple(), signed(&ids[1], &config));
        assert!(!receipt.verify_proofs(&ctx));
    }

    #[test]
    fn test_empty_receipt_has_no_quorum() {
        let ids = KeyringIdentity::deployment(4, [1u8; 32]);
        let config = ProtocolConfig::default();
        let ctx = ReplicaContext::new(&ids[0], &config).unwrap();

        let receipt = ReceiptProof::new(1);
        assert!(receipt.verify_proofs(&ctx));
        assert!(!receipt.has_quorum(&ctx));
        assert_eq!(receipt.get_size_of_proofs(), 0);
    }

    #[test]
    fn test_copy_out_and_decode() {
        let ids = KeyringIdentity::deployment(4, [1u8; 32]);
        let config = ProtocolConfig::default();

        let mut receipt = ReceiptProof::new(42);
        for id in [2, 0, 1] {
            receipt.add_proof(id, 42, tuple(), signed(&ids[id as usize], &config));
        }
        assert_eq!(Proof::RECORD_SIZE, 184);
        assert_eq!(receipt.get_size_of_proofs(), 3 * 184);

        let mut small = vec![0u8; 100];
        assert!(receipt.copy_out_proofs(&mut small).is_err());

        let mut buf = vec![0u8; receipt.get_size_of_proofs()];
        assert_eq!(receipt.copy_out_proofs(&mut buf).unwrap(), buf.len());
        // Id order
        assert_eq!(&buf[..4], &0i32.to_le_bytes());
        assert_eq!(&buf[184..188], &1i32.to_le_bytes());

        let decoded = ReceiptProof::decode_proofs(42, &buf).unwrap();
        assert_eq!(decoded, receipt);
        assert_eq!(
            ReceiptProof::decode_proofs(42, &buf[..200]),
            Err(MessageError::TrailingBytes(16))
        );
    }
}
