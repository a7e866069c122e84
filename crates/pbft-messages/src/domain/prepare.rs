//! # Prepare Vote
//!
//! A non-primary replica's endorsement of a pre-prepare at `(view, seqno,
//! digest)`. Besides the message authenticator, a vote carries a signature
//! over the attested tuple so it can later be folded into a receipt proof.
//!
//! ## Wire Layout
//!
//! ```text
//! 0    view            i64
//! 8    seqno           i64
//! 16   digest          [u8; 32]
//! 48   merkle_root     [u8; 32]
//! 80   id              i32
//! 84   hashed_nonce    u64
//! 92   flag            u8     0 = broadcast, 1 = targeted
//! 93   digest_sig_size u32
//! 97   digest_sig      [u8; 96]
//! 193  auth_sig_size   u32    signature mode only
//!      authenticator   ...
//! ```
//!
//! The authenticator covers `[0, 193)`.
//!
//! ## Acceptance
//!
//! `pre_verify` screens a vote in order, stopping at the first decision:
//! 1. `f == 0`: accept
//! 2. Sender is not a replica, or is the local replica: reject
//! 3. Sender has no certificate and the node's own fault threshold is 0:
//!    accept (bootstrap)
//! 4. Digest signature invalid: reject under `Enforce`, log under `Audit`
//! 5. Sender is the primary, or authenticator region too short: reject

use super::config::DigestSignaturePolicy;
use super::context::ReplicaContext;
use super::crypto::{
    nonce_hash, AttestedTuple, Digest, MerkleRoot, NonceHash, PbftSignature, MAC_SIZE,
    MAX_SIGNATURE_SIZE,
};
use super::envelope::{AuthKind, AuthLayout, AuthMode, Authenticator, MacStrategy};
use super::errors::{MessageError, MessageResult};
use super::wire::{WireReader, WireWriter};
use super::{NodeId, Seqno, View};
use crate::ports::inbound::ProtocolMessage;
use crate::ports::outbound::PrincipalRef;
use tracing::{debug, trace, warn};

/// Bytes covered by the authenticator.
pub const PREPARE_HEADER_LEN: usize = 193;

/// Header length when the signature-length field is present.
pub const PREPARE_HEADER_SIG_LEN: usize = PREPARE_HEADER_LEN + 4;

/// What the vote endorses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrepareFields {
    pub view: View,
    pub seqno: Seqno,
    pub digest: Digest,
    pub merkle_root: MerkleRoot,
    /// Random per-vote nonce; only its hash goes on the wire
    pub nonce: u64,
}

/// Construction switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrepareOptions {
    /// Sign the attested tuple now. When false the digest signature stays
    /// empty until [`Prepare::save_signature`].
    pub is_signed: bool,
    /// Build the vote on behalf of another replica (replay, testing)
    pub sender_override: Option<NodeId>,
    /// In signature mode, sign the broadcast authenticator now
    pub should_sign: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            is_signed: true,
            sender_override: None,
            should_sign: true,
        }
    }
}

/// Outcome of the screening steps shared by `pre_verify` and `verify`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Verdict {
    Reject,
    /// Passed every check; the authenticator still needs checking
    Accept,
    /// Accepted without authenticator checks (f = 0 or bootstrap)
    Trusted,
}

/// A prepare vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prepare {
    view: View,
    seqno: Seqno,
    digest: Digest,
    merkle_root: MerkleRoot,
    id: NodeId,
    hashed_nonce: NonceHash,
    kind: AuthKind,
    digest_signature: PbftSignature,
    /// Known only to the replica that built the vote
    nonce: Option<u64>,
    /// Recipient of a targeted vote
    destination: Option<NodeId>,
    auth: Authenticator,
}

impl Prepare {
    /// Build and authenticate a vote.
    ///
    /// With `dst` the vote is MAC'd for that principal alone. Without it the
    /// vote is broadcast and sealed with the deployment's strategy; in
    /// signature mode the seal is skipped when `options.should_sign` is false
    /// and the region stays zeroed until [`Prepare::authenticate`].
    pub fn new(
        ctx: &ReplicaContext<'_>,
        fields: PrepareFields,
        dst: Option<&PrincipalRef>,
        options: PrepareOptions,
    ) -> MessageResult<Self> {
        let id = options
            .sender_override
            .filter(|id| *id >= 0)
            .unwrap_or_else(|| ctx.local_id());
        let hashed_nonce = nonce_hash(fields.nonce);

        let digest_signature = if options.is_signed {
            Self::sign(ctx, &fields.merkle_root, hashed_nonce, &fields.digest)?
        } else {
            PbftSignature::empty()
        };

        let mut prepare = Self {
            view: fields.view,
            seqno: fields.seqno,
            digest: fields.digest,
            merkle_root: fields.merkle_root,
            id,
            hashed_nonce,
            kind: if dst.is_some() {
                AuthKind::Targeted
            } else {
                AuthKind::Broadcast
            },
            digest_signature,
            nonce: Some(fields.nonce),
            destination: dst.map(|p| p.id),
            auth: Authenticator::default(),
        };

        match dst {
            Some(_) => prepare.authenticate(ctx)?,
            None if ctx.auth_mode() == AuthMode::Signature && !options.should_sign => {
                let size = ctx.strategy().authenticator_size(ctx.identity(), id);
                prepare.auth = Authenticator {
                    region: vec![0u8; size],
                    sig_len: 0,
                };
            }
            None => prepare.authenticate(ctx)?,
        }

        trace!(
            sender = id,
            view = prepare.view,
            seqno = prepare.seqno,
            kind = ?prepare.kind,
            "Built prepare"
        );
        Ok(prepare)
    }

    /// Seal the vote for its destination, or for every replica when broadcast.
    pub fn authenticate(&mut self, ctx: &ReplicaContext<'_>) -> MessageResult<()> {
        let covered = self.covered_bytes();
        self.auth = match self.kind {
            AuthKind::Broadcast => ctx.strategy().authenticate(ctx.identity(), &covered)?,
            AuthKind::Targeted => {
                let dst = self.destination.ok_or(MessageError::MissingDestination)?;
                MacStrategy::authenticate_for(ctx.identity(), dst, &covered)?
            }
        };
        Ok(())
    }

    /// Recompute the authenticator before resending to `principal`.
    ///
    /// A targeted MAC is only valid under its recipient's pairwise key, so
    /// it is regenerated for the new destination. Broadcast MAC vectors are
    /// regenerated in place; a broadcast signature already serves everyone.
    pub fn re_authenticate(
        &mut self,
        ctx: &ReplicaContext<'_>,
        principal: &PrincipalRef,
    ) -> MessageResult<()> {
        match self.kind {
            AuthKind::Targeted => {
                self.destination = Some(principal.id);
                self.authenticate(ctx)
            }
            AuthKind::Broadcast if ctx.auth_mode() == AuthMode::Mac => self.authenticate(ctx),
            AuthKind::Broadcast => Ok(()),
        }
    }

    // =========================================================================
    // VERIFICATION
    // =========================================================================

    /// Screen a received vote without checking its authenticator.
    pub fn pre_verify(&self, ctx: &ReplicaContext<'_>) -> bool {
        self.screen(ctx) != Verdict::Reject
    }

    /// `pre_verify` plus the authenticator check for the local replica.
    pub fn verify(&self, ctx: &ReplicaContext<'_>) -> bool {
        match self.screen(ctx) {
            Verdict::Reject => false,
            Verdict::Trusted => true,
            Verdict::Accept => self.authenticator_valid(ctx),
        }
    }

    fn screen(&self, ctx: &ReplicaContext<'_>) -> Verdict {
        if ctx.f() == 0 {
            return Verdict::Trusted;
        }

        let identity = ctx.identity();
        if !identity.is_replica(self.id) || self.id == ctx.local_id() {
            debug!(
                sender = self.id,
                view = self.view,
                seqno = self.seqno,
                "Rejecting prepare: sender is not a remote replica"
            );
            return Verdict::Reject;
        }

        let Some(principal) = identity.lookup_principal(self.id) else {
            debug!(sender = self.id, "Rejecting prepare: unknown principal");
            return Verdict::Reject;
        };

        // The first pre-prepare carries the certificates later votes are checked against
        if !principal.has_certificate && identity.local_fault_threshold() == 0 {
            return Verdict::Trusted;
        }

        if !self.digest_signature_valid(ctx, &principal) {
            match ctx.config().digest_signature_policy {
                DigestSignaturePolicy::Enforce => {
                    debug!(
                        sender = self.id,
                        view = self.view,
                        seqno = self.seqno,
                        "Rejecting prepare: digest signature invalid"
                    );
                    return Verdict::Reject;
                }
                DigestSignaturePolicy::Audit => {
                    warn!(
                        sender = self.id,
                        view = self.view,
                        seqno = self.seqno,
                        "Digest signature invalid, continuing under audit policy"
                    );
                }
            }
        }

        if self.id == ctx.primary(self.view) {
            debug!(
                sender = self.id,
                view = self.view,
                seqno = self.seqno,
                "Rejecting prepare: sender is the primary"
            );
            return Verdict::Reject;
        }

        let required = match self.kind {
            AuthKind::Broadcast => ctx.strategy().authenticator_size(identity, self.id),
            AuthKind::Targeted => MAC_SIZE,
        };
        if self.auth.region.len() < required {
            debug!(
                sender = self.id,
                len = self.auth.region.len(),
                required,
                "Rejecting prepare: authenticator too short"
            );
            return Verdict::Reject;
        }

        Verdict::Accept
    }

    fn digest_signature_valid(&self, ctx: &ReplicaContext<'_>, principal: &PrincipalRef) -> bool {
        if self.digest_signature.is_empty() {
            return false;
        }
        let tuple = AttestedTuple::new(self.digest, self.merkle_root, self.hashed_nonce);
        ctx.identity()
            .verify(principal, &tuple.signing_bytes(), &self.digest_signature)
    }

    fn authenticator_valid(&self, ctx: &ReplicaContext<'_>) -> bool {
        let covered = self.covered_bytes();
        let valid = match self.kind {
            AuthKind::Broadcast => {
                ctx.strategy()
                    .verify(ctx.identity(), self.id, &covered, &self.auth)
            }
            AuthKind::Targeted => {
                MacStrategy::verify_from(ctx.identity(), self.id, &covered, &self.auth.region)
            }
        };
        if !valid {
            debug!(
                sender = self.id,
                view = self.view,
                seqno = self.seqno,
                "Rejecting prepare: authenticator mismatch"
            );
        }
        valid
    }

    // =========================================================================
    // DIGEST SIGNATURE
    // =========================================================================

    /// Sign the attested tuple with the local identity.
    pub fn sign(
        ctx: &ReplicaContext<'_>,
        merkle_root: &MerkleRoot,
        hashed_nonce: NonceHash,
        digest: &Digest,
    ) -> MessageResult<PbftSignature> {
        let tuple = AttestedTuple::new(*digest, *merkle_root, hashed_nonce);
        ctx.identity()
            .sign(&tuple.signing_bytes())
            .map_err(|e| MessageError::SigningFailed(e.to_string()))
    }

    /// Store a previously computed digest signature.
    ///
    /// The signature is covered by the authenticator, so a sealed vote must
    /// be re-authenticated afterwards.
    pub fn save_signature(
        &mut self,
        signature: &PbftSignature,
        signature_size: usize,
    ) -> MessageResult<()> {
        if signature_size > MAX_SIGNATURE_SIZE {
            return Err(MessageError::SignatureTooLong {
                len: signature_size,
                max: MAX_SIGNATURE_SIZE,
            });
        }
        self.digest_signature = PbftSignature::from_parts(*signature.buffer(), signature_size as u32)?;
        Ok(())
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn view(&self) -> View {
        self.view
    }

    pub fn seqno(&self) -> Seqno {
        self.seqno
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn merkle_root(&self) -> &MerkleRoot {
        &self.merkle_root
    }

    /// Sender id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn hashed_nonce(&self) -> NonceHash {
        self.hashed_nonce
    }

    /// The raw nonce; `None` for decoded votes.
    pub fn nonce(&self) -> Option<u64> {
        self.nonce
    }

    pub fn is_broadcast(&self) -> bool {
        self.kind == AuthKind::Broadcast
    }

    pub fn auth_kind(&self) -> AuthKind {
        self.kind
    }

    pub fn digest_signature(&self) -> &PbftSignature {
        &self.digest_signature
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// True iff this vote endorses the given pre-prepare.
    pub fn matches(&self, view: View, seqno: Seqno, digest: &Digest) -> bool {
        self.view == view && self.seqno == seqno && self.digest == *digest
    }

    /// Where the authenticator sits in the encoded vote.
    pub fn layout(&self, ctx: &ReplicaContext<'_>) -> AuthLayout {
        AuthLayout {
            kind: self.kind,
            src_offset: 0,
            auth_len: PREPARE_HEADER_LEN,
            dst_offset: Self::header_len(ctx),
        }
    }

    // =========================================================================
    // WIRE
    // =========================================================================

    fn header_len(ctx: &ReplicaContext<'_>) -> usize {
        if ctx.strategy().has_length_field() {
            PREPARE_HEADER_SIG_LEN
        } else {
            PREPARE_HEADER_LEN
        }
    }

    fn write_header(&self, w: &mut WireWriter) {
        w.put_i64(self.view)
            .put_i64(self.seqno)
            .put_bytes(self.digest.as_bytes())
            .put_bytes(&self.merkle_root)
            .put_i32(self.id)
            .put_u64(self.hashed_nonce)
            .put_u8(self.kind.flag())
            .put_u32(self.digest_signature.len() as u32)
            .put_bytes(self.digest_signature.buffer());
    }

    fn covered_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(PREPARE_HEADER_LEN);
        self.write_header(&mut w);
        w.into_bytes()
    }

    /// Encode the vote with its authenticator.
    pub fn encode(&self, ctx: &ReplicaContext<'_>) -> MessageResult<Vec<u8>> {
        let mut w = WireWriter::with_capacity(Self::header_len(ctx) + self.auth.region.len());
        self.write_header(&mut w);
        if ctx.strategy().has_length_field() {
            w.put_u32(self.auth.sig_len);
        }
        w.put_bytes(&self.auth.region);

        let max = ctx.config().max_message_size;
        if w.len() > max {
            return Err(MessageError::MessageTooLarge {
                size: w.len(),
                max,
            });
        }
        Ok(w.into_bytes())
    }

    /// Decode a received vote. Every field is bounds-checked before use.
    pub fn decode(bytes: &[u8], ctx: &ReplicaContext<'_>) -> MessageResult<Self> {
        let max = ctx.config().max_message_size;
        if bytes.len() > max {
            return Err(MessageError::MessageTooLarge {
                size: bytes.len(),
                max,
            });
        }

        let mut r = WireReader::new(bytes);
        let view = r.i64("view")?;
        let seqno = r.i64("seqno")?;
        let digest = Digest::from_bytes(r.array("digest")?);
        let merkle_root = r.array("merkle_root")?;
        let id = r.i32("id")?;
        let hashed_nonce = r.u64("hashed_nonce")?;
        let kind = AuthKind::from_flag(r.u8("flag")?)?;
        let digest_sig_size = r.u32("digest_sig_size")?;
        let digest_signature =
            PbftSignature::from_parts(r.array("digest_signature")?, digest_sig_size)?;
        let sig_len = if ctx.strategy().has_length_field() {
            r.u32("auth_sig_size")?
        } else {
            0
        };

        let region = r.rest().to_vec();
        if sig_len as usize > region.len() {
            return Err(MessageError::DeclaredSizeExceedsBuffer {
                field: "authenticator",
                declared: sig_len as usize,
                limit: region.len(),
            });
        }

        Ok(Self {
            view,
            seqno,
            digest,
            merkle_root,
            id,
            hashed_nonce,
            kind,
            digest_signature,
            nonce: None,
            destination: (kind == AuthKind::Targeted).then(|| ctx.local_id()),
            auth: Authenticator { region, sig_len },
        })
    }
}

impl ProtocolMessage for Prepare {
    fn sender(&self) -> NodeId {
        self.id
    }

    fn authenticate(&mut self, ctx: &ReplicaContext<'_>) -> MessageResult<()> {
        Prepare::authenticate(self, ctx)
    }

    fn pre_verify(&self, ctx: &ReplicaContext<'_>) -> bool {
        Prepare::pre_verify(self, ctx)
    }

    fn verify(&self, ctx: &ReplicaContext<'_>) -> bool {
        Prepare::verify(self, ctx)
    }

    fn encode(&self, ctx: &ReplicaContext<'_>) -> MessageResult<Vec<u8>> {
        Prepare::encode(self, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::KeyringIdentity;
    use crate::domain::config::ProtocolConfig;
    use crate::ports::outbound::IdentityService;

    fn fields(view: View, seqno: Seqno) -> PrepareFields {
        PrepareFields {
            view,
            seqno,
            digest: Digest::of(b"batch"),
            merkle_root: [7u8; 32],
            nonce: 99,
        }
    }

    fn config(mode: AuthMode) -> ProtocolConfig {
        ProtocolConfig {
            auth_mode: mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_broadcast_vote_accepted_by_backup() {
        let ids = KeyringIdentity::deployment(4, [1u8; 32]);
        let config = config(AuthMode::Signature);
        let sender = ReplicaContext::new(&ids[2], &config).unwrap();
        let receiver = ReplicaContext::new(&ids[0], &config).unwrap();

        let prepare = Prepare::new(&sender, fields(1, 7), None, PrepareOptions::default()).unwrap();
        assert!(prepare.is_broadcast());
        assert_eq!(prepare.hashed_nonce(), nonce_hash(99));
        assert!(prepare.pre_verify(&receiver));
        assert!(prepare.verify(&receiver));
    }

    #[test]
    fn test_primary_vote_rejected() {
        let ids = KeyringIdentity::deployment(4, [1u8; 32]);
        let config = config(AuthMode::Signature);
        let primary = ReplicaContext::new(&ids[1], &config).unwrap();
        let receiver = ReplicaContext::new(&ids[0], &config).unwrap();

        let prepare =
            Prepare::new(&primary, fields(1, 7), None, PrepareOptions::default()).unwrap();
        assert!(!prepare.pre_verify(&receiver));
    }

    #[test]
    fn test_own_vote_rejected() {
        let ids = KeyringIdentity::deployment(4, [1u8; 32]);
        let config = config(AuthMode::Signature);
        let ctx = ReplicaContext::new(&ids[2], &config).unwrap();

        let prepare = Prepare::new(&ctx, fields(1, 7), None, PrepareOptions::default()).unwrap();
        assert!(!prepare.pre_verify(&ctx));
    }

    #[test]
    fn test_mac_broadcast_round_trip() {
        let ids = KeyringIdentity::deployment(4, [2u8; 32]);
        let config = config(AuthMode::Mac);
        let sender = ReplicaContext::new(&ids[3], &config).unwrap();
        let receiver = ReplicaContext::new(&ids[2], &config).unwrap();

        let prepare = Prepare::new(&sender, fields(0, 1), None, PrepareOptions::default()).unwrap();
        assert_eq!(prepare.authenticator().region.len(), 4 * MAC_SIZE);

        let bytes = prepare.encode(&sender).unwrap();
        assert_eq!(bytes.len(), PREPARE_HEADER_LEN + 4 * MAC_SIZE);

        let decoded = Prepare::decode(&bytes, &receiver).unwrap();
        assert_eq!(decoded.nonce(), None);
        assert!(decoded.matches(0, 1, &Digest::of(b"batch")));
        assert!(decoded.verify(&receiver));
    }

    #[test]
    fn test_targeted_vote_needs_reauthentication() {
        let ids = KeyringIdentity::deployment(4, [3u8; 32]);
        let config = config(AuthMode::Signature);
        let sender = ReplicaContext::new(&ids[2], &config).unwrap();
        let first = ids[0].local_principal();
        let second = ids[3].local_principal();

        let mut prepare =
            Prepare::new(&sender, fields(1, 4), Some(&first), PrepareOptions::default()).unwrap();
        assert_eq!(prepare.auth_kind(), AuthKind::Targeted);
        assert_eq!(prepare.authenticator().region.len(), MAC_SIZE);

        let at_first = ReplicaContext::new(&ids[0], &config).unwrap();
        let at_second = ReplicaContext::new(&ids[3], &config).unwrap();
        assert!(prepare.verify(&at_first));
        assert!(!prepare.verify(&at_second));

        prepare.re_authenticate(&sender, &second).unwrap();
        assert!(prepare.verify(&at_second));
        assert!(!prepare.verify(&at_first));
    }

    #[test]
    fn test_missing_digest_signature_policy() {
        let ids = KeyringIdentity::deployment(4, [4u8; 32]);
        let enforce = config(AuthMode::Signature);
        let audit = ProtocolConfig {
            digest_signature_policy: DigestSignaturePolicy::Audit,
            ..enforce.clone()
        };
        let sender = ReplicaContext::new(&ids[2], &enforce).unwrap();
        let options = PrepareOptions {
            is_signed: false,
            ..Default::default()
        };

        let prepare = Prepare::new(&sender, fields(1, 7), None, options).unwrap();
        assert!(prepare.digest_signature().is_empty());
        assert!(!prepare.pre_verify(&ReplicaContext::new(&ids[0], &enforce).unwrap()));
        assert!(prepare.pre_verify(&ReplicaContext::new(&ids[0], &audit).unwrap()));
    }

    #[test]
    fn test_save_signature_then_reauthenticate() {
        let ids = KeyringIdentity::deployment(4, [4u8; 32]);
        let config = config(AuthMode::Signature);
        let sender = ReplicaContext::new(&ids[2], &config).unwrap();
        let receiver = ReplicaContext::new(&ids[0], &config).unwrap();
        let options = PrepareOptions {
            is_signed: false,
            ..Default::default()
        };

        let mut prepare = Prepare::new(&sender, fields(1, 7), None, options).unwrap();
        let signature = Prepare::sign(
            &sender,
            prepare.merkle_root(),
            prepare.hashed_nonce(),
            prepare.digest(),
        )
        .unwrap();
        prepare.save_signature(&signature, signature.len()).unwrap();
        assert!(prepare.pre_verify(&receiver));
        // Header changed under the old seal
        assert!(!prepare.verify(&receiver));

        prepare.authenticate(&sender).unwrap();
        assert!(prepare.verify(&receiver));

        assert!(matches!(
            prepare.save_signature(&signature, MAX_SIGNATURE_SIZE + 1),
            Err(MessageError::SignatureTooLong { .. })
        ));
    }

    #[test]
    fn test_unsigned_broadcast_keeps_zeroed_region() {
        let ids = KeyringIdentity::deployment(4, [6u8; 32]);
        let config = config(AuthMode::Signature);
        let sender = ReplicaContext::new(&ids[2], &config).unwrap();
        let receiver = ReplicaContext::new(&ids[0], &config).unwrap();
        let options = PrepareOptions {
            should_sign: false,
            ..Default::default()
        };

        let prepare = Prepare::new(&sender, fields(1, 7), None, options).unwrap();
        assert_eq!(prepare.authenticator().sig_len, 0);
        assert!(prepare.pre_verify(&receiver));
        assert!(!prepare.verify(&receiver));
    }

    #[test]
    fn test_short_authenticator_rejected() {
        let ids = KeyringIdentity::deployment(4, [6u8; 32]);
        let config = config(AuthMode::Signature);
        let sender = ReplicaContext::new(&ids[2], &config).unwrap();
        let receiver = ReplicaContext::new(&ids[0], &config).unwrap();

        let prepare = Prepare::new(&sender, fields(1, 7), None, PrepareOptions::default()).unwrap();
        let mut bytes = prepare.encode(&sender).unwrap();
        bytes.truncate(PREPARE_HEADER_SIG_LEN + 10);
        // auth_sig_size still declares the full signature
        assert!(matches!(
            Prepare::decode(&bytes, &receiver),
            Err(MessageError::DeclaredSizeExceedsBuffer { .. })
        ));

        bytes[PREPARE_HEADER_LEN..PREPARE_HEADER_SIG_LEN].copy_from_slice(&0u32.to_le_bytes());
        let decoded = Prepare::decode(&bytes, &receiver).unwrap();
        assert!(!decoded.pre_verify(&receiver));
    }

    #[test]
    fn test_decode_rejects_malformed_buffers() {
        let ids = KeyringIdentity::deployment(4, [6u8; 32]);
        let config = config(AuthMode::Mac);
        let ctx = ReplicaContext::new(&ids[2], &config).unwrap();

        assert!(matches!(
            Prepare::decode(&[0u8; 40], &ctx),
            Err(MessageError::Truncated { field: "digest", .. })
        ));

        let prepare = Prepare::new(&ctx, fields(1, 7), None, PrepareOptions::default()).unwrap();
        let mut bytes = prepare.encode(&ctx).unwrap();
        bytes[92] = 9;
        assert_eq!(
            Prepare::decode(&bytes, &ctx),
            Err(MessageError::InvalidModeFlag(9))
        );
    }

    #[test]
    fn test_sender_override() {
        let ids = KeyringIdentity::deployment(4, [8u8; 32]);
        let config = config(AuthMode::Signature);
        let ctx = ReplicaContext::new(&ids[0], &config).unwrap();
        let options = PrepareOptions {
            sender_override: Some(3),
            ..Default::default()
        };

        let prepare = Prepare::new(&ctx, fields(1, 7), None, options).unwrap();
        assert_eq!(prepare.id(), 3);
        // Signed with replica 0's key but claims replica 3
        assert!(!prepare.pre_verify(&ReplicaContext::new(&ids[2], &config).unwrap()));
    }

    #[test]
    fn test_bootstrap_accepts_uncertified_sender() {
        let mut ids: Vec<KeyringIdentity> = KeyringIdentity::deployment(4, [5u8; 32])
            .into_iter()
            .enumerate()
            .map(|(i, identity)| match i {
                0 => identity.with_local_fault_threshold(0),
                _ => identity,
            })
            .collect();
        let config = config(AuthMode::Signature);
        let options = PrepareOptions {
            is_signed: false,
            ..Default::default()
        };
        let prepare = {
            let sender = ReplicaContext::new(&ids[2], &config).unwrap();
            Prepare::new(&sender, fields(1, 7), None, options).unwrap()
        };

        // Certificate on file: the missing digest signature is still enforced
        assert!(!prepare.pre_verify(&ReplicaContext::new(&ids[0], &config).unwrap()));

        ids[0].remove_certificate(2);
        let receiver = ReplicaContext::new(&ids[0], &config).unwrap();
        assert_eq!(receiver.f(), 1);
        assert!(prepare.pre_verify(&receiver));
        assert!(prepare.verify(&receiver));

        // A node started with f > 0 gets no bootstrap exception
        ids[1].remove_certificate(2);
        assert!(!prepare.pre_verify(&ReplicaContext::new(&ids[1], &config).unwrap()));
    }
}
