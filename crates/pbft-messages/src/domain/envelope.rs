//! # Authenticated Envelope
//!
//! Every message is a fixed header followed by an authenticator region. The
//! covered byte range and where the region starts are declared through an
//! [`AuthLayout`] instead of being inferred while parsing.
//!
//! ## Modes
//!
//! | Mode | Broadcast region | Verifiable by |
//! |------|------------------|---------------|
//! | `Mac` | one HMAC slot per replica | each slot's recipient |
//! | `Signature` | one signature, zero padded | anyone with the certificate |
//!
//! Destination-targeted messages always carry a single pairwise MAC,
//! whatever the deployment mode.

use super::crypto::{PbftSignature, MAC_SIZE, MAX_SIGNATURE_SIZE};
use super::errors::{MessageError, MessageResult};
use super::NodeId;
use crate::ports::outbound::IdentityService;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Deployment-wide authentication mode for broadcast messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Vector of pairwise MACs
    Mac,
    /// Public-key signature
    Signature,
}

/// Destination pattern carried in a message's mode flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AuthKind {
    /// Authenticated for every replica
    Broadcast = 0,
    /// MAC'd for one recipient
    Targeted = 1,
}

impl AuthKind {
    /// Parse the wire flag.
    pub fn from_flag(flag: u8) -> MessageResult<Self> {
        match flag {
            0 => Ok(Self::Broadcast),
            1 => Ok(Self::Targeted),
            other => Err(MessageError::InvalidModeFlag(other)),
        }
    }

    pub fn flag(self) -> u8 {
        self as u8
    }
}

/// Declared placement of a message's authenticator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthLayout {
    pub kind: AuthKind,
    /// First covered byte
    pub src_offset: usize,
    /// Number of covered bytes
    pub auth_len: usize,
    /// Where the authenticator region starts
    pub dst_offset: usize,
}

impl AuthLayout {
    /// The covered slice of an encoded header.
    pub fn covered<'a>(&self, bytes: &'a [u8]) -> MessageResult<&'a [u8]> {
        let end = self.src_offset + self.auth_len;
        bytes
            .get(self.src_offset..end)
            .ok_or(MessageError::Truncated {
                field: "authenticated range",
                needed: end,
                available: bytes.len(),
            })
    }
}

/// A computed authenticator region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Authenticator {
    /// Region bytes as laid out on the wire
    pub region: Vec<u8>,
    /// Meaningful signature length in signature mode; zero for MACs
    pub sig_len: u32,
}

// =============================================================================
// STRATEGY
// =============================================================================

/// How broadcast messages are sealed and checked.
pub trait AuthStrategy: Send + Sync {
    /// Mode this strategy implements.
    fn mode(&self) -> AuthMode;

    /// Minimum region size a broadcast from `sender` must carry.
    fn authenticator_size(&self, identity: &dyn IdentityService, sender: NodeId) -> usize;

    /// Seal `covered` with the local identity.
    fn authenticate(
        &self,
        identity: &dyn IdentityService,
        covered: &[u8],
    ) -> MessageResult<Authenticator>;

    /// Check a broadcast authenticator from `sender` as seen by the local replica.
    fn verify(
        &self,
        identity: &dyn IdentityService,
        sender: NodeId,
        covered: &[u8],
        auth: &Authenticator,
    ) -> bool;

    /// True when a `u32` signature-length field precedes the region.
    fn has_length_field(&self) -> bool {
        self.mode() == AuthMode::Signature
    }
}

/// Pairwise HMAC-SHA256 authentication.
#[derive(Clone, Copy, Debug, Default)]
pub struct MacStrategy;

impl MacStrategy {
    /// Single MAC for `dst`.
    pub fn authenticate_for(
        identity: &dyn IdentityService,
        dst: NodeId,
        covered: &[u8],
    ) -> MessageResult<Authenticator> {
        let mac = identity
            .gen_mac(dst, covered)
            .ok_or(MessageError::UnknownPrincipal(dst))?;
        trace!(dst, "Generated targeted MAC");
        Ok(Authenticator {
            region: mac.to_vec(),
            sig_len: 0,
        })
    }

    /// Check a single MAC that `src` computed for the local replica.
    pub fn verify_from(
        identity: &dyn IdentityService,
        src: NodeId,
        covered: &[u8],
        region: &[u8],
    ) -> bool {
        region.len() >= MAC_SIZE && identity.verify_mac(src, covered, &region[..MAC_SIZE])
    }
}

impl AuthStrategy for MacStrategy {
    fn mode(&self) -> AuthMode {
        AuthMode::Mac
    }

    fn authenticator_size(&self, identity: &dyn IdentityService, sender: NodeId) -> usize {
        identity.mac_size(sender)
    }

    fn authenticate(
        &self,
        identity: &dyn IdentityService,
        covered: &[u8],
    ) -> MessageResult<Authenticator> {
        let n = identity.replica_count();
        let mut region = Vec::with_capacity(n * MAC_SIZE);
        for replica in 0..n as NodeId {
            let mac = identity
                .gen_mac(replica, covered)
                .ok_or(MessageError::UnknownPrincipal(replica))?;
            region.extend_from_slice(&mac);
        }
        trace!(slots = n, "Generated broadcast MAC vector");
        Ok(Authenticator { region, sig_len: 0 })
    }

    fn verify(
        &self,
        identity: &dyn IdentityService,
        sender: NodeId,
        covered: &[u8],
        auth: &Authenticator,
    ) -> bool {
        let local = identity.local_id();
        if local < 0 {
            return false;
        }
        let start = local as usize * MAC_SIZE;
        match auth.region.get(start..start + MAC_SIZE) {
            Some(slot) => identity.verify_mac(sender, covered, slot),
            None => false,
        }
    }
}

/// Public-key signature authentication.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignatureStrategy;

impl AuthStrategy for SignatureStrategy {
    fn mode(&self) -> AuthMode {
        AuthMode::Signature
    }

    fn authenticator_size(&self, identity: &dyn IdentityService, _sender: NodeId) -> usize {
        identity.max_signature_size()
    }

    fn authenticate(
        &self,
        identity: &dyn IdentityService,
        covered: &[u8],
    ) -> MessageResult<Authenticator> {
        let signature = identity
            .sign(covered)
            .map_err(|e| MessageError::SigningFailed(e.to_string()))?;
        trace!(len = signature.len(), "Signed broadcast authenticator");
        Ok(Authenticator {
            region: signature.buffer().to_vec(),
            sig_len: signature.len() as u32,
        })
    }

    fn verify(
        &self,
        identity: &dyn IdentityService,
        sender: NodeId,
        covered: &[u8],
        auth: &Authenticator,
    ) -> bool {
        let len = auth.sig_len as usize;
        if len == 0 || len > MAX_SIGNATURE_SIZE || len > auth.region.len() {
            return false;
        }
        let Some(principal) = identity.lookup_principal(sender) else {
            return false;
        };
        match PbftSignature::from_slice(&auth.region[..len]) {
            Ok(signature) => identity.verify(&principal, covered, &signature),
            Err(_) => false,
        }
    }
}

static MAC_STRATEGY: MacStrategy = MacStrategy;
static SIGNATURE_STRATEGY: SignatureStrategy = SignatureStrategy;

/// The strategy for a deployment mode.
pub fn strategy_for(mode: AuthMode) -> &'static dyn AuthStrategy {
    match mode {
        AuthMode::Mac => &MAC_STRATEGY,
        AuthMode::Signature => &SIGNATURE_STRATEGY,
    }
}
