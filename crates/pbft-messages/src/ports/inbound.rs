//! # Inbound Ports (Driving Ports / API)
//!
//! The surface a replication engine drives: every protocol message can be
//! sealed, screened, verified and encoded against an explicit context.

use crate::domain::{MessageResult, NodeId, ReplicaContext};

/// A sealed protocol message.
///
/// Verification entry points return `bool`: adversarial input is an
/// expected outcome, not an error.
pub trait ProtocolMessage {
    /// Claimed sender id.
    fn sender(&self) -> NodeId;

    /// Compute the authenticator with the local identity.
    fn authenticate(&mut self, ctx: &ReplicaContext<'_>) -> MessageResult<()>;

    /// Structural and semantic checks that do not touch the authenticator.
    fn pre_verify(&self, ctx: &ReplicaContext<'_>) -> bool;

    /// `pre_verify` plus the authenticator check for the local replica.
    fn verify(&self, ctx: &ReplicaContext<'_>) -> bool;

    /// Wire bytes, authenticator included.
    fn encode(&self, ctx: &ReplicaContext<'_>) -> MessageResult<Vec<u8>>;
}
