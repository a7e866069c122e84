//! # pbft-messages
//!
//! Authentication and catch-up messages for a PBFT replica.
//!
//! ## Architecture
//!
//! Hexagonal, like the rest of the workspace:
//! - **Domain Layer** (`domain/`): message types, wire codecs, verification rules
//! - **Ports Layer** (`ports/`): the [`ProtocolMessage`] surface and the
//!   [`IdentityService`] the domain calls into
//! - **Adapters Layer** (`adapters/`): [`KeyringIdentity`], an in-memory identity
//!
//! ## Messages
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Prepare`] | A backup's vote for `(view, seqno, digest)` |
//! | [`ReceiptProof`] | Quorum of signatures proving a batch was executed |
//! | [`Status`] | Bitmaps describing what a lagging replica is missing |
//!
//! Every call takes a [`ReplicaContext`]: the local identity plus the
//! deployment's [`ProtocolConfig`]. Nothing is read from globals.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pbft_messages::{KeyringIdentity, Prepare, PrepareFields, PrepareOptions};
//! use pbft_messages::{ProtocolConfig, ReplicaContext};
//!
//! let group = KeyringIdentity::deployment(4, secret);
//! let config = ProtocolConfig::from_env()?;
//! let ctx = ReplicaContext::new(&group[2], &config)?;
//!
//! let vote = Prepare::new(&ctx, fields, None, PrepareOptions::default())?;
//! let bytes = vote.encode(&ctx)?;
//! ```
//!
//! ## Security
//!
//! - Verification returns `bool`; adversarial input never panics or errors
//! - Declared sizes are bounds-checked before trailing arrays are read
//! - Digest signatures are enforced unless the audit policy is configured

#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;

// Re-export public API
pub use adapters::KeyringIdentity;
pub use domain::{
    nonce_hash, strategy_for, AttestedTuple, AuthKind, AuthLayout, AuthMode, AuthStrategy,
    Authenticator, BrInfo, BrMap, BrsIter, ConfigError, Digest, DigestSignaturePolicy,
    MacStrategy, MerkleRoot, MessageError, MessageResult, MissingPrePrepare, NodeId, NonceHash,
    PbftSignature, PpInfo, PpsIter, Prepare, PrepareFields, PrepareOptions, Proof,
    ProtocolConfig, ReceiptProof, ReplicaContext, Seqno, SignatureStrategy, Status, View,
    WindowBitmap,
};
pub use ports::inbound::ProtocolMessage;
pub use ports::outbound::{IdentityService, PrincipalRef};
