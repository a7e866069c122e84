//! # Domain Layer
//!
//! Message types and verification rules with no I/O dependencies.
//! This is the inner layer of the hexagonal architecture.

pub mod bitmap;
pub mod config;
pub mod context;
pub mod crypto;
pub mod envelope;
pub mod errors;
pub mod prepare;
pub mod receipt_proof;
pub mod status;
pub mod wire;

pub use bitmap::{BrMap, WindowBitmap};
pub use config::{ConfigError, DigestSignaturePolicy, ProtocolConfig};
pub use context::ReplicaContext;
pub use crypto::{
    nonce_hash, AttestedTuple, Digest, Mac, MerkleRoot, NonceHash, PbftSignature, DIGEST_SIZE,
    MAC_SIZE, MAX_SIGNATURE_SIZE, MERKLE_ROOT_SIZE,
};
pub use envelope::{
    strategy_for, AuthKind, AuthLayout, AuthMode, AuthStrategy, Authenticator, MacStrategy,
    SignatureStrategy,
};
pub use errors::{MessageError, MessageResult};
pub use prepare::{Prepare, PrepareFields, PrepareOptions};
pub use receipt_proof::{Proof, ReceiptProof};
pub use status::{BrInfo, BrsIter, MissingPrePrepare, PpInfo, PpsIter, Status};

/// Epoch identifier.
pub type View = i64;

/// Request sequence number.
pub type Seqno = i64;

/// Replica identifier.
pub type NodeId = i32;

/// Upper bound on replica ids.
pub const MAX_NUM_REPLICAS: usize = 32;

/// Bytes in the view-change bitmap of a status message.
pub const VCS_SIZE: usize = MAX_NUM_REPLICAS.div_ceil(8);
