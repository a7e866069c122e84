//! # Shared Crypto - Replica Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-256, BLAKE3 | Batch digests, key derivation |
//! | `mac` | HMAC-SHA256 | Pairwise message authenticators |
//! | `ecdsa` | secp256k1 | Replica identity signing |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic, low-S normalization
//! - **HMAC-SHA256**: constant-time tag comparison
//! - **BLAKE3 derive_key**: context-separated pairwise keys

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod mac;

// Re-exports
pub use ecdsa::{Secp256k1KeyPair, Secp256k1PublicKey, Secp256k1Signature};
pub use errors::CryptoError;
pub use hashing::{blake3_derive_key, sha256, Hash};
pub use mac::{hmac_sha256, verify_hmac_sha256, MacTag, MAC_LEN};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
