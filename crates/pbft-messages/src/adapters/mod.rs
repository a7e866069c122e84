//! # Adapters Layer
//!
//! Concrete implementations of the outbound ports.

pub mod keyring;

pub use keyring::KeyringIdentity;
