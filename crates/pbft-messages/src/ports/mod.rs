//! # Ports Layer
//!
//! Trait definitions for the hexagonal architecture.
//! - **Inbound (Driving)**: what the replication engine calls
//! - **Outbound (Driven)**: the identity service this layer needs

pub mod inbound;
pub mod outbound;
