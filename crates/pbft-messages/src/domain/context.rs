//! # Replica Context
//!
//! Explicit handle on the local identity and deployment configuration,
//! passed to every constructor and verification call.

use super::config::{ConfigError, ProtocolConfig};
use super::envelope::{strategy_for, AuthMode, AuthStrategy};
use super::{NodeId, View};
use crate::ports::outbound::IdentityService;

/// Identity plus quorum configuration for one replica.
#[derive(Clone, Copy)]
pub struct ReplicaContext<'a> {
    identity: &'a dyn IdentityService,
    config: &'a ProtocolConfig,
}

impl<'a> ReplicaContext<'a> {
    /// Bind `identity` to `config`, rejecting a configuration that fails
    /// [`ProtocolConfig::validate`].
    pub fn new(
        identity: &'a dyn IdentityService,
        config: &'a ProtocolConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { identity, config })
    }

    pub fn identity(&self) -> &'a dyn IdentityService {
        self.identity
    }

    pub fn config(&self) -> &'a ProtocolConfig {
        self.config
    }

    /// Fault threshold.
    pub fn f(&self) -> usize {
        self.identity.fault_threshold()
    }

    /// Replica count.
    pub fn n(&self) -> usize {
        self.identity.replica_count()
    }

    pub fn local_id(&self) -> NodeId {
        self.identity.local_id()
    }

    /// Primary of `view`: `view mod n`.
    pub fn primary(&self, view: View) -> NodeId {
        match self.n() {
            0 => 0,
            n => view.rem_euclid(n as i64) as NodeId,
        }
    }

    /// Matching votes needed for agreement: `2f + 1`.
    pub fn quorum(&self) -> usize {
        2 * self.f() + 1
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.config.auth_mode
    }

    /// Broadcast authentication strategy for this deployment.
    pub fn strategy(&self) -> &'static dyn AuthStrategy {
        strategy_for(self.config.auth_mode)
    }
}

impl std::fmt::Debug for ReplicaContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaContext")
            .field("local_id", &self.local_id())
            .field("f", &self.f())
            .field("n", &self.n())
            .field("config", self.config)
            .finish()
    }
}
