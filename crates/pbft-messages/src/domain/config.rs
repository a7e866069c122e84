//! # Protocol Configuration
//!
//! Deployment-wide settings shared by every replica. Chosen once at startup;
//! all replicas of a deployment must agree on them.
//!
//! ## Sources
//!
//! - `ProtocolConfig::default()`
//! - `ProtocolConfig::from_toml_str` for a config file section
//! - `ProtocolConfig::from_env` for `PBFT_*` environment overrides

use super::envelope::AuthMode;
use super::prepare::PREPARE_HEADER_SIG_LEN;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default width of the prepared/committed window (`max_out`).
pub const DEFAULT_WINDOW_SIZE: usize = 256;

/// Default upper bound on an encoded message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 9000;

/// What `Prepare::pre_verify` does when the digest signature does not check out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestSignaturePolicy {
    /// Reject votes whose digest signature is missing or invalid
    #[default]
    Enforce,
    /// Log the failure and keep evaluating the vote
    Audit,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Window size must be a non-zero multiple of 8, got {0}")]
    InvalidWindowSize(usize),

    #[error("Window size {0} does not fit the status size field")]
    WindowTooLarge(usize),

    #[error("Max message size {size} is smaller than the minimum {min}")]
    MaxMessageSizeTooSmall { size: usize, min: usize },

    #[error("Invalid value for {key}: {value}")]
    InvalidEnvValue { key: &'static str, value: String },

    #[error("Config parse error: {0}")]
    Parse(String),
}

/// Deployment-wide protocol settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Authentication mode for broadcast messages
    pub auth_mode: AuthMode,
    /// Number of sequence numbers tracked past the last stable checkpoint
    pub window_size: usize,
    /// Upper bound on an encoded message in bytes
    pub max_message_size: usize,
    /// Handling of digest-signature failures in prepare votes
    pub digest_signature_policy: DigestSignaturePolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            auth_mode: AuthMode::Signature,
            window_size: DEFAULT_WINDOW_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            digest_signature_policy: DigestSignaturePolicy::Enforce,
        }
    }
}

impl ProtocolConfig {
    /// Bytes needed for each of the prepared/committed bitmaps.
    pub fn bitmap_bytes(&self) -> usize {
        self.window_size / 8
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 || self.window_size % 8 != 0 {
            return Err(ConfigError::InvalidWindowSize(self.window_size));
        }
        if self.window_size > i16::MAX as usize {
            return Err(ConfigError::WindowTooLarge(self.window_size));
        }
        // Largest fixed header plus a full signature authenticator
        let min = PREPARE_HEADER_SIG_LEN + super::crypto::MAX_SIGNATURE_SIZE;
        if self.max_message_size < min {
            return Err(ConfigError::MaxMessageSizeTooSmall {
                size: self.max_message_size,
                min,
            });
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `PBFT_*` environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides taken from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("PBFT_AUTH_MODE") {
            config.auth_mode = match value.to_ascii_lowercase().as_str() {
                "mac" => AuthMode::Mac,
                "signature" => AuthMode::Signature,
                _ => {
                    return Err(ConfigError::InvalidEnvValue {
                        key: "PBFT_AUTH_MODE",
                        value,
                    })
                }
            };
        }

        if let Some(value) = lookup("PBFT_WINDOW_SIZE") {
            config.window_size = value.parse().map_err(|_| ConfigError::InvalidEnvValue {
                key: "PBFT_WINDOW_SIZE",
                value: value.clone(),
            })?;
        }

        if let Some(value) = lookup("PBFT_MAX_MESSAGE_SIZE") {
            config.max_message_size =
                value.parse().map_err(|_| ConfigError::InvalidEnvValue {
                    key: "PBFT_MAX_MESSAGE_SIZE",
                    value: value.clone(),
                })?;
        }

        if let Some(value) = lookup("PBFT_DIGEST_SIGNATURE_POLICY") {
            config.digest_signature_policy = match value.to_ascii_lowercase().as_str() {
                "enforce" => DigestSignaturePolicy::Enforce,
                "audit" => DigestSignaturePolicy::Audit,
                _ => {
                    return Err(ConfigError::InvalidEnvValue {
                        key: "PBFT_DIGEST_SIGNATURE_POLICY",
                        value,
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bitmap_bytes(), 32);
        assert_eq!(config.digest_signature_policy, DigestSignaturePolicy::Enforce);
    }

    #[test]
    fn test_window_must_be_byte_aligned() {
        let config = ProtocolConfig {
            window_size: 100,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidWindowSize(100)));
    }

    #[test]
    fn test_tiny_message_size_rejected() {
        let config = ProtocolConfig {
            max_message_size: 64,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MaxMessageSizeTooSmall { size: 64, .. })
        ));
    }

    #[test]
    fn test_from_toml_partial_uses_defaults() {
        let config = ProtocolConfig::from_toml_str(
            r#"
            auth_mode = "mac"
            digest_signature_policy = "audit"
            "#,
        )
        .unwrap();
        assert_eq!(config.auth_mode, AuthMode::Mac);
        assert_eq!(config.digest_signature_policy, DigestSignaturePolicy::Audit);
        assert_eq!(config.window_size, DEFAULT_WINDOW_SIZE);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PBFT_AUTH_MODE", "MAC"),
            ("PBFT_WINDOW_SIZE", "128"),
            ("PBFT_MAX_MESSAGE_SIZE", "4096"),
        ]
        .into_iter()
        .collect();

        let config = ProtocolConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.auth_mode, AuthMode::Mac);
        assert_eq!(config.window_size, 128);
        assert_eq!(config.max_message_size, 4096);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let result = ProtocolConfig::from_lookup(|k| {
            (k == "PBFT_WINDOW_SIZE").then(|| "lots".to_string())
        });
        assert_eq!(
            result,
            Err(ConfigError::InvalidEnvValue {
                key: "PBFT_WINDOW_SIZE",
                value: "lots".into()
            })
        );
    }
}
