//! Onboarding configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! store = { synchronizer = "global-domain::1220..." }
//! party_hint = "alice"
//! confirming_threshold = 1
//!
//! [[hosting]]
//! participant = "participant1::1220..."
//! permission = "confirmation"
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 100
//! strategy = "exponential"
//! ```

use crate::crypto::SigningPublicKey;
use crate::errors::{Result, TopologyError};
use crate::mapping::HostingParticipant;
use crate::retry::{BackoffStrategy, RetryPolicy};
use crate::types::StoreId;
use crate::workflow::OnboardingRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Trait for configuration validation
pub trait ConfigValidation {
    /// Validate this configuration
    fn validate(&self) -> Result<()>;
}

/// Retry settings as written in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound on any delay, in milliseconds
    pub max_delay_ms: u64,
    /// How delays grow
    pub strategy: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            strategy: policy.strategy,
        }
    }
}

impl ConfigValidation for RetryConfig {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(TopologyError::config("retry.max_attempts must be at least 1"));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(TopologyError::config(
                "retry.max_delay_ms must not be below retry.initial_delay_ms",
            ));
        }
        Ok(())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            strategy: config.strategy,
        }
    }
}

fn default_threshold() -> u32 {
    1
}

/// Settings for onboarding one external party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingConfig {
    /// Store the onboarding transactions target
    pub store: StoreId,
    /// Identifier part of the party id
    #[serde(default)]
    pub party_hint: Option<String>,
    /// Signatures required from the party's keys
    #[serde(default = "default_threshold")]
    pub key_threshold: u32,
    /// Confirming participants required
    #[serde(default = "default_threshold")]
    pub confirming_threshold: u32,
    /// Participants hosting the party
    pub hosting: Vec<HostingParticipant>,
    /// Conflict retry settings
    #[serde(default)]
    pub retry: RetryConfig,
}

impl OnboardingConfig {
    /// Read and validate a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TopologyError::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TopologyError::config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Onboarding request for `public_key`
    pub fn to_request(&self, public_key: SigningPublicKey) -> OnboardingRequest {
        OnboardingRequest {
            public_key,
            party_hint: self.party_hint.clone(),
            hosting: self.hosting.clone(),
            confirming_threshold: self.confirming_threshold,
            key_threshold: self.key_threshold,
        }
    }

    /// Retry policy for conflicts
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}

impl ConfigValidation for OnboardingConfig {
    fn validate(&self) -> Result<()> {
        if self.hosting.is_empty() {
            return Err(TopologyError::config("at least one hosting participant is required"));
        }
        let mut seen = BTreeSet::new();
        for host in &self.hosting {
            if !seen.insert(&host.participant) {
                return Err(TopologyError::config(format!(
                    "hosting participant {} listed twice",
                    host.participant
                )));
            }
        }
        let confirmers = self
            .hosting
            .iter()
            .filter(|h| h.permission.can_confirm())
            .count();
        if self.confirming_threshold == 0 || self.confirming_threshold as usize > confirmers {
            return Err(TopologyError::config(format!(
                "confirming_threshold must be between 1 and {confirmers}"
            )));
        }
        // A freshly onboarded party holds exactly one signing key.
        if self.key_threshold != 1 {
            return Err(TopologyError::config("key_threshold must be 1 for a new party"));
        }
        if let Some(hint) = &self.party_hint {
            if hint.is_empty() || hint.contains("::") {
                return Err(TopologyError::config(
                    "party_hint must be non-empty and must not contain '::'",
                ));
            }
        }
        self.retry.validate()
    }
}
