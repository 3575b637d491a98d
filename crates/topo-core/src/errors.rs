//! Unified error type for topology operations
//!
//! Every failure carries an [`ErrorContext`] with the unique key, attempted
//! serial, mapping kind and (for batch submissions) the failing transaction.
//! Callers drive re-resolve loops off [`TopologyError::is_retryable`]; only
//! concurrency conflicts qualify.

use crate::crypto::Digest;
use crate::mapping::{MappingKind, UniqueKey};
use crate::types::Serial;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured context attached to topology errors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique key of the mapping involved
    pub unique_key: Option<UniqueKey>,
    /// Serial the caller attempted to write
    pub attempted_serial: Option<Serial>,
    /// Kind of the mapping involved
    pub kind: Option<MappingKind>,
    /// Position of the failing transaction inside a batch
    pub transaction_index: Option<usize>,
    /// Hash of the failing transaction
    pub transaction_hash: Option<Digest>,
}

impl ErrorContext {
    /// Empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a unique key; also records the mapping kind
    pub fn for_key(key: &UniqueKey) -> Self {
        Self {
            kind: Some(key.kind()),
            unique_key: Some(key.clone()),
            ..Self::default()
        }
    }

    /// Context for a mapping kind only
    pub fn for_kind(kind: MappingKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Record the attempted serial
    pub fn with_serial(mut self, serial: Serial) -> Self {
        self.attempted_serial = Some(serial);
        self
    }

    /// Record the failing transaction inside a batch
    pub fn with_transaction(mut self, index: usize, hash: Digest) -> Self {
        self.transaction_index = Some(index);
        self.transaction_hash = Some(hash);
        self
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.unique_key.is_none()
            && self.attempted_serial.is_none()
            && self.kind.is_none()
            && self.transaction_index.is_none()
            && self.transaction_hash.is_none()
    }

    /// Fill unset fields from `other`, keeping the ones already present
    fn merge(&mut self, other: ErrorContext) {
        if self.unique_key.is_none() {
            self.unique_key = other.unique_key;
        }
        if self.attempted_serial.is_none() {
            self.attempted_serial = other.attempted_serial;
        }
        if self.kind.is_none() {
            self.kind = other.kind;
        }
        if self.transaction_index.is_none() {
            self.transaction_index = other.transaction_index;
        }
        if self.transaction_hash.is_none() {
            self.transaction_hash = other.transaction_hash;
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let mut parts = Vec::new();
        if let Some(key) = &self.unique_key {
            parts.push(format!("unique_key={key}"));
        } else if let Some(kind) = self.kind {
            parts.push(format!("kind={kind}"));
        }
        if let Some(serial) = self.attempted_serial {
            parts.push(format!("serial={serial}"));
        }
        if let Some(index) = self.transaction_index {
            parts.push(format!("transaction=#{index}"));
        }
        if let Some(hash) = &self.transaction_hash {
            parts.push(format!("hash={hash}"));
        }
        write!(f, " ({})", parts.join(", "))
    }
}

/// Error type for all topology operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TopologyError {
    /// Mapping or transaction cannot be canonically encoded or decoded
    #[error("Encoding error: {message}{context}")]
    Encoding {
        /// Description of the missing or malformed input
        message: String,
        /// Structured context
        context: ErrorContext,
    },

    /// Business-rule violation detected while building a mapping
    #[error("Invalid mapping: {constraint}{context}")]
    InvalidMapping {
        /// The violated constraint
        constraint: String,
        /// Structured context
        context: ErrorContext,
    },

    /// A collaborator returned data that cannot exist in a consistent store
    #[error("Inconsistent topology state: {message}{context}")]
    InconsistentState {
        /// Description of the impossible data
        message: String,
        /// Structured context
        context: ErrorContext,
    },

    /// The store rejected a stale serial; re-resolve before retrying
    #[error("Concurrency conflict: {message}{context}")]
    ConcurrencyConflict {
        /// Description of the conflict
        message: String,
        /// Serial the store expected, when reported
        expected_serial: Option<Serial>,
        /// Structured context
        context: ErrorContext,
    },

    /// The store rejected a signature or a missing delegation
    #[error("Authorization rejected: {message}{context}")]
    AuthorizationRejected {
        /// Description of the rejection
        message: String,
        /// Structured context
        context: ErrorContext,
    },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// A collaborator call failed or timed out
    #[error("Transport failure: {message}")]
    TransportFailure {
        /// Description of the failure
        message: String,
        /// The write may or may not have been applied
        indeterminate: bool,
    },
}

impl TopologyError {
    /// Create an encoding error
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create an invalid mapping error naming the violated constraint
    pub fn invalid_mapping(constraint: impl Into<String>) -> Self {
        Self::InvalidMapping {
            constraint: constraint.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create an inconsistent state error
    pub fn inconsistent_state(message: impl Into<String>) -> Self {
        Self::InconsistentState {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a concurrency conflict error
    pub fn concurrency_conflict(
        message: impl Into<String>,
        expected_serial: Option<Serial>,
    ) -> Self {
        Self::ConcurrencyConflict {
            message: message.into(),
            expected_serial,
            context: ErrorContext::new(),
        }
    }

    /// Create an authorization rejected error
    pub fn authorization_rejected(message: impl Into<String>) -> Self {
        Self::AuthorizationRejected {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a transport failure
    pub fn transport(message: impl Into<String>, indeterminate: bool) -> Self {
        Self::TransportFailure {
            message: message.into(),
            indeterminate,
        }
    }

    /// Attach context, keeping any fields that are already set
    pub fn with_context(mut self, extra: ErrorContext) -> Self {
        if let Some(context) = self.context_mut() {
            context.merge(extra);
        }
        self
    }

    /// Structured context, if this variant carries one
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Encoding { context, .. }
            | Self::InvalidMapping { context, .. }
            | Self::InconsistentState { context, .. }
            | Self::ConcurrencyConflict { context, .. }
            | Self::AuthorizationRejected { context, .. } => Some(context),
            Self::Config { .. } | Self::TransportFailure { .. } => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            Self::Encoding { context, .. }
            | Self::InvalidMapping { context, .. }
            | Self::InconsistentState { context, .. }
            | Self::ConcurrencyConflict { context, .. }
            | Self::AuthorizationRejected { context, .. } => Some(context),
            Self::Config { .. } | Self::TransportFailure { .. } => None,
        }
    }

    /// Only concurrency conflicts may be retried, and only after re-resolving serials
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// The write may have been applied; re-resolve before deciding anything
    pub fn outcome_unknown(&self) -> bool {
        matches!(
            self,
            Self::TransportFailure {
                indeterminate: true,
                ..
            }
        )
    }
}

/// Standard Result type for topology operations
pub type Result<T> = std::result::Result<T, TopologyError>;
