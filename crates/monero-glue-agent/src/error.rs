use std::fmt;

use monero_glue_crypto::CryptoError;
use monero_glue_tx::extra::ExtraError;
use monero_glue_tx::TxError;
use thiserror::Error;

use crate::agent::Phase;
use crate::config::ConfigError;

/// Which host/device digest comparison failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    PrefixHash,
    AggregateHash,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::PrefixHash => write!(f, "prefix hash"),
            Checkpoint::AggregateHash => write!(f, "pre-MLSAG hash"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    /// Device response or call sequence does not fit the current phase
    #[error("protocol violation during {phase}: {reason}")]
    ProtocolViolation { phase: Phase, reason: String },

    /// Host-computed digest differs from the device-reported one
    #[error("integrity mismatch at {checkpoint} checkpoint")]
    IntegrityMismatch { checkpoint: Checkpoint },

    #[error("malformed extra: {0}")]
    MalformedExtra(#[from] ExtraError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("empty mix ring")]
    EmptyRing,

    #[error("ring size mismatch: expected {expected}, got {got}")]
    RingSizeMismatch { expected: usize, got: usize },

    #[error("invalid agent config: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid construction data: {0}")]
    InvalidConstructionData(String),

    /// Device communication error
    #[error("device error: {0}")]
    Device(Box<dyn std::error::Error + Send + Sync>),

    #[error("timeout waiting for device response")]
    DeviceTimeout,

    #[error("transaction error: {0}")]
    Tx(TxError),
}

impl From<TxError> for AgentError {
    fn from(value: TxError) -> Self {
        match value {
            TxError::EmptyRing => AgentError::EmptyRing,
            TxError::Crypto(e) => AgentError::Crypto(e),
            other => AgentError::Tx(other),
        }
    }
}

impl AgentError {
    pub(crate) fn violation(phase: Phase, reason: impl Into<String>) -> Self {
        AgentError::ProtocolViolation { phase, reason: reason.into() }
    }

    /// Digest mismatch, the one error that signals tampering or desync.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, AgentError::IntegrityMismatch { .. })
    }
}
