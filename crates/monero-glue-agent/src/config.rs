use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only transaction format the agent builds: RingCT, version 2.
pub const TX_VERSION_RCT: u64 = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tx version {0} not supported, RingCT signing builds version {TX_VERSION_RCT}")]
    UnsupportedTxVersion(u64),

    #[error("request timeout must be at least one second")]
    ZeroTimeout,
}

/// Agent settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Protocol version tag sent to the device at init
    pub protocol_version: u32,
    /// Transaction format version of the built skeleton, must be 2
    pub tx_version: u64,
    /// Per device call timeout, in seconds, at least 1
    pub request_timeout: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { protocol_version: 1, tx_version: TX_VERSION_RCT, request_timeout: 120 }
    }
}

impl AgentConfig {
    /// Parse and validate.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Only version 2 skeletons are built; a zero timeout is rejected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tx_version != TX_VERSION_RCT {
            return Err(ConfigError::UnsupportedTxVersion(self.tx_version));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}
