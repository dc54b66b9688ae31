//! Host-side agent for hardware-wallet RingCT signing.
//!
//! The [`Agent`] drives a [`DeviceSession`] through the fixed phase sequence
//! of a transaction build, keeps the host copy of the transaction in a
//! [`BuildState`], and independently recomputes the prefix hash and the
//! pre-MLSAG hash the device claims to sign. Any disagreement aborts the
//! session with [`AgentError::IntegrityMismatch`].

pub mod agent;
pub mod config;
pub mod device;
pub mod error;
pub mod params;
pub mod state;
pub mod verify;

pub use agent::{Agent, Phase, SigningSession};
pub use config::{AgentConfig, ConfigError};
pub use device::{DeviceSession, FinalizeAck, InitAck, InputAck, OutputAck, PseudoOut, SignAck};
pub use error::{AgentError, Checkpoint};
pub use params::SessionParameters;
pub use state::{apply_permutation, BuildState};
