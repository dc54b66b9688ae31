//! Signing device contract.
//!
//! One trait for every device flavour. Devices that keep the whole
//! transaction in memory report `in_memory` at init; the agent then skips
//! the permutation notice and input re-confirmation calls.

use async_trait::async_trait;

use monero_glue_crypto::{Hash, Key};
use monero_glue_tx::{
    CtKey, EcdhTuple, MgSig, RangeProof, RctSig, TxDestinationEntry, TxIn, TxOut, TxSourceEntry,
};

use crate::params::SessionParameters;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitAck {
    pub in_memory: bool,
    /// One tag per destination, empty when `in_memory`.
    pub output_precommit_tags: Vec<Vec<u8>>,
}

/// Pseudo-output commitment with the device tag authenticating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoOut {
    pub commitment: Key,
    pub tag: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputAck {
    pub vin: TxIn,
    pub vin_tag: Vec<u8>,
    pub pseudo_out: PseudoOut,
    /// Encrypted pseudo-output blinding factor.
    pub alpha_enc: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputAck {
    pub vout: TxOut,
    pub vout_tag: Vec<u8>,
    pub range_proof: RangeProof,
    pub out_pk: CtKey,
    pub ecdh_info: EcdhTuple,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeAck {
    pub extra: Vec<u8>,
    pub prefix_hash: Hash,
    /// Signature shell: scheme type and fee fixed by the device.
    pub rv: RctSig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignAck {
    pub mg: MgSig,
    pub metadata: Vec<u8>,
}

#[async_trait]
pub trait DeviceSession: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn init(&mut self, params: &SessionParameters) -> Result<InitAck, Self::Error>;

    async fn setup_input(&mut self, source: &TxSourceEntry) -> Result<InputAck, Self::Error>;

    /// `permutation[i]` is the original index of the input now at `i`.
    async fn notify_permutation(&mut self, permutation: &[usize]) -> Result<(), Self::Error>;

    async fn reconfirm_input(
        &mut self,
        source: &TxSourceEntry,
        vin: &TxIn,
        vin_tag: &[u8],
        pseudo_out: Option<&PseudoOut>,
    ) -> Result<(), Self::Error>;

    async fn setup_output(
        &mut self,
        destination: &TxDestinationEntry,
        precommit_tag: &[u8],
    ) -> Result<OutputAck, Self::Error>;

    async fn finalize(&mut self) -> Result<FinalizeAck, Self::Error>;

    async fn aggregate_hash(&mut self) -> Result<Hash, Self::Error>;

    async fn sign_input(
        &mut self,
        source: &TxSourceEntry,
        vin: &TxIn,
        vin_tag: &[u8],
        pseudo_out: &PseudoOut,
        alpha_enc: &[u8],
    ) -> Result<SignAck, Self::Error>;
}
