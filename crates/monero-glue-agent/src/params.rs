//! Session parameters sent to the device at init.

use monero_glue_crypto::Hash;
use monero_glue_tx::extra::encrypted_payment_id_from_extra;
use monero_glue_tx::wire::{KeccakWriter, WireWriter};
use monero_glue_tx::{TxConstructionData, TxDestinationEntry};

use crate::config::AgentConfig;
use crate::error::AgentError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParameters {
    pub version: u32,
    /// Encrypted payment id from the extra nonce, empty if absent.
    pub payment_id: Vec<u8>,
    pub unlock_time: u64,
    pub outputs: Vec<TxDestinationEntry>,
    pub change_dts: Option<TxDestinationEntry>,
    pub num_inputs: usize,
    /// Ring size of the first source.
    pub mixin: usize,
    pub fee: u64,
    pub account: u32,
    pub minor_indices: Vec<u32>,
}

impl SessionParameters {
    /// Validate construction data and derive the session parameters.
    pub fn from_construction_data(
        data: &TxConstructionData,
        config: &AgentConfig,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let first = data
            .sources
            .first()
            .ok_or_else(|| AgentError::InvalidConstructionData("no sources".into()))?;
        if data.splitted_dsts.is_empty() {
            return Err(AgentError::InvalidConstructionData("no destinations".into()));
        }

        let mixin = first.outputs.len();
        if mixin == 0 {
            return Err(AgentError::EmptyRing);
        }
        for (idx, src) in data.sources.iter().enumerate() {
            if src.outputs.len() != mixin {
                return Err(AgentError::RingSizeMismatch { expected: mixin, got: src.outputs.len() });
            }
            if src.real_output as usize >= mixin {
                return Err(AgentError::InvalidConstructionData(format!(
                    "source {idx}: real output {} outside ring of {mixin}",
                    src.real_output
                )));
            }
        }

        let inputs_sum = data
            .sources
            .iter()
            .try_fold(0u64, |acc, s| acc.checked_add(s.amount))
            .ok_or_else(|| AgentError::InvalidConstructionData("input amount overflow".into()))?;
        let outputs_sum = data
            .splitted_dsts
            .iter()
            .try_fold(0u64, |acc, d| acc.checked_add(d.amount))
            .ok_or_else(|| AgentError::InvalidConstructionData("output amount overflow".into()))?;
        let fee = inputs_sum.checked_sub(outputs_sum).ok_or_else(|| {
            AgentError::InvalidConstructionData(format!(
                "outputs {outputs_sum} exceed inputs {inputs_sum}"
            ))
        })?;

        Ok(Self {
            version: config.protocol_version,
            payment_id: encrypted_payment_id_from_extra(&data.extra)?,
            unlock_time: data.unlock_time,
            outputs: data.splitted_dsts.clone(),
            change_dts: data.change_dts.clone(),
            num_inputs: data.sources.len(),
            mixin,
            fee,
            account: data.subaddr_account,
            minor_indices: data.subaddr_indices.clone(),
        })
    }

    /// Canonical encoding: payment id blob, unlock time, outputs, change.
    pub fn encode<W: WireWriter>(&self, w: &mut W) {
        w.write_varint(self.payment_id.len() as u64);
        w.write_bytes(&self.payment_id);
        w.write_varint(self.unlock_time);
        w.write_varint(self.outputs.len() as u64);
        for dst in &self.outputs {
            encode_destination(dst, w);
        }
        match &self.change_dts {
            Some(change) => encode_destination(change, w),
            None => encode_destination(&TxDestinationEntry::default(), w),
        }
    }

    /// Keccak fingerprint of [`Self::encode`].
    pub fn digest(&self) -> Hash {
        let mut hasher = KeccakWriter::new();
        self.encode(&mut hasher);
        hasher.finalize()
    }
}

fn encode_destination<W: WireWriter>(dst: &TxDestinationEntry, w: &mut W) {
    w.write_varint(dst.amount);
    w.write_key(&dst.addr.spend_public_key);
    w.write_key(&dst.addr.view_public_key);
    w.write_u8(dst.is_subaddress as u8);
}
