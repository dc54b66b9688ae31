//! Host-side transaction build state.
//!
//! Per-input data lives in parallel vectors that must stay index aligned
//! with the source list. They are private; `push_input` and `swap_inputs`
//! are the only ways to change them and both touch every vector.

use monero_glue_crypto::Key;
use monero_glue_tx::{CtKey, EcdhTuple, RangeProof, TxIn, TxPrefix, TxSourceEntry};

use crate::agent::Phase;
use crate::device::{InputAck, OutputAck, PseudoOut};
use crate::error::AgentError;

#[derive(Debug, Clone)]
pub struct BuildState {
    tx: TxPrefix,

    sources: Vec<TxSourceEntry>,
    vin_tags: Vec<Vec<u8>>,
    pseudo_outs: Vec<PseudoOut>,
    alphas: Vec<Vec<u8>>,

    range_proofs: Vec<RangeProof>,
    out_pk: Vec<CtKey>,
    ecdh_info: Vec<EcdhTuple>,

    permutation: Vec<usize>,
}

impl BuildState {
    pub fn new(version: u64, unlock_time: u64) -> Self {
        Self {
            tx: TxPrefix::new(version, unlock_time),
            sources: Vec::new(),
            vin_tags: Vec::new(),
            pseudo_outs: Vec::new(),
            alphas: Vec::new(),
            range_proofs: Vec::new(),
            out_pk: Vec::new(),
            ecdh_info: Vec::new(),
            permutation: Vec::new(),
        }
    }

    pub fn push_input(&mut self, source: TxSourceEntry, ack: InputAck) {
        self.tx.vin.push(ack.vin);
        self.vin_tags.push(ack.vin_tag);
        self.pseudo_outs.push(ack.pseudo_out);
        self.alphas.push(ack.alpha_enc);
        self.sources.push(source);
    }

    /// Swap inputs `i` and `j` in every aligned vector.
    pub fn swap_inputs(&mut self, i: usize, j: usize) {
        self.tx.vin.swap(i, j);
        self.vin_tags.swap(i, j);
        self.pseudo_outs.swap(i, j);
        self.alphas.swap(i, j);
        self.sources.swap(i, j);
    }

    pub fn push_output(&mut self, ack: OutputAck) {
        self.tx.vout.push(ack.vout);
        self.range_proofs.push(ack.range_proof);
        self.out_pk.push(ack.out_pk);
        self.ecdh_info.push(ack.ecdh_info);
    }

    pub fn set_extra(&mut self, extra: Vec<u8>) {
        self.tx.extra = extra;
    }

    /// Order inputs by descending key image bytes, stable on ties.
    ///
    /// Returns `perm` with `perm[i]` the current index of the input that
    /// belongs at position `i`.
    pub fn compute_permutation(&self) -> Result<Vec<usize>, AgentError> {
        let mut keyed = Vec::with_capacity(self.tx.vin.len());
        for (idx, vin) in self.tx.vin.iter().enumerate() {
            let key_image = vin
                .key_image()
                .ok_or_else(|| AgentError::violation(Phase::Permuted, format!("input {idx} has no key image")))?;
            keyed.push((idx, *key_image));
        }
        keyed.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(keyed.into_iter().map(|(idx, _)| idx).collect())
    }

    /// Reorder every aligned vector by `perm` and remember it.
    pub fn apply_permutation(&mut self, perm: &[usize]) -> Result<(), AgentError> {
        if perm.len() != self.tx.vin.len() {
            return Err(AgentError::violation(
                Phase::Permuted,
                format!("permutation of {} for {} inputs", perm.len(), self.tx.vin.len()),
            ));
        }
        apply_permutation(perm, |i, j| self.swap_inputs(i, j))?;
        self.permutation = perm.to_vec();
        Ok(())
    }

    pub fn prefix(&self) -> &TxPrefix {
        &self.tx
    }

    pub fn into_prefix(self) -> TxPrefix {
        self.tx
    }

    pub fn inputs(&self) -> &[TxIn] {
        &self.tx.vin
    }

    pub fn sources(&self) -> &[TxSourceEntry] {
        &self.sources
    }

    pub fn vin_tags(&self) -> &[Vec<u8>] {
        &self.vin_tags
    }

    pub fn pseudo_outs(&self) -> &[PseudoOut] {
        &self.pseudo_outs
    }

    pub fn pseudo_out_commitments(&self) -> Vec<Key> {
        self.pseudo_outs.iter().map(|p| p.commitment).collect()
    }

    pub fn alphas(&self) -> &[Vec<u8>] {
        &self.alphas
    }

    pub fn range_proofs(&self) -> &[RangeProof] {
        &self.range_proofs
    }

    pub fn out_pk(&self) -> &[CtKey] {
        &self.out_pk
    }

    pub fn ecdh_info(&self) -> &[EcdhTuple] {
        &self.ecdh_info
    }

    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    pub fn num_inputs(&self) -> usize {
        self.tx.vin.len()
    }
}

/// Apply `perm` through `swap` by walking its cycles.
///
/// After the call, position `i` holds the element that was at `perm[i]`.
pub fn apply_permutation<F>(perm: &[usize], mut swap: F) -> Result<(), AgentError>
where
    F: FnMut(usize, usize),
{
    let n = perm.len();
    let mut seen = vec![false; n];
    for &p in perm {
        if p >= n || seen[p] {
            return Err(AgentError::violation(Phase::Permuted, "not a permutation"));
        }
        seen[p] = true;
    }

    let mut perm = perm.to_vec();
    for i in 0..n {
        let mut current = i;
        while i != perm[current] {
            let next = perm[current];
            swap(current, next);
            perm[current] = current;
            current = next;
        }
        perm[current] = current;
    }
    Ok(())
}
