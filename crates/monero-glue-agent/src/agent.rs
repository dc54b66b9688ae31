//! Signing orchestrator.
//!
//! A [`SigningSession`] walks one transaction through
//!
//!   Init -> InputsSet -> Permuted -> OutputsSet -> PrefixVerified
//!        -> SignatureAssembled -> AggregateVerified -> InputsSigned -> Done
//!
//! Each phase method checks that the previous phase completed. The first
//! error aborts the session; later calls fail with a protocol violation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};

use monero_glue_crypto::Hash;
use monero_glue_tx::{
    serialize_transaction, CtKey, RangeProof, RctSig, RctType, Transaction, TxConstructionData,
    TxIn, UnsignedTxSet,
};

use crate::config::AgentConfig;
use crate::device::DeviceSession;
use crate::error::AgentError;
use crate::params::SessionParameters;
use crate::state::BuildState;
use crate::verify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    InputsSet,
    Permuted,
    OutputsSet,
    PrefixVerified,
    SignatureAssembled,
    AggregateVerified,
    InputsSigned,
    Done,
}

impl Phase {
    /// Phase that must have completed before this one may run.
    pub fn previous(self) -> Option<Phase> {
        match self {
            Phase::Init => None,
            Phase::InputsSet => Some(Phase::Init),
            Phase::Permuted => Some(Phase::InputsSet),
            Phase::OutputsSet => Some(Phase::Permuted),
            Phase::PrefixVerified => Some(Phase::OutputsSet),
            Phase::SignatureAssembled => Some(Phase::PrefixVerified),
            Phase::AggregateVerified => Some(Phase::SignatureAssembled),
            Phase::InputsSigned => Some(Phase::AggregateVerified),
            Phase::Done => Some(Phase::InputsSigned),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Run one device call under the request timeout.
async fn exchange<T, E, F>(timeout: Duration, call: F) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(AgentError::Device(Box::new(e))),
        Err(_e) => Err(AgentError::DeviceTimeout),
    }
}

/// Host agent owning one signing device.
pub struct Agent<D> {
    device: D,
    config: AgentConfig,
}

impl<D: DeviceSession> Agent<D> {
    pub fn new(device: D) -> Self {
        Self::with_config(device, AgentConfig::default())
    }

    pub fn with_config(device: D, config: AgentConfig) -> Self {
        Self { device, config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Start a session. The device stays borrowed until the session is dropped.
    pub fn session<'a>(&'a mut self, data: &'a TxConstructionData) -> SigningSession<'a, D> {
        SigningSession::new(&mut self.device, &self.config, data)
    }

    /// Run every phase for one transaction.
    pub async fn sign_transaction(
        &mut self,
        data: &TxConstructionData,
    ) -> Result<Transaction, AgentError> {
        let mut session = self.session(data);
        session.init().await?;
        session.set_inputs().await?;
        session.permute().await?;
        session.set_outputs().await?;
        session.finalize().await?;
        session.assemble_signature()?;
        session.verify_aggregate().await?;
        session.sign_inputs().await?;
        session.finish()
    }

    /// Sign and serialize one transaction.
    pub async fn sign_transaction_bytes(
        &mut self,
        data: &TxConstructionData,
    ) -> Result<Vec<u8>, AgentError> {
        let tx = self.sign_transaction(data).await?;
        Ok(serialize_transaction(&tx)?)
    }

    /// Sign each entry in its own session, one after another.
    ///
    /// A failed entry does not stop the batch.
    pub async fn sign_batch(
        &mut self,
        batch: &[TxConstructionData],
    ) -> Vec<Result<Vec<u8>, AgentError>> {
        let mut results = Vec::with_capacity(batch.len());
        for (idx, data) in batch.iter().enumerate() {
            let res = self.sign_transaction_bytes(data).await;
            if let Err(e) = &res {
                warn!("batch entry {idx} failed: {e}");
            }
            results.push(res);
        }
        results
    }

    pub async fn sign_unsigned_tx_set(
        &mut self,
        set: &UnsignedTxSet,
    ) -> Vec<Result<Vec<u8>, AgentError>> {
        self.sign_batch(&set.txes).await
    }
}

/// One transaction signing session.
pub struct SigningSession<'a, D> {
    device: &'a mut D,
    config: &'a AgentConfig,
    data: &'a TxConstructionData,
    timeout: Duration,

    phase: Option<Phase>,
    aborted: bool,

    params: Option<SessionParameters>,
    in_memory: bool,
    output_precommit_tags: Vec<Vec<u8>>,
    state: BuildState,
    prefix_hash: Option<Hash>,
    rv: Option<RctSig>,
    input_metadata: Vec<Vec<u8>>,
}

impl<'a, D: DeviceSession> SigningSession<'a, D> {
    fn new(device: &'a mut D, config: &'a AgentConfig, data: &'a TxConstructionData) -> Self {
        Self {
            device,
            config,
            data,
            timeout: config.timeout(),
            phase: None,
            aborted: false,
            params: None,
            in_memory: false,
            output_precommit_tags: Vec::new(),
            state: BuildState::new(config.tx_version, data.unlock_time),
            prefix_hash: None,
            rv: None,
            input_metadata: Vec::new(),
        }
    }

    /// Last completed phase.
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    pub fn params(&self) -> Option<&SessionParameters> {
        self.params.as_ref()
    }

    pub fn in_memory(&self) -> bool {
        self.in_memory
    }

    /// Per-input metadata returned by the device with each signature, in
    /// signed (permuted) input order.
    pub fn input_metadata(&self) -> &[Vec<u8>] {
        &self.input_metadata
    }

    fn enter(&self, phase: Phase) -> Result<(), AgentError> {
        if self.aborted {
            return Err(AgentError::violation(phase, "session aborted"));
        }
        if self.phase != phase.previous() {
            return Err(AgentError::violation(
                phase,
                format!("called after {:?}", self.phase),
            ));
        }
        Ok(())
    }

    fn complete<T>(&mut self, phase: Phase, res: Result<T, AgentError>) -> Result<T, AgentError> {
        match res {
            Ok(v) => {
                debug!("phase {phase} complete");
                self.phase = Some(phase);
                Ok(v)
            }
            Err(e) => {
                warn!("session aborted in {phase}: {e}");
                self.aborted = true;
                Err(e)
            }
        }
    }

    pub async fn init(&mut self) -> Result<(), AgentError> {
        self.enter(Phase::Init)?;
        let res = self.do_init().await;
        self.complete(Phase::Init, res)
    }

    async fn do_init(&mut self) -> Result<(), AgentError> {
        let params = SessionParameters::from_construction_data(self.data, self.config)?;
        info!(
            "starting signing session {}: {} inputs, {} outputs, ring size {}, fee {}",
            hex::encode(&params.digest()[..8]),
            params.num_inputs,
            params.outputs.len(),
            params.mixin,
            params.fee
        );

        let ack = exchange(self.timeout, self.device.init(&params)).await?;
        if !ack.in_memory && ack.output_precommit_tags.len() != params.outputs.len() {
            return Err(AgentError::violation(
                Phase::Init,
                format!(
                    "{} precommit tags for {} outputs",
                    ack.output_precommit_tags.len(),
                    params.outputs.len()
                ),
            ));
        }

        self.in_memory = ack.in_memory;
        self.output_precommit_tags = ack.output_precommit_tags;
        self.params = Some(params);
        Ok(())
    }

    pub async fn set_inputs(&mut self) -> Result<(), AgentError> {
        self.enter(Phase::InputsSet)?;
        let res = self.do_set_inputs().await;
        self.complete(Phase::InputsSet, res)
    }

    async fn do_set_inputs(&mut self) -> Result<(), AgentError> {
        for (idx, source) in self.data.sources.iter().enumerate() {
            let ack = exchange(self.timeout, self.device.setup_input(source)).await?;
            match &ack.vin {
                TxIn::ToKey { key_offsets, .. } if key_offsets.len() == source.outputs.len() => {}
                TxIn::ToKey { key_offsets, .. } => {
                    return Err(AgentError::violation(
                        Phase::InputsSet,
                        format!(
                            "input {idx}: {} key offsets for ring of {}",
                            key_offsets.len(),
                            source.outputs.len()
                        ),
                    ))
                }
                TxIn::Gen { .. } => {
                    return Err(AgentError::violation(
                        Phase::InputsSet,
                        format!("input {idx} is not a key input"),
                    ))
                }
            }
            debug!("input {idx} set up");
            self.state.push_input(source.clone(), ack);
        }
        Ok(())
    }

    pub async fn permute(&mut self) -> Result<(), AgentError> {
        self.enter(Phase::Permuted)?;
        let res = self.do_permute().await;
        self.complete(Phase::Permuted, res)
    }

    async fn do_permute(&mut self) -> Result<(), AgentError> {
        let perm = self.state.compute_permutation()?;
        self.state.apply_permutation(&perm)?;
        debug!("input permutation {perm:?}");

        if self.in_memory {
            return Ok(());
        }

        exchange(self.timeout, self.device.notify_permutation(&perm)).await?;
        for idx in 0..self.state.num_inputs() {
            let state = &self.state;
            exchange(
                self.timeout,
                self.device.reconfirm_input(
                    &state.sources()[idx],
                    &state.inputs()[idx],
                    &state.vin_tags()[idx],
                    Some(&state.pseudo_outs()[idx]),
                ),
            )
            .await?;
        }
        Ok(())
    }

    pub async fn set_outputs(&mut self) -> Result<(), AgentError> {
        self.enter(Phase::OutputsSet)?;
        let res = self.do_set_outputs().await;
        self.complete(Phase::OutputsSet, res)
    }

    async fn do_set_outputs(&mut self) -> Result<(), AgentError> {
        for (idx, destination) in self.data.splitted_dsts.iter().enumerate() {
            let tag: &[u8] = if self.in_memory {
                &[]
            } else {
                self.output_precommit_tags.get(idx).map(Vec::as_slice).ok_or_else(|| {
                    AgentError::violation(Phase::OutputsSet, format!("no precommit tag for output {idx}"))
                })?
            };
            let ack = exchange(self.timeout, self.device.setup_output(destination, tag)).await?;
            debug!("output {idx} set up");
            self.state.push_output(ack);
        }
        Ok(())
    }

    pub async fn finalize(&mut self) -> Result<(), AgentError> {
        self.enter(Phase::PrefixVerified)?;
        let res = self.do_finalize().await;
        self.complete(Phase::PrefixVerified, res)
    }

    async fn do_finalize(&mut self) -> Result<(), AgentError> {
        let ack = exchange(self.timeout, self.device.finalize()).await?;
        self.state.set_extra(ack.extra);

        let prefix_hash = verify::check_prefix_hash(self.state.prefix(), &ack.prefix_hash)?;

        let rv = ack.rv;
        if rv.rct_type == RctType::Null {
            return Err(AgentError::violation(Phase::PrefixVerified, "signature shell has no RingCT type"));
        }
        let fee = self
            .params
            .as_ref()
            .map(|p| p.fee)
            .ok_or_else(|| AgentError::violation(Phase::PrefixVerified, "no session parameters"))?;
        if rv.txn_fee != fee {
            return Err(AgentError::violation(
                Phase::PrefixVerified,
                format!("device fee {} differs from session fee {fee}", rv.txn_fee),
            ));
        }

        self.prefix_hash = Some(prefix_hash);
        self.rv = Some(rv);
        Ok(())
    }

    /// Fill the shell with the collected per-input and per-output data.
    pub fn assemble_signature(&mut self) -> Result<(), AgentError> {
        self.enter(Phase::SignatureAssembled)?;
        let res = self.do_assemble_signature();
        self.complete(Phase::SignatureAssembled, res)
    }

    fn do_assemble_signature(&mut self) -> Result<(), AgentError> {
        let phase = Phase::SignatureAssembled;
        let (Some(rv), Some(prefix_hash)) = (self.rv.as_mut(), self.prefix_hash) else {
            return Err(AgentError::violation(phase, "no verified signature shell"));
        };
        let state = &self.state;

        rv.message = prefix_hash;
        rv.mix_ring = build_mix_ring(rv.rct_type, state);

        rv.pseudo_outs.clear();
        rv.p.pseudo_outs.clear();
        match rv.rct_type {
            RctType::Simple => rv.pseudo_outs = state.pseudo_out_commitments(),
            RctType::SimpleBulletproof => rv.p.pseudo_outs = state.pseudo_out_commitments(),
            _ => {}
        }

        let kind = rv
            .rct_type
            .range_proof_kind()
            .ok_or_else(|| AgentError::violation(phase, "signature shell has no RingCT type"))?;
        rv.p.range_sigs.clear();
        rv.p.bulletproofs.clear();
        for (idx, proof) in state.range_proofs().iter().enumerate() {
            if proof.kind() != kind {
                return Err(AgentError::violation(
                    phase,
                    format!("output {idx}: {:?} proof for {:?} scheme", proof.kind(), rv.rct_type),
                ));
            }
            match proof {
                RangeProof::Borromean(sig) => rv.p.range_sigs.push(sig.clone()),
                RangeProof::Bulletproof(bp) => rv.p.bulletproofs.push(bp.clone()),
            }
        }

        rv.out_pk = state.out_pk().to_vec();
        rv.ecdh_info = state.ecdh_info().to_vec();
        Ok(())
    }

    pub async fn verify_aggregate(&mut self) -> Result<(), AgentError> {
        self.enter(Phase::AggregateVerified)?;
        let res = self.do_verify_aggregate().await;
        self.complete(Phase::AggregateVerified, res)
    }

    async fn do_verify_aggregate(&mut self) -> Result<(), AgentError> {
        let reported = exchange(self.timeout, self.device.aggregate_hash()).await?;
        let rv = self
            .rv
            .as_ref()
            .ok_or_else(|| AgentError::violation(Phase::AggregateVerified, "no signature shell"))?;
        verify::check_aggregate_hash(rv, &reported)
    }

    pub async fn sign_inputs(&mut self) -> Result<(), AgentError> {
        self.enter(Phase::InputsSigned)?;
        let res = self.do_sign_inputs().await;
        self.complete(Phase::InputsSigned, res)
    }

    async fn do_sign_inputs(&mut self) -> Result<(), AgentError> {
        let mut mgs = Vec::with_capacity(self.state.num_inputs());
        let mut metadata = Vec::with_capacity(self.state.num_inputs());
        for idx in 0..self.state.num_inputs() {
            let state = &self.state;
            let ack = exchange(
                self.timeout,
                self.device.sign_input(
                    &state.sources()[idx],
                    &state.inputs()[idx],
                    &state.vin_tags()[idx],
                    &state.pseudo_outs()[idx],
                    &state.alphas()[idx],
                ),
            )
            .await?;
            debug!("input {idx} signed");
            mgs.push(ack.mg);
            metadata.push(ack.metadata);
        }

        let rv = self
            .rv
            .as_mut()
            .ok_or_else(|| AgentError::violation(Phase::InputsSigned, "no signature shell"))?;
        rv.p.mgs = mgs;
        self.input_metadata = metadata;
        Ok(())
    }

    /// Attach the signature and hand out the finished transaction.
    pub fn finish(mut self) -> Result<Transaction, AgentError> {
        self.enter(Phase::Done)?;
        let rct_signatures = self
            .rv
            .take()
            .ok_or_else(|| AgentError::violation(Phase::Done, "no signature"))?;
        let tx = Transaction {
            prefix: self.state.into_prefix(),
            signatures: Vec::new(),
            rct_signatures,
        };
        info!(
            "signing session done: {} inputs, {} outputs",
            tx.prefix.vin.len(),
            tx.prefix.vout.len()
        );
        Ok(tx)
    }
}

/// Ring members as the MLSAG sees them: one row per input for simple
/// schemes, one row per ring position for full ones.
fn build_mix_ring(rct_type: RctType, state: &BuildState) -> Vec<Vec<CtKey>> {
    let rings: Vec<Vec<CtKey>> = state
        .sources()
        .iter()
        .map(|s| s.outputs.iter().map(|o| o.key).collect())
        .collect();
    if rct_type.is_simple() {
        return rings;
    }

    let ring_size = rings.first().map(Vec::len).unwrap_or(0);
    (0..ring_size)
        .map(|pos| rings.iter().map(|ring| ring[pos]).collect())
        .collect()
}
