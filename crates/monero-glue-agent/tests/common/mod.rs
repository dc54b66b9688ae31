//! Reference device and wallet fixtures shared by the integration tests.
#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;

use monero_glue_agent::{
    DeviceSession, FinalizeAck, InitAck, InputAck, OutputAck, PseudoOut, SessionParameters, SignAck,
};
use monero_glue_crypto::{
    compress, decompress, derive_public_key, generate_key_derivation, generate_key_image_helper,
    keccak256_parts, public_key, random_scalar, scalar_mult_point, subaddress_spend_public_key,
    AccountKeys, CryptoError, Hash, Key, Scalar, SubaddressIndex, SubaddressTable,
};
use monero_glue_tx::extra::{
    add_extra_nonce_to_extra, add_tx_pub_key_to_extra, set_encrypted_payment_id_to_nonce,
};
use monero_glue_tx::{
    absolute_output_offsets_to_relative, pre_mlsag_hash, prefix_hash, AccountPublicAddress,
    Bulletproof, CtKey, EcdhTuple, MgSig, OutputEntry, RangeProof, RangeSig, RctSig, RctType,
    TxConstructionData, TxDestinationEntry, TxIn, TxOut, TxPrefix, TxSourceEntry,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_key() -> Key {
    public_key(&random_scalar())
}

fn tag(domain: &[u8], data: &[u8]) -> Vec<u8> {
    keccak256_parts(&[domain, data]).to_vec()
}

#[derive(Debug, thiserror::Error)]
pub enum RefDeviceError {
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("simulated device failure")]
    Simulated,
}

fn rejected(reason: impl Into<String>) -> RefDeviceError {
    RefDeviceError::Rejected(reason.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Flip a byte of the reported prefix hash
    WrongPrefixHash,
    /// Return extra bytes that differ from the hashed ones
    TamperExtra,
    /// Flip a byte of the reported pre-MLSAG hash
    WrongAggregate,
    /// Fail `init` of the n-th session (0-based)
    FailSession(usize),
    /// Return one precommit tag too few
    DropPrecommitTag,
    /// Return range proofs of the other kind
    WrongProofKind,
    /// Report a fee different from the session fee
    WrongFee,
    /// Never answer the aggregate hash request
    Stall,
}

struct DeviceInput {
    vin: TxIn,
    pseudo_out: Key,
    /// Real ring member of the source this input spends.
    real_key: Key,
}

/// One `reconfirm_input` call as the device saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconfirm {
    pub amount: u64,
    pub key_image: Key,
    pub vin_tag: Vec<u8>,
    pub pseudo_out: Option<Key>,
}

struct DeviceTx {
    params: SessionParameters,
    tx_secret: Scalar,
    inputs: Vec<DeviceInput>,
    outputs: Vec<OutputAck>,
    rings: Vec<Vec<CtKey>>,
    reconfirmed: usize,
    prefix_hash: Option<Hash>,
}

/// Software device holding the wallet keys.
pub struct RefDevice {
    keys: AccountKeys,
    table: SubaddressTable,
    pub in_memory: bool,
    pub rct_type: RctType,
    pub faults: Vec<Fault>,
    pub calls: Vec<&'static str>,
    pub sessions: usize,
    pub last_prefix_hash: Option<Hash>,
    pub last_permutation: Option<Vec<usize>>,
    pub reconfirms: Vec<Reconfirm>,
    tx: Option<DeviceTx>,
}

impl RefDevice {
    pub fn new(wallet: &Wallet) -> Self {
        Self {
            keys: wallet.keys.clone(),
            table: wallet.table.clone(),
            in_memory: true,
            rct_type: RctType::SimpleBulletproof,
            faults: Vec::new(),
            calls: Vec::new(),
            sessions: 0,
            last_prefix_hash: None,
            last_permutation: None,
            reconfirms: Vec::new(),
            tx: None,
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn not_in_memory(mut self) -> Self {
        self.in_memory = false;
        self
    }

    pub fn with_rct_type(mut self, rct_type: RctType) -> Self {
        self.rct_type = rct_type;
        self
    }

    pub fn called(&self, name: &str) -> usize {
        self.calls.iter().filter(|c| **c == name).count()
    }

    fn has(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }

    fn tx(&mut self) -> Result<&mut DeviceTx, RefDeviceError> {
        self.tx.as_mut().ok_or_else(|| rejected("no transaction in progress"))
    }

    fn vin_tag(vin: &TxIn) -> Vec<u8> {
        tag(b"vin", vin.key_image().map(|k| k.as_slice()).unwrap_or_default())
    }

    /// Metadata returned with each input signature.
    pub fn sign_metadata(vin: &TxIn) -> Vec<u8> {
        tag(b"meta", vin.key_image().map(|k| k.as_slice()).unwrap_or_default())
    }

    fn real_key(source: &TxSourceEntry) -> Option<Key> {
        source.outputs.get(source.real_output as usize).map(|o| o.key.dest)
    }

    fn precommit_tag(idx: usize) -> Vec<u8> {
        tag(b"out", &(idx as u64).to_le_bytes())
    }

    /// Descending key image order, the same rule the host applies.
    fn sort_inputs(tx: &mut DeviceTx) {
        let mut order: Vec<usize> = (0..tx.inputs.len()).collect();
        order.sort_by(|a, b| tx.inputs[*b].vin.key_image().cmp(&tx.inputs[*a].vin.key_image()));
        let mut inputs: Vec<Option<DeviceInput>> = tx.inputs.drain(..).map(Some).collect();
        let mut rings: Vec<Option<Vec<CtKey>>> = tx.rings.drain(..).map(Some).collect();
        for idx in order {
            if let (Some(input), Some(ring)) = (inputs[idx].take(), rings[idx].take()) {
                tx.inputs.push(input);
                tx.rings.push(ring);
            }
        }
    }

    fn signature_shell(&self, tx: &DeviceTx) -> RctSig {
        RctSig {
            rct_type: self.rct_type,
            txn_fee: tx.params.fee,
            ..Default::default()
        }
    }

    /// The device's own view of the filled signature.
    fn device_rv(&self, tx: &DeviceTx) -> RctSig {
        let mut rv = self.signature_shell(tx);
        rv.message = tx.prefix_hash.unwrap_or_default();
        rv.mix_ring = tx.rings.clone();
        let pseudo_outs: Vec<Key> = tx.inputs.iter().map(|i| i.pseudo_out).collect();
        match self.rct_type {
            RctType::Simple => rv.pseudo_outs = pseudo_outs,
            RctType::SimpleBulletproof => rv.p.pseudo_outs = pseudo_outs,
            _ => {}
        }
        for out in &tx.outputs {
            match &out.range_proof {
                RangeProof::Borromean(sig) => rv.p.range_sigs.push(sig.clone()),
                RangeProof::Bulletproof(bp) => rv.p.bulletproofs.push(bp.clone()),
            }
            rv.out_pk.push(out.out_pk);
            rv.ecdh_info.push(out.ecdh_info);
        }
        rv
    }

    fn range_proof(&self) -> RangeProof {
        let bulletproof = self.rct_type.is_bulletproof() != self.has(Fault::WrongProofKind);
        if bulletproof {
            RangeProof::Bulletproof(Bulletproof {
                big_a: random_key(),
                big_s: random_key(),
                t1: random_key(),
                t2: random_key(),
                taux: random_key(),
                mu: random_key(),
                l: (0..6).map(|_| random_key()).collect(),
                r: (0..6).map(|_| random_key()).collect(),
                a: random_key(),
                b: random_key(),
                t: random_key(),
            })
        } else {
            let mut sig = RangeSig::default();
            sig.asig.ee = random_key();
            sig.ci[0] = random_key();
            RangeProof::Borromean(sig)
        }
    }
}

#[async_trait]
impl DeviceSession for RefDevice {
    type Error = RefDeviceError;

    async fn init(&mut self, params: &SessionParameters) -> Result<InitAck, Self::Error> {
        self.calls.push("init");
        let session = self.sessions;
        self.sessions += 1;
        if self.has(Fault::FailSession(session)) {
            self.tx = None;
            return Err(RefDeviceError::Simulated);
        }

        self.tx = Some(DeviceTx {
            params: params.clone(),
            tx_secret: random_scalar(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            rings: Vec::new(),
            reconfirmed: 0,
            prefix_hash: None,
        });

        let mut tags = Vec::new();
        if !self.in_memory {
            tags = (0..params.outputs.len()).map(Self::precommit_tag).collect();
            if self.has(Fault::DropPrecommitTag) {
                tags.pop();
            }
        }
        Ok(InitAck { in_memory: self.in_memory, output_precommit_tags: tags })
    }

    async fn setup_input(&mut self, source: &TxSourceEntry) -> Result<InputAck, Self::Error> {
        self.calls.push("setup_input");
        let real = source
            .outputs
            .get(source.real_output as usize)
            .ok_or_else(|| rejected("real output outside ring"))?;
        let (_, key_image, _) = generate_key_image_helper(
            &self.keys,
            &self.table,
            &real.key.dest,
            &source.real_out_tx_key,
            &source.real_out_additional_tx_keys,
            source.real_output_in_tx_index as usize,
        )?;

        let offsets: Vec<u64> = source.outputs.iter().map(|o| o.index).collect();
        let vin = TxIn::ToKey {
            amount: 0,
            key_offsets: absolute_output_offsets_to_relative(&offsets),
            key_image,
        };
        let commitment = random_key();

        let tx = self.tx()?;
        tx.inputs.push(DeviceInput { vin: vin.clone(), pseudo_out: commitment, real_key: real.key.dest });
        tx.rings.push(source.outputs.iter().map(|o| o.key).collect());

        Ok(InputAck {
            vin_tag: Self::vin_tag(&vin),
            vin,
            pseudo_out: PseudoOut { commitment, tag: tag(b"pseudo", &commitment) },
            alpha_enc: random_key().to_vec(),
        })
    }

    async fn notify_permutation(&mut self, permutation: &[usize]) -> Result<(), Self::Error> {
        self.calls.push("notify_permutation");
        self.last_permutation = Some(permutation.to_vec());
        let tx = self.tx()?;

        let mut expected: Vec<usize> = (0..tx.inputs.len()).collect();
        expected.sort_by(|a, b| tx.inputs[*b].vin.key_image().cmp(&tx.inputs[*a].vin.key_image()));
        if expected != permutation {
            return Err(rejected(format!("permutation {permutation:?}, expected {expected:?}")));
        }
        Self::sort_inputs(tx);
        Ok(())
    }

    async fn reconfirm_input(
        &mut self,
        source: &TxSourceEntry,
        vin: &TxIn,
        vin_tag: &[u8],
        pseudo_out: Option<&PseudoOut>,
    ) -> Result<(), Self::Error> {
        self.calls.push("reconfirm_input");
        self.reconfirms.push(Reconfirm {
            amount: source.amount,
            key_image: vin.key_image().copied().unwrap_or_default(),
            vin_tag: vin_tag.to_vec(),
            pseudo_out: pseudo_out.map(|p| p.commitment),
        });
        let tx = self.tx()?;
        let idx = tx.reconfirmed;
        let input = tx.inputs.get(idx).ok_or_else(|| rejected("too many inputs"))?;
        if Self::real_key(source) != Some(input.real_key) {
            return Err(rejected(format!("source {idx} does not match")));
        }
        if input.vin != *vin || Self::vin_tag(vin) != vin_tag {
            return Err(rejected(format!("input {idx} does not match")));
        }
        if pseudo_out.map(|p| p.commitment) != Some(input.pseudo_out) {
            return Err(rejected(format!("pseudo output {idx} does not match")));
        }
        tx.reconfirmed += 1;
        Ok(())
    }

    async fn setup_output(
        &mut self,
        destination: &TxDestinationEntry,
        precommit_tag: &[u8],
    ) -> Result<OutputAck, Self::Error> {
        self.calls.push("setup_output");
        let in_memory = self.in_memory;
        let range_proof = self.range_proof();
        let tx = self.tx()?;
        let idx = tx.outputs.len();
        if !in_memory && Self::precommit_tag(idx) != precommit_tag {
            return Err(rejected(format!("bad precommit tag for output {idx}")));
        }

        let derivation =
            generate_key_derivation(&destination.addr.view_public_key, &tx.tx_secret)?;
        let key = derive_public_key(&derivation, idx as u64, &destination.addr.spend_public_key)?;
        let ack = OutputAck {
            vout: TxOut { amount: 0, key },
            vout_tag: tag(b"vout", &key),
            range_proof,
            out_pk: CtKey { dest: key, mask: random_key() },
            ecdh_info: EcdhTuple { mask: random_key(), amount: random_key() },
        };
        tx.outputs.push(ack.clone());
        Ok(ack)
    }

    async fn finalize(&mut self) -> Result<FinalizeAck, Self::Error> {
        self.calls.push("finalize");
        let wrong_hash = self.has(Fault::WrongPrefixHash);
        let tamper = self.has(Fault::TamperExtra);
        let wrong_fee = self.has(Fault::WrongFee);
        let tx = self.tx.as_mut().ok_or_else(|| rejected("no transaction in progress"))?;
        Self::sort_inputs(tx);

        let mut extra = Vec::new();
        add_tx_pub_key_to_extra(&mut extra, &public_key(&tx.tx_secret));
        if let Ok(pid) = <[u8; 8]>::try_from(tx.params.payment_id.as_slice()) {
            add_extra_nonce_to_extra(&mut extra, &set_encrypted_payment_id_to_nonce(&pid))
                .map_err(|e| rejected(e.to_string()))?;
        }

        let prefix = TxPrefix {
            version: 2,
            unlock_time: tx.params.unlock_time,
            vin: tx.inputs.iter().map(|i| i.vin.clone()).collect(),
            vout: tx.outputs.iter().map(|o| o.vout.clone()).collect(),
            extra: extra.clone(),
        };
        let hash = prefix_hash(&prefix);
        tx.prefix_hash = Some(hash);

        let mut reported = hash;
        if wrong_hash {
            reported[0] ^= 0x01;
        }
        if tamper {
            if let Some(last) = extra.last_mut() {
                *last ^= 0x01;
            }
        }

        let tx = self.tx.as_ref().ok_or_else(|| rejected("no transaction in progress"))?;
        let mut rv = self.signature_shell(tx);
        if wrong_fee {
            rv.txn_fee += 1;
        }
        self.last_prefix_hash = Some(hash);
        Ok(FinalizeAck { extra, prefix_hash: reported, rv })
    }

    async fn aggregate_hash(&mut self) -> Result<Hash, Self::Error> {
        self.calls.push("aggregate_hash");
        if self.has(Fault::Stall) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let tx = self.tx.as_ref().ok_or_else(|| rejected("no transaction in progress"))?;
        let rv = self.device_rv(tx);
        let mut hash = pre_mlsag_hash(&rv).map_err(|e| rejected(e.to_string()))?;
        if self.has(Fault::WrongAggregate) {
            hash[31] ^= 0x80;
        }
        Ok(hash)
    }

    async fn sign_input(
        &mut self,
        source: &TxSourceEntry,
        vin: &TxIn,
        vin_tag: &[u8],
        _pseudo_out: &PseudoOut,
        _alpha_enc: &[u8],
    ) -> Result<SignAck, Self::Error> {
        self.calls.push("sign_input");
        if Self::vin_tag(vin) != vin_tag {
            return Err(rejected("input tag mismatch"));
        }
        let cols = if self.rct_type.is_simple() { 2 } else { source.outputs.len() + 1 };
        let mg = MgSig {
            ss: (0..source.outputs.len())
                .map(|_| (0..cols).map(|_| random_key()).collect())
                .collect(),
            cc: random_key(),
        };
        Ok(SignAck { mg, metadata: Self::sign_metadata(vin) })
    }
}

// ─── Wallet fixtures ────────────────────────────────────────────────────────

pub struct Wallet {
    pub keys: AccountKeys,
    pub table: SubaddressTable,
}

impl Wallet {
    pub fn random() -> Self {
        let keys = AccountKeys::from_secret_keys(random_scalar(), random_scalar());
        let table = SubaddressTable::generate(&keys, 1, 4).expect("subaddress table");
        Self { keys, table }
    }

    pub fn address(&self) -> AccountPublicAddress {
        AccountPublicAddress {
            spend_public_key: self.keys.spend_public,
            view_public_key: self.keys.view_public,
        }
    }

    /// Source spending an output paid to `index`, with its real member at
    /// `real_pos` in a ring of `ring_size`.
    pub fn owned_source(
        &self,
        amount: u64,
        ring_size: usize,
        real_pos: usize,
        index: SubaddressIndex,
    ) -> TxSourceEntry {
        let r = random_scalar();
        let spend = subaddress_spend_public_key(&self.keys, index).expect("spend key");
        let (tx_pub, view) = if index.is_main() {
            (public_key(&r), self.keys.view_public)
        } else {
            let d = decompress(&spend).expect("spend point");
            (
                compress(&scalar_mult_point(&r, &d)),
                compress(&scalar_mult_point(&self.keys.view_secret, &d)),
            )
        };
        let derivation = generate_key_derivation(&view, &r).expect("derivation");
        let out_key = derive_public_key(&derivation, 1, &spend).expect("output key");

        let base = 1000 + amount % 97;
        let outputs = (0..ring_size)
            .map(|pos| {
                let dest = if pos == real_pos { out_key } else { random_key() };
                OutputEntry {
                    index: base + 13 * pos as u64,
                    key: CtKey { dest, mask: random_key() },
                }
            })
            .collect();

        TxSourceEntry {
            outputs,
            real_output: real_pos as u64,
            real_out_tx_key: tx_pub,
            real_out_additional_tx_keys: Vec::new(),
            real_output_in_tx_index: 1,
            amount,
            rct: true,
            mask: random_key(),
        }
    }
}

pub fn stranger() -> AccountPublicAddress {
    AccountPublicAddress { spend_public_key: random_key(), view_public_key: random_key() }
}

/// Two sources (ring 11) of 6000 and 5000, paying 7000 away and 3000 back
/// as change: fee 1000.
pub fn construction_data(wallet: &Wallet) -> TxConstructionData {
    let change = TxDestinationEntry { amount: 3000, addr: wallet.address(), is_subaddress: false };
    TxConstructionData {
        sources: vec![
            wallet.owned_source(6000, 11, 3, SubaddressIndex::new(0, 0)),
            wallet.owned_source(5000, 11, 7, SubaddressIndex::new(1, 2)),
        ],
        change_dts: Some(change.clone()),
        splitted_dsts: vec![
            TxDestinationEntry { amount: 7000, addr: stranger(), is_subaddress: false },
            change,
        ],
        extra: Vec::new(),
        unlock_time: 0,
        subaddr_account: 0,
        subaddr_indices: vec![0],
    }
}
