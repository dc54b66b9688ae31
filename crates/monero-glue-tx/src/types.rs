//! Typed transaction structures.
//!
//! The skeleton (`TxPrefix`), the RingCT signature (`RctSig`) and the
//! construction data a wallet hands to the signing agent.

use serde::{Deserialize, Serialize};

use monero_glue_crypto::{Key, KeyImage, NULL_KEY};

use crate::serde_hex;
use crate::TxError;

// ─── Transaction Constants ──────────────────────────────────────────────────

pub mod txin_tag {
    pub const GEN: u8 = 0xff;
    pub const TO_KEY: u8 = 0x02;
}

pub mod txout_tag {
    pub const TO_KEY: u8 = 0x02;
}

/// RingCT signature scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RctType {
    #[default]
    Null,
    Full,
    Simple,
    FullBulletproof,
    SimpleBulletproof,
}

/// Range proof construction carried by an `RctSig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeProofKind {
    Borromean,
    Bulletproof,
}

impl RctType {
    pub fn as_u8(self) -> u8 {
        match self {
            RctType::Null => 0,
            RctType::Full => 1,
            RctType::Simple => 2,
            RctType::FullBulletproof => 3,
            RctType::SimpleBulletproof => 4,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RctType::Null),
            1 => Some(RctType::Full),
            2 => Some(RctType::Simple),
            3 => Some(RctType::FullBulletproof),
            4 => Some(RctType::SimpleBulletproof),
            _ => None,
        }
    }

    /// Per-input pseudo-output commitments.
    pub fn is_simple(self) -> bool {
        matches!(self, RctType::Simple | RctType::SimpleBulletproof)
    }

    pub fn is_bulletproof(self) -> bool {
        matches!(self, RctType::FullBulletproof | RctType::SimpleBulletproof)
    }

    /// `None` for `Null`, which carries no proofs.
    pub fn range_proof_kind(self) -> Option<RangeProofKind> {
        match self {
            RctType::Null => None,
            RctType::Full | RctType::Simple => Some(RangeProofKind::Borromean),
            RctType::FullBulletproof | RctType::SimpleBulletproof => {
                Some(RangeProofKind::Bulletproof)
            }
        }
    }
}

// ─── Transaction Prefix ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxIn {
    Gen { height: u64 },
    ToKey { amount: u64, key_offsets: Vec<u64>, key_image: KeyImage },
}

impl TxIn {
    pub fn key_image(&self) -> Option<&KeyImage> {
        match self {
            TxIn::ToKey { key_image, .. } => Some(key_image),
            TxIn::Gen { .. } => None,
        }
    }

    pub fn ring_size(&self) -> Option<usize> {
        match self {
            TxIn::ToKey { key_offsets, .. } => Some(key_offsets.len()),
            TxIn::Gen { .. } => None,
        }
    }
}

/// Output paying to a one-time public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub amount: u64,
    pub key: Key,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPrefix {
    pub version: u64,
    pub unlock_time: u64,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub extra: Vec<u8>,
}

impl TxPrefix {
    pub fn new(version: u64, unlock_time: u64) -> Self {
        Self { version, unlock_time, vin: Vec::new(), vout: Vec::new(), extra: Vec::new() }
    }
}

// ─── RingCT ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtKey {
    #[serde(with = "serde_hex::key")]
    pub dest: Key,
    #[serde(with = "serde_hex::key")]
    pub mask: Key,
}

/// Encrypted mask and amount of one output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EcdhTuple {
    pub mask: Key,
    pub amount: Key,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoroSig {
    pub s0: [Key; 64],
    pub s1: [Key; 64],
    pub ee: Key,
}

/// Borromean range signature over the 64 bit commitments of one amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSig {
    pub asig: BoroSig,
    pub ci: [Key; 64],
}

impl Default for RangeSig {
    fn default() -> Self {
        Self {
            asig: BoroSig { s0: [NULL_KEY; 64], s1: [NULL_KEY; 64], ee: NULL_KEY },
            ci: [NULL_KEY; 64],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bulletproof {
    pub big_a: Key,
    pub big_s: Key,
    pub t1: Key,
    pub t2: Key,
    pub taux: Key,
    pub mu: Key,
    pub l: Vec<Key>,
    pub r: Vec<Key>,
    pub a: Key,
    pub b: Key,
    pub t: Key,
}

/// Range proof for one output as returned by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeProof {
    Borromean(RangeSig),
    Bulletproof(Bulletproof),
}

impl RangeProof {
    pub fn kind(&self) -> RangeProofKind {
        match self {
            RangeProof::Borromean(_) => RangeProofKind::Borromean,
            RangeProof::Bulletproof(_) => RangeProofKind::Bulletproof,
        }
    }
}

/// MLSAG signature: `ss` is ring size rows by key columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MgSig {
    pub ss: Vec<Vec<Key>>,
    pub cc: Key,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RctSigPrunable {
    pub range_sigs: Vec<RangeSig>,
    pub bulletproofs: Vec<Bulletproof>,
    pub mgs: Vec<MgSig>,
    /// Pseudo-outputs live here for `SimpleBulletproof`.
    pub pseudo_outs: Vec<Key>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RctSig {
    pub rct_type: RctType,
    /// Prefix hash the signatures commit to. Not serialized.
    pub message: Key,
    /// Ring members per input (simple) or per ring position (full). Not serialized.
    pub mix_ring: Vec<Vec<CtKey>>,
    /// Pseudo-outputs for `Simple`.
    pub pseudo_outs: Vec<Key>,
    pub ecdh_info: Vec<EcdhTuple>,
    pub out_pk: Vec<CtKey>,
    pub txn_fee: u64,
    pub p: RctSigPrunable,
}

impl RctSig {
    /// Input count the base encoding expects.
    pub fn input_count(&self) -> Result<usize, TxError> {
        let first = self.mix_ring.first().ok_or(TxError::EmptyRing)?;
        if self.rct_type.is_simple() {
            Ok(self.mix_ring.len())
        } else {
            Ok(first.len())
        }
    }
}

/// Legacy (v1) ring signature element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signature {
    pub c: Key,
    pub r: Key,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub prefix: TxPrefix,
    /// Per-input legacy signatures, only for version 1.
    pub signatures: Vec<Vec<Signature>>,
    pub rct_signatures: RctSig,
}

// ─── Construction Data ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountPublicAddress {
    #[serde(with = "serde_hex::key")]
    pub spend_public_key: Key,
    #[serde(with = "serde_hex::key")]
    pub view_public_key: Key,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDestinationEntry {
    pub amount: u64,
    pub addr: AccountPublicAddress,
    #[serde(default)]
    pub is_subaddress: bool,
}

/// One ring member: global output index and its commitment pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub index: u64,
    pub key: CtKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSourceEntry {
    pub outputs: Vec<OutputEntry>,
    /// Position of the real output inside `outputs`.
    pub real_output: u64,
    #[serde(with = "serde_hex::key")]
    pub real_out_tx_key: Key,
    #[serde(with = "serde_hex::keys", default)]
    pub real_out_additional_tx_keys: Vec<Key>,
    pub real_output_in_tx_index: u64,
    pub amount: u64,
    #[serde(default = "default_true")]
    pub rct: bool,
    #[serde(with = "serde_hex::key")]
    pub mask: Key,
}

fn default_true() -> bool {
    true
}

/// Everything a wallet prepares before handing a transaction to the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxConstructionData {
    pub sources: Vec<TxSourceEntry>,
    pub change_dts: Option<TxDestinationEntry>,
    pub splitted_dsts: Vec<TxDestinationEntry>,
    #[serde(with = "serde_hex::bytes", default)]
    pub extra: Vec<u8>,
    #[serde(default)]
    pub unlock_time: u64,
    #[serde(default)]
    pub subaddr_account: u32,
    #[serde(default)]
    pub subaddr_indices: Vec<u32>,
}

/// A batch of transactions exported by a view-only wallet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTxSet {
    pub txes: Vec<TxConstructionData>,
}

impl UnsignedTxSet {
    pub fn from_json(json: &str) -> Result<Self, TxError> {
        serde_json::from_str(json).map_err(|e| TxError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, TxError> {
        serde_json::to_string(self).map_err(|e| TxError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rct_type_tags() {
        for v in 0u8..=4 {
            assert_eq!(RctType::from_u8(v).unwrap().as_u8(), v);
        }
        assert!(RctType::from_u8(5).is_none());
        assert!(RctType::SimpleBulletproof.is_simple());
        assert!(!RctType::FullBulletproof.is_simple());
        assert_eq!(RctType::Null.range_proof_kind(), None);
        assert_eq!(RctType::Full.range_proof_kind(), Some(RangeProofKind::Borromean));
    }

    #[test]
    fn test_input_count_by_scheme() {
        let mut rv = RctSig { rct_type: RctType::Simple, ..Default::default() };
        assert!(matches!(rv.input_count(), Err(TxError::EmptyRing)));

        // 2 inputs, ring size 3
        rv.mix_ring = vec![vec![CtKey::default(); 3]; 2];
        assert_eq!(rv.input_count().unwrap(), 2);

        // full: ring size rows by input columns
        rv.rct_type = RctType::Full;
        rv.mix_ring = vec![vec![CtKey::default(); 2]; 3];
        assert_eq!(rv.input_count().unwrap(), 2);
    }

    #[test]
    fn test_unsigned_set_json() {
        let json = format!(
            r#"{{"txes":[{{"sources":[{{"outputs":[{{"index":7,"key":{{"dest":"{k}","mask":"{k}"}}}}],
            "real_output":0,"real_out_tx_key":"{k}","real_output_in_tx_index":1,"amount":5,"mask":"{k}"}}],
            "change_dts":null,"splitted_dsts":[],"extra":"0102"}}]}}"#,
            k = hex::encode([0x11u8; 32])
        );
        let set = UnsignedTxSet::from_json(&json).unwrap();
        assert_eq!(set.txes.len(), 1);
        let tx = &set.txes[0];
        assert_eq!(tx.extra, vec![1, 2]);
        assert_eq!(tx.sources[0].outputs[0].index, 7);
        assert!(tx.sources[0].rct);
        assert_eq!(tx.sources[0].outputs.len(), 1);

        let again = UnsignedTxSet::from_json(&set.to_json().unwrap()).unwrap();
        assert_eq!(again, set);
    }

    #[test]
    fn test_unsigned_set_rejects_short_key() {
        let json = r#"{"txes":[{"sources":[{"outputs":[],"real_output":0,"real_out_tx_key":"00",
            "real_output_in_tx_index":0,"amount":0,"mask":"00"}],"change_dts":null,"splitted_dsts":[]}]}"#;
        assert!(matches!(UnsignedTxSet::from_json(json), Err(TxError::Parse(_))));
    }
}
