//! RingCT transaction structures for the monero-glue signing agent.
//!
//! Typed transaction skeleton and signature structures, the canonical wire
//! encoding used for hashing and serialization, the `tx_extra` field codec,
//! and the two digests the host recomputes during a signing session.

pub mod destinations;
pub mod extra;
pub mod hash;
pub mod types;
pub mod wire;

mod serde_hex;

pub use destinations::{
    absolute_output_offsets_to_relative, classify_subaddresses, get_destination_view_key_pub,
    AddressClassification,
};
pub use hash::{pre_mlsag_hash, prefix_hash};
pub use types::{
    AccountPublicAddress, Bulletproof, BoroSig, CtKey, EcdhTuple, MgSig, OutputEntry, RangeProof,
    RangeProofKind, RangeSig, RctSig, RctSigPrunable, RctType, Signature, Transaction,
    TxConstructionData, TxDestinationEntry, TxIn, TxOut, TxPrefix, TxSourceEntry, UnsignedTxSet,
};
pub use wire::{serialize_transaction, KeccakWriter, WireWriter};

use monero_glue_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxError {
    #[error("empty mix ring")]
    EmptyRing,

    #[error("structure shape mismatch: {0}")]
    Shape(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
