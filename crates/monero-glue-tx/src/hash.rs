//! Transaction digests recomputed by the host.
//!
//! `prefix_hash` is Keccak over the canonical prefix encoding.
//!
//! `pre_mlsag_hash` is the message every MLSAG signs:
//!   H(message || H(rctsig_base) || H(range proof material))
//! where the range proof material is the concatenation of
//!   A, S, T1, T2, taux, mu, L[..], R[..], a, b, t    per bulletproof, or
//!   s0[0..64], s1[0..64], ee, Ci[0..64]             per Borromean range sig.

use monero_glue_crypto::Hash;

use crate::types::{RctSig, TxPrefix};
use crate::wire::{encode_prefix, encode_rct_base, KeccakWriter, WireWriter};
use crate::TxError;

pub fn prefix_hash(prefix: &TxPrefix) -> Hash {
    let mut hasher = KeccakWriter::new();
    encode_prefix(prefix, &mut hasher);
    hasher.finalize()
}

/// Range proof material hashed without length prefixes.
fn range_proof_hash(rv: &RctSig) -> Hash {
    let mut hasher = KeccakWriter::new();
    if rv.rct_type.is_bulletproof() {
        for p in &rv.p.bulletproofs {
            for key in [&p.big_a, &p.big_s, &p.t1, &p.t2, &p.taux, &p.mu] {
                hasher.write_key(key);
            }
            for l in &p.l {
                hasher.write_key(l);
            }
            for r in &p.r {
                hasher.write_key(r);
            }
            hasher.write_key(&p.a);
            hasher.write_key(&p.b);
            hasher.write_key(&p.t);
        }
    } else {
        for sig in &rv.p.range_sigs {
            for s in &sig.asig.s0 {
                hasher.write_key(s);
            }
            for s in &sig.asig.s1 {
                hasher.write_key(s);
            }
            hasher.write_key(&sig.asig.ee);
            for c in &sig.ci {
                hasher.write_key(c);
            }
        }
    }
    hasher.finalize()
}

pub fn pre_mlsag_hash(rv: &RctSig) -> Result<Hash, TxError> {
    let inputs = rv.input_count()?;
    let outputs = rv.ecdh_info.len();

    let mut base = KeccakWriter::new();
    encode_rct_base(rv, inputs, outputs, &mut base)?;

    let mut master = KeccakWriter::new();
    master.write_key(&rv.message);
    master.write_key(&base.finalize());
    master.write_key(&range_proof_hash(rv));
    Ok(master.finalize())
}
