//! Canonical binary encoding of transactions.
//!
//! Field order is fixed by the protocol. Encoders write into any
//! [`WireWriter`], so the same code produces serialized bytes (`Vec<u8>`)
//! or a digest ([`KeccakWriter`]) without buffering.
//!
//! Layout summary:
//! - prefix: version, unlock_time (varints), vin, vout, extra (varint-prefixed)
//! - rctsig base: type u8, fee varint, pseudo-outs (Simple), ecdh, outPk masks
//! - rctsig prunable: range proofs, MGs, pseudo-outs (SimpleBulletproof)

use monero_glue_crypto::{read_varint, write_varint, Hash, Key};
use tiny_keccak::{Hasher, Keccak};

use crate::types::{
    txin_tag, txout_tag, Bulletproof, MgSig, RangeSig, RctSig, RctType, Transaction, TxIn, TxOut,
    TxPrefix,
};
use crate::TxError;

/// Byte sink for the canonical encoders.
pub trait WireWriter {
    fn write_bytes(&mut self, bytes: &[u8]);

    fn write_u8(&mut self, byte: u8) {
        self.write_bytes(&[byte]);
    }

    fn write_varint(&mut self, value: u64) {
        let mut buf = Vec::with_capacity(10);
        write_varint(&mut buf, value);
        self.write_bytes(&buf);
    }

    fn write_key(&mut self, key: &Key) {
        self.write_bytes(key);
    }
}

impl WireWriter for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }

    fn write_varint(&mut self, value: u64) {
        write_varint(self, value);
    }
}

/// Streaming Keccak-256 sink.
pub struct KeccakWriter {
    keccak: Keccak,
}

impl KeccakWriter {
    pub fn new() -> Self {
        Self { keccak: Keccak::v256() }
    }

    pub fn finalize(self) -> Hash {
        let mut out = [0u8; 32];
        self.keccak.finalize(&mut out);
        out
    }
}

impl Default for KeccakWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl WireWriter for KeccakWriter {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.keccak.update(bytes);
    }
}

fn shape(what: &str, expected: usize, got: usize) -> TxError {
    TxError::Shape(format!("{what}: expected {expected}, got {got}"))
}

fn check_len(what: &str, expected: usize, got: usize) -> Result<(), TxError> {
    if expected != got {
        return Err(shape(what, expected, got));
    }
    Ok(())
}

// ─── Prefix ─────────────────────────────────────────────────────────────────

pub fn encode_txin<W: WireWriter>(input: &TxIn, w: &mut W) {
    match input {
        TxIn::Gen { height } => {
            w.write_u8(txin_tag::GEN);
            w.write_varint(*height);
        }
        TxIn::ToKey { amount, key_offsets, key_image } => {
            w.write_u8(txin_tag::TO_KEY);
            w.write_varint(*amount);
            w.write_varint(key_offsets.len() as u64);
            for offset in key_offsets {
                w.write_varint(*offset);
            }
            w.write_key(key_image);
        }
    }
}

pub fn encode_txout<W: WireWriter>(output: &TxOut, w: &mut W) {
    w.write_varint(output.amount);
    w.write_u8(txout_tag::TO_KEY);
    w.write_key(&output.key);
}

pub fn encode_prefix<W: WireWriter>(prefix: &TxPrefix, w: &mut W) {
    w.write_varint(prefix.version);
    w.write_varint(prefix.unlock_time);
    w.write_varint(prefix.vin.len() as u64);
    for input in &prefix.vin {
        encode_txin(input, w);
    }
    w.write_varint(prefix.vout.len() as u64);
    for output in &prefix.vout {
        encode_txout(output, w);
    }
    w.write_varint(prefix.extra.len() as u64);
    w.write_bytes(&prefix.extra);
}

// ─── RingCT base ────────────────────────────────────────────────────────────

/// Encode the non-prunable part of the RingCT signature.
pub fn encode_rct_base<W: WireWriter>(
    rv: &RctSig,
    inputs: usize,
    outputs: usize,
    w: &mut W,
) -> Result<(), TxError> {
    w.write_u8(rv.rct_type.as_u8());
    if rv.rct_type == RctType::Null {
        return Ok(());
    }
    w.write_varint(rv.txn_fee);

    if rv.rct_type == RctType::Simple {
        check_len("pseudo outputs", inputs, rv.pseudo_outs.len())?;
        for pseudo_out in &rv.pseudo_outs {
            w.write_key(pseudo_out);
        }
    }

    check_len("ecdh info", outputs, rv.ecdh_info.len())?;
    for ecdh in &rv.ecdh_info {
        w.write_key(&ecdh.mask);
        w.write_key(&ecdh.amount);
    }

    check_len("output commitments", outputs, rv.out_pk.len())?;
    for out_pk in &rv.out_pk {
        w.write_key(&out_pk.mask);
    }
    Ok(())
}

// ─── RingCT prunable ────────────────────────────────────────────────────────

pub fn encode_bulletproof<W: WireWriter>(bp: &Bulletproof, w: &mut W) {
    w.write_key(&bp.big_a);
    w.write_key(&bp.big_s);
    w.write_key(&bp.t1);
    w.write_key(&bp.t2);
    w.write_key(&bp.taux);
    w.write_key(&bp.mu);
    w.write_varint(bp.l.len() as u64);
    for l in &bp.l {
        w.write_key(l);
    }
    w.write_varint(bp.r.len() as u64);
    for r in &bp.r {
        w.write_key(r);
    }
    w.write_key(&bp.a);
    w.write_key(&bp.b);
    w.write_key(&bp.t);
}

pub fn encode_range_sig<W: WireWriter>(sig: &RangeSig, w: &mut W) {
    for s in &sig.asig.s0 {
        w.write_key(s);
    }
    for s in &sig.asig.s1 {
        w.write_key(s);
    }
    w.write_key(&sig.asig.ee);
    for c in &sig.ci {
        w.write_key(c);
    }
}

/// MG matrices are written without size prefixes; dimensions are implied
/// by the scheme, input count and mixin.
fn encode_mg<W: WireWriter>(
    mg: &MgSig,
    rows: usize,
    cols: usize,
    w: &mut W,
) -> Result<(), TxError> {
    check_len("MG rows", rows, mg.ss.len())?;
    for row in &mg.ss {
        check_len("MG columns", cols, row.len())?;
        for key in row {
            w.write_key(key);
        }
    }
    w.write_key(&mg.cc);
    Ok(())
}

/// Encode the prunable part. `mixin` is ring size minus one.
pub fn encode_rct_prunable<W: WireWriter>(
    rv: &RctSig,
    inputs: usize,
    outputs: usize,
    mixin: usize,
    w: &mut W,
) -> Result<(), TxError> {
    let rct_type = rv.rct_type;
    if rct_type == RctType::Null {
        return Ok(());
    }

    if rct_type.is_bulletproof() {
        check_len("bulletproofs", outputs, rv.p.bulletproofs.len())?;
        for bp in &rv.p.bulletproofs {
            encode_bulletproof(bp, w);
        }
    } else {
        check_len("range signatures", outputs, rv.p.range_sigs.len())?;
        for sig in &rv.p.range_sigs {
            encode_range_sig(sig, w);
        }
    }

    let (mg_count, cols) = if rct_type.is_simple() { (inputs, 2) } else { (1, inputs + 1) };
    check_len("MG signatures", mg_count, rv.p.mgs.len())?;
    for mg in &rv.p.mgs {
        encode_mg(mg, mixin + 1, cols, w)?;
    }

    if rct_type == RctType::SimpleBulletproof {
        check_len("prunable pseudo outputs", inputs, rv.p.pseudo_outs.len())?;
        for pseudo_out in &rv.p.pseudo_outs {
            w.write_key(pseudo_out);
        }
    }
    Ok(())
}

// ─── Whole transaction ──────────────────────────────────────────────────────

pub fn encode_transaction<W: WireWriter>(tx: &Transaction, w: &mut W) -> Result<(), TxError> {
    let prefix = &tx.prefix;
    encode_prefix(prefix, w);

    if prefix.version == 1 {
        check_len("signature sets", prefix.vin.len(), tx.signatures.len())?;
        for (input, sigs) in prefix.vin.iter().zip(&tx.signatures) {
            let ring = input.ring_size().unwrap_or(0);
            check_len("ring signatures", ring, sigs.len())?;
            for sig in sigs {
                w.write_key(&sig.c);
                w.write_key(&sig.r);
            }
        }
        return Ok(());
    }

    let inputs = prefix.vin.len();
    let outputs = prefix.vout.len();
    let rv = &tx.rct_signatures;
    encode_rct_base(rv, inputs, outputs, w)?;
    if rv.rct_type != RctType::Null {
        let mixin = prefix
            .vin
            .first()
            .and_then(TxIn::ring_size)
            .map(|size| size.saturating_sub(1))
            .unwrap_or(0);
        encode_rct_prunable(rv, inputs, outputs, mixin, w)?;
    }
    Ok(())
}

/// Canonical wire bytes of a signed transaction.
pub fn serialize_transaction(tx: &Transaction) -> Result<Vec<u8>, TxError> {
    let mut out = Vec::new();
    encode_transaction(tx, &mut out)?;
    Ok(out)
}

// ─── Decoding ───────────────────────────────────────────────────────────────

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn varint(&mut self, what: &str) -> Result<u64, TxError> {
        let (value, read) = read_varint(self.data, self.offset)
            .ok_or_else(|| TxError::Parse(format!("bad varint for {what} at {}", self.offset)))?;
        self.offset += read;
        Ok(value)
    }

    fn u8(&mut self, what: &str) -> Result<u8, TxError> {
        let byte = *self
            .data
            .get(self.offset)
            .ok_or_else(|| TxError::Parse(format!("truncated {what} at {}", self.offset)))?;
        self.offset += 1;
        Ok(byte)
    }

    fn bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8], TxError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| TxError::Parse(format!("truncated {what} at {}", self.offset)))?;
        let out = &self.data[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    fn key(&mut self, what: &str) -> Result<Key, TxError> {
        let mut key = [0u8; 32];
        key.copy_from_slice(self.bytes(32, what)?);
        Ok(key)
    }

    /// Count that must fit in the remaining bytes at `min_size` each.
    fn count(&mut self, what: &str, min_size: usize) -> Result<usize, TxError> {
        let count = self.varint(what)?;
        let remaining = (self.data.len() - self.offset) as u64;
        if count.saturating_mul(min_size as u64) > remaining {
            return Err(TxError::Parse(format!("{what} count {count} exceeds buffer")));
        }
        Ok(count as usize)
    }
}

impl TxPrefix {
    /// Parse a prefix from the start of `data`. Returns the prefix and the
    /// number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(TxPrefix, usize), TxError> {
        let mut r = Reader { data, offset: 0 };
        let version = r.varint("version")?;
        let unlock_time = r.varint("unlock time")?;

        let vin_count = r.count("inputs", 2)?;
        let mut vin = Vec::with_capacity(vin_count);
        for _ in 0..vin_count {
            let input = match r.u8("input tag")? {
                txin_tag::GEN => TxIn::Gen { height: r.varint("height")? },
                txin_tag::TO_KEY => {
                    let amount = r.varint("amount")?;
                    let n = r.count("key offsets", 1)?;
                    let key_offsets =
                        (0..n).map(|_| r.varint("key offset")).collect::<Result<Vec<_>, _>>()?;
                    let key_image = r.key("key image")?;
                    TxIn::ToKey { amount, key_offsets, key_image }
                }
                tag => return Err(TxError::Parse(format!("unsupported input tag 0x{tag:02x}"))),
            };
            vin.push(input);
        }

        let vout_count = r.count("outputs", 34)?;
        let mut vout = Vec::with_capacity(vout_count);
        for _ in 0..vout_count {
            let amount = r.varint("output amount")?;
            let tag = r.u8("output tag")?;
            if tag != txout_tag::TO_KEY {
                return Err(TxError::Parse(format!("unsupported output tag 0x{tag:02x}")));
            }
            vout.push(TxOut { amount, key: r.key("output key")? });
        }

        let extra_len = r.count("extra", 1)?;
        let extra = r.bytes(extra_len, "extra")?.to_vec();

        Ok((TxPrefix { version, unlock_time, vin, vout, extra }, r.offset))
    }
}
