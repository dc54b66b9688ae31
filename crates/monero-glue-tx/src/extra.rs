//! `tx_extra` field codec.
//!
//! Tag layout:
//! - 0x00 padding: zero bytes up to the end of the buffer, 255 bytes max
//! - 0x01 tx public key: 32 bytes
//! - 0x02 nonce: 1-byte length + up to 255 bytes
//! - 0x03 merge mining: varint length + blob
//! - 0x04 additional public keys: varint count + 32*N bytes
//! - 0xde minergate: varint length + blob
//!
//! Payment ids travel inside a nonce: type byte 0x00 + 32-byte plain id, or
//! type byte 0x01 + 8-byte id encrypted with the output derivation.

use std::ops::Range;

use monero_glue_crypto::{
    generate_key_derivation, keccak256, read_varint, write_varint, CryptoError, Key,
    KeyDerivation, Scalar,
};
use thiserror::Error;

pub mod tag {
    pub const PADDING: u8 = 0x00;
    pub const PUBKEY: u8 = 0x01;
    pub const NONCE: u8 = 0x02;
    pub const MERGE_MINING: u8 = 0x03;
    pub const ADDITIONAL_PUBKEYS: u8 = 0x04;
    pub const MYSTERIOUS_MINERGATE: u8 = 0xde;
}

pub const NONCE_PAYMENT_ID: u8 = 0x00;
pub const NONCE_ENCRYPTED_PAYMENT_ID: u8 = 0x01;

pub const PADDING_MAX_COUNT: usize = 255;
pub const NONCE_MAX_COUNT: usize = 255;

const ENCRYPTED_PAYMENT_ID_TAIL: u8 = 0x8b;

pub type PaymentId = [u8; 32];
pub type EncryptedPaymentId = [u8; 8];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtraError {
    #[error("malformed extra at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("extra nonce is {0} bytes, max 255")]
    NonceTooLong(usize),

    #[error("invalid payment id nonce: {0}")]
    InvalidNonce(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    /// Total size including the tag byte.
    Padding(usize),
    PubKey(Key),
    Nonce(Vec<u8>),
    MergeMining(Vec<u8>),
    AdditionalPubKeys(Vec<Key>),
    MysteriousMinergate(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtraFieldType {
    Padding,
    PubKey,
    Nonce,
    MergeMining,
    AdditionalPubKeys,
    MysteriousMinergate,
}

impl ExtraField {
    pub fn field_type(&self) -> ExtraFieldType {
        match self {
            ExtraField::Padding(_) => ExtraFieldType::Padding,
            ExtraField::PubKey(_) => ExtraFieldType::PubKey,
            ExtraField::Nonce(_) => ExtraFieldType::Nonce,
            ExtraField::MergeMining(_) => ExtraFieldType::MergeMining,
            ExtraField::AdditionalPubKeys(_) => ExtraFieldType::AdditionalPubKeys,
            ExtraField::MysteriousMinergate(_) => ExtraFieldType::MysteriousMinergate,
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), ExtraError> {
        match self {
            ExtraField::Padding(size) => {
                if *size == 0 || *size > PADDING_MAX_COUNT {
                    return Err(ExtraError::Malformed {
                        offset: out.len(),
                        reason: format!("padding size {size}"),
                    });
                }
                out.push(tag::PADDING);
                out.resize(out.len() + size - 1, 0);
            }
            ExtraField::PubKey(key) => {
                out.push(tag::PUBKEY);
                out.extend_from_slice(key);
            }
            ExtraField::Nonce(nonce) => add_extra_nonce_to_extra(out, nonce)?,
            ExtraField::MergeMining(blob) => {
                out.push(tag::MERGE_MINING);
                write_varint(out, blob.len() as u64);
                out.extend_from_slice(blob);
            }
            ExtraField::AdditionalPubKeys(keys) => add_additional_tx_pub_keys_to_extra(out, keys),
            ExtraField::MysteriousMinergate(blob) => {
                out.push(tag::MYSTERIOUS_MINERGATE);
                write_varint(out, blob.len() as u64);
                out.extend_from_slice(blob);
            }
        }
        Ok(())
    }
}

// ─── Parsing ────────────────────────────────────────────────────────────────

fn malformed(offset: usize, reason: impl Into<String>) -> ExtraError {
    ExtraError::Malformed { offset, reason: reason.into() }
}

fn take<'a>(buf: &'a [u8], offset: usize, len: usize, what: &str) -> Result<&'a [u8], ExtraError> {
    offset
        .checked_add(len)
        .filter(|end| *end <= buf.len())
        .map(|end| &buf[offset..end])
        .ok_or_else(|| malformed(offset, format!("truncated {what}")))
}

fn take_varint(buf: &[u8], offset: usize, what: &str) -> Result<(usize, usize), ExtraError> {
    let (value, read) =
        read_varint(buf, offset).ok_or_else(|| malformed(offset, format!("bad {what} varint")))?;
    let value = usize::try_from(value).map_err(|_| malformed(offset, format!("{what} too large")))?;
    Ok((value, read))
}

/// Parse one field starting at `start`; returns it with the offset past it.
fn parse_field(buf: &[u8], start: usize) -> Result<(ExtraField, usize), ExtraError> {
    let mut offset = start + 1;
    let field = match buf[start] {
        tag::PADDING => {
            let size = buf.len() - start;
            if size > PADDING_MAX_COUNT {
                return Err(malformed(start, format!("padding of {size} bytes")));
            }
            if buf[offset..].iter().any(|b| *b != 0) {
                return Err(malformed(start, "non-zero byte in padding"));
            }
            offset = buf.len();
            ExtraField::Padding(size)
        }
        tag::PUBKEY => {
            let mut key = [0u8; 32];
            key.copy_from_slice(take(buf, offset, 32, "public key")?);
            offset += 32;
            ExtraField::PubKey(key)
        }
        tag::NONCE => {
            let len = take(buf, offset, 1, "nonce length")?[0] as usize;
            offset += 1;
            let nonce = take(buf, offset, len, "nonce")?.to_vec();
            offset += len;
            ExtraField::Nonce(nonce)
        }
        tag::MERGE_MINING | tag::MYSTERIOUS_MINERGATE => {
            let t = buf[start];
            let (len, read) = take_varint(buf, offset, "blob length")?;
            offset += read;
            let blob = take(buf, offset, len, "blob")?.to_vec();
            offset += len;
            if t == tag::MERGE_MINING {
                ExtraField::MergeMining(blob)
            } else {
                ExtraField::MysteriousMinergate(blob)
            }
        }
        tag::ADDITIONAL_PUBKEYS => {
            let (count, read) = take_varint(buf, offset, "key count")?;
            offset += read;
            let total = count
                .checked_mul(32)
                .ok_or_else(|| malformed(offset, "key count overflow"))?;
            let data = take(buf, offset, total, "additional public keys")?;
            offset += total;
            let keys = data
                .chunks_exact(32)
                .map(|c| {
                    let mut key = [0u8; 32];
                    key.copy_from_slice(c);
                    key
                })
                .collect();
            ExtraField::AdditionalPubKeys(keys)
        }
        other => return Err(malformed(start, format!("unknown tag 0x{other:02x}"))),
    };
    Ok((field, offset))
}

fn parse_spans(buf: &[u8]) -> Result<Vec<(ExtraField, Range<usize>)>, ExtraError> {
    let mut fields = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        let (field, next) = parse_field(buf, offset)?;
        fields.push((field, offset..next));
        offset = next;
    }
    Ok(fields)
}

/// Parse a whole `tx_extra` buffer.
pub fn parse_extra(buf: &[u8]) -> Result<Vec<ExtraField>, ExtraError> {
    Ok(parse_spans(buf)?.into_iter().map(|(field, _)| field).collect())
}

pub fn serialize_extra(fields: &[ExtraField]) -> Result<Vec<u8>, ExtraError> {
    let mut out = Vec::new();
    for field in fields {
        field.encode_into(&mut out)?;
    }
    Ok(out)
}

pub fn find_first(fields: &[ExtraField], field_type: ExtraFieldType) -> Option<&ExtraField> {
    fields.iter().find(|f| f.field_type() == field_type)
}

/// Drop every field of `field_type`, keeping the others byte for byte.
pub fn remove_all_of_type(buf: &[u8], field_type: ExtraFieldType) -> Result<Vec<u8>, ExtraError> {
    let mut out = Vec::with_capacity(buf.len());
    for (field, span) in parse_spans(buf)? {
        if field.field_type() != field_type {
            out.extend_from_slice(&buf[span]);
        }
    }
    Ok(out)
}

// ─── Builders ───────────────────────────────────────────────────────────────

pub fn add_tx_pub_key_to_extra(extra: &mut Vec<u8>, pub_key: &Key) {
    extra.push(tag::PUBKEY);
    extra.extend_from_slice(pub_key);
}

pub fn add_extra_nonce_to_extra(extra: &mut Vec<u8>, nonce: &[u8]) -> Result<(), ExtraError> {
    if nonce.len() > NONCE_MAX_COUNT {
        return Err(ExtraError::NonceTooLong(nonce.len()));
    }
    extra.push(tag::NONCE);
    extra.push(nonce.len() as u8);
    extra.extend_from_slice(nonce);
    Ok(())
}

pub fn add_additional_tx_pub_keys_to_extra(extra: &mut Vec<u8>, keys: &[Key]) {
    extra.push(tag::ADDITIONAL_PUBKEYS);
    write_varint(extra, keys.len() as u64);
    for key in keys {
        extra.extend_from_slice(key);
    }
}

// ─── Payment ids ────────────────────────────────────────────────────────────

pub fn has_encrypted_payment_id(nonce: &[u8]) -> bool {
    nonce.len() == 9 && nonce[0] == NONCE_ENCRYPTED_PAYMENT_ID
}

pub fn has_payment_id(nonce: &[u8]) -> bool {
    nonce.len() == 33 && nonce[0] == NONCE_PAYMENT_ID
}

pub fn get_encrypted_payment_id_from_nonce(nonce: &[u8]) -> Result<EncryptedPaymentId, ExtraError> {
    if nonce.len() != 9 {
        return Err(ExtraError::InvalidNonce(format!("size {} != 9", nonce.len())));
    }
    if nonce[0] != NONCE_ENCRYPTED_PAYMENT_ID {
        return Err(ExtraError::InvalidNonce(format!("type byte 0x{:02x}", nonce[0])));
    }
    let mut pid = [0u8; 8];
    pid.copy_from_slice(&nonce[1..]);
    Ok(pid)
}

pub fn get_payment_id_from_nonce(nonce: &[u8]) -> Result<PaymentId, ExtraError> {
    if nonce.len() != 33 {
        return Err(ExtraError::InvalidNonce(format!("size {} != 33", nonce.len())));
    }
    if nonce[0] != NONCE_PAYMENT_ID {
        return Err(ExtraError::InvalidNonce(format!("type byte 0x{:02x}", nonce[0])));
    }
    let mut pid = [0u8; 32];
    pid.copy_from_slice(&nonce[1..]);
    Ok(pid)
}

pub fn set_payment_id_to_nonce(payment_id: &PaymentId) -> Vec<u8> {
    let mut nonce = Vec::with_capacity(33);
    nonce.push(NONCE_PAYMENT_ID);
    nonce.extend_from_slice(payment_id);
    nonce
}

pub fn set_encrypted_payment_id_to_nonce(payment_id: &EncryptedPaymentId) -> Vec<u8> {
    let mut nonce = Vec::with_capacity(9);
    nonce.push(NONCE_ENCRYPTED_PAYMENT_ID);
    nonce.extend_from_slice(payment_id);
    nonce
}

/// XOR the id with `Keccak(derivation || 0x8b)`. Applying it twice is identity.
pub fn encrypt_payment_id_with_derivation(
    payment_id: &EncryptedPaymentId,
    derivation: &KeyDerivation,
) -> EncryptedPaymentId {
    let mut data = [0u8; 33];
    data[..32].copy_from_slice(derivation.as_bytes());
    data[32] = ENCRYPTED_PAYMENT_ID_TAIL;
    let hash = keccak256(&data);

    let mut out = *payment_id;
    for (b, h) in out.iter_mut().zip(hash.iter()) {
        *b ^= h;
    }
    out
}

/// Encrypt (or decrypt) with the derivation of `public_key` and `secret_key`.
pub fn encrypt_payment_id(
    payment_id: &EncryptedPaymentId,
    public_key: &Key,
    secret_key: &Scalar,
) -> Result<EncryptedPaymentId, CryptoError> {
    let derivation = generate_key_derivation(public_key, secret_key)?;
    Ok(encrypt_payment_id_with_derivation(payment_id, &derivation))
}

/// Encrypted payment id carried in `extra`, or empty when there is none.
///
/// A nonce that does not hold an encrypted id counts as no id; an extra
/// buffer that does not parse is an error.
pub fn encrypted_payment_id_from_extra(extra: &[u8]) -> Result<Vec<u8>, ExtraError> {
    let fields = parse_extra(extra)?;
    match find_first(&fields, ExtraFieldType::Nonce) {
        Some(ExtraField::Nonce(nonce)) if has_encrypted_payment_id(nonce) => {
            Ok(get_encrypted_payment_id_from_nonce(nonce)?.to_vec())
        }
        _ => Ok(Vec::new()),
    }
}
