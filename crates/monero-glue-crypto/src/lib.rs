//! Curve and hash primitives for the monero-glue signing agent.
//!
//! Thin typed layer over `curve25519-dalek` and `tiny-keccak` covering what
//! the host side of a hardware-wallet signing session needs: Keccak-256,
//! hash-to-scalar, hash-to-point, ECDH key derivations, one-time key
//! derivation and key images. Subaddress handling lives in [`subaddress`].

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::traits::VartimeMultiscalarMul;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

mod hash_to_point;
pub mod subaddress;

pub use curve25519_dalek::edwards::EdwardsPoint;
pub use curve25519_dalek::scalar::Scalar;

pub use subaddress::{
    AccountKeys, SubaddressIndex, SubaddressTable, derive_shared_secret,
    derive_spend_scalar_and_key_image, derive_subaddress_public_key,
    generate_key_image_helper, match_subaddress, subaddress_secret_key,
    subaddress_spend_public_key,
};

/// Compressed curve point or scalar encoding.
pub type Key = [u8; 32];

/// 32-byte Keccak digest.
pub type Hash = [u8; 32];

/// Key image of a spent one-time output.
pub type KeyImage = [u8; 32];

/// Compressed point `8 * a * R` shared between sender and receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyDerivation(pub [u8; 32]);

impl KeyDerivation {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// All-zero key, used as the "no key" placeholder.
pub const NULL_KEY: Key = [0u8; 32];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid curve point: {0}")]
    InvalidPoint(String),

    #[error("watch-only credentials cannot derive spend keys")]
    WatchOnly,

    #[error("derived public key does not match the output key")]
    KeyMismatch,

    #[error("wrong number of additional derivations: index {index}, have {count}")]
    DerivationCountMismatch { index: usize, count: usize },

    #[error("output does not belong to any known subaddress")]
    NotOwned,
}

// ─── Hashing ────────────────────────────────────────────────────────────────

/// Keccak-256 with the original (pre-SHA3) padding, `cn_fast_hash`.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut keccak = Keccak::v256();
    let mut output = [0u8; 32];
    keccak.update(data);
    keccak.finalize(&mut output);
    output
}

/// Keccak-256 over several slices without concatenating them first.
pub fn keccak256_parts(parts: &[&[u8]]) -> Hash {
    let mut keccak = Keccak::v256();
    for part in parts {
        keccak.update(part);
    }
    let mut output = [0u8; 32];
    keccak.finalize(&mut output);
    output
}

/// `Hs(data) = keccak256(data) mod l`
pub fn hash_to_scalar(data: &[u8]) -> Scalar {
    Scalar::from_bytes_mod_order(keccak256(data))
}

/// `Hp(data) = 8 * map(keccak256(data))`
pub fn hash_to_point(data: &[u8]) -> Result<EdwardsPoint, CryptoError> {
    let digest = keccak256(data);
    let point = hash_to_point::ge_fromfe_frombytes_vartime(&digest)
        .ok_or_else(|| CryptoError::InvalidPoint("hash-to-point produced no point".into()))?;
    Ok(point.mul_by_cofactor())
}

// ─── Encoding helpers ───────────────────────────────────────────────────────

/// Append a CryptoNote varint (LEB128).
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

/// Decode a varint at `offset`. Returns `(value, bytes_read)`.
pub fn read_varint(data: &[u8], offset: usize) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    let mut i = 0;
    loop {
        let byte = *data.get(offset + i)?;
        i += 1;
        if shift == 63 && byte > 1 {
            return None;
        }
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i));
        }
        shift += 7;
        if shift > 63 {
            return None;
        }
    }
}

pub fn decompress(key: &Key) -> Result<EdwardsPoint, CryptoError> {
    CompressedEdwardsY(*key)
        .decompress()
        .ok_or_else(|| CryptoError::InvalidPoint(hex::encode(key)))
}

pub fn compress(point: &EdwardsPoint) -> Key {
    point.compress().to_bytes()
}

// ─── Scalars and points ─────────────────────────────────────────────────────

pub fn sc_is_zero(s: &Scalar) -> bool {
    *s == Scalar::ZERO
}

/// Uniformly random scalar from the OS RNG.
pub fn random_scalar() -> Scalar {
    let mut wide = [0u8; 64];
    OsRng.fill_bytes(&mut wide);
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// `s * G`
pub fn scalar_mult_base(s: &Scalar) -> EdwardsPoint {
    ED25519_BASEPOINT_TABLE * s
}

/// `s * P`, variable time.
pub fn scalar_mult_point(s: &Scalar, p: &EdwardsPoint) -> EdwardsPoint {
    EdwardsPoint::vartime_multiscalar_mul([s], [p])
}

/// Public key of a secret scalar, compressed.
pub fn public_key(secret: &Scalar) -> Key {
    compress(&scalar_mult_base(secret))
}

// ─── Derivations ────────────────────────────────────────────────────────────

/// `D = 8 * (sec * pub)`
pub fn generate_key_derivation(pub_key: &Key, sec_key: &Scalar) -> Result<KeyDerivation, CryptoError> {
    let point = decompress(pub_key)?;
    let shared = scalar_mult_point(sec_key, &point).mul_by_cofactor();
    Ok(KeyDerivation(compress(&shared)))
}

/// `Hs(D || varint(index))`
pub fn derivation_to_scalar(derivation: &KeyDerivation, output_index: u64) -> Scalar {
    let mut buf = Vec::with_capacity(42);
    buf.extend_from_slice(derivation.as_bytes());
    write_varint(&mut buf, output_index);
    hash_to_scalar(&buf)
}

/// One-time public key: `base + Hs(D || index) * G`
pub fn derive_public_key(
    derivation: &KeyDerivation,
    output_index: u64,
    base_pub: &Key,
) -> Result<Key, CryptoError> {
    let scalar = derivation_to_scalar(derivation, output_index);
    let base = decompress(base_pub)?;
    Ok(compress(&(scalar_mult_base(&scalar) + base)))
}

/// One-time secret key: `base + Hs(D || index)`
pub fn derive_secret_key(derivation: &KeyDerivation, output_index: u64, base_sec: &Scalar) -> Scalar {
    base_sec + derivation_to_scalar(derivation, output_index)
}

/// Key image: `sec * Hp(pub)`
pub fn generate_key_image(pub_key: &Key, sec_key: &Scalar) -> Result<KeyImage, CryptoError> {
    let hp = hash_to_point(pub_key)?;
    Ok(compress(&scalar_mult_point(sec_key, &hp)))
}
