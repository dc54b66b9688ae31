//! Subaddress lookup and key-image generation.
//!
//! Given the account's view/spend secrets and an output's public data, decide
//! which (major, minor) subaddress the output was sent to and derive the
//! one-time spend scalar and key image for it.
//!
//! Subaddress secret:
//!   m = Hs("SubAddr\0" || view_secret || major_LE32 || minor_LE32)
//!
//! Indices are always encoded as fixed-width little-endian u32.

use std::collections::HashMap;

use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};

use crate::{
    compress, decompress, derivation_to_scalar, derive_secret_key, generate_key_derivation,
    generate_key_image, hash_to_scalar, public_key, sc_is_zero, scalar_mult_base, CryptoError,
    Key, KeyDerivation, KeyImage,
};

/// (major, minor) subaddress index. `(0, 0)` is the account's main address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubaddressIndex {
    pub major: u32,
    pub minor: u32,
}

impl SubaddressIndex {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn is_main(&self) -> bool {
        self.major == 0 && self.minor == 0
    }
}

impl From<(u32, u32)> for SubaddressIndex {
    fn from((major, minor): (u32, u32)) -> Self {
        Self { major, minor }
    }
}

/// Account credentials used for scanning and key-image generation.
///
/// A zero spend secret marks watch-only credentials.
#[derive(Clone)]
pub struct AccountKeys {
    pub view_secret: Scalar,
    pub spend_secret: Scalar,
    pub view_public: Key,
    pub spend_public: Key,
}

impl AccountKeys {
    pub fn from_secret_keys(view_secret: Scalar, spend_secret: Scalar) -> Self {
        Self {
            view_public: public_key(&view_secret),
            spend_public: public_key(&spend_secret),
            view_secret,
            spend_secret,
        }
    }

    /// View-only credentials: spend secret is zero.
    pub fn watch_only(view_secret: Scalar, spend_public: Key) -> Self {
        Self {
            view_public: public_key(&view_secret),
            spend_public,
            view_secret,
            spend_secret: Scalar::ZERO,
        }
    }

    pub fn is_watch_only(&self) -> bool {
        sc_is_zero(&self.spend_secret)
    }
}

impl std::fmt::Debug for AccountKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountKeys")
            .field("view_public", &hex::encode(self.view_public))
            .field("spend_public", &hex::encode(self.spend_public))
            .finish_non_exhaustive()
    }
}

/// m = Hs("SubAddr\0" || view_secret || major_LE || minor_LE)
pub fn subaddress_secret_key(view_secret: &Scalar, index: SubaddressIndex) -> Scalar {
    let mut data = Vec::with_capacity(8 + 32 + 4 + 4);
    data.extend_from_slice(b"SubAddr\0");
    data.extend_from_slice(view_secret.as_bytes());
    data.extend_from_slice(&index.major.to_le_bytes());
    data.extend_from_slice(&index.minor.to_le_bytes());
    hash_to_scalar(&data)
}

/// D = B + m*G for non-zero indices, B for (0, 0).
pub fn subaddress_spend_public_key(
    keys: &AccountKeys,
    index: SubaddressIndex,
) -> Result<Key, CryptoError> {
    if index.is_main() {
        return Ok(keys.spend_public);
    }
    let spend = decompress(&keys.spend_public)?;
    let m = subaddress_secret_key(&keys.view_secret, index);
    Ok(compress(&(spend + scalar_mult_base(&m))))
}

/// Subaddress spend public key to index lookup.
#[derive(Debug, Clone, Default)]
pub struct SubaddressTable {
    entries: HashMap<Key, SubaddressIndex>,
}

impl SubaddressTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table for majors `0..=major_count` and minors `0..=minor_count`.
    pub fn generate(
        keys: &AccountKeys,
        major_count: u32,
        minor_count: u32,
    ) -> Result<Self, CryptoError> {
        let mut table = Self::new();
        for major in 0..=major_count {
            for minor in 0..=minor_count {
                table.add(keys, SubaddressIndex::new(major, minor))?;
            }
        }
        Ok(table)
    }

    pub fn add(&mut self, keys: &AccountKeys, index: SubaddressIndex) -> Result<Key, CryptoError> {
        let spend = subaddress_spend_public_key(keys, index)?;
        self.entries.insert(spend, index);
        Ok(spend)
    }

    pub fn insert(&mut self, spend_public: Key, index: SubaddressIndex) {
        self.entries.insert(spend_public, index);
    }

    pub fn get(&self, spend_public: &Key) -> Option<SubaddressIndex> {
        self.entries.get(spend_public).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Receiver side of the ECDH exchange: `8 * view_secret * R`.
pub fn derive_shared_secret(
    tx_public_key: &Key,
    view_secret: &Scalar,
) -> Result<KeyDerivation, CryptoError> {
    generate_key_derivation(tx_public_key, view_secret)
}

/// Recover the subaddress spend key an output was addressed to:
///   D = P - Hs(derivation || index) * G
pub fn derive_subaddress_public_key(
    out_key: &Key,
    derivation: &KeyDerivation,
    output_index: u64,
) -> Result<Key, CryptoError> {
    let p = decompress(out_key)?;
    let scalar = derivation_to_scalar(derivation, output_index);
    Ok(compress(&(p - scalar_mult_base(&scalar))))
}

/// Find which subaddress `out_key` belongs to.
///
/// Tries the main derivation first. On a miss, and only when per-output
/// derivations were supplied, tries the one at `output_index`. Returns the
/// matched index together with the derivation that matched.
pub fn match_subaddress(
    table: &SubaddressTable,
    out_key: &Key,
    derivation: &KeyDerivation,
    additional: &[KeyDerivation],
    output_index: usize,
) -> Result<Option<(SubaddressIndex, KeyDerivation)>, CryptoError> {
    let spend = derive_subaddress_public_key(out_key, derivation, output_index as u64)?;
    if let Some(index) = table.get(&spend) {
        return Ok(Some((index, *derivation)));
    }

    if additional.is_empty() {
        return Ok(None);
    }
    if output_index >= additional.len() {
        return Err(CryptoError::DerivationCountMismatch {
            index: output_index,
            count: additional.len(),
        });
    }

    let extra = &additional[output_index];
    let spend = derive_subaddress_public_key(out_key, extra, output_index as u64)?;
    Ok(table.get(&spend).map(|index| (index, *extra)))
}

/// Derive the one-time spend scalar and key image of an owned output.
///
/// x = Hs(derivation || index) + b            for the main address
/// x = Hs(derivation || index) + b + m        for subaddress (major, minor)
///
/// `x*G` must equal `out_key`; anything else means corrupt input.
pub fn derive_spend_scalar_and_key_image(
    keys: &AccountKeys,
    out_key: &Key,
    derivation: &KeyDerivation,
    output_index: u64,
    subaddress: SubaddressIndex,
) -> Result<(Scalar, KeyImage), CryptoError> {
    if keys.is_watch_only() {
        return Err(CryptoError::WatchOnly);
    }

    let base = derive_secret_key(derivation, output_index, &keys.spend_secret);
    let scalar = if subaddress.is_main() {
        base
    } else {
        base + subaddress_secret_key(&keys.view_secret, subaddress)
    };

    let derived = public_key(&scalar);
    if &derived != out_key {
        return Err(CryptoError::KeyMismatch);
    }

    let key_image = generate_key_image(&derived, &scalar)?;
    Ok((scalar, key_image))
}

/// Full receive-side pipeline for one output.
///
/// Computes the main and per-output derivations from the transaction public
/// keys, matches the subaddress, and derives scalar and key image. Returns
/// the main derivation as the third element.
pub fn generate_key_image_helper(
    keys: &AccountKeys,
    table: &SubaddressTable,
    out_key: &Key,
    tx_public_key: &Key,
    additional_tx_public_keys: &[Key],
    output_index: usize,
) -> Result<(Scalar, KeyImage, KeyDerivation), CryptoError> {
    let derivation = derive_shared_secret(tx_public_key, &keys.view_secret)?;
    let additional = additional_tx_public_keys
        .iter()
        .map(|pk| derive_shared_secret(pk, &keys.view_secret))
        .collect::<Result<Vec<_>, _>>()?;

    let (index, matched) = match_subaddress(table, out_key, &derivation, &additional, output_index)?
        .ok_or(CryptoError::NotOwned)?;

    let (scalar, key_image) =
        derive_spend_scalar_and_key_image(keys, out_key, &matched, output_index as u64, index)?;
    Ok((scalar, key_image, derivation))
}
