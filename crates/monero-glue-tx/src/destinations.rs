//! Destination helpers used while preparing construction data.

use std::collections::HashSet;

use monero_glue_crypto::{Key, NULL_KEY};

use crate::types::{AccountPublicAddress, TxDestinationEntry};

/// Distinct non-change destinations split by address kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressClassification {
    pub num_standard: usize,
    pub num_subaddresses: usize,
    /// Last subaddress destination seen, if any.
    pub single_dest_subaddress: Option<AccountPublicAddress>,
}

/// Count distinct standard and subaddress destinations, skipping change.
pub fn classify_subaddresses(
    dests: &[TxDestinationEntry],
    change: Option<&AccountPublicAddress>,
) -> AddressClassification {
    let mut seen = HashSet::new();
    let mut out = AddressClassification::default();
    for dest in dests {
        if change == Some(&dest.addr) {
            continue;
        }
        if !seen.insert(dest.addr) {
            continue;
        }
        if dest.is_subaddress {
            out.num_subaddresses += 1;
            out.single_dest_subaddress = Some(dest.addr);
        } else {
            out.num_standard += 1;
        }
    }
    out
}

/// View key of the only paid non-change destination.
///
/// Zero-amount entries, change and null addresses are skipped. More than one
/// distinct destination yields the null key.
pub fn get_destination_view_key_pub(
    dests: &[TxDestinationEntry],
    change: Option<&AccountPublicAddress>,
) -> Key {
    let mut addr = AccountPublicAddress::default();
    let mut count = 0;
    for dest in dests {
        if dest.amount == 0 || change == Some(&dest.addr) || dest.addr == addr {
            continue;
        }
        if count > 0 {
            return NULL_KEY;
        }
        addr = dest.addr;
        count += 1;
    }
    addr.view_public_key
}

/// Sort absolute ring offsets and turn them into deltas.
pub fn absolute_output_offsets_to_relative(offsets: &[u64]) -> Vec<u64> {
    let mut res = offsets.to_vec();
    res.sort_unstable();
    for i in (1..res.len()).rev() {
        res[i] -= res[i - 1];
    }
    res
}
