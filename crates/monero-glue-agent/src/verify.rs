//! Host/device digest checkpoints.
//!
//! A mismatch is fatal and never retried.

use log::warn;

use monero_glue_crypto::Hash;
use monero_glue_tx::{pre_mlsag_hash, prefix_hash, RctSig, TxPrefix};

use crate::error::{AgentError, Checkpoint};

pub(crate) fn check_digest(
    checkpoint: Checkpoint,
    computed: &Hash,
    reported: &Hash,
) -> Result<(), AgentError> {
    if computed != reported {
        warn!(
            "{checkpoint} mismatch: host {} device {}",
            hex::encode(computed),
            hex::encode(reported)
        );
        return Err(AgentError::IntegrityMismatch { checkpoint });
    }
    Ok(())
}

/// Checkpoint 1. Returns the verified prefix hash.
pub fn check_prefix_hash(prefix: &TxPrefix, reported: &Hash) -> Result<Hash, AgentError> {
    let computed = prefix_hash(prefix);
    check_digest(Checkpoint::PrefixHash, &computed, reported)?;
    Ok(computed)
}

/// Checkpoint 2.
pub fn check_aggregate_hash(rv: &RctSig, reported: &Hash) -> Result<(), AgentError> {
    let computed = pre_mlsag_hash(rv)?;
    check_digest(Checkpoint::AggregateHash, &computed, reported)
}
