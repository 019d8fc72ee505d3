//! Domain-separated SHA3-256 binary merkle trees.
//!
//! A lone node at any level is carried forward unchanged (promotion). It is
//! never paired with itself; implementations that duplicate the last leaf
//! are consensus-incompatible.

use rubin_crypto::CryptoProvider;

use crate::constants::{
    MERKLE_LEAF_PREFIX, MERKLE_NODE_PREFIX, WITNESS_MERKLE_LEAF_PREFIX,
    WITNESS_MERKLE_NODE_PREFIX,
};
use crate::error::{ErrorCode, TxError};
use crate::hashing::sha3;

fn merkle_root(
    provider: &dyn CryptoProvider,
    ids: &[[u8; 32]],
    leaf_prefix: u8,
    node_prefix: u8,
) -> Result<[u8; 32], TxError> {
    if ids.is_empty() {
        return Err(TxError::new(
            ErrorCode::BlockErrMerkleInvalid,
            "merkle: empty id list",
        ));
    }

    let mut level: Vec<[u8; 32]> = Vec::with_capacity(ids.len());
    let mut leaf_preimage = [0u8; 1 + 32];
    leaf_preimage[0] = leaf_prefix;
    for id in ids {
        leaf_preimage[1..].copy_from_slice(id);
        level.push(sha3(provider, &leaf_preimage)?);
    }

    let mut node_preimage = [0u8; 1 + 32 + 32];
    node_preimage[0] = node_prefix;
    while level.len() > 1 {
        let mut next: Vec<[u8; 32]> = Vec::with_capacity(level.len().div_ceil(2));
        let mut i = 0usize;
        while i < level.len() {
            if i == level.len() - 1 {
                // Odd promotion rule: carry forward unchanged.
                next.push(level[i]);
                i += 1;
                continue;
            }
            node_preimage[1..33].copy_from_slice(&level[i]);
            node_preimage[33..].copy_from_slice(&level[i + 1]);
            next.push(sha3(provider, &node_preimage)?);
            i += 2;
        }
        level = next;
    }

    Ok(level[0])
}

pub fn merkle_root_txids(
    provider: &dyn CryptoProvider,
    txids: &[[u8; 32]],
) -> Result<[u8; 32], TxError> {
    merkle_root(provider, txids, MERKLE_LEAF_PREFIX, MERKLE_NODE_PREFIX)
}

/// Witness merkle root over wtxids. The coinbase's wtxid is replaced with
/// the zero hash before calling (the commitment cannot cover itself).
pub fn witness_merkle_root_wtxids(
    provider: &dyn CryptoProvider,
    wtxids: &[[u8; 32]],
) -> Result<[u8; 32], TxError> {
    if wtxids.is_empty() {
        return Err(TxError::new(
            ErrorCode::BlockErrMerkleInvalid,
            "merkle: empty wtxid list",
        ));
    }
    let mut ids = wtxids.to_vec();
    ids[0] = [0u8; 32];
    merkle_root(
        provider,
        &ids,
        WITNESS_MERKLE_LEAF_PREFIX,
        WITNESS_MERKLE_NODE_PREFIX,
    )
}

/// The 32-byte value the coinbase anchor output must carry.
pub fn witness_commitment_hash(
    provider: &dyn CryptoProvider,
    witness_merkle_root: [u8; 32],
) -> Result<[u8; 32], TxError> {
    sha3(provider, &witness_merkle_root)
}
