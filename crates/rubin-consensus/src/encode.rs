//! Canonical serialisers. Byte-for-byte the inverse of the parsers; fixture
//! builders and the signing path both depend on them.

use crate::block::BlockHeader;
use crate::compactsize::encode_compact_size;
use crate::constants::BLOCK_HEADER_BYTES;
use crate::tx::{Tx, TxOutput, WitnessItem};

pub fn block_header_bytes(h: &BlockHeader) -> [u8; BLOCK_HEADER_BYTES] {
    let mut out = [0u8; BLOCK_HEADER_BYTES];
    out[0..4].copy_from_slice(&h.version.to_le_bytes());
    out[4..36].copy_from_slice(&h.prev_block_hash);
    out[36..68].copy_from_slice(&h.merkle_root);
    out[68..76].copy_from_slice(&h.timestamp.to_le_bytes());
    out[76..108].copy_from_slice(&h.target);
    out[108..116].copy_from_slice(&h.nonce.to_le_bytes());
    out
}

pub fn tx_output_bytes(output: &TxOutput) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + 2 + 9 + output.covenant_data.len());
    out.extend_from_slice(&output.value.to_le_bytes());
    out.extend_from_slice(&output.covenant_type.to_le_bytes());
    encode_compact_size(output.covenant_data.len() as u64, &mut out);
    out.extend_from_slice(&output.covenant_data);
    out
}

pub fn witness_item_bytes(item: &WitnessItem) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 9 + item.pubkey.len() + 9 + item.signature.len());
    out.push(item.suite_id);
    encode_compact_size(item.pubkey.len() as u64, &mut out);
    out.extend_from_slice(&item.pubkey);
    encode_compact_size(item.signature.len() as u64, &mut out);
    out.extend_from_slice(&item.signature);
    out
}

/// Core transaction bytes: everything the txid commits to (no witness, no
/// da_payload).
pub fn tx_core_bytes(tx: &Tx) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&tx.version.to_le_bytes());
    out.push(tx.tx_kind);
    out.extend_from_slice(&tx.tx_nonce.to_le_bytes());
    encode_compact_size(tx.inputs.len() as u64, &mut out);
    for input in &tx.inputs {
        out.extend_from_slice(&input.prev_txid);
        out.extend_from_slice(&input.prev_vout.to_le_bytes());
        encode_compact_size(input.script_sig.len() as u64, &mut out);
        out.extend_from_slice(&input.script_sig);
        out.extend_from_slice(&input.sequence.to_le_bytes());
    }
    encode_compact_size(tx.outputs.len() as u64, &mut out);
    for output in &tx.outputs {
        out.extend_from_slice(&tx_output_bytes(output));
    }
    out.extend_from_slice(&tx.locktime.to_le_bytes());
    out
}

/// Full transaction bytes: core, then witness, then da_payload.
pub fn tx_bytes(tx: &Tx) -> Vec<u8> {
    let mut out = tx_core_bytes(tx);
    encode_compact_size(tx.witness.len() as u64, &mut out);
    for item in &tx.witness {
        out.extend_from_slice(&witness_item_bytes(item));
    }
    encode_compact_size(tx.da_payload.len() as u64, &mut out);
    out.extend_from_slice(&tx.da_payload);
    out
}

pub fn block_bytes(header: &BlockHeader, txs: &[Tx]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&block_header_bytes(header));
    encode_compact_size(txs.len() as u64, &mut out);
    for tx in txs {
        out.extend_from_slice(&tx_bytes(tx));
    }
    out
}
