//! UTXO entry type and its canonical byte layouts.
//!
//! The on-disk value encoding and the chainstate snapshot hash use the same
//! serialisation; both are consensus-observable and must match the Go client
//! byte-for-byte.

use std::collections::HashMap;

use rubin_crypto::CryptoProvider;

use crate::compactsize::{compact_size_decode, encode_compact_size};
use crate::error::{ErrorCode, TxError};
use crate::hashing::sha3;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Outpoint {
    pub txid: [u8; 32],
    pub vout: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxoEntry {
    pub value: u64,
    pub covenant_type: u16,
    pub covenant_data: Vec<u8>,
    pub creation_height: u64,
    pub created_by_coinbase: bool,
}

/// Outpoint key: txid(32) || vout_le(4).
pub fn outpoint_key(op: &Outpoint) -> [u8; 36] {
    let mut buf = [0u8; 36];
    buf[0..32].copy_from_slice(&op.txid);
    buf[32..36].copy_from_slice(&op.vout.to_le_bytes());
    buf
}

pub fn parse_outpoint_key(data: &[u8]) -> Result<Outpoint, TxError> {
    if data.len() != 36 {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "outpoint key length mismatch",
        ));
    }
    let mut txid = [0u8; 32];
    txid.copy_from_slice(&data[0..32]);
    let vout = u32::from_le_bytes(data[32..36].try_into().unwrap());
    Ok(Outpoint { txid, vout })
}

/// UTXO entry bytes: value_le(8) || covenant_type_le(2) ||
/// CompactSize(cov_data_len) || cov_data || creation_height_le(8) ||
/// coinbase_flag(1).
pub fn utxo_entry_bytes(e: &UtxoEntry) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + 2 + 9 + e.covenant_data.len() + 8 + 1);
    buf.extend_from_slice(&e.value.to_le_bytes());
    buf.extend_from_slice(&e.covenant_type.to_le_bytes());
    encode_compact_size(e.covenant_data.len() as u64, &mut buf);
    buf.extend_from_slice(&e.covenant_data);
    buf.extend_from_slice(&e.creation_height.to_le_bytes());
    buf.push(if e.created_by_coinbase { 0x01 } else { 0x00 });
    buf
}

pub fn parse_utxo_entry(data: &[u8]) -> Result<UtxoEntry, TxError> {
    if data.len() < 8 + 2 + 1 + 8 + 1 {
        return Err(TxError::new(ErrorCode::TxErrParse, "utxo entry too short"));
    }
    let value = u64::from_le_bytes(data[0..8].try_into().unwrap());
    let covenant_type = u16::from_le_bytes(data[8..10].try_into().unwrap());
    let (cov_len, varint_bytes) = compact_size_decode(&data[10..])?;
    let cov_start = 10 + varint_bytes;
    let cov_end = cov_start
        .checked_add(cov_len as usize)
        .ok_or_else(|| TxError::new(ErrorCode::TxErrParse, "utxo entry length overflow"))?;
    if data.len() != cov_end + 8 + 1 {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "utxo entry length mismatch",
        ));
    }
    let covenant_data = data[cov_start..cov_end].to_vec();
    let creation_height = u64::from_le_bytes(data[cov_end..cov_end + 8].try_into().unwrap());
    let created_by_coinbase = match data[cov_end + 8] {
        0x00 => false,
        0x01 => true,
        _ => {
            return Err(TxError::new(
                ErrorCode::TxErrParse,
                "utxo entry coinbase flag invalid",
            ))
        }
    };
    Ok(UtxoEntry {
        value,
        covenant_type,
        covenant_data,
        creation_height,
        created_by_coinbase,
    })
}

/// Chainstate snapshot hash over an in-memory set:
/// SHA3-256 of the concatenation of `outpoint_key || utxo_entry_bytes`
/// pairs, sorted lexicographically by outpoint key. The container's own
/// iteration order is never observable.
pub fn utxo_set_hash(
    provider: &dyn CryptoProvider,
    utxo: &HashMap<Outpoint, UtxoEntry>,
) -> Result<[u8; 32], TxError> {
    let mut items: Vec<([u8; 36], &UtxoEntry)> = Vec::with_capacity(utxo.len());
    for (point, entry) in utxo {
        items.push((outpoint_key(point), entry));
    }
    items.sort_by(|a, b| a.0.cmp(&b.0));

    let mut preimage: Vec<u8> = Vec::with_capacity(items.len() * 64);
    for (key, entry) in items {
        preimage.extend_from_slice(&key);
        preimage.extend_from_slice(&utxo_entry_bytes(entry));
    }
    sha3(provider, &preimage)
}
