//! Canonical byte encoding and decoding for KV table keys and values.
//!
//! All integers are little-endian. Layouts are deterministic and must
//! match the Go implementation byte-for-byte for cross-client parity.

use num_bigint::BigUint;

use rubin_consensus::{
    outpoint_key, parse_outpoint_key, parse_utxo_entry, utxo_entry_bytes, Outpoint, UtxoEntry,
};

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Block index status enum
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockStatus {
    /// Header accepted, body not yet validated.
    Unknown = 0,
    Valid = 1,
    InvalidHeader = 2,
    InvalidAncestry = 3,
    InvalidBody = 4,
    Orphaned = 5,
}

impl BlockStatus {
    pub fn from_u8(v: u8) -> Result<Self, StoreError> {
        match v {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Valid),
            2 => Ok(Self::InvalidHeader),
            3 => Ok(Self::InvalidAncestry),
            4 => Ok(Self::InvalidBody),
            5 => Ok(Self::Orphaned),
            _ => Err(StoreError::Codec(format!("invalid block status byte: {v}"))),
        }
    }

    pub fn is_invalid(self) -> bool {
        matches!(
            self,
            Self::InvalidHeader | Self::InvalidAncestry | Self::InvalidBody
        )
    }
}

// ---------------------------------------------------------------------------
// Block index entry
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockIndexEntry {
    pub height: u64,
    pub prev_hash: [u8; 32],
    pub cumulative_work: BigUint,
    pub status: BlockStatus,
}

/// Encoding: height_le(8) || prev_hash(32) || status(1) ||
/// cum_work_len_le(2) || cum_work_be (minimal, no leading zero bytes).
pub fn encode_block_index(entry: &BlockIndexEntry) -> Vec<u8> {
    let work_be = biguint_minimal_be(&entry.cumulative_work);
    let mut buf = Vec::with_capacity(8 + 32 + 1 + 2 + work_be.len());
    buf.extend_from_slice(&entry.height.to_le_bytes());
    buf.extend_from_slice(&entry.prev_hash);
    buf.push(entry.status as u8);
    buf.extend_from_slice(&(work_be.len() as u16).to_le_bytes());
    buf.extend_from_slice(&work_be);
    buf
}

pub fn decode_block_index(data: &[u8]) -> Result<BlockIndexEntry, StoreError> {
    if data.len() < 8 + 32 + 1 + 2 {
        return Err(StoreError::Codec(format!(
            "block_index: expected >= 43 bytes, got {}",
            data.len()
        )));
    }
    let height = u64::from_le_bytes(data[0..8].try_into().unwrap());
    let mut prev_hash = [0u8; 32];
    prev_hash.copy_from_slice(&data[8..40]);
    let status = BlockStatus::from_u8(data[40])?;
    let work_len = u16::from_le_bytes(data[41..43].try_into().unwrap()) as usize;
    if data.len() != 43 + work_len {
        return Err(StoreError::Codec(
            "block_index: work length mismatch".into(),
        ));
    }
    let work_be = &data[43..];
    if !work_be.is_empty() && work_be[0] == 0 {
        return Err(StoreError::Codec(
            "block_index: non-minimal cumulative work".into(),
        ));
    }
    Ok(BlockIndexEntry {
        height,
        prev_hash,
        cumulative_work: BigUint::from_bytes_be(work_be),
        status,
    })
}

fn biguint_minimal_be(x: &BigUint) -> Vec<u8> {
    let b = x.to_bytes_be();
    // num-bigint encodes zero as [0]; the canonical form is empty.
    if b == [0] {
        Vec::new()
    } else {
        b
    }
}

// ---------------------------------------------------------------------------
// Undo record:
//   spent_count_le(4) || [outpoint_key(36) || utxo_len_le(4) || utxo_bytes]* ||
//   created_count_le(4) || [outpoint_key(36)]*
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UndoEntry {
    pub outpoint: Outpoint,
    pub restored_entry: UtxoEntry,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UndoRecord {
    /// Entries spent by the block, in consumption order.
    pub spent: Vec<UndoEntry>,
    /// Outpoints the block created, in production order.
    pub created: Vec<Outpoint>,
}

pub fn encode_undo_record(record: &UndoRecord) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(record.spent.len() as u32).to_le_bytes());
    for item in &record.spent {
        buf.extend_from_slice(&outpoint_key(&item.outpoint));
        let entry_bytes = utxo_entry_bytes(&item.restored_entry);
        buf.extend_from_slice(&(entry_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&entry_bytes);
    }
    buf.extend_from_slice(&(record.created.len() as u32).to_le_bytes());
    for outpoint in &record.created {
        buf.extend_from_slice(&outpoint_key(outpoint));
    }
    buf
}

pub fn decode_undo_record(data: &[u8]) -> Result<UndoRecord, StoreError> {
    let mut offset = 0usize;

    let take = |offset: &mut usize, n: usize| -> Result<&[u8], StoreError> {
        if *offset + n > data.len() {
            return Err(StoreError::Codec("undo: truncated".into()));
        }
        let s = &data[*offset..*offset + n];
        *offset += n;
        Ok(s)
    };

    let n_spent = u32::from_le_bytes(take(&mut offset, 4)?.try_into().unwrap());
    let mut spent = Vec::with_capacity(n_spent as usize);
    for _ in 0..n_spent {
        let outpoint = parse_outpoint_key(take(&mut offset, 36)?)
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        let entry_len = u32::from_le_bytes(take(&mut offset, 4)?.try_into().unwrap()) as usize;
        let restored_entry = parse_utxo_entry(take(&mut offset, entry_len)?)
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        spent.push(UndoEntry {
            outpoint,
            restored_entry,
        });
    }

    let n_created = u32::from_le_bytes(take(&mut offset, 4)?.try_into().unwrap());
    let mut created = Vec::with_capacity(n_created as usize);
    for _ in 0..n_created {
        let outpoint = parse_outpoint_key(take(&mut offset, 36)?)
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        created.push(outpoint);
    }

    if offset != data.len() {
        return Err(StoreError::Codec("undo: trailing bytes".into()));
    }

    Ok(UndoRecord { spent, created })
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn block_index_roundtrip() {
        let entry = BlockIndexEntry {
            height: 42,
            prev_hash: [0xab; 32],
            cumulative_work: BigUint::from(123_456_789u64) << 200,
            status: BlockStatus::Valid,
        };
        let encoded = encode_block_index(&entry);
        let decoded = decode_block_index(&encoded).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn block_index_zero_work_is_empty() {
        let entry = BlockIndexEntry {
            height: 0,
            prev_hash: [0; 32],
            cumulative_work: BigUint::from(0u32),
            status: BlockStatus::Orphaned,
        };
        let encoded = encode_block_index(&entry);
        assert_eq!(encoded.len(), 43);
        let decoded = decode_block_index(&encoded).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn block_index_rejects_leading_zero_work() {
        let entry = BlockIndexEntry {
            height: 1,
            prev_hash: [0; 32],
            cumulative_work: BigUint::from(7u32),
            status: BlockStatus::Valid,
        };
        let mut encoded = encode_block_index(&entry);
        // Widen the work field with a leading zero byte.
        encoded[41..43].copy_from_slice(&2u16.to_le_bytes());
        let pos = encoded.len() - 1;
        encoded.insert(pos, 0x00);
        assert!(decode_block_index(&encoded).is_err());
    }

    #[test]
    fn undo_record_roundtrip() {
        let record = UndoRecord {
            spent: vec![UndoEntry {
                outpoint: Outpoint {
                    txid: [0x11; 32],
                    vout: 0,
                },
                restored_entry: UtxoEntry {
                    value: 1_000,
                    covenant_type: 0x0100,
                    covenant_data: vec![0xaa; 33],
                    creation_height: 5,
                    created_by_coinbase: false,
                },
            }],
            created: vec![
                Outpoint {
                    txid: [0x22; 32],
                    vout: 1,
                },
                Outpoint {
                    txid: [0x22; 32],
                    vout: 2,
                },
            ],
        };
        let encoded = encode_undo_record(&record);
        let decoded = decode_undo_record(&encoded).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn undo_record_rejects_trailing_bytes() {
        let record = UndoRecord {
            spent: vec![],
            created: vec![],
        };
        let mut encoded = encode_undo_record(&record);
        encoded.push(0x00);
        assert!(decode_undo_record(&encoded).is_err());
    }
}
