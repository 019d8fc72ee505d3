use rubin_crypto::CryptoProvider;

use crate::compactsize::read_compact_size;
use crate::constants::BLOCK_HEADER_BYTES;
use crate::error::{ErrorCode, TxError};
use crate::hashing::sha3;
use crate::tx::{parse_tx, Tx};
use crate::wire_read::Reader;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub timestamp: u64,
    pub target: [u8; 32],
    pub nonce: u64,
}

#[derive(Clone, Debug)]
pub struct ParsedBlock {
    pub header: BlockHeader,
    pub header_bytes: [u8; BLOCK_HEADER_BYTES],
    pub txs: Vec<Tx>,
    pub txids: Vec<[u8; 32]>,
    pub wtxids: Vec<[u8; 32]>,
}

pub fn parse_block_header_bytes(b: &[u8]) -> Result<BlockHeader, TxError> {
    if b.len() != BLOCK_HEADER_BYTES {
        return Err(TxError::new(
            ErrorCode::BlockErrParse,
            "block header length mismatch",
        ));
    }

    let version = u32::from_le_bytes(b[0..4].try_into().unwrap());
    let mut prev_block_hash = [0u8; 32];
    prev_block_hash.copy_from_slice(&b[4..36]);
    let mut merkle_root = [0u8; 32];
    merkle_root.copy_from_slice(&b[36..68]);
    let timestamp = u64::from_le_bytes(b[68..76].try_into().unwrap());
    let mut target = [0u8; 32];
    target.copy_from_slice(&b[76..108]);
    let nonce = u64::from_le_bytes(b[108..116].try_into().unwrap());

    Ok(BlockHeader {
        version,
        prev_block_hash,
        merkle_root,
        timestamp,
        target,
        nonce,
    })
}

/// Block hash: SHA3-256 over the exact 116 header bytes.
pub fn block_hash(
    provider: &dyn CryptoProvider,
    header_bytes: &[u8],
) -> Result<[u8; 32], TxError> {
    if header_bytes.len() != BLOCK_HEADER_BYTES {
        return Err(TxError::new(
            ErrorCode::BlockErrParse,
            "block hash: invalid header length",
        ));
    }
    sha3(provider, header_bytes)
}

/// Parse a full block: exactly 116 header bytes, a CompactSize tx count,
/// then that many transactions back-to-back. No trailing bytes tolerated.
///
/// Transaction-level parse failures propagate with their own tx token; only
/// the block envelope itself surfaces `BLOCK_ERR_PARSE`.
pub fn parse_block_bytes(
    provider: &dyn CryptoProvider,
    block_bytes: &[u8],
) -> Result<ParsedBlock, TxError> {
    if block_bytes.len() < BLOCK_HEADER_BYTES + 1 {
        return Err(TxError::new(ErrorCode::BlockErrParse, "block too short"));
    }

    let mut header_bytes = [0u8; BLOCK_HEADER_BYTES];
    header_bytes.copy_from_slice(&block_bytes[..BLOCK_HEADER_BYTES]);
    let header = parse_block_header_bytes(&header_bytes)?;

    let mut r = Reader::new(&block_bytes[BLOCK_HEADER_BYTES..]);
    let (tx_count, _) = read_compact_size(&mut r)
        .map_err(|_| TxError::new(ErrorCode::BlockErrParse, "invalid tx_count"))?;
    if tx_count == 0 {
        return Err(TxError::new(
            ErrorCode::BlockErrCoinbaseInvalid,
            "empty block tx list",
        ));
    }

    let mut txs: Vec<Tx> = Vec::new();
    let mut txids: Vec<[u8; 32]> = Vec::new();
    let mut wtxids: Vec<[u8; 32]> = Vec::new();

    for _ in 0..tx_count {
        let rem = &block_bytes[BLOCK_HEADER_BYTES + r.offset()..];
        if rem.is_empty() {
            return Err(TxError::new(
                ErrorCode::BlockErrParse,
                "unexpected EOF in tx list",
            ));
        }
        let (tx, txid, wtxid, consumed) = parse_tx(provider, rem)?;
        txs.push(tx);
        txids.push(txid);
        wtxids.push(wtxid);
        r.read_bytes(consumed)
            .map_err(|_| TxError::new(ErrorCode::BlockErrParse, "unexpected EOF in tx list"))?;
    }

    if BLOCK_HEADER_BYTES + r.offset() != block_bytes.len() {
        return Err(TxError::new(
            ErrorCode::BlockErrParse,
            "trailing bytes after tx list",
        ));
    }

    Ok(ParsedBlock {
        header,
        header_bytes,
        txs,
        txids,
        wtxids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{block_bytes, block_header_bytes};

    struct Sha3Provider;

    impl CryptoProvider for Sha3Provider {
        fn sha3_256(&self, input: &[u8]) -> Result<[u8; 32], String> {
            use sha3::Digest;
            let mut h = sha3::Sha3_256::new();
            h.update(input);
            let out = h.finalize();
            let mut r = [0u8; 32];
            r.copy_from_slice(&out);
            Ok(r)
        }
        fn verify_mldsa87(&self, _: &[u8], _: &[u8], _: &[u8; 32]) -> Result<bool, String> {
            Ok(false)
        }
        fn verify_slhdsa_shake_256f(&self, _: &[u8], _: &[u8], _: &[u8; 32]) -> Result<bool, String> {
            Ok(false)
        }
    }

    fn header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block_hash: [0u8; 32],
            merkle_root: [0x42; 32],
            timestamp: 1_700_000_000,
            target: [0xff; 32],
            nonce: 7,
        }
    }

    #[test]
    fn header_roundtrip() {
        let h = header();
        let bytes = block_header_bytes(&h);
        assert_eq!(bytes.len(), BLOCK_HEADER_BYTES);
        let parsed = parse_block_header_bytes(&bytes).expect("parse");
        assert_eq!(parsed, h);
    }

    #[test]
    fn block_rejects_trailing_bytes() {
        let p = Sha3Provider;
        let tx = crate::tx::Tx {
            version: crate::constants::TX_WIRE_VERSION,
            tx_kind: crate::constants::TX_KIND_STANDARD,
            tx_nonce: 1,
            inputs: vec![crate::tx::TxInput {
                prev_txid: [1u8; 32],
                prev_vout: 0,
                script_sig: Vec::new(),
                sequence: 0,
            }],
            outputs: vec![crate::tx::TxOutput {
                value: 1,
                covenant_type: crate::constants::COV_TYPE_ANCHOR,
                covenant_data: vec![0u8; 32],
            }],
            locktime: 0,
            witness: Vec::new(),
            da_payload: Vec::new(),
        };
        let mut bytes = block_bytes(&header(), std::slice::from_ref(&tx));
        bytes.push(0x00);

        let err = parse_block_bytes(&p, &bytes).unwrap_err();
        assert_eq!(err.code, ErrorCode::BlockErrParse);
    }

    #[test]
    fn block_rejects_empty_tx_list() {
        let p = Sha3Provider;
        let bytes = block_bytes(&header(), &[]);
        let err = parse_block_bytes(&p, &bytes).unwrap_err();
        assert_eq!(err.code, ErrorCode::BlockErrCoinbaseInvalid);
    }
}
