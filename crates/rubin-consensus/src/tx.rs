use rubin_crypto::CryptoProvider;

use crate::compactsize::read_compact_size;
use crate::constants::*;
use crate::error::{ErrorCode, TxError};
use crate::hashing::sha3;
use crate::wire_read::Reader;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tx {
    pub version: u32,
    pub tx_kind: u8,
    pub tx_nonce: u64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub locktime: u32,
    pub witness: Vec<WitnessItem>,
    pub da_payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    pub prev_txid: [u8; 32],
    pub prev_vout: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub covenant_type: u16,
    pub covenant_data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WitnessItem {
    pub suite_id: u8,
    pub pubkey: Vec<u8>,
    pub signature: Vec<u8>,
}

impl WitnessItem {
    /// Keyless sentinel: no crypto at all. The only form VAULT/HTLC_V2
    /// selectors and pre-activation EXT spends accept.
    pub fn is_keyless_sentinel(&self) -> bool {
        self.suite_id == SUITE_ID_SENTINEL && self.pubkey.is_empty() && self.signature.is_empty()
    }
}

/// Single-pass transaction parse.
///
/// Returns `(tx, txid, wtxid, consumed)`. `txid` hashes the core bytes
/// (everything up to and including locktime); `wtxid` hashes the full
/// serialisation including witness and da_payload. The caller is responsible
/// for rejecting residual bytes at the transaction boundary.
pub fn parse_tx(
    provider: &dyn CryptoProvider,
    b: &[u8],
) -> Result<(Tx, [u8; 32], [u8; 32], usize), TxError> {
    let mut r = Reader::new(b);

    let version = r.read_u32_le()?;
    if version != TX_WIRE_VERSION {
        return Err(TxError::new(ErrorCode::TxErrParse, "unsupported version"));
    }

    let tx_kind = r.read_u8()?;
    if tx_kind != TX_KIND_STANDARD && tx_kind != TX_KIND_DA {
        return Err(TxError::new(ErrorCode::TxErrParse, "unsupported tx_kind"));
    }

    let tx_nonce = r.read_u64_le()?;

    let (in_count, _) = read_compact_size(&mut r)?;
    if in_count == 0 {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "tx must have at least one input",
        ));
    }
    if in_count > MAX_TX_INPUTS {
        return Err(TxError::new(ErrorCode::TxErrParse, "input_count overflow"));
    }

    let mut inputs = Vec::with_capacity(in_count as usize);
    for _ in 0..in_count {
        let prev = r.read_bytes(32)?;
        let mut prev_txid = [0u8; 32];
        prev_txid.copy_from_slice(prev);

        let prev_vout = r.read_u32_le()?;

        let (script_sig_len, _) = read_compact_size(&mut r)?;
        if script_sig_len != 0 && script_sig_len != MAX_SCRIPT_SIG_BYTES as u64 {
            return Err(TxError::new(
                ErrorCode::TxErrParse,
                "script_sig length must be 0 or 32",
            ));
        }
        let script_sig = r.read_bytes(script_sig_len as usize)?.to_vec();

        let sequence = r.read_u32_le()?;

        inputs.push(TxInput {
            prev_txid,
            prev_vout,
            script_sig,
            sequence,
        });
    }

    let (out_count, _) = read_compact_size(&mut r)?;
    if out_count == 0 {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "tx must have at least one output",
        ));
    }
    if out_count > MAX_TX_OUTPUTS {
        return Err(TxError::new(ErrorCode::TxErrParse, "output_count overflow"));
    }

    let mut outputs = Vec::with_capacity(out_count as usize);
    for _ in 0..out_count {
        let value = r.read_u64_le()?;
        let covenant_type = r.read_u16_le()?;

        let (cov_len, _) = read_compact_size(&mut r)?;
        if cov_len > MAX_COVENANT_DATA {
            return Err(TxError::new(
                ErrorCode::TxErrParse,
                "covenant_data_len overflow",
            ));
        }
        let covenant_data = r.read_bytes(cov_len as usize)?.to_vec();

        outputs.push(TxOutput {
            value,
            covenant_type,
            covenant_data,
        });
    }

    let locktime = r.read_u32_le()?;
    let core_end = r.offset();

    // Witness section.
    let (witness_count, witness_count_varint_bytes) = read_compact_size(&mut r)?;
    if witness_count > MAX_WITNESS_ITEMS {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "witness_count overflow",
        ));
    }

    let mut witness_bytes = witness_count_varint_bytes;
    let mut witness = Vec::with_capacity(witness_count as usize);

    for _ in 0..witness_count {
        let suite_id = r.read_u8()?;
        witness_bytes += 1;

        let (pub_len, pub_len_varint_bytes) = read_compact_size(&mut r)?;
        witness_bytes += pub_len_varint_bytes;
        let pubkey = r.read_bytes(pub_len as usize)?.to_vec();
        witness_bytes += pub_len as usize;

        let (sig_len, sig_len_varint_bytes) = read_compact_size(&mut r)?;
        witness_bytes += sig_len_varint_bytes;
        let signature = r.read_bytes(sig_len as usize)?.to_vec();
        witness_bytes += sig_len as usize;

        check_witness_item_canonical(suite_id, &pubkey, &signature)?;

        if witness_bytes > MAX_WITNESS_BYTES_PER_TX {
            return Err(TxError::new(
                ErrorCode::TxErrParse,
                "witness bytes overflow",
            ));
        }

        witness.push(WitnessItem {
            suite_id,
            pubkey,
            signature,
        });
    }

    // DA payload.
    let (da_len, _) = read_compact_size(&mut r)?;
    let da_payload: Vec<u8> = match tx_kind {
        TX_KIND_STANDARD => {
            if da_len != 0 {
                return Err(TxError::new(
                    ErrorCode::TxErrParse,
                    "da_payload_len must be 0 for tx_kind=0x00",
                ));
            }
            Vec::new()
        }
        TX_KIND_DA => {
            if da_len == 0 || da_len > MAX_DA_PAYLOAD_BYTES_PER_TX {
                return Err(TxError::new(
                    ErrorCode::TxErrParse,
                    "da_payload_len out of range for tx_kind=0x01",
                ));
            }
            r.read_bytes(da_len as usize)?.to_vec()
        }
        _ => unreachable!("tx_kind checked above"),
    };
    let total_end = r.offset();

    let txid = sha3(provider, &b[..core_end])?;
    let wtxid = sha3(provider, &b[..total_end])?;

    let tx = Tx {
        version,
        tx_kind,
        tx_nonce,
        inputs,
        outputs,
        locktime,
        witness,
        da_payload,
    };

    Ok((tx, txid, wtxid, total_end))
}

/// Canonical witness item forms, enforced at parse.
///
/// Sentinel items are either keyless `(0, 0)` or a legacy-HTLC selector:
/// a 32-byte key_id plus a 1-byte refund path id, or a claim payload
/// `path_id(0x00) || u16le(preimage_len) || preimage`. Crypto suites demand
/// exact pubkey/signature lengths; anything else never reaches verification.
fn check_witness_item_canonical(suite_id: u8, pubkey: &[u8], sig: &[u8]) -> Result<(), TxError> {
    match suite_id {
        SUITE_ID_SENTINEL => {
            let ok = if pubkey.is_empty() && sig.is_empty() {
                true
            } else if pubkey.len() == 32 {
                if sig.len() == 1 {
                    sig[0] == 0x01
                } else if sig.len() >= 3 {
                    if sig[0] != 0x00 {
                        false
                    } else {
                        let pre_len =
                            u16::from_le_bytes(sig[1..3].try_into().expect("sig[1..3] is 2 bytes"))
                                as usize;
                        if pre_len as u64 > MAX_HTLC_PREIMAGE_BYTES {
                            false
                        } else {
                            sig.len() == 3 + pre_len
                        }
                    }
                } else {
                    false
                }
            } else {
                false
            };
            if !ok {
                return Err(TxError::new(
                    ErrorCode::TxErrParse,
                    "non-canonical sentinel witness item",
                ));
            }
            Ok(())
        }
        SUITE_ID_ML_DSA_87 => {
            if pubkey.len() as u64 != ML_DSA_87_PUBKEY_BYTES
                || sig.len() as u64 != ML_DSA_87_SIG_BYTES
            {
                return Err(TxError::new(
                    ErrorCode::TxErrParse,
                    "non-canonical ML-DSA witness item lengths",
                ));
            }
            Ok(())
        }
        SUITE_ID_SLH_DSA_SHAKE_256F => {
            if pubkey.len() as u64 != SLH_DSA_SHAKE_256F_PUBKEY_BYTES
                || sig.len() as u64 != SLH_DSA_SHAKE_256F_SIG_BYTES
            {
                return Err(TxError::new(
                    ErrorCode::TxErrParse,
                    "non-canonical SLH-DSA witness item lengths",
                ));
            }
            Ok(())
        }
        _ => Err(TxError::new(ErrorCode::TxErrSigAlgInvalid, "unknown suite_id")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{tx_bytes, tx_core_bytes};

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

    fn minimal_tx() -> Tx {
        Tx {
            version: TX_WIRE_VERSION,
            tx_kind: TX_KIND_STANDARD,
            tx_nonce: 1,
            inputs: vec![TxInput {
                prev_txid: [0x11; 32],
                prev_vout: 0,
                script_sig: Vec::new(),
                sequence: 0,
            }],
            outputs: vec![TxOutput {
                value: 5,
                covenant_type: COV_TYPE_P2PK,
                covenant_data: vec![0u8; P2PK_COVENANT_DATA_BYTES],
            }],
            locktime: 0,
            witness: Vec::new(),
            da_payload: Vec::new(),
        }
    }

    #[test]
    fn parse_roundtrip_with_ids() {
        let p = Sha3Provider;
        let tx = minimal_tx();
        let bytes = tx_bytes(&tx);

        let (parsed, txid, wtxid, consumed) = parse_tx(&p, &bytes).expect("parse");
        assert_eq!(parsed, tx);
        assert_eq!(consumed, bytes.len());
        assert_eq!(txid, p.sha3_256(&tx_core_bytes(&tx)).unwrap());
        assert_eq!(wtxid, p.sha3_256(&bytes).unwrap());
        assert_ne!(txid, wtxid);
    }

    #[test]
    fn parse_rejects_nonminimal_compactsize() {
        let p = Sha3Provider;
        let tx = minimal_tx();
        let mut bytes = tx_bytes(&tx);
        // input_count starts right after version+tx_kind+tx_nonce.
        let off = 4 + 1 + 8;
        bytes.splice(off..off + 1, [0xfd, 0x01, 0x00]);

        let err = parse_tx(&p, &bytes).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrParse);
    }

    #[test]
    fn parse_rejects_bad_script_sig_len() {
        let p = Sha3Provider;
        let mut tx = minimal_tx();
        tx.inputs[0].script_sig = vec![0u8; 16];
        let bytes = tx_bytes(&tx);

        let err = parse_tx(&p, &bytes).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrParse);
    }

    #[test]
    fn parse_rejects_zero_inputs_and_outputs() {
        let p = Sha3Provider;
        let mut tx = minimal_tx();
        tx.inputs.clear();
        let err = parse_tx(&p, &tx_bytes(&tx)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrParse);

        let mut tx = minimal_tx();
        tx.outputs.clear();
        let err = parse_tx(&p, &tx_bytes(&tx)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrParse);
    }

    #[test]
    fn parse_rejects_witness_length_mismatch() {
        let p = Sha3Provider;

        // ML-DSA item with a truncated signature.
        let mut tx = minimal_tx();
        tx.witness.push(WitnessItem {
            suite_id: SUITE_ID_ML_DSA_87,
            pubkey: vec![0u8; ML_DSA_87_PUBKEY_BYTES as usize],
            signature: vec![0u8; ML_DSA_87_SIG_BYTES as usize - 1],
        });
        let err = parse_tx(&p, &tx_bytes(&tx)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrParse);

        // SLH-DSA signatures are exact-length, not a maximum.
        let mut tx = minimal_tx();
        tx.witness.push(WitnessItem {
            suite_id: SUITE_ID_SLH_DSA_SHAKE_256F,
            pubkey: vec![0u8; SLH_DSA_SHAKE_256F_PUBKEY_BYTES as usize],
            signature: vec![0u8; SLH_DSA_SHAKE_256F_SIG_BYTES as usize - 8],
        });
        let err = parse_tx(&p, &tx_bytes(&tx)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrParse);
    }

    #[test]
    fn parse_rejects_unknown_suite() {
        let p = Sha3Provider;
        let mut tx = minimal_tx();
        tx.witness.push(WitnessItem {
            suite_id: 0x07,
            pubkey: Vec::new(),
            signature: Vec::new(),
        });
        let err = parse_tx(&p, &tx_bytes(&tx)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrSigAlgInvalid);
    }

    #[test]
    fn parse_rejects_da_payload_on_standard_kind() {
        let p = Sha3Provider;
        let mut tx = minimal_tx();
        tx.da_payload = vec![0xaa; 4];
        // tx_bytes serialises the payload; the standard kind must reject it.
        let err = parse_tx(&p, &tx_bytes(&tx)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrParse);
    }

    #[test]
    fn parse_accepts_da_carrier() {
        let p = Sha3Provider;
        let mut tx = minimal_tx();
        tx.tx_kind = TX_KIND_DA;
        tx.da_payload = vec![0xaa; 100];
        let (parsed, _, _, _) = parse_tx(&p, &tx_bytes(&tx)).expect("parse");
        assert_eq!(parsed.da_payload.len(), 100);
    }

    #[test]
    fn parse_rejects_oversized_covenant_data() {
        let p = Sha3Provider;
        let mut tx = minimal_tx();
        tx.outputs[0].covenant_data = vec![0u8; MAX_COVENANT_DATA as usize + 1];
        let err = parse_tx(&p, &tx_bytes(&tx)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrParse);
    }
}
