//! CORE_HTLC (legacy) and CORE_HTLC_V2 hashed-timelock covenants.
//!
//! The legacy form selects its spend path through a sentinel selector
//! witness carrying an explicit path id (and the preimage on claims).
//! HTLC_V2 instead selects the path from the set M of matching CORE_ANCHOR
//! outputs in the spending transaction; the selector slot is keyless.

use rubin_crypto::CryptoProvider;

use crate::constants::{
    COV_TYPE_ANCHOR, HTLC_COVENANT_DATA_BYTES, HTLC_V2_ANCHOR_ENVELOPE_BYTES,
    HTLC_V2_ANCHOR_PREFIX, LOCK_MODE_HEIGHT, LOCK_MODE_TIMESTAMP, MAX_HTLC_PREIMAGE_BYTES,
    SUITE_ID_SENTINEL,
};
use crate::error::{ErrorCode, TxError};
use crate::hashing::sha3;
use crate::spend::{check_suite_gate, compute_key_id, verify_sig};
use crate::tx::{Tx, WitnessItem};
use crate::utxo::UtxoEntry;
use crate::validate::DeploymentView;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HtlcCovenant {
    pub preimage_hash: [u8; 32],
    pub lock_mode: u8,
    pub lock_value: u64,
    pub claim_key_id: [u8; 32],
    pub refund_key_id: [u8; 32],
}

/// Layout (105 bytes): preimage_hash(32) || lock_mode(1) || lock_value_le(8)
/// || claim_key_id(32) || refund_key_id(32).
pub fn parse_htlc_covenant_data(cov_data: &[u8]) -> Result<HtlcCovenant, TxError> {
    if cov_data.len() != HTLC_COVENANT_DATA_BYTES {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_HTLC covenant_data length mismatch",
        ));
    }

    let mut preimage_hash = [0u8; 32];
    preimage_hash.copy_from_slice(&cov_data[0..32]);
    let lock_mode = cov_data[32];
    let lock_value = u64::from_le_bytes(cov_data[33..41].try_into().unwrap());
    let mut claim_key_id = [0u8; 32];
    claim_key_id.copy_from_slice(&cov_data[41..73]);
    let mut refund_key_id = [0u8; 32];
    refund_key_id.copy_from_slice(&cov_data[73..105]);

    if lock_mode != LOCK_MODE_HEIGHT && lock_mode != LOCK_MODE_TIMESTAMP {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_HTLC lock_mode invalid",
        ));
    }
    if lock_value == 0 {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_HTLC lock_value must be > 0",
        ));
    }
    if claim_key_id == refund_key_id {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_HTLC claim/refund key_id must differ",
        ));
    }

    Ok(HtlcCovenant {
        preimage_hash,
        lock_mode,
        lock_value,
        claim_key_id,
        refund_key_id,
    })
}

fn satisfy_lock(
    lock_mode: u8,
    lock_value: u64,
    block_height: u64,
    block_mtp: u64,
) -> Result<(), TxError> {
    let satisfied = match lock_mode {
        LOCK_MODE_HEIGHT => block_height >= lock_value,
        LOCK_MODE_TIMESTAMP => block_mtp >= lock_value,
        _ => return Err(TxError::new(ErrorCode::TxErrCovenantInvalid, "lock_mode")),
    };
    if satisfied {
        Ok(())
    } else {
        Err(TxError::new(
            ErrorCode::TxErrTimelockNotMet,
            "HTLC lock not met",
        ))
    }
}

fn check_sig_binding_and_verify(
    provider: &dyn CryptoProvider,
    sig_item: &WitnessItem,
    expected_key_id: &[u8; 32],
    digest: &[u8; 32],
    deployments: &DeploymentView,
    context: &'static str,
) -> Result<(), TxError> {
    if sig_item.suite_id == SUITE_ID_SENTINEL {
        return Err(TxError::new(ErrorCode::TxErrSigAlgInvalid, context));
    }
    if compute_key_id(provider, &sig_item.pubkey)? != *expected_key_id {
        return Err(TxError::new(ErrorCode::TxErrSigInvalid, context));
    }
    check_suite_gate(sig_item.suite_id, deployments)?;
    let ok = verify_sig(
        provider,
        sig_item.suite_id,
        &sig_item.pubkey,
        &sig_item.signature,
        digest,
    )?;
    if !ok {
        return Err(TxError::new(ErrorCode::TxErrSigInvalid, context));
    }
    Ok(())
}

/// Legacy HTLC spend: `path_item` is the sentinel selector
/// (pubkey = selected key_id, signature = path payload), `sig_item` the
/// signature witness.
#[allow(clippy::too_many_arguments)]
pub(crate) fn validate_htlc_spend(
    provider: &dyn CryptoProvider,
    entry: &UtxoEntry,
    path_item: &WitnessItem,
    sig_item: &WitnessItem,
    digest: &[u8; 32],
    block_height: u64,
    block_mtp: u64,
    deployments: &DeploymentView,
) -> Result<(), TxError> {
    let cov = parse_htlc_covenant_data(&entry.covenant_data)?;

    if path_item.suite_id != SUITE_ID_SENTINEL || path_item.pubkey.len() != 32 {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "CORE_HTLC selector invalid",
        ));
    }
    if path_item.signature.is_empty() {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "CORE_HTLC selector payload too short",
        ));
    }

    let mut selector_key_id = [0u8; 32];
    selector_key_id.copy_from_slice(&path_item.pubkey);

    let expected_key_id = match path_item.signature[0] {
        0x00 => {
            // Claim path: payload carries the preimage.
            if selector_key_id != cov.claim_key_id {
                return Err(TxError::new(
                    ErrorCode::TxErrSigInvalid,
                    "CORE_HTLC claim key_id mismatch",
                ));
            }
            if path_item.signature.len() < 3 {
                return Err(TxError::new(
                    ErrorCode::TxErrParse,
                    "CORE_HTLC claim payload too short",
                ));
            }
            let pre_len =
                u16::from_le_bytes(path_item.signature[1..3].try_into().unwrap()) as usize;
            if pre_len == 0 || pre_len as u64 > MAX_HTLC_PREIMAGE_BYTES {
                return Err(TxError::new(
                    ErrorCode::TxErrParse,
                    "CORE_HTLC preimage length out of range",
                ));
            }
            if path_item.signature.len() != 3 + pre_len {
                return Err(TxError::new(
                    ErrorCode::TxErrParse,
                    "CORE_HTLC claim payload length mismatch",
                ));
            }
            let preimage = &path_item.signature[3..];
            if sha3(provider, preimage)? != cov.preimage_hash {
                return Err(TxError::new(
                    ErrorCode::TxErrSigInvalid,
                    "CORE_HTLC claim preimage hash mismatch",
                ));
            }
            cov.claim_key_id
        }
        0x01 => {
            // Refund path: lock must be satisfied.
            if selector_key_id != cov.refund_key_id {
                return Err(TxError::new(
                    ErrorCode::TxErrSigInvalid,
                    "CORE_HTLC refund key_id mismatch",
                ));
            }
            if path_item.signature.len() != 1 {
                return Err(TxError::new(
                    ErrorCode::TxErrParse,
                    "CORE_HTLC refund payload length mismatch",
                ));
            }
            satisfy_lock(cov.lock_mode, cov.lock_value, block_height, block_mtp)?;
            cov.refund_key_id
        }
        _ => {
            return Err(TxError::new(
                ErrorCode::TxErrParse,
                "CORE_HTLC unknown spend path",
            ));
        }
    };

    check_sig_binding_and_verify(
        provider,
        sig_item,
        &expected_key_id,
        digest,
        deployments,
        "CORE_HTLC",
    )
}

/// The matching-anchor set M: CORE_ANCHOR outputs of exactly 54 bytes whose
/// payload starts with the preimage envelope prefix. Non-matching anchors
/// never affect |M|.
fn matching_anchors<'a>(tx: &'a Tx) -> Vec<&'a [u8]> {
    let mut m = Vec::new();
    for out in &tx.outputs {
        if out.covenant_type != COV_TYPE_ANCHOR {
            continue;
        }
        if out.covenant_data.len() != HTLC_V2_ANCHOR_ENVELOPE_BYTES {
            continue;
        }
        if &out.covenant_data[..HTLC_V2_ANCHOR_PREFIX.len()] != HTLC_V2_ANCHOR_PREFIX {
            continue;
        }
        m.push(out.covenant_data.as_slice());
    }
    m
}

/// HTLC_V2 spend: `selector` must be the keyless sentinel; the path is the
/// matching-anchor set of the spending transaction.
#[allow(clippy::too_many_arguments)]
pub(crate) fn validate_htlc_v2_spend(
    provider: &dyn CryptoProvider,
    entry: &UtxoEntry,
    tx: &Tx,
    selector: &WitnessItem,
    sig_item: &WitnessItem,
    digest: &[u8; 32],
    block_height: u64,
    block_mtp: u64,
    deployments: &DeploymentView,
) -> Result<(), TxError> {
    let cov = parse_htlc_covenant_data(&entry.covenant_data)?;

    if !selector.is_keyless_sentinel() {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "CORE_HTLC_V2 selector must be keyless sentinel",
        ));
    }

    let m = matching_anchors(tx);
    match m.len() {
        0 => {
            // Refund path.
            satisfy_lock(cov.lock_mode, cov.lock_value, block_height, block_mtp)?;
            check_sig_binding_and_verify(
                provider,
                sig_item,
                &cov.refund_key_id,
                digest,
                deployments,
                "CORE_HTLC_V2",
            )
        }
        1 => {
            // Claim path: preimage is the envelope suffix.
            let preimage = &m[0][HTLC_V2_ANCHOR_PREFIX.len()..];
            if sha3(provider, preimage)? != cov.preimage_hash {
                return Err(TxError::new(
                    ErrorCode::TxErrSigInvalid,
                    "CORE_HTLC_V2 preimage hash mismatch",
                ));
            }
            check_sig_binding_and_verify(
                provider,
                sig_item,
                &cov.claim_key_id,
                digest,
                deployments,
                "CORE_HTLC_V2",
            )
        }
        _ => Err(TxError::new(
            ErrorCode::TxErrParse,
            "CORE_HTLC_V2 ambiguous anchor set",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HTLC_V2_ANCHOR_PREFIX;

    fn cov_data(
        preimage_hash: [u8; 32],
        lock_mode: u8,
        lock_value: u64,
        claim: [u8; 32],
        refund: [u8; 32],
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(HTLC_COVENANT_DATA_BYTES);
        out.extend_from_slice(&preimage_hash);
        out.push(lock_mode);
        out.extend_from_slice(&lock_value.to_le_bytes());
        out.extend_from_slice(&claim);
        out.extend_from_slice(&refund);
        out
    }

    #[test]
    fn parse_rejects_equal_keys_and_bad_mode() {
        let d = cov_data([1; 32], LOCK_MODE_HEIGHT, 10, [2; 32], [2; 32]);
        assert!(parse_htlc_covenant_data(&d).is_err());

        let d = cov_data([1; 32], 0x05, 10, [2; 32], [3; 32]);
        assert!(parse_htlc_covenant_data(&d).is_err());

        let d = cov_data([1; 32], LOCK_MODE_HEIGHT, 0, [2; 32], [3; 32]);
        assert!(parse_htlc_covenant_data(&d).is_err());
    }

    #[test]
    fn parse_accepts_canonical() {
        let d = cov_data([1; 32], LOCK_MODE_TIMESTAMP, 99, [2; 32], [3; 32]);
        let cov = parse_htlc_covenant_data(&d).expect("parse");
        assert_eq!(cov.lock_value, 99);
        assert_eq!(cov.claim_key_id, [2; 32]);
    }

    #[test]
    fn anchor_envelope_prefix_is_22_bytes() {
        assert_eq!(HTLC_V2_ANCHOR_PREFIX.len(), 22);
        assert_eq!(HTLC_V2_ANCHOR_ENVELOPE_BYTES, 22 + 32);
    }
}
