//! Signature-bearing spend checks shared by P2PK, MULTISIG and VAULT.
//!
//! Check order inside each helper is fixed: suite/deployment gate, then
//! key binding, then signature verification. The gate must fire before any
//! provider verify call is reached.

use rubin_crypto::CryptoProvider;

use crate::constants::{
    P2PK_COVENANT_DATA_BYTES, SUITE_ID_ML_DSA_87, SUITE_ID_SENTINEL, SUITE_ID_SLH_DSA_SHAKE_256F,
};
use crate::error::{ErrorCode, TxError};
use crate::hashing::sha3;
use crate::tx::WitnessItem;
use crate::utxo::UtxoEntry;
use crate::validate::DeploymentView;

pub(crate) fn compute_key_id(
    provider: &dyn CryptoProvider,
    pubkey: &[u8],
) -> Result<[u8; 32], TxError> {
    sha3(provider, pubkey)
}

/// Dispatch one verify call through the provider. Witness item lengths are
/// canonical by parse, so a `false` here is a cryptographic rejection.
pub(crate) fn verify_sig(
    provider: &dyn CryptoProvider,
    suite_id: u8,
    pubkey: &[u8],
    signature: &[u8],
    digest32: &[u8; 32],
) -> Result<bool, TxError> {
    match suite_id {
        SUITE_ID_ML_DSA_87 => provider
            .verify_mldsa87(pubkey, signature, digest32)
            .map_err(|_| TxError::new(ErrorCode::TxErrSigInvalid, "provider verify failure")),
        SUITE_ID_SLH_DSA_SHAKE_256F => provider
            .verify_slhdsa_shake_256f(pubkey, signature, digest32)
            .map_err(|_| TxError::new(ErrorCode::TxErrSigInvalid, "provider verify failure")),
        _ => Err(TxError::new(
            ErrorCode::TxErrSigAlgInvalid,
            "verify_sig: unsupported suite_id",
        )),
    }
}

/// Deployment gate for a witness item's suite. Fails before any verify call.
pub(crate) fn check_suite_gate(
    suite_id: u8,
    deployments: &DeploymentView,
) -> Result<(), TxError> {
    if suite_id == SUITE_ID_SLH_DSA_SHAKE_256F && !deployments.slh_dsa_p2pk_active {
        return Err(TxError::new(
            ErrorCode::TxErrSigAlgInvalid,
            "SLH-DSA suite inactive",
        ));
    }
    Ok(())
}

pub(crate) fn validate_p2pk_spend(
    provider: &dyn CryptoProvider,
    entry: &UtxoEntry,
    w: &WitnessItem,
    digest: &[u8; 32],
    deployments: &DeploymentView,
) -> Result<(), TxError> {
    if entry.covenant_data.len() != P2PK_COVENANT_DATA_BYTES {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_P2PK covenant_data invalid",
        ));
    }
    if w.suite_id != SUITE_ID_ML_DSA_87 && w.suite_id != SUITE_ID_SLH_DSA_SHAKE_256F {
        return Err(TxError::new(
            ErrorCode::TxErrSigAlgInvalid,
            "CORE_P2PK suite invalid",
        ));
    }
    if entry.covenant_data[0] != w.suite_id {
        return Err(TxError::new(
            ErrorCode::TxErrSigInvalid,
            "CORE_P2PK suite binding mismatch",
        ));
    }
    let mut key_id = [0u8; 32];
    key_id.copy_from_slice(&entry.covenant_data[1..33]);
    if compute_key_id(provider, &w.pubkey)? != key_id {
        return Err(TxError::new(
            ErrorCode::TxErrSigInvalid,
            "CORE_P2PK key binding mismatch",
        ));
    }

    check_suite_gate(w.suite_id, deployments)?;

    let ok = verify_sig(provider, w.suite_id, &w.pubkey, &w.signature, digest)?;
    if !ok {
        return Err(TxError::new(
            ErrorCode::TxErrSigInvalid,
            "CORE_P2PK signature invalid",
        ));
    }
    Ok(())
}

/// Threshold spend over a sorted key-id set: exactly `threshold` witness
/// items, each binding to a distinct key at a strictly ascending position,
/// each verifying over the shared digest.
pub(crate) fn validate_threshold_sig_spend(
    provider: &dyn CryptoProvider,
    keys: &[[u8; 32]],
    threshold: u8,
    ws: &[WitnessItem],
    digest: &[u8; 32],
    deployments: &DeploymentView,
    context: &'static str,
) -> Result<(), TxError> {
    if ws.len() != threshold as usize {
        return Err(TxError::new(
            ErrorCode::TxErrWitnessMismatch,
            "threshold witness slot count mismatch",
        ));
    }

    let mut next_key = 0usize;
    for w in ws {
        if w.suite_id == SUITE_ID_SENTINEL {
            return Err(TxError::new(ErrorCode::TxErrSigAlgInvalid, context));
        }
        check_suite_gate(w.suite_id, deployments)?;

        let key_id = compute_key_id(provider, &w.pubkey)?;
        let pos = keys[next_key..]
            .iter()
            .position(|k| *k == key_id)
            .ok_or_else(|| TxError::new(ErrorCode::TxErrSigInvalid, context))?;
        next_key += pos + 1;

        let ok = verify_sig(provider, w.suite_id, &w.pubkey, &w.signature, digest)?;
        if !ok {
            return Err(TxError::new(ErrorCode::TxErrSigInvalid, context));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{COV_TYPE_P2PK, ML_DSA_87_PUBKEY_BYTES, ML_DSA_87_SIG_BYTES};

    /// Real SHA3; a signature verifies iff every byte is 0xAA.
    struct MockProvider;

    const GOOD_SIG_BYTE: u8 = 0xaa;

    impl CryptoProvider for MockProvider {
        fn sha3_256(&self, input: &[u8]) -> Result<[u8; 32], String> {
            use sha3::Digest;
            let mut h = sha3::Sha3_256::new();
            h.update(input);
            let out = h.finalize();
            let mut r = [0u8; 32];
            r.copy_from_slice(&out);
            Ok(r)
        }
        fn verify_mldsa87(&self, _: &[u8], sig: &[u8], _: &[u8; 32]) -> Result<bool, String> {
            Ok(sig.iter().all(|&b| b == GOOD_SIG_BYTE))
        }
        fn verify_slhdsa_shake_256f(&self, _: &[u8], sig: &[u8], _: &[u8; 32]) -> Result<bool, String> {
            Ok(sig.iter().all(|&b| b == GOOD_SIG_BYTE))
        }
    }

    fn ml_item(pubkey_fill: u8, sig_fill: u8) -> WitnessItem {
        WitnessItem {
            suite_id: SUITE_ID_ML_DSA_87,
            pubkey: vec![pubkey_fill; ML_DSA_87_PUBKEY_BYTES as usize],
            signature: vec![sig_fill; ML_DSA_87_SIG_BYTES as usize],
        }
    }

    fn p2pk_entry(p: &MockProvider, pubkey: &[u8]) -> UtxoEntry {
        let key_id = p.sha3_256(pubkey).unwrap();
        let mut cov = vec![SUITE_ID_ML_DSA_87];
        cov.extend_from_slice(&key_id);
        UtxoEntry {
            value: 100,
            covenant_type: COV_TYPE_P2PK,
            covenant_data: cov,
            creation_height: 0,
            created_by_coinbase: false,
        }
    }

    #[test]
    fn p2pk_accepts_bound_valid_signature() {
        let p = MockProvider;
        let w = ml_item(0x11, GOOD_SIG_BYTE);
        let entry = p2pk_entry(&p, &w.pubkey);
        validate_p2pk_spend(&p, &entry, &w, &[0u8; 32], &DeploymentView::default())
            .expect("valid spend");
    }

    #[test]
    fn p2pk_rejects_wrong_key_then_bad_sig() {
        let p = MockProvider;
        let w = ml_item(0x11, GOOD_SIG_BYTE);
        let entry = p2pk_entry(&p, &[0x22; ML_DSA_87_PUBKEY_BYTES as usize]);
        let err = validate_p2pk_spend(&p, &entry, &w, &[0u8; 32], &DeploymentView::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrSigInvalid);

        let w = ml_item(0x11, 0x00);
        let entry = p2pk_entry(&p, &w.pubkey);
        let err = validate_p2pk_spend(&p, &entry, &w, &[0u8; 32], &DeploymentView::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrSigInvalid);
    }

    #[test]
    fn threshold_enforces_ascending_distinct_keys() {
        let p = MockProvider;
        let w1 = ml_item(0x01, GOOD_SIG_BYTE);
        let w2 = ml_item(0x02, GOOD_SIG_BYTE);
        let k1 = p.sha3_256(&w1.pubkey).unwrap();
        let k2 = p.sha3_256(&w2.pubkey).unwrap();
        let mut keys = vec![k1, k2];
        keys.sort();

        // Items in key order pass.
        let (first, second) = if keys[0] == k1 {
            (w1.clone(), w2.clone())
        } else {
            (w2.clone(), w1.clone())
        };
        validate_threshold_sig_spend(
            &p,
            &keys,
            2,
            &[first.clone(), second.clone()],
            &[0u8; 32],
            &DeploymentView::default(),
            "ctx",
        )
        .expect("ordered items pass");

        // Reversed order violates ascending positional matching.
        let err = validate_threshold_sig_spend(
            &p,
            &keys,
            2,
            &[second, first.clone()],
            &[0u8; 32],
            &DeploymentView::default(),
            "ctx",
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrSigInvalid);

        // The same key cannot satisfy two slots.
        let err = validate_threshold_sig_spend(
            &p,
            &keys,
            2,
            &[first.clone(), first],
            &[0u8; 32],
            &DeploymentView::default(),
            "ctx",
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrSigInvalid);
    }

    #[test]
    fn threshold_gates_slh_before_verifying() {
        let p = MockProvider;
        let w = WitnessItem {
            suite_id: SUITE_ID_SLH_DSA_SHAKE_256F,
            pubkey: vec![0x01; 64],
            signature: vec![GOOD_SIG_BYTE; 49_856],
        };
        let key = p.sha3_256(&w.pubkey).unwrap();
        let err = validate_threshold_sig_spend(
            &p,
            &[key],
            1,
            &[w],
            &[0u8; 32],
            &DeploymentView::default(),
            "ctx",
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrSigAlgInvalid);
    }
}
