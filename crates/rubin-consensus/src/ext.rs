//! CORE_EXT: deployment-gated extension covenant.
//!
//! Until the deployment carrying an ext_id reaches ACTIVE, outputs of that
//! id are spendable by anyone with zero witness slots (the keyless sentinel
//! rule; consensus does not block pre-activation spends, policy layers do).
//! Once ACTIVE, a spend consumes one native-suite witness item that must
//! verify over the sighash digest.

use rubin_crypto::CryptoProvider;

use crate::compactsize::compact_size_decode;
use crate::constants::{SUITE_ID_ML_DSA_87, SUITE_ID_SENTINEL, SUITE_ID_SLH_DSA_SHAKE_256F};
use crate::error::{ErrorCode, TxError};
use crate::spend::{check_suite_gate, verify_sig};
use crate::tx::WitnessItem;
use crate::utxo::UtxoEntry;
use crate::validate::DeploymentView;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtCovenant<'a> {
    pub ext_id: u16,
    pub ext_payload: &'a [u8],
}

/// Layout: ext_id_le(2) || CompactSize(payload_len) || payload, exact.
pub fn parse_ext_covenant_data(cov_data: &[u8]) -> Result<ExtCovenant<'_>, TxError> {
    if cov_data.len() < 3 {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_EXT covenant_data too short",
        ));
    }
    let ext_id = u16::from_le_bytes(cov_data[0..2].try_into().unwrap());

    let (payload_len, varint_bytes) = compact_size_decode(&cov_data[2..]).map_err(|_| {
        TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_EXT ext_payload_len invalid",
        )
    })?;
    let payload_start = 2 + varint_bytes;
    let expected_len = payload_start
        .checked_add(payload_len as usize)
        .ok_or_else(|| {
            TxError::new(ErrorCode::TxErrCovenantInvalid, "CORE_EXT length overflow")
        })?;
    if cov_data.len() != expected_len {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_EXT covenant_data length mismatch",
        ));
    }

    Ok(ExtCovenant {
        ext_id,
        ext_payload: &cov_data[payload_start..],
    })
}

/// Witness slots an EXT input consumes at the current deployment state.
pub(crate) fn ext_witness_slots(
    cov_data: &[u8],
    deployments: &DeploymentView,
) -> Result<usize, TxError> {
    let cov = parse_ext_covenant_data(cov_data)?;
    Ok(if deployments.ext_active(cov.ext_id) { 1 } else { 0 })
}

pub(crate) fn validate_ext_spend(
    provider: &dyn CryptoProvider,
    entry: &UtxoEntry,
    assigned: &[WitnessItem],
    digest: &[u8; 32],
    deployments: &DeploymentView,
) -> Result<(), TxError> {
    let cov = parse_ext_covenant_data(&entry.covenant_data)?;

    if !deployments.ext_active(cov.ext_id) {
        // Keyless sentinel rule: no witness consumed, anyone can spend.
        if !assigned.is_empty() {
            return Err(TxError::new(
                ErrorCode::TxErrWitnessMismatch,
                "CORE_EXT pre-activation consumes no witness",
            ));
        }
        return Ok(());
    }

    let w = assigned.first().ok_or_else(|| {
        TxError::new(
            ErrorCode::TxErrWitnessMismatch,
            "CORE_EXT missing witness item",
        )
    })?;
    match w.suite_id {
        SUITE_ID_SENTINEL => Err(TxError::new(
            ErrorCode::TxErrSigAlgInvalid,
            "CORE_EXT sentinel forbidden once active",
        )),
        SUITE_ID_ML_DSA_87 | SUITE_ID_SLH_DSA_SHAKE_256F => {
            check_suite_gate(w.suite_id, deployments)?;
            let ok = verify_sig(provider, w.suite_id, &w.pubkey, &w.signature, digest)?;
            if !ok {
                return Err(TxError::new(
                    ErrorCode::TxErrSigInvalid,
                    "CORE_EXT signature invalid",
                ));
            }
            Ok(())
        }
        _ => Err(TxError::new(
            ErrorCode::TxErrSigAlgInvalid,
            "CORE_EXT unknown suite",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compactsize::encode_compact_size;

    fn ext_cov(ext_id: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&ext_id.to_le_bytes());
        encode_compact_size(payload.len() as u64, &mut out);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn parse_roundtrip_and_exact_length() {
        let data = ext_cov(7, b"payload");
        let cov = parse_ext_covenant_data(&data).expect("parse");
        assert_eq!(cov.ext_id, 7);
        assert_eq!(cov.ext_payload, b"payload");

        let mut bad = data.clone();
        bad.push(0x00);
        assert!(parse_ext_covenant_data(&bad).is_err());
    }

    #[test]
    fn slots_follow_activation() {
        let data = ext_cov(7, b"");
        let inactive = DeploymentView::default();
        assert_eq!(ext_witness_slots(&data, &inactive).unwrap(), 0);

        let active = DeploymentView {
            slh_dsa_p2pk_active: false,
            active_ext_ids: vec![7],
        };
        assert_eq!(ext_witness_slots(&data, &active).unwrap(), 1);
    }
}
