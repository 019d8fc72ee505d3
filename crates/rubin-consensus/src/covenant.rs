//! Output-side covenant rules and per-covenant witness slot counts.

use crate::constants::*;
use crate::error::{ErrorCode, TxError};
use crate::ext::{ext_witness_slots, parse_ext_covenant_data};
use crate::htlc::parse_htlc_covenant_data;
use crate::tx::Tx;
use crate::validate::DeploymentView;
use crate::vault::{parse_multisig_covenant_data, parse_vault_covenant_data};

/// Structural rules for every output a transaction creates, applied to
/// coinbase and non-coinbase alike.
pub fn validate_tx_output_covenants(tx: &Tx, deployments: &DeploymentView) -> Result<(), TxError> {
    for out in &tx.outputs {
        match out.covenant_type {
            COV_TYPE_P2PK => {
                if out.value == 0 {
                    return Err(TxError::new(
                        ErrorCode::TxErrCovenantInvalid,
                        "CORE_P2PK value must be > 0",
                    ));
                }
                if out.covenant_data.len() != P2PK_COVENANT_DATA_BYTES {
                    return Err(TxError::new(
                        ErrorCode::TxErrCovenantInvalid,
                        "invalid CORE_P2PK covenant_data length",
                    ));
                }
                let suite_id = out.covenant_data[0];
                if suite_id != SUITE_ID_ML_DSA_87 && suite_id != SUITE_ID_SLH_DSA_SHAKE_256F {
                    return Err(TxError::new(
                        ErrorCode::TxErrCovenantInvalid,
                        "invalid CORE_P2PK suite_id",
                    ));
                }
                if suite_id == SUITE_ID_SLH_DSA_SHAKE_256F && !deployments.slh_dsa_p2pk_active {
                    return Err(TxError::new(
                        ErrorCode::TxErrDeploymentInactive,
                        "CORE_P2PK SLH-DSA suite inactive",
                    ));
                }
            }
            COV_TYPE_ANCHOR => {
                if out.value != 0 {
                    return Err(TxError::new(
                        ErrorCode::TxErrCovenantInvalid,
                        "CORE_ANCHOR value must be 0",
                    ));
                }
                let len = out.covenant_data.len();
                if len == 0 || len > MAX_ANCHOR_PAYLOAD_SIZE {
                    return Err(TxError::new(
                        ErrorCode::TxErrCovenantInvalid,
                        "invalid CORE_ANCHOR payload length",
                    ));
                }
            }
            COV_TYPE_VAULT => {
                if out.value == 0 {
                    return Err(TxError::new(
                        ErrorCode::TxErrCovenantInvalid,
                        "CORE_VAULT value must be > 0",
                    ));
                }
                parse_vault_covenant_data(&out.covenant_data)?;
            }
            COV_TYPE_MULTISIG => {
                if out.value == 0 {
                    return Err(TxError::new(
                        ErrorCode::TxErrCovenantInvalid,
                        "CORE_MULTISIG value must be > 0",
                    ));
                }
                parse_multisig_covenant_data(&out.covenant_data)?;
            }
            COV_TYPE_HTLC | COV_TYPE_HTLC_V2 => {
                if out.value == 0 {
                    return Err(TxError::new(
                        ErrorCode::TxErrCovenantInvalid,
                        "CORE_HTLC value must be > 0",
                    ));
                }
                parse_htlc_covenant_data(&out.covenant_data)?;
            }
            COV_TYPE_EXT => {
                if out.value == 0 {
                    return Err(TxError::new(
                        ErrorCode::TxErrCovenantInvalid,
                        "CORE_EXT value must be > 0",
                    ));
                }
                parse_ext_covenant_data(&out.covenant_data)?;
            }
            COV_TYPE_RESERVED_0102 => {
                return Err(TxError::new(
                    ErrorCode::TxErrCovenantInvalid,
                    "reserved covenant_type",
                ));
            }
            _ => {
                return Err(TxError::new(
                    ErrorCode::TxErrCovenantInvalid,
                    "unknown covenant_type",
                ));
            }
        }
    }

    Ok(())
}

/// Witness slots a spend of this covenant consumes from the tx-level cursor.
///
/// P2PK: 1. MULTISIG: threshold. VAULT: threshold + leading sentinel
/// selector. HTLC/HTLC_V2: selector + signature. EXT: 0 before activation,
/// 1 after. ANCHOR entries never exist in the UTXO set.
pub fn witness_slots(
    covenant_type: u16,
    covenant_data: &[u8],
    deployments: &DeploymentView,
) -> Result<usize, TxError> {
    match covenant_type {
        COV_TYPE_P2PK => Ok(1),
        COV_TYPE_MULTISIG => {
            let m = parse_multisig_covenant_data(covenant_data)?;
            Ok(m.threshold as usize)
        }
        COV_TYPE_VAULT => {
            let v = parse_vault_covenant_data(covenant_data)?;
            Ok(v.threshold as usize + 1)
        }
        COV_TYPE_HTLC | COV_TYPE_HTLC_V2 => Ok(2),
        COV_TYPE_EXT => ext_witness_slots(covenant_data, deployments),
        _ => Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "unsupported covenant in witness_slots",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::TxOutput;

    fn tx_with_output(out: TxOutput) -> Tx {
        Tx {
            version: TX_WIRE_VERSION,
            tx_kind: TX_KIND_STANDARD,
            tx_nonce: 1,
            inputs: vec![crate::tx::TxInput {
                prev_txid: [1; 32],
                prev_vout: 0,
                script_sig: Vec::new(),
                sequence: 0,
            }],
            outputs: vec![out],
            locktime: 0,
            witness: Vec::new(),
            da_payload: Vec::new(),
        }
    }

    #[test]
    fn anchor_must_be_zero_valued_and_bounded() {
        let deployments = DeploymentView::default();

        let tx = tx_with_output(TxOutput {
            value: 1,
            covenant_type: COV_TYPE_ANCHOR,
            covenant_data: vec![0u8; 10],
        });
        assert!(validate_tx_output_covenants(&tx, &deployments).is_err());

        let tx = tx_with_output(TxOutput {
            value: 0,
            covenant_type: COV_TYPE_ANCHOR,
            covenant_data: Vec::new(),
        });
        assert!(validate_tx_output_covenants(&tx, &deployments).is_err());

        let tx = tx_with_output(TxOutput {
            value: 0,
            covenant_type: COV_TYPE_ANCHOR,
            covenant_data: vec![0u8; 8_192],
        });
        validate_tx_output_covenants(&tx, &deployments).expect("8 KiB anchor is consensus-valid");
    }

    #[test]
    fn reserved_0102_rejects() {
        let tx = tx_with_output(TxOutput {
            value: 5,
            covenant_type: COV_TYPE_RESERVED_0102,
            covenant_data: Vec::new(),
        });
        let err = validate_tx_output_covenants(&tx, &DeploymentView::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrCovenantInvalid);
    }

    #[test]
    fn slh_p2pk_output_gated_by_deployment() {
        let mut cov = vec![SUITE_ID_SLH_DSA_SHAKE_256F];
        cov.extend_from_slice(&[0u8; 32]);
        let tx = tx_with_output(TxOutput {
            value: 5,
            covenant_type: COV_TYPE_P2PK,
            covenant_data: cov,
        });

        let err = validate_tx_output_covenants(&tx, &DeploymentView::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrDeploymentInactive);

        let active = DeploymentView {
            slh_dsa_p2pk_active: true,
            active_ext_ids: Vec::new(),
        };
        validate_tx_output_covenants(&tx, &active).expect("active deployment accepts");
    }

    #[test]
    fn slot_counts_per_covenant() {
        let deployments = DeploymentView::default();
        assert_eq!(
            witness_slots(COV_TYPE_P2PK, &[0u8; 33], &deployments).unwrap(),
            1
        );
        assert_eq!(
            witness_slots(COV_TYPE_HTLC_V2, &[0u8; 105], &deployments).unwrap(),
            2
        );

        let mut ms = vec![3u8, 4u8];
        for i in 0..4u8 {
            ms.extend_from_slice(&[i + 1; 32]);
        }
        assert_eq!(
            witness_slots(COV_TYPE_MULTISIG, &ms, &deployments).unwrap(),
            3
        );
    }
}
