use rubin_consensus::{ErrorCode, TxError};

#[test]
fn error_code_as_str_covers_all_variants() {
    // Intentionally list every variant: this keeps ErrorCode::as_str()
    // coverage high and guards against accidental renames/typos in the
    // stable wire tokens.
    let cases: &[(ErrorCode, &str)] = &[
        (ErrorCode::TxErrParse, "TX_ERR_PARSE"),
        (
            ErrorCode::TxErrCompactSizeNonMinimal,
            "TX_ERR_COMPACTSIZE_NONMINIMAL",
        ),
        (ErrorCode::TxErrMissingUtxo, "TX_ERR_MISSING_UTXO"),
        (ErrorCode::TxErrDoubleSpend, "TX_ERR_DOUBLE_SPEND"),
        (ErrorCode::TxErrCoinbaseImmature, "TX_ERR_COINBASE_IMMATURE"),
        (ErrorCode::TxErrReplay, "TX_ERR_REPLAY"),
        (
            ErrorCode::TxErrValueConservation,
            "TX_ERR_VALUE_CONSERVATION",
        ),
        (ErrorCode::TxErrCovenantInvalid, "TX_ERR_COVENANT_INVALID"),
        (ErrorCode::TxErrSigAlgInvalid, "TX_ERR_SIG_ALG_INVALID"),
        (ErrorCode::TxErrSigInvalid, "TX_ERR_SIG_INVALID"),
        (ErrorCode::TxErrWitnessMismatch, "TX_ERR_WITNESS_MISMATCH"),
        (ErrorCode::TxErrTimelockNotMet, "TX_ERR_TIMELOCK_NOT_MET"),
        (
            ErrorCode::TxErrDeploymentInactive,
            "TX_ERR_DEPLOYMENT_INACTIVE",
        ),
        (ErrorCode::BlockErrParse, "BLOCK_ERR_PARSE"),
        (ErrorCode::BlockErrPowInvalid, "BLOCK_ERR_POW_INVALID"),
        (ErrorCode::BlockErrTargetInvalid, "BLOCK_ERR_TARGET_INVALID"),
        (ErrorCode::BlockErrMerkleInvalid, "BLOCK_ERR_MERKLE_INVALID"),
        (
            ErrorCode::BlockErrWitnessCommitmentInvalid,
            "BLOCK_ERR_WITNESS_COMMITMENT_INVALID",
        ),
        (ErrorCode::BlockErrTimestampOld, "BLOCK_ERR_TIMESTAMP_OLD"),
        (
            ErrorCode::BlockErrTimestampFuture,
            "BLOCK_ERR_TIMESTAMP_FUTURE",
        ),
        (
            ErrorCode::BlockErrWeightExceeded,
            "BLOCK_ERR_WEIGHT_EXCEEDED",
        ),
        (
            ErrorCode::BlockErrDaBatchExceeded,
            "BLOCK_ERR_DA_BATCH_EXCEEDED",
        ),
        (
            ErrorCode::BlockErrDaPayloadCommitInvalid,
            "BLOCK_ERR_DA_PAYLOAD_COMMIT_INVALID",
        ),
        (
            ErrorCode::BlockErrCoinbaseInvalid,
            "BLOCK_ERR_COINBASE_INVALID",
        ),
    ];

    for (code, want) in cases {
        assert_eq!(code.as_str(), *want);
    }
}

#[test]
fn tx_error_display() {
    let e = TxError::new(ErrorCode::TxErrParse, "");
    assert_eq!(e.to_string(), "TX_ERR_PARSE");
    let e2 = TxError::new(ErrorCode::TxErrParse, "bad");
    assert_eq!(e2.to_string(), "TX_ERR_PARSE: bad");
}
