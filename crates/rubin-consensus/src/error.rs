use core::fmt;

/// Stable rejection tokens. The token string is the wire/RPC contract; the
/// enum exists so Rust code cannot misspell one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    TxErrParse,
    TxErrCompactSizeNonMinimal,
    TxErrMissingUtxo,
    TxErrDoubleSpend,
    TxErrCoinbaseImmature,
    TxErrReplay,
    TxErrValueConservation,
    TxErrCovenantInvalid,
    TxErrSigAlgInvalid,
    TxErrSigInvalid,
    TxErrWitnessMismatch,
    TxErrTimelockNotMet,
    TxErrDeploymentInactive,

    BlockErrParse,
    BlockErrPowInvalid,
    BlockErrTargetInvalid,
    BlockErrMerkleInvalid,
    BlockErrWitnessCommitmentInvalid,
    BlockErrTimestampOld,
    BlockErrTimestampFuture,
    BlockErrWeightExceeded,
    BlockErrDaBatchExceeded,
    BlockErrDaPayloadCommitInvalid,
    BlockErrCoinbaseInvalid,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::TxErrParse => "TX_ERR_PARSE",
            ErrorCode::TxErrCompactSizeNonMinimal => "TX_ERR_COMPACTSIZE_NONMINIMAL",
            ErrorCode::TxErrMissingUtxo => "TX_ERR_MISSING_UTXO",
            ErrorCode::TxErrDoubleSpend => "TX_ERR_DOUBLE_SPEND",
            ErrorCode::TxErrCoinbaseImmature => "TX_ERR_COINBASE_IMMATURE",
            ErrorCode::TxErrReplay => "TX_ERR_REPLAY",
            ErrorCode::TxErrValueConservation => "TX_ERR_VALUE_CONSERVATION",
            ErrorCode::TxErrCovenantInvalid => "TX_ERR_COVENANT_INVALID",
            ErrorCode::TxErrSigAlgInvalid => "TX_ERR_SIG_ALG_INVALID",
            ErrorCode::TxErrSigInvalid => "TX_ERR_SIG_INVALID",
            ErrorCode::TxErrWitnessMismatch => "TX_ERR_WITNESS_MISMATCH",
            ErrorCode::TxErrTimelockNotMet => "TX_ERR_TIMELOCK_NOT_MET",
            ErrorCode::TxErrDeploymentInactive => "TX_ERR_DEPLOYMENT_INACTIVE",

            ErrorCode::BlockErrParse => "BLOCK_ERR_PARSE",
            ErrorCode::BlockErrPowInvalid => "BLOCK_ERR_POW_INVALID",
            ErrorCode::BlockErrTargetInvalid => "BLOCK_ERR_TARGET_INVALID",
            ErrorCode::BlockErrMerkleInvalid => "BLOCK_ERR_MERKLE_INVALID",
            ErrorCode::BlockErrWitnessCommitmentInvalid => "BLOCK_ERR_WITNESS_COMMITMENT_INVALID",
            ErrorCode::BlockErrTimestampOld => "BLOCK_ERR_TIMESTAMP_OLD",
            ErrorCode::BlockErrTimestampFuture => "BLOCK_ERR_TIMESTAMP_FUTURE",
            ErrorCode::BlockErrWeightExceeded => "BLOCK_ERR_WEIGHT_EXCEEDED",
            ErrorCode::BlockErrDaBatchExceeded => "BLOCK_ERR_DA_BATCH_EXCEEDED",
            ErrorCode::BlockErrDaPayloadCommitInvalid => "BLOCK_ERR_DA_PAYLOAD_COMMIT_INVALID",
            ErrorCode::BlockErrCoinbaseInvalid => "BLOCK_ERR_COINBASE_INVALID",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxError {
    pub code: ErrorCode,
    pub msg: &'static str,
}

impl TxError {
    pub fn new(code: ErrorCode, msg: &'static str) -> Self {
        Self { code, msg }
    }
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.msg.is_empty() {
            write!(f, "{}", self.code.as_str())
        } else {
            write!(f, "{}: {}", self.code.as_str(), self.msg)
        }
    }
}

impl std::error::Error for TxError {}
