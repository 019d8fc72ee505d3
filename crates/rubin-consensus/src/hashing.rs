use rubin_crypto::CryptoProvider;

use crate::error::{ErrorCode, TxError};

/// Route a SHA3-256 computation through the provider, mapping provider
/// failures (shim load/ABI errors) onto a parse-family token.
pub(crate) fn sha3(provider: &dyn CryptoProvider, input: &[u8]) -> Result<[u8; 32], TxError> {
    provider
        .sha3_256(input)
        .map_err(|_| TxError::new(ErrorCode::TxErrParse, "crypto provider sha3 failure"))
}
