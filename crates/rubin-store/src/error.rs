use rubin_consensus::TxError;
use thiserror::Error;

/// Storage-layer failures. Consensus rejections pass through unchanged so
/// their stable token survives to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage: {0}")]
    Db(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec: {0}")]
    Codec(String),

    #[error(transparent)]
    Consensus(#[from] TxError),

    #[error("manifest: {0}")]
    Manifest(String),

    #[error("reorg: {0}")]
    Reorg(String),
}
