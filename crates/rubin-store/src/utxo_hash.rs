//! Chainstate snapshot hash for cross-client verification.
//!
//! SHA3-256 over the concatenation of `outpoint_key || utxo_entry_bytes`
//! pairs in lexicographic outpoint-key order. The stored value bytes are
//! already the canonical entry encoding, and redb iterates keys in byte
//! order, so the table streams straight into the preimage.

use rubin_crypto::CryptoProvider;

use crate::db::Store;
use crate::error::StoreError;

pub fn chainstate_snapshot_hash(
    store: &Store,
    provider: &dyn CryptoProvider,
) -> Result<[u8; 32], StoreError> {
    let mut preimage: Vec<u8> = Vec::new();
    store.iter_utxos(|key_bytes, value_bytes| {
        preimage.extend_from_slice(key_bytes);
        preimage.extend_from_slice(value_bytes);
    })?;

    provider
        .sha3_256(&preimage)
        .map_err(|e| StoreError::Db(format!("provider sha3: {e}")))
}
