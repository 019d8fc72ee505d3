//! Read-only snapshot view over the committed store, handed to consensus
//! validation. Readers never observe a partially applied block: everything
//! here reads through point lookups against the last committed write
//! transaction.

use rubin_consensus::{ChainView, Outpoint, UtxoEntry};
use tracing::error;

use crate::db::Store;

pub struct StoreView<'a> {
    pub store: &'a Store,
}

impl ChainView for StoreView<'_> {
    fn utxo(&self, outpoint: &Outpoint) -> Option<UtxoEntry> {
        match self.store.get_utxo(outpoint) {
            Ok(v) => v,
            Err(e) => {
                // A read failure mid-validation cannot be distinguished from
                // a missing entry through this interface; surface it loudly
                // and fail the lookup.
                error!("utxo read failed: {e}");
                None
            }
        }
    }

    fn nonce_seen(&self, tx_nonce: u64) -> bool {
        match self.store.nonce_seen(tx_nonce) {
            Ok(v) => v,
            Err(e) => {
                error!("nonce read failed: {e}");
                false
            }
        }
    }
}
