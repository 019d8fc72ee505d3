//! Reorganisation: disconnect the current side with undo records, connect
//! the candidate side, commit the manifest once at the end. A failed
//! candidate connect rolls the chain forward to the original tip.

use tracing::{info, warn};

use rubin_consensus::{parse_block_bytes, TxError};

use crate::error::StoreError;
use crate::pipeline::{Chain, ImportResult};

impl Chain<'_> {
    /// Lowest common ancestor of two indexed blocks, by walking prev links.
    pub(crate) fn find_fork_point(
        &self,
        old_tip: &[u8; 32],
        new_tip: &[u8; 32],
    ) -> Result<[u8; 32], StoreError> {
        let get_index = |hash: &[u8; 32]| {
            self.store.get_block_index(hash)?.ok_or_else(|| {
                StoreError::Reorg(format!("missing index entry: {}", hex::encode(hash)))
            })
        };

        let mut a = *old_tip;
        let mut b = *new_tip;
        let mut a_idx = get_index(&a)?;
        let mut b_idx = get_index(&b)?;

        while a_idx.height > b_idx.height {
            a = a_idx.prev_hash;
            a_idx = get_index(&a)?;
        }
        while b_idx.height > a_idx.height {
            b = b_idx.prev_hash;
            b_idx = get_index(&b)?;
        }
        while a != b {
            a = a_idx.prev_hash;
            b = b_idx.prev_hash;
            a_idx = get_index(&a)?;
            b_idx = get_index(&b)?;
        }
        Ok(a)
    }

    /// Revert one block's UTXO and nonce effects using its undo record.
    /// The block stays VALID in the index; it is merely off the active
    /// chain now.
    fn disconnect_block(&mut self, block_hash: &[u8; 32]) -> Result<(), StoreError> {
        let undo = self.store.get_undo(block_hash)?.ok_or_else(|| {
            StoreError::Reorg(format!("missing undo record: {}", hex::encode(block_hash)))
        })?;
        let block_bytes = self.store.get_block_bytes(block_hash)?.ok_or_else(|| {
            StoreError::Reorg(format!("missing block bytes: {}", hex::encode(block_hash)))
        })?;
        let pb = parse_block_bytes(self.provider, &block_bytes)
            .map_err(|e| StoreError::Reorg(format!("stored block unparseable: {e}")))?;

        let wb = self.store.begin_write()?;
        for outpoint in &undo.created {
            wb.delete_utxo(outpoint)?;
        }
        for item in &undo.spent {
            wb.put_utxo(&item.outpoint, &item.restored_entry)?;
        }
        for tx in pb.txs.iter().skip(1) {
            wb.delete_nonce(tx.tx_nonce)?;
        }
        wb.commit()?;
        Ok(())
    }

    fn connect_stored_block(&mut self, hash: &[u8; 32]) -> Result<Result<(), TxError>, StoreError> {
        let block_bytes = self.store.get_block_bytes(hash)?.ok_or_else(|| {
            StoreError::Reorg(format!("missing block bytes: {}", hex::encode(hash)))
        })?;
        let pb = parse_block_bytes(self.provider, &block_bytes)
            .map_err(|e| StoreError::Reorg(format!("stored block unparseable: {e}")))?;
        let idx = self.store.get_block_index(hash)?.ok_or_else(|| {
            StoreError::Reorg(format!("missing index entry: {}", hex::encode(hash)))
        })?;
        let work = idx.cumulative_work.clone();
        self.connect_block(hash, &pb, idx.height, &work)
    }

    /// Walk back from `tip` to `fork_point` (exclusive), newest first.
    fn path_to_fork(
        &self,
        tip: &[u8; 32],
        fork_point: &[u8; 32],
    ) -> Result<Vec<[u8; 32]>, StoreError> {
        let mut path = Vec::new();
        let mut cursor = *tip;
        while cursor != *fork_point {
            path.push(cursor);
            let idx = self.store.get_block_index(&cursor)?.ok_or_else(|| {
                StoreError::Reorg(format!("missing index entry: {}", hex::encode(cursor)))
            })?;
            cursor = idx.prev_hash;
        }
        Ok(path)
    }

    /// Switch the active chain to `new_tip_hash`. The manifest is written
    /// exactly once, after the winning side is fully connected.
    pub(crate) fn execute_reorg(
        &mut self,
        new_tip_hash: &[u8; 32],
    ) -> Result<ImportResult, StoreError> {
        let manifest = self
            .manifest
            .as_ref()
            .ok_or_else(|| StoreError::Reorg("reorg without a tip".into()))?;
        let old_tip = manifest.tip_hash()?;
        let old_height = manifest.tip_height;
        let old_work = manifest.tip_cumulative_work()?;

        let fork_point = self.find_fork_point(&old_tip, new_tip_hash)?;
        let disconnect_hashes = self.path_to_fork(&old_tip, &fork_point)?;
        let mut connect_hashes = self.path_to_fork(new_tip_hash, &fork_point)?;
        connect_hashes.reverse();

        info!(
            disconnect = disconnect_hashes.len(),
            connect = connect_hashes.len(),
            fork = %hex::encode(fork_point),
            "reorg start"
        );

        for hash in &disconnect_hashes {
            self.disconnect_block(hash)?;
        }

        let mut connected: Vec<[u8; 32]> = Vec::new();
        let mut failure: Option<([u8; 32], TxError)> = None;
        for hash in &connect_hashes {
            match self.connect_stored_block(hash)? {
                Ok(()) => connected.push(*hash),
                Err(e) => {
                    failure = Some((*hash, e));
                    break;
                }
            }
        }

        if let Some((bad_hash, error)) = failure {
            warn!(
                hash = %hex::encode(bad_hash),
                code = error.code.as_str(),
                "reorg candidate failed; rolling back"
            );
            // Unwind the partial candidate side, then re-connect the
            // original side from its stored blocks (all previously VALID).
            for hash in connected.iter().rev() {
                self.disconnect_block(hash)?;
            }
            for hash in disconnect_hashes.iter().rev() {
                match self.connect_stored_block(hash)? {
                    Ok(()) => {}
                    Err(e) => {
                        return Err(StoreError::Reorg(format!(
                            "rollback re-connect failed for {}: {e}",
                            hex::encode(hash)
                        )));
                    }
                }
            }
            // The original tip never stopped being the manifest tip; write
            // it again only to refresh last_applied fields.
            self.commit_manifest(&old_tip, old_height, &old_work)?;
            return Ok(ImportResult::Rejected {
                block_hash: bad_hash,
                error,
            });
        }

        let new_idx = self.store.get_block_index(new_tip_hash)?.ok_or_else(|| {
            StoreError::Reorg(format!("missing index entry: {}", hex::encode(new_tip_hash)))
        })?;
        self.commit_manifest(new_tip_hash, new_idx.height, &new_idx.cumulative_work)?;
        info!(
            height = new_idx.height,
            hash = %hex::encode(new_tip_hash),
            "reorg complete"
        );
        Ok(ImportResult::AcceptedNewTip {
            block_hash: *new_tip_hash,
            height: new_idx.height,
        })
    }
}
