//! Block import pipeline (Stages 0–5).
//!
//! Stage 0 decode, Stage 1 context-free header checks, Stage 2 ancestry
//! classification, Stage 3 fork choice, Stage 4 body validation against the
//! parent-ending snapshot, Stage 5 atomic persist with the manifest rename
//! as the single commit point.

use std::fs;
use std::path::{Path, PathBuf};

use num_bigint::BigUint;
use tracing::{info, warn};

use rubin_consensus::{
    already_generated_at, apply_block, block_hash, parse_block_bytes, pow_check, work_from_target,
    BlockContext, BlockHeader, ChainProfile, ErrorCode, ParsedBlock, TxError,
};
use rubin_crypto::CryptoProvider;

use crate::db::Store;
use crate::deploy::derive_deployment_view;
use crate::error::StoreError;
use crate::keys::{BlockIndexEntry, BlockStatus, UndoEntry, UndoRecord};
use crate::manifest::Manifest;
use crate::view::StoreView;

#[derive(Clone, Debug)]
pub enum ImportResult {
    AcceptedNewTip {
        block_hash: [u8; 32],
        height: u64,
    },
    StoredNotSelected {
        block_hash: [u8; 32],
        height: u64,
    },
    Orphaned {
        block_hash: [u8; 32],
    },
    Rejected {
        block_hash: [u8; 32],
        error: TxError,
    },
}

/// One chain instance: store, manifest and profile, driven by a single
/// logical writer.
pub struct Chain<'a> {
    pub(crate) store: Store,
    pub(crate) manifest: Option<Manifest>,
    pub(crate) manifest_path: PathBuf,
    pub(crate) profile: ChainProfile,
    pub(crate) provider: &'a dyn CryptoProvider,
    /// Wall clock supplied per import for the future-drift bound; None in
    /// replay contexts.
    pub local_time: Option<u64>,
}

impl<'a> Chain<'a> {
    /// Open (or create) the chain-specific subdirectory
    /// `datadir/chains/<chain_id_hex>/` with its store and manifest.
    pub fn open(
        datadir: &Path,
        profile: ChainProfile,
        provider: &'a dyn CryptoProvider,
    ) -> Result<Self, StoreError> {
        let chain_dir = datadir
            .join("chains")
            .join(hex::encode(profile.chain_id));
        fs::create_dir_all(&chain_dir)?;

        let store = Store::open(&chain_dir.join("store.redb"))?;
        let manifest_path = Manifest::path_in(&chain_dir);
        let manifest = if manifest_path.exists() {
            Some(Manifest::load(&manifest_path)?)
        } else {
            None
        };

        Ok(Self {
            store,
            manifest,
            manifest_path,
            profile,
            provider,
            local_time: None,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn profile(&self) -> &ChainProfile {
        &self.profile
    }

    pub fn tip(&self) -> Option<([u8; 32], u64)> {
        let m = self.manifest.as_ref()?;
        let hash = m.tip_hash().ok()?;
        Some((hash, m.tip_height))
    }

    /// Apply a candidate block if it extends the best chain.
    pub fn import_block(&mut self, block_bytes: &[u8]) -> Result<ImportResult, StoreError> {
        // ── Stage 0: decode ─────────────────────────────────────────────
        let pb = match parse_block_bytes(self.provider, block_bytes) {
            Ok(pb) => pb,
            Err(e) => {
                warn!(code = e.code.as_str(), "block parse rejected");
                return Ok(ImportResult::Rejected {
                    block_hash: [0u8; 32],
                    error: e,
                });
            }
        };
        let hash = block_hash(self.provider, &pb.header_bytes)?;

        if let Some(idx) = self.store.get_block_index(&hash)? {
            if idx.status == BlockStatus::Valid || idx.status == BlockStatus::Unknown {
                return Ok(ImportResult::StoredNotSelected {
                    block_hash: hash,
                    height: idx.height,
                });
            }
            if idx.status.is_invalid() {
                return Ok(ImportResult::Rejected {
                    block_hash: hash,
                    error: TxError::new(ErrorCode::BlockErrParse, "block already marked invalid"),
                });
            }
            // Orphaned blocks fall through and retry ancestry below.
        }

        // ── Stage 1: context-free header checks ─────────────────────────
        if let Err(e) = pow_check(&hash, &pb.header.target, &self.profile.pow_limit) {
            self.put_index(
                &hash,
                &BlockIndexEntry {
                    height: 0,
                    prev_hash: pb.header.prev_block_hash,
                    cumulative_work: BigUint::from(0u32),
                    status: BlockStatus::InvalidHeader,
                },
            )?;
            return Ok(ImportResult::Rejected {
                block_hash: hash,
                error: e,
            });
        }

        // Persist header and body early; validity is tracked in the index.
        {
            let wb = self.store.begin_write()?;
            wb.put_header(&hash, &pb.header_bytes)?;
            wb.put_block_bytes(&hash, block_bytes)?;
            wb.commit()?;
        }

        // ── Stage 2: ancestry classification ────────────────────────────
        let parent_hash = pb.header.prev_block_hash;
        let is_genesis = parent_hash == [0u8; 32];

        let (height, parent_work) = if is_genesis {
            (0u64, BigUint::from(0u32))
        } else {
            match self.store.get_block_index(&parent_hash)? {
                None => {
                    self.put_index(
                        &hash,
                        &BlockIndexEntry {
                            height: 0,
                            prev_hash: parent_hash,
                            cumulative_work: BigUint::from(0u32),
                            status: BlockStatus::Orphaned,
                        },
                    )?;
                    return Ok(ImportResult::Orphaned { block_hash: hash });
                }
                Some(parent_idx) => {
                    if parent_idx.status.is_invalid() {
                        self.put_index(
                            &hash,
                            &BlockIndexEntry {
                                height: parent_idx.height + 1,
                                prev_hash: parent_hash,
                                cumulative_work: BigUint::from(0u32),
                                status: BlockStatus::InvalidAncestry,
                            },
                        )?;
                        return Ok(ImportResult::Rejected {
                            block_hash: hash,
                            error: TxError::new(ErrorCode::BlockErrParse, "invalid ancestry"),
                        });
                    }
                    if parent_idx.status == BlockStatus::Orphaned {
                        self.put_index(
                            &hash,
                            &BlockIndexEntry {
                                height: 0,
                                prev_hash: parent_hash,
                                cumulative_work: BigUint::from(0u32),
                                status: BlockStatus::Orphaned,
                            },
                        )?;
                        return Ok(ImportResult::Orphaned { block_hash: hash });
                    }
                    (parent_idx.height + 1, parent_idx.cumulative_work)
                }
            }
        };

        let this_work = work_from_target(&pb.header.target, &self.profile.pow_limit)?;
        let cumulative_work = parent_work + this_work;

        // ── Stage 3: fork choice ────────────────────────────────────────
        let is_best = match &self.manifest {
            None => is_genesis,
            Some(m) => {
                let tip_work = m.tip_cumulative_work()?;
                let tip_hash = m.tip_hash()?;
                cumulative_work > tip_work
                    || (cumulative_work == tip_work && hash < tip_hash)
            }
        };

        self.put_index(
            &hash,
            &BlockIndexEntry {
                height,
                prev_hash: parent_hash,
                cumulative_work: cumulative_work.clone(),
                status: BlockStatus::Unknown,
            },
        )?;

        if !is_best {
            return Ok(ImportResult::StoredNotSelected {
                block_hash: hash,
                height,
            });
        }

        // ── Direct connect vs reorg ─────────────────────────────────────
        let current_tip = self.manifest.as_ref().map(|m| m.tip_hash()).transpose()?;
        if let Some(tip) = current_tip {
            if tip != parent_hash {
                return self.execute_reorg(&hash);
            }
        }

        // ── Stage 4 + 5: validate, persist, commit manifest ─────────────
        match self.connect_block(&hash, &pb, height, &cumulative_work)? {
            Ok(()) => {
                self.commit_manifest(&hash, height, &cumulative_work)?;
                info!(height, hash = %hex::encode(hash), "accepted new tip");
                Ok(ImportResult::AcceptedNewTip {
                    block_hash: hash,
                    height,
                })
            }
            Err(e) => {
                warn!(height, code = e.code.as_str(), "block body rejected");
                Ok(ImportResult::Rejected {
                    block_hash: hash,
                    error: e,
                })
            }
        }
    }

    /// Stage 4 (body validation) + Stage 5 (atomic batch persist), without
    /// the manifest write. Consensus rejections come back as `Ok(Err(_))`
    /// so reorg can roll back; infrastructure failures are `Err(_)`.
    pub(crate) fn connect_block(
        &mut self,
        hash: &[u8; 32],
        pb: &ParsedBlock,
        height: u64,
        cumulative_work: &BigUint,
    ) -> Result<Result<(), TxError>, StoreError> {
        let parent = if height == 0 {
            None
        } else {
            Some(pb.header.prev_block_hash)
        };

        let ancestor_headers = self.load_ancestor_headers(parent.as_ref(), height)?;
        let deployments =
            derive_deployment_view(&self.store, &self.profile, parent.as_ref(), height)?;
        let already_generated = already_generated_at(&self.profile.subsidy, height);

        let ctx = BlockContext {
            height,
            ancestor_headers,
            local_time: self.local_time,
            already_generated,
            deployments,
        };

        let view = StoreView { store: &self.store };
        let apply = match apply_block(self.provider, &self.profile, &view, pb, &ctx) {
            Ok(apply) => apply,
            Err(e) => {
                self.put_index(
                    hash,
                    &BlockIndexEntry {
                        height,
                        prev_hash: pb.header.prev_block_hash,
                        cumulative_work: cumulative_work.clone(),
                        status: BlockStatus::InvalidBody,
                    },
                )?;
                return Ok(Err(e));
            }
        };

        let undo = UndoRecord {
            spent: apply
                .spent
                .iter()
                .map(|(outpoint, restored_entry)| UndoEntry {
                    outpoint: outpoint.clone(),
                    restored_entry: restored_entry.clone(),
                })
                .collect(),
            created: apply.created.iter().map(|(op, _)| op.clone()).collect(),
        };

        let wb = self.store.begin_write()?;
        wb.put_undo(hash, &undo)?;
        for (outpoint, _) in &apply.spent {
            wb.delete_utxo(outpoint)?;
        }
        for (outpoint, entry) in &apply.created {
            wb.put_utxo(outpoint, entry)?;
        }
        for (nonce, txid) in apply.tx_nonces.iter().zip(pb.txids.iter().skip(1)) {
            wb.put_nonce(*nonce, txid)?;
        }
        wb.put_block_index(
            hash,
            &BlockIndexEntry {
                height,
                prev_hash: pb.header.prev_block_hash,
                cumulative_work: cumulative_work.clone(),
                status: BlockStatus::Valid,
            },
        )?;
        wb.commit()?;

        Ok(Ok(()))
    }

    pub(crate) fn commit_manifest(
        &mut self,
        tip_hash: &[u8; 32],
        height: u64,
        cumulative_work: &BigUint,
    ) -> Result<(), StoreError> {
        match &mut self.manifest {
            Some(m) => m.update_tip(tip_hash, height, cumulative_work),
            None => {
                self.manifest = Some(Manifest::new(
                    &self.profile.chain_id,
                    tip_hash,
                    height,
                    cumulative_work,
                ));
            }
        }
        self.manifest
            .as_ref()
            .expect("manifest just set")
            .save_atomic(&self.manifest_path)
    }

    /// Ancestor headers ordered oldest to newest, parent last: enough for
    /// MTP always, and a full window when `height` is a retarget boundary.
    pub(crate) fn load_ancestor_headers(
        &self,
        parent_hash: Option<&[u8; 32]>,
        height: u64,
    ) -> Result<Vec<BlockHeader>, StoreError> {
        let Some(parent_hash) = parent_hash else {
            return Ok(Vec::new());
        };

        let mut needed = 11u64;
        if height > 0 && height % self.profile.window_size == 0 {
            needed = needed.max(self.profile.window_size);
        }
        let needed = needed.min(height) as usize;

        let mut headers = Vec::with_capacity(needed);
        let mut cursor = *parent_hash;
        for _ in 0..needed {
            let h = self.store.get_header(&cursor)?.ok_or_else(|| {
                StoreError::Db("missing ancestor header".into())
            })?;
            let prev = h.prev_block_hash;
            headers.push(h);
            cursor = prev;
        }
        headers.reverse();
        Ok(headers)
    }

    pub(crate) fn put_index(
        &self,
        hash: &[u8; 32],
        entry: &BlockIndexEntry,
    ) -> Result<(), StoreError> {
        let wb = self.store.begin_write()?;
        wb.put_block_index(hash, entry)?;
        wb.commit()
    }
}
