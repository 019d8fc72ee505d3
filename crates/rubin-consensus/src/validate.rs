//! Transaction and block validation against a read-only chain view.
//!
//! The chain-state engine hands validation a snapshot (`ChainView`) plus a
//! derived deployment view; validation never mutates committed state. A
//! successful block application returns the ordered state deltas
//! (`BlockApply`) the storage layer persists and can later undo.
//!
//! Per-input check order is fixed and first-fail-wins: structural parse,
//! UTXO lookup, coinbase maturity, covenant binding, deployment gate,
//! covenant evaluation (with witness cursor advance), signature
//! verification; value conservation is aggregated at transaction end.

use std::collections::{HashMap, HashSet};

use rubin_crypto::CryptoProvider;

use crate::block::{block_hash, BlockHeader, ParsedBlock};
use crate::compactsize::compact_size_len;
use crate::constants::*;
use crate::covenant::{validate_tx_output_covenants, witness_slots};
use crate::error::{ErrorCode, TxError};
use crate::ext::validate_ext_spend;
use crate::hashing::sha3;
use crate::htlc::{validate_htlc_spend, validate_htlc_v2_spend};
use crate::merkle::{merkle_root_txids, witness_commitment_hash, witness_merkle_root_wtxids};
use crate::pow::{check_target_range, expected_target, pow_check};
use crate::profile::ChainProfile;
use crate::sighash::sighash_v1_digest;
use crate::spend::{validate_p2pk_spend, validate_threshold_sig_spend};
use crate::subsidy::block_subsidy;
use crate::tx::Tx;
use crate::utxo::{Outpoint, UtxoEntry};
use crate::vault::{
    hash_in_sorted_32, output_descriptor_bytes, parse_multisig_covenant_data,
    parse_vault_covenant_data,
};

/// Deployment states relevant to validation, derived by the chain-state
/// engine from the VERSION_BITS FSM over the ancestor chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeploymentView {
    pub slh_dsa_p2pk_active: bool,
    /// CORE_EXT ids whose deployments are ACTIVE.
    pub active_ext_ids: Vec<u16>,
}

impl DeploymentView {
    pub fn ext_active(&self, ext_id: u16) -> bool {
        self.active_ext_ids.contains(&ext_id)
    }
}

/// Read-only snapshot of committed chain state.
pub trait ChainView {
    fn utxo(&self, outpoint: &Outpoint) -> Option<UtxoEntry>;
    /// Replay protection: has this tx_nonce been used by any transaction
    /// already on the chain?
    fn nonce_seen(&self, tx_nonce: u64) -> bool;
}

/// In-memory view for tests and stateless tools.
pub struct MemoryView<'a> {
    pub utxos: &'a HashMap<Outpoint, UtxoEntry>,
    pub nonces: &'a HashSet<u64>,
}

impl ChainView for MemoryView<'_> {
    fn utxo(&self, outpoint: &Outpoint) -> Option<UtxoEntry> {
        self.utxos.get(outpoint).cloned()
    }
    fn nonce_seen(&self, tx_nonce: u64) -> bool {
        self.nonces.contains(&tx_nonce)
    }
}

/// Per-block working set layered over the committed snapshot. Records the
/// ordered deltas that become the undo record: entries spent from the
/// committed set in consumption order, entries surviving to commit in
/// production order. Outputs created and spent within the same block touch
/// neither list.
struct UtxoOverlay<'a> {
    base: &'a dyn ChainView,
    added: HashMap<Outpoint, UtxoEntry>,
    added_order: Vec<Outpoint>,
    spent_base: Vec<(Outpoint, UtxoEntry)>,
    spent_set: HashSet<Outpoint>,
}

impl<'a> UtxoOverlay<'a> {
    fn new(base: &'a dyn ChainView) -> Self {
        Self {
            base,
            added: HashMap::new(),
            added_order: Vec::new(),
            spent_base: Vec::new(),
            spent_set: HashSet::new(),
        }
    }

    fn get(&self, op: &Outpoint) -> Option<UtxoEntry> {
        if self.spent_set.contains(op) {
            return None;
        }
        if let Some(e) = self.added.get(op) {
            return Some(e.clone());
        }
        self.base.utxo(op)
    }

    fn spend(&mut self, op: &Outpoint, entry: UtxoEntry) {
        if self.added.remove(op).is_none() {
            self.spent_base.push((op.clone(), entry));
            self.spent_set.insert(op.clone());
        }
    }

    fn add(&mut self, op: Outpoint, entry: UtxoEntry) {
        self.added_order.push(op.clone());
        self.added.insert(op, entry);
    }

    fn into_deltas(self) -> (Vec<(Outpoint, UtxoEntry)>, Vec<(Outpoint, UtxoEntry)>) {
        let UtxoOverlay {
            mut added,
            added_order,
            spent_base,
            ..
        } = self;
        let mut created = Vec::with_capacity(added.len());
        for op in added_order {
            if let Some(entry) = added.remove(&op) {
                created.push((op, entry));
            }
        }
        (spent_base, created)
    }
}

/// Context the chain-state engine supplies for one block application.
#[derive(Clone, Debug)]
pub struct BlockContext {
    pub height: u64,
    /// Ordered oldest to newest, parent last. At least min(height, 11)
    /// headers; a full window when `height` is a retarget boundary.
    pub ancestor_headers: Vec<BlockHeader>,
    /// Wall clock for the future-drift bound; None in replay contexts.
    pub local_time: Option<u64>,
    /// Subsidy generated by heights 1..height.
    pub already_generated: u64,
    pub deployments: DeploymentView,
}

/// Ordered state deltas of a fully validated block.
#[derive(Clone, Debug)]
pub struct BlockApply {
    pub block_hash: [u8; 32],
    pub spent: Vec<(Outpoint, UtxoEntry)>,
    pub created: Vec<(Outpoint, UtxoEntry)>,
    /// Nonces consumed by this block's non-coinbase transactions, in block
    /// order.
    pub tx_nonces: Vec<u64>,
    pub sum_fees: u64,
    pub sum_weight: u64,
    pub sum_da_bytes: u64,
    pub subsidy: u64,
}

fn cadd(a: u64, b: u64) -> Result<u64, TxError> {
    a.checked_add(b)
        .ok_or_else(|| TxError::new(ErrorCode::TxErrParse, "u64 overflow"))
}

/// Weight and DA accounting for one transaction.
///
/// weight = 4*base + witness + da_section + sig_cost. DA bytes are the
/// payload plus every anchor output's covenant bytes.
pub fn tx_weight_and_da(tx: &Tx) -> Result<(u64, u64), TxError> {
    let mut base: u64 = 4 + 1 + 8; // version + tx_kind + tx_nonce
    base = cadd(base, compact_size_len(tx.inputs.len() as u64))?;
    for i in &tx.inputs {
        base = cadd(base, 32 + 4 + 4)?;
        base = cadd(base, compact_size_len(i.script_sig.len() as u64))?;
        base = cadd(base, i.script_sig.len() as u64)?;
    }
    base = cadd(base, compact_size_len(tx.outputs.len() as u64))?;
    let mut anchor_bytes: u64 = 0;
    for o in &tx.outputs {
        let cov_len = o.covenant_data.len() as u64;
        base = cadd(base, 8 + 2)?;
        base = cadd(base, compact_size_len(cov_len))?;
        base = cadd(base, cov_len)?;
        if o.covenant_type == COV_TYPE_ANCHOR {
            anchor_bytes = cadd(anchor_bytes, cov_len)?;
        }
    }
    base = cadd(base, 4)?; // locktime

    let mut witness_size: u64 = compact_size_len(tx.witness.len() as u64);
    let mut sig_cost: u64 = 0;
    for w in &tx.witness {
        witness_size = cadd(witness_size, 1)?;
        witness_size = cadd(witness_size, compact_size_len(w.pubkey.len() as u64))?;
        witness_size = cadd(witness_size, w.pubkey.len() as u64)?;
        witness_size = cadd(witness_size, compact_size_len(w.signature.len() as u64))?;
        witness_size = cadd(witness_size, w.signature.len() as u64)?;
        match w.suite_id {
            SUITE_ID_ML_DSA_87 => sig_cost = cadd(sig_cost, VERIFY_COST_ML_DSA)?,
            SUITE_ID_SLH_DSA_SHAKE_256F => sig_cost = cadd(sig_cost, VERIFY_COST_SLH_DSA)?,
            _ => {}
        }
    }

    let da_len = tx.da_payload.len() as u64;
    let da_size = cadd(compact_size_len(da_len), da_len)?;

    let weight = WITNESS_DISCOUNT_DIVISOR
        .checked_mul(base)
        .and_then(|v| v.checked_add(witness_size))
        .and_then(|v| v.checked_add(da_size))
        .and_then(|v| v.checked_add(sig_cost))
        .ok_or_else(|| TxError::new(ErrorCode::TxErrParse, "weight overflow"))?;

    let da_bytes = cadd(da_len, anchor_bytes)?;
    Ok((weight, da_bytes))
}

pub fn is_coinbase_shape(tx: &Tx) -> bool {
    if tx.tx_kind != TX_KIND_STANDARD
        || tx.tx_nonce != 0
        || tx.inputs.len() != 1
        || !tx.witness.is_empty()
        || !tx.da_payload.is_empty()
    {
        return false;
    }
    let input = &tx.inputs[0];
    input.prev_txid == [0u8; 32]
        && input.prev_vout == TX_COINBASE_PREVOUT_VOUT
        && input.script_sig.is_empty()
        && input.sequence == TX_COINBASE_SEQUENCE
}

fn validate_coinbase_structure(tx: &Tx, height: u64) -> Result<(), TxError> {
    if !is_coinbase_shape(tx) {
        return Err(TxError::new(
            ErrorCode::BlockErrCoinbaseInvalid,
            "first tx is not canonical coinbase",
        ));
    }
    let expected_locktime = u32::try_from(height).map_err(|_| {
        TxError::new(ErrorCode::BlockErrCoinbaseInvalid, "height out of range")
    })?;
    if tx.locktime != expected_locktime {
        return Err(TxError::new(
            ErrorCode::BlockErrCoinbaseInvalid,
            "coinbase locktime must equal block height",
        ));
    }
    Ok(())
}

/// Median-time-past: median of the last min(height, 11) ancestor timestamps.
pub fn median_time_past(ancestors: &[BlockHeader], height: u64) -> Result<u64, TxError> {
    let k = height.min(11) as usize;
    if k == 0 || ancestors.len() < k {
        return Err(TxError::new(
            ErrorCode::BlockErrParse,
            "insufficient ancestor headers for MTP",
        ));
    }
    let mut window: Vec<u64> = ancestors[ancestors.len() - k..]
        .iter()
        .map(|h| h.timestamp)
        .collect();
    window.sort_unstable();
    Ok(window[(window.len() - 1) / 2])
}

/// Validate one non-coinbase transaction against a snapshot and return its
/// fee. Convenience wrapper over the block path for tools and tests.
#[allow(clippy::too_many_arguments)]
pub fn validate_tx(
    provider: &dyn CryptoProvider,
    profile: &ChainProfile,
    view: &dyn ChainView,
    tx: &Tx,
    txid: [u8; 32],
    height: u64,
    block_mtp: u64,
    deployments: &DeploymentView,
) -> Result<u64, TxError> {
    let mut overlay = UtxoOverlay::new(view);
    apply_tx_with_overlay(
        provider,
        profile,
        &mut overlay,
        tx,
        txid,
        height,
        block_mtp,
        deployments,
    )
}

#[allow(clippy::too_many_arguments)]
fn apply_tx_with_overlay(
    provider: &dyn CryptoProvider,
    profile: &ChainProfile,
    overlay: &mut UtxoOverlay<'_>,
    tx: &Tx,
    txid: [u8; 32],
    height: u64,
    block_mtp: u64,
    deployments: &DeploymentView,
) -> Result<u64, TxError> {
    // ① structural rules beyond the parser.
    if is_coinbase_shape(tx) {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "coinbase shape forbidden outside block position 0",
        ));
    }
    validate_tx_output_covenants(tx, deployments)?;

    struct VaultSpendCtx {
        input_index: usize,
        owner_lock_id: [u8; 32],
        whitelist: Vec<[u8; 32]>,
    }

    let mut vault_spend: Option<VaultSpendCtx> = None;
    let mut input_lock_ids: Vec<[u8; 32]> = Vec::with_capacity(tx.inputs.len());
    let mut seen_inputs: HashSet<Outpoint> = HashSet::with_capacity(tx.inputs.len());
    let mut cursor = 0usize;
    let mut sum_in: u128 = 0;

    for (input_index, input) in tx.inputs.iter().enumerate() {
        let op = Outpoint {
            txid: input.prev_txid,
            vout: input.prev_vout,
        };
        if input.prev_txid == [0u8; 32] && input.prev_vout == TX_COINBASE_PREVOUT_VOUT {
            return Err(TxError::new(
                ErrorCode::TxErrParse,
                "null prevout forbidden in non-coinbase",
            ));
        }
        if !seen_inputs.insert(op.clone()) {
            return Err(TxError::new(
                ErrorCode::TxErrDoubleSpend,
                "duplicate input outpoint",
            ));
        }

        // ② UTXO lookup. Anchors never enter the set, so spends of them
        // fail here with the same token as any unknown outpoint.
        let entry = overlay
            .get(&op)
            .ok_or_else(|| TxError::new(ErrorCode::TxErrMissingUtxo, "utxo not found"))?;

        // ③ coinbase maturity.
        if entry.created_by_coinbase {
            let mature_at = entry
                .creation_height
                .checked_add(profile.coinbase_maturity)
                .ok_or_else(|| TxError::new(ErrorCode::TxErrParse, "maturity overflow"))?;
            if height < mature_at {
                return Err(TxError::new(
                    ErrorCode::TxErrCoinbaseImmature,
                    "coinbase immature",
                ));
            }
        }

        // ④–⑦ covenant binding, deployment gate, evaluation, signatures.
        // Slot count comes from the spent covenant; the cursor advances
        // exactly that much whether or not the covenant carries crypto.
        let slots = witness_slots(entry.covenant_type, &entry.covenant_data, deployments)?;
        if cursor + slots > tx.witness.len() {
            return Err(TxError::new(
                ErrorCode::TxErrWitnessMismatch,
                "witness underflow",
            ));
        }
        let assigned = &tx.witness[cursor..cursor + slots];

        let digest = sighash_v1_digest(
            provider,
            &profile.chain_id,
            tx,
            input_index as u32,
            entry.value,
        )?;

        // script_sig only carries the optional HTLC key-id binding; every
        // other covenant requires it empty.
        if entry.covenant_type != COV_TYPE_HTLC && !input.script_sig.is_empty() {
            return Err(TxError::new(
                ErrorCode::TxErrParse,
                "script_sig must be empty for this covenant",
            ));
        }

        match entry.covenant_type {
            COV_TYPE_P2PK => {
                validate_p2pk_spend(provider, &entry, &assigned[0], &digest, deployments)?;
            }
            COV_TYPE_MULTISIG => {
                let m = parse_multisig_covenant_data(&entry.covenant_data)?;
                validate_threshold_sig_spend(
                    provider,
                    &m.keys,
                    m.threshold,
                    assigned,
                    &digest,
                    deployments,
                    "CORE_MULTISIG",
                )?;
            }
            COV_TYPE_VAULT => {
                if vault_spend.is_some() {
                    return Err(TxError::new(
                        ErrorCode::TxErrCovenantInvalid,
                        "multiple CORE_VAULT inputs forbidden",
                    ));
                }
                let v = parse_vault_covenant_data(&entry.covenant_data)?;
                if !assigned[0].is_keyless_sentinel() {
                    return Err(TxError::new(
                        ErrorCode::TxErrCovenantInvalid,
                        "CORE_VAULT selector must be keyless sentinel",
                    ));
                }
                if let Some(delay) = v.spend_delay {
                    let unlock_height = entry
                        .creation_height
                        .checked_add(delay)
                        .ok_or_else(|| {
                            TxError::new(ErrorCode::TxErrParse, "vault spend_delay overflow")
                        })?;
                    if height < unlock_height {
                        return Err(TxError::new(
                            ErrorCode::TxErrTimelockNotMet,
                            "CORE_VAULT spend_delay not met",
                        ));
                    }
                }
                validate_threshold_sig_spend(
                    provider,
                    &v.keys,
                    v.threshold,
                    &assigned[1..],
                    &digest,
                    deployments,
                    "CORE_VAULT",
                )?;
                vault_spend = Some(VaultSpendCtx {
                    input_index,
                    owner_lock_id: v.owner_lock_id,
                    whitelist: v.whitelist,
                });
            }
            COV_TYPE_HTLC => {
                validate_htlc_spend(
                    provider,
                    &entry,
                    &assigned[0],
                    &assigned[1],
                    &digest,
                    height,
                    block_mtp,
                    deployments,
                )?;
            }
            COV_TYPE_HTLC_V2 => {
                validate_htlc_v2_spend(
                    provider,
                    &entry,
                    tx,
                    &assigned[0],
                    &assigned[1],
                    &digest,
                    height,
                    block_mtp,
                    deployments,
                )?;
            }
            COV_TYPE_EXT => {
                validate_ext_spend(provider, &entry, assigned, &digest, deployments)?;
            }
            COV_TYPE_ANCHOR => {
                return Err(TxError::new(
                    ErrorCode::TxErrMissingUtxo,
                    "CORE_ANCHOR is not spendable",
                ));
            }
            _ => {
                return Err(TxError::new(
                    ErrorCode::TxErrCovenantInvalid,
                    "unknown covenant in spend",
                ));
            }
        }
        cursor += slots;

        let desc = output_descriptor_bytes(entry.covenant_type, &entry.covenant_data);
        input_lock_ids.push(sha3(provider, &desc)?);

        sum_in = sum_in
            .checked_add(entry.value as u128)
            .ok_or_else(|| TxError::new(ErrorCode::TxErrParse, "u128 overflow"))?;
        overlay.spend(&op, entry);
    }

    if cursor != tx.witness.len() {
        return Err(TxError::new(
            ErrorCode::TxErrWitnessMismatch,
            "witness item count mismatch",
        ));
    }

    // Vault transaction-level rules: whitelisted outputs only, no vault
    // recursion, no third-party fee sponsorship.
    if let Some(vs) = &vault_spend {
        for out in &tx.outputs {
            if out.covenant_type == COV_TYPE_VAULT {
                return Err(TxError::new(
                    ErrorCode::TxErrCovenantInvalid,
                    "CORE_VAULT spend must not create vault outputs",
                ));
            }
            let desc = output_descriptor_bytes(out.covenant_type, &out.covenant_data);
            let h = sha3(provider, &desc)?;
            if !hash_in_sorted_32(&vs.whitelist, &h) {
                return Err(TxError::new(
                    ErrorCode::TxErrCovenantInvalid,
                    "CORE_VAULT output not whitelisted",
                ));
            }
        }
        for (i, lock_id) in input_lock_ids.iter().enumerate() {
            if i == vs.input_index {
                continue;
            }
            if *lock_id != vs.owner_lock_id {
                return Err(TxError::new(
                    ErrorCode::TxErrCovenantInvalid,
                    "CORE_VAULT sponsorship by non-owner input",
                ));
            }
        }
    }

    let mut sum_out: u128 = 0;
    for (i, out) in tx.outputs.iter().enumerate() {
        sum_out = sum_out
            .checked_add(out.value as u128)
            .ok_or_else(|| TxError::new(ErrorCode::TxErrParse, "u128 overflow"))?;
        if out.covenant_type == COV_TYPE_ANCHOR {
            continue;
        }
        overlay.add(
            Outpoint {
                txid,
                vout: i as u32,
            },
            UtxoEntry {
                value: out.value,
                covenant_type: out.covenant_type,
                covenant_data: out.covenant_data.clone(),
                creation_height: height,
                created_by_coinbase: false,
            },
        );
    }

    // ⑧ value conservation.
    if sum_out > sum_in {
        return Err(TxError::new(
            ErrorCode::TxErrValueConservation,
            "outputs exceed inputs",
        ));
    }
    u64::try_from(sum_in - sum_out)
        .map_err(|_| TxError::new(ErrorCode::TxErrParse, "fee overflow"))
}

/// DA carrier binding: a tx with a payload must commit to it with exactly
/// one 32-byte anchor output equal to SHA3-256(da_payload).
fn validate_da_payload_commitment(
    provider: &dyn CryptoProvider,
    tx: &Tx,
) -> Result<(), TxError> {
    if tx.tx_kind != TX_KIND_DA {
        return Ok(());
    }
    let want = sha3(provider, &tx.da_payload)?;
    let mut matches = 0u32;
    for out in &tx.outputs {
        if out.covenant_type != COV_TYPE_ANCHOR || out.covenant_data.len() != 32 {
            continue;
        }
        if out.covenant_data.as_slice() == want.as_slice() {
            matches += 1;
        }
    }
    if matches != 1 {
        return Err(TxError::new(
            ErrorCode::BlockErrDaPayloadCommitInvalid,
            "DA payload commitment missing or duplicated",
        ));
    }
    Ok(())
}

fn validate_witness_commitment(
    provider: &dyn CryptoProvider,
    pb: &ParsedBlock,
) -> Result<(), TxError> {
    let wroot = witness_merkle_root_wtxids(provider, &pb.wtxids)?;
    let expected = witness_commitment_hash(provider, wroot)?;

    // The commitment is the coinbase's last 32-byte anchor output.
    let commitment = pb.txs[0]
        .outputs
        .iter()
        .rev()
        .find(|o| o.covenant_type == COV_TYPE_ANCHOR && o.covenant_data.len() == 32);
    match commitment {
        Some(o) if o.covenant_data.as_slice() == expected.as_slice() => Ok(()),
        _ => Err(TxError::new(
            ErrorCode::BlockErrWitnessCommitmentInvalid,
            "coinbase witness commitment missing or wrong",
        )),
    }
}

/// Validate a parsed block in full and produce its state deltas.
pub fn apply_block(
    provider: &dyn CryptoProvider,
    profile: &ChainProfile,
    view: &dyn ChainView,
    pb: &ParsedBlock,
    ctx: &BlockContext,
) -> Result<BlockApply, TxError> {
    let header = &pb.header;

    // Linkage sanity against the supplied ancestors. The chain-state engine
    // resolves parents; this guards against inconsistent contexts.
    if ctx.height == 0 {
        if header.prev_block_hash != [0u8; 32] {
            return Err(TxError::new(
                ErrorCode::BlockErrParse,
                "genesis prev_block_hash must be zero",
            ));
        }
        if !ctx.ancestor_headers.is_empty() {
            return Err(TxError::new(
                ErrorCode::BlockErrParse,
                "genesis takes no ancestors",
            ));
        }
    } else {
        let parent = ctx.ancestor_headers.last().ok_or_else(|| {
            TxError::new(ErrorCode::BlockErrParse, "missing ancestor headers")
        })?;
        let parent_hash = block_hash(provider, &crate::encode::block_header_bytes(parent))?;
        if header.prev_block_hash != parent_hash {
            return Err(TxError::new(
                ErrorCode::BlockErrParse,
                "ancestor context does not end at parent",
            ));
        }
    }

    // Target rules: range always, retarget schedule off genesis.
    check_target_range(&header.target, &profile.pow_limit)?;
    if ctx.height > 0 {
        let expected = expected_target(profile, ctx.height, &ctx.ancestor_headers)?;
        if expected != header.target {
            return Err(TxError::new(
                ErrorCode::BlockErrTargetInvalid,
                "target does not match retarget schedule",
            ));
        }
    }

    let bhash = block_hash(provider, &pb.header_bytes)?;
    pow_check(&bhash, &header.target, &profile.pow_limit)?;

    let root = merkle_root_txids(provider, &pb.txids)?;
    if root != header.merkle_root {
        return Err(TxError::new(
            ErrorCode::BlockErrMerkleInvalid,
            "merkle_root mismatch",
        ));
    }

    let mtp = if ctx.height > 0 {
        let m = median_time_past(&ctx.ancestor_headers, ctx.height)?;
        if header.timestamp <= m {
            return Err(TxError::new(
                ErrorCode::BlockErrTimestampOld,
                "timestamp <= median-time-past",
            ));
        }
        Some(m)
    } else {
        None
    };
    if let Some(local_time) = ctx.local_time {
        if header.timestamp > local_time.saturating_add(profile.max_future_drift) {
            return Err(TxError::new(
                ErrorCode::BlockErrTimestampFuture,
                "timestamp exceeds future drift",
            ));
        }
    }

    validate_coinbase_structure(&pb.txs[0], ctx.height)?;
    for tx in pb.txs.iter().skip(1) {
        if is_coinbase_shape(tx) {
            return Err(TxError::new(
                ErrorCode::BlockErrCoinbaseInvalid,
                "coinbase-like tx found at index > 0",
            ));
        }
    }

    validate_witness_commitment(provider, pb)?;

    // Aggregate caps. Weight is checked first; the DA caps share a token.
    let mut sum_weight: u64 = 0;
    let mut sum_da: u64 = 0;
    let mut da_batches: u64 = 0;
    for tx in &pb.txs {
        let (w, da) = tx_weight_and_da(tx)?;
        sum_weight = cadd(sum_weight, w)?;
        sum_da = cadd(sum_da, da)?;
        if tx.tx_kind == TX_KIND_DA {
            da_batches += 1;
        }
    }
    if sum_weight > profile.max_block_weight {
        return Err(TxError::new(
            ErrorCode::BlockErrWeightExceeded,
            "block weight exceeded",
        ));
    }
    if sum_da > profile.max_da_bytes_per_block {
        return Err(TxError::new(
            ErrorCode::BlockErrDaBatchExceeded,
            "DA bytes exceeded",
        ));
    }
    if da_batches > profile.max_da_batches_per_block {
        return Err(TxError::new(
            ErrorCode::BlockErrDaBatchExceeded,
            "DA batch count exceeded",
        ));
    }
    for tx in &pb.txs {
        validate_da_payload_commitment(provider, tx)?;
    }

    // Per-transaction validation over the snapshot + in-block overlay.
    let mtp_for_locks = mtp.unwrap_or(header.timestamp);
    let mut overlay = UtxoOverlay::new(view);
    let mut block_nonces: HashSet<u64> = HashSet::with_capacity(pb.txs.len());
    let mut tx_nonces: Vec<u64> = Vec::new();
    let mut sum_fees: u64 = 0;

    for (i, tx) in pb.txs.iter().enumerate() {
        if i == 0 {
            validate_tx_output_covenants(tx, &ctx.deployments)?;
            for (vout, out) in tx.outputs.iter().enumerate() {
                if out.covenant_type == COV_TYPE_ANCHOR {
                    continue;
                }
                overlay.add(
                    Outpoint {
                        txid: pb.txids[0],
                        vout: vout as u32,
                    },
                    UtxoEntry {
                        value: out.value,
                        covenant_type: out.covenant_type,
                        covenant_data: out.covenant_data.clone(),
                        creation_height: ctx.height,
                        created_by_coinbase: true,
                    },
                );
            }
            continue;
        }

        // Replay protection: nonce fresh within the block and on the chain.
        if tx.tx_nonce == 0 {
            return Err(TxError::new(
                ErrorCode::TxErrReplay,
                "tx_nonce 0 reserved for coinbase",
            ));
        }
        if !block_nonces.insert(tx.tx_nonce) || view.nonce_seen(tx.tx_nonce) {
            return Err(TxError::new(
                ErrorCode::TxErrReplay,
                "tx_nonce already used on this chain",
            ));
        }

        let fee = apply_tx_with_overlay(
            provider,
            profile,
            &mut overlay,
            tx,
            pb.txids[i],
            ctx.height,
            mtp_for_locks,
            &ctx.deployments,
        )?;
        sum_fees = cadd(sum_fees, fee)?;
        tx_nonces.push(tx.tx_nonce);
    }

    // Coinbase value bound.
    let subsidy = block_subsidy(&profile.subsidy, ctx.height, ctx.already_generated);
    if ctx.height > 0 {
        let mut coinbase_sum: u128 = 0;
        for out in &pb.txs[0].outputs {
            coinbase_sum = coinbase_sum
                .checked_add(out.value as u128)
                .ok_or_else(|| TxError::new(ErrorCode::TxErrParse, "u128 overflow"))?;
        }
        let limit = (subsidy as u128) + (sum_fees as u128);
        if coinbase_sum > limit {
            return Err(TxError::new(
                ErrorCode::BlockErrCoinbaseInvalid,
                "coinbase outputs exceed subsidy plus fees",
            ));
        }
    }

    let (spent, created) = overlay.into_deltas();
    Ok(BlockApply {
        block_hash: bhash,
        spent,
        created,
        tx_nonces,
        sum_fees,
        sum_weight,
        sum_da_bytes: sum_da,
        subsidy,
    })
}
