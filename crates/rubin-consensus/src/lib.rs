//! RUBIN consensus library (wire, hashing domains, validation).
//!
//! This crate is the deterministic byte-level validation engine: given a
//! previous chain state view and a candidate block, it either produces the
//! state deltas for the next chain state or rejects with a canonical error
//! code. Every byte, integer width and iteration order here is a consensus
//! contract shared with the Go client.
//!
//! Non-consensus policy MUST NOT be implemented here. All hashing and
//! signature verification is routed through the narrow
//! [`rubin_crypto::CryptoProvider`] interface.

pub mod block;
pub mod compactsize;
pub mod constants;
pub mod covenant;
pub mod encode;
pub mod error;
pub mod ext;
pub mod featurebits;
pub mod htlc;
pub mod merkle;
pub mod pow;
pub mod profile;
pub mod sighash;
pub mod spend;
pub mod subsidy;
pub mod tx;
pub mod utxo;
pub mod validate;
pub mod vault;
pub mod wire_read;

pub(crate) mod hashing;

pub use block::{block_hash, parse_block_bytes, parse_block_header_bytes, BlockHeader, ParsedBlock};
pub use compactsize::{compact_size_decode, compact_size_len, encode_compact_size};
pub use constants::*;
pub use error::{ErrorCode, TxError};
pub use featurebits::{deployment_state_for_block, DeploymentState};
pub use merkle::{merkle_root_txids, witness_commitment_hash, witness_merkle_root_wtxids};
pub use pow::{expected_target, pow_check, retarget, work_from_target};
pub use profile::{ChainProfile, Deployment, SubsidySchedule};
pub use sighash::sighash_v1_digest;
pub use subsidy::{already_generated_at, block_subsidy};
pub use tx::{parse_tx, Tx, TxInput, TxOutput, WitnessItem};
pub use utxo::{
    outpoint_key, parse_outpoint_key, parse_utxo_entry, utxo_entry_bytes, utxo_set_hash, Outpoint,
    UtxoEntry,
};
pub use validate::{
    apply_block, tx_weight_and_da, validate_tx, BlockApply, BlockContext, ChainView,
    DeploymentView, MemoryView,
};

pub const CONSENSUS_REVISION: &str = "v2";
