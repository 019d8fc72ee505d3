//! Consensus constants shared with the Go client. Profile-independent values
//! only; anything an operator may vary per chain instance lives in
//! [`crate::profile::ChainProfile`].

pub const TX_WIRE_VERSION: u32 = 2;

pub const TX_KIND_STANDARD: u8 = 0x00;
pub const TX_KIND_DA: u8 = 0x01;

pub const BLOCK_HEADER_BYTES: usize = 116;

// Weight accounting: base bytes are discounted 4x against witness bytes, and
// each canonical signature item adds a verify cost term.
pub const WITNESS_DISCOUNT_DIVISOR: u64 = 4;
pub const VERIFY_COST_ML_DSA: u64 = 8;
pub const VERIFY_COST_SLH_DSA: u64 = 64;

// Structural parse caps.
pub const MAX_TX_INPUTS: u64 = 1_024;
pub const MAX_TX_OUTPUTS: u64 = 1_024;
pub const MAX_WITNESS_ITEMS: u64 = 1_024;
pub const MAX_WITNESS_BYTES_PER_TX: usize = 100_000;
pub const MAX_SCRIPT_SIG_BYTES: usize = 32;
pub const MAX_COVENANT_DATA: u64 = 65_536;
pub const MAX_ANCHOR_PAYLOAD_SIZE: usize = 65_536;
pub const MAX_DA_PAYLOAD_BYTES_PER_TX: u64 = 524_288;
pub const MAX_HTLC_PREIMAGE_BYTES: u64 = 256;

pub const SUITE_ID_SENTINEL: u8 = 0x00;
pub const SUITE_ID_ML_DSA_87: u8 = 0x01;
pub const SUITE_ID_SLH_DSA_SHAKE_256F: u8 = 0x02;

pub const ML_DSA_87_PUBKEY_BYTES: u64 = 2_592;
pub const ML_DSA_87_SIG_BYTES: u64 = 4_627;
pub const SLH_DSA_SHAKE_256F_PUBKEY_BYTES: u64 = 64;
pub const SLH_DSA_SHAKE_256F_SIG_BYTES: u64 = 49_856;

// Covenant type codes. 0x0102 is reserved and rejects everywhere.
pub const COV_TYPE_P2PK: u16 = 0x0100;
pub const COV_TYPE_VAULT: u16 = 0x0101;
pub const COV_TYPE_RESERVED_0102: u16 = 0x0102;
pub const COV_TYPE_ANCHOR: u16 = 0x0103;
pub const COV_TYPE_MULTISIG: u16 = 0x0104;
pub const COV_TYPE_HTLC: u16 = 0x0105;
pub const COV_TYPE_HTLC_V2: u16 = 0x0106;
pub const COV_TYPE_EXT: u16 = 0x0107;

pub const P2PK_COVENANT_DATA_BYTES: usize = 33;
pub const HTLC_COVENANT_DATA_BYTES: usize = 105;

pub const MAX_MULTISIG_KEYS: u8 = 12;
pub const MAX_VAULT_KEYS: u8 = 12;
pub const MAX_VAULT_WHITELIST_ENTRIES: u16 = 1_024;

pub const LOCK_MODE_HEIGHT: u8 = 0x00;
pub const LOCK_MODE_TIMESTAMP: u8 = 0x01;

// HTLC_V2 path selection envelope: prefix || preimage32, carried in a
// CORE_ANCHOR output of the spending transaction.
pub const HTLC_V2_ANCHOR_PREFIX: &[u8] = b"RUBINv1-htlc-preimage/";
pub const HTLC_V2_ANCHOR_ENVELOPE_BYTES: usize = 54;

pub const TX_COINBASE_PREVOUT_VOUT: u32 = u32::MAX;
pub const TX_COINBASE_SEQUENCE: u32 = u32::MAX;

pub const SIGHASH_DOMAIN_TAG: &[u8] = b"RUBINv1-sighash/";

// Merkle domain prefixes. The txid tree and the witness tree are
// domain-separated at the leaf and node level.
pub const MERKLE_LEAF_PREFIX: u8 = 0x00;
pub const MERKLE_NODE_PREFIX: u8 = 0x01;
pub const WITNESS_MERKLE_LEAF_PREFIX: u8 = 0x02;
pub const WITNESS_MERKLE_NODE_PREFIX: u8 = 0x03;

pub const WITNESS_COMMITMENT_BYTES: usize = 32;

/// Deployment name gating SLH-DSA-SHAKE-256f use in CORE_P2PK.
pub const SLH_DSA_P2PK_DEPLOYMENT: &str = "slh_dsa_p2pk_v1";
