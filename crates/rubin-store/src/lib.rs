//! `rubin-store`: persistent chain state for the Rubin node.
//!
//! redb-backed KV store with canonical byte layouts, MANIFEST.json as the
//! single atomic commit point, the staged block import pipeline, the reorg
//! engine, VERSION_BITS deployment-state derivation, the chainstate
//! snapshot hash, and the single-writer supervisor.

pub mod db;
pub mod deploy;
pub mod error;
pub mod keys;
pub mod manifest;
pub mod pipeline;
pub mod reorg;
pub mod utxo_hash;
pub mod view;
pub mod writer;

pub use db::{Store, WriteBatch};
pub use error::StoreError;
pub use keys::{BlockIndexEntry, BlockStatus, UndoEntry, UndoRecord};
pub use manifest::Manifest;
pub use pipeline::{Chain, ImportResult};
pub use utxo_hash::chainstate_snapshot_hash;
pub use writer::{CancelToken, ChainWriter};
