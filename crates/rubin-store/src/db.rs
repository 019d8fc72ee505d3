//! redb-backed persistent storage.
//!
//! Six logical tables, all keyed and valued with canonical byte layouts:
//! - `headers_by_hash`      block_hash -> 116 raw header bytes
//! - `blocks_by_hash`       block_hash -> raw block bytes
//! - `block_index_by_hash`  block_hash -> index entry
//! - `utxo_by_outpoint`     outpoint_key(36) -> utxo entry bytes
//! - `undo_by_block_hash`   block_hash -> undo record
//! - `nonces_seen`          tx_nonce_le(8) -> txid(32)
//!
//! All mutations for one block apply in a single write transaction, so a
//! crash leaves the batch fully present or fully absent.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};

use rubin_consensus::{
    outpoint_key, parse_block_header_bytes, parse_utxo_entry, BlockHeader, Outpoint, UtxoEntry,
};

use crate::error::StoreError;
use crate::keys::{decode_block_index, decode_undo_record, encode_block_index,
    encode_undo_record, BlockIndexEntry, UndoRecord};

const HEADERS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("headers_by_hash");
const BLOCKS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blocks_by_hash");
const BLOCK_INDEX_TABLE: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("block_index_by_hash");
const UTXO_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("utxo_by_outpoint");
const UNDO_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("undo_by_block_hash");
const NONCES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("nonces_seen");

pub struct Store {
    db: Database,
}

fn db_err<E: std::fmt::Display>(ctx: &'static str) -> impl Fn(E) -> StoreError {
    move |e| StoreError::Db(format!("{ctx}: {e}"))
}

impl Store {
    /// Open (or create) a redb database at `path`, ensuring all tables exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(db_err("redb open"))?;
        let tx = db.begin_write().map_err(db_err("redb begin_write"))?;
        tx.open_table(HEADERS_TABLE).map_err(db_err("create headers table"))?;
        tx.open_table(BLOCKS_TABLE).map_err(db_err("create blocks table"))?;
        tx.open_table(BLOCK_INDEX_TABLE)
            .map_err(db_err("create block_index table"))?;
        tx.open_table(UTXO_TABLE).map_err(db_err("create utxo table"))?;
        tx.open_table(UNDO_TABLE).map_err(db_err("create undo table"))?;
        tx.open_table(NONCES_TABLE).map_err(db_err("create nonces table"))?;
        tx.commit().map_err(db_err("redb commit"))?;
        Ok(Self { db })
    }

    pub fn begin_write(&self) -> Result<WriteBatch, StoreError> {
        let tx = self.db.begin_write().map_err(db_err("begin_write"))?;
        Ok(WriteBatch { tx })
    }

    fn read_value(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let tx = self.db.begin_read().map_err(db_err("begin_read"))?;
        let table = tx.open_table(table).map_err(db_err("open table"))?;
        match table.get(key).map_err(db_err("get"))? {
            Some(guard) => Ok(Some(guard.value().to_vec())),
            None => Ok(None),
        }
    }

    pub fn get_header(&self, block_hash: &[u8; 32]) -> Result<Option<BlockHeader>, StoreError> {
        match self.read_value(HEADERS_TABLE, block_hash.as_slice())? {
            Some(raw) => Ok(Some(
                parse_block_header_bytes(&raw).map_err(|e| StoreError::Codec(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn get_block_bytes(&self, block_hash: &[u8; 32]) -> Result<Option<Vec<u8>>, StoreError> {
        self.read_value(BLOCKS_TABLE, block_hash.as_slice())
    }

    pub fn get_block_index(
        &self,
        block_hash: &[u8; 32],
    ) -> Result<Option<BlockIndexEntry>, StoreError> {
        match self.read_value(BLOCK_INDEX_TABLE, block_hash.as_slice())? {
            Some(raw) => Ok(Some(decode_block_index(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_utxo(&self, outpoint: &Outpoint) -> Result<Option<UtxoEntry>, StoreError> {
        let key = outpoint_key(outpoint);
        match self.read_value(UTXO_TABLE, key.as_slice())? {
            Some(raw) => Ok(Some(
                parse_utxo_entry(&raw).map_err(|e| StoreError::Codec(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn get_undo(&self, block_hash: &[u8; 32]) -> Result<Option<UndoRecord>, StoreError> {
        match self.read_value(UNDO_TABLE, block_hash.as_slice())? {
            Some(raw) => Ok(Some(decode_undo_record(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn nonce_seen(&self, tx_nonce: u64) -> Result<bool, StoreError> {
        Ok(self
            .read_value(NONCES_TABLE, tx_nonce.to_le_bytes().as_slice())?
            .is_some())
    }

    /// Iterate all UTXO pairs in lexicographic outpoint-key order, the
    /// canonical order of the chainstate snapshot hash.
    pub fn iter_utxos<F>(&self, mut f: F) -> Result<(), StoreError>
    where
        F: FnMut(&[u8], &[u8]),
    {
        let tx = self.db.begin_read().map_err(db_err("begin_read"))?;
        let table = tx.open_table(UTXO_TABLE).map_err(db_err("open utxo"))?;
        let iter = table.iter().map_err(db_err("utxo iter"))?;
        for result in iter {
            let (key_guard, val_guard) = result.map_err(db_err("utxo next"))?;
            f(key_guard.value(), val_guard.value());
        }
        Ok(())
    }
}

/// Wraps a redb WriteTransaction for atomic multi-table writes.
pub struct WriteBatch {
    tx: WriteTransaction,
}

impl WriteBatch {
    fn insert(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StoreError> {
        let mut table = self.tx.open_table(table).map_err(db_err("open table"))?;
        table.insert(key, value).map_err(db_err("insert"))?;
        Ok(())
    }

    fn remove(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
    ) -> Result<(), StoreError> {
        let mut table = self.tx.open_table(table).map_err(db_err("open table"))?;
        table.remove(key).map_err(db_err("remove"))?;
        Ok(())
    }

    pub fn put_header(
        &self,
        block_hash: &[u8; 32],
        header_bytes: &[u8; 116],
    ) -> Result<(), StoreError> {
        self.insert(HEADERS_TABLE, block_hash.as_slice(), header_bytes.as_slice())
    }

    pub fn put_block_bytes(
        &self,
        block_hash: &[u8; 32],
        block_bytes: &[u8],
    ) -> Result<(), StoreError> {
        self.insert(BLOCKS_TABLE, block_hash.as_slice(), block_bytes)
    }

    pub fn put_block_index(
        &self,
        block_hash: &[u8; 32],
        entry: &BlockIndexEntry,
    ) -> Result<(), StoreError> {
        let value = encode_block_index(entry);
        self.insert(BLOCK_INDEX_TABLE, block_hash.as_slice(), &value)
    }

    pub fn put_utxo(&self, outpoint: &Outpoint, entry: &UtxoEntry) -> Result<(), StoreError> {
        let key = outpoint_key(outpoint);
        let value = rubin_consensus::utxo_entry_bytes(entry);
        self.insert(UTXO_TABLE, key.as_slice(), &value)
    }

    pub fn delete_utxo(&self, outpoint: &Outpoint) -> Result<(), StoreError> {
        let key = outpoint_key(outpoint);
        self.remove(UTXO_TABLE, key.as_slice())
    }

    pub fn put_undo(&self, block_hash: &[u8; 32], record: &UndoRecord) -> Result<(), StoreError> {
        let value = encode_undo_record(record);
        self.insert(UNDO_TABLE, block_hash.as_slice(), &value)
    }

    pub fn delete_undo(&self, block_hash: &[u8; 32]) -> Result<(), StoreError> {
        self.remove(UNDO_TABLE, block_hash.as_slice())
    }

    pub fn put_nonce(&self, tx_nonce: u64, txid: &[u8; 32]) -> Result<(), StoreError> {
        self.insert(
            NONCES_TABLE,
            tx_nonce.to_le_bytes().as_slice(),
            txid.as_slice(),
        )
    }

    pub fn delete_nonce(&self, tx_nonce: u64) -> Result<(), StoreError> {
        self.remove(NONCES_TABLE, tx_nonce.to_le_bytes().as_slice())
    }

    /// Commit the batch atomically.
    pub fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().map_err(db_err("commit"))
    }
}
