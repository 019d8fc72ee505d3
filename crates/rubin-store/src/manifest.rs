//! MANIFEST.json: the single atomic commit point for tip advancement.
//!
//! Written as a temp file, fsynced, renamed over MANIFEST.json, then the
//! directory is fsynced. Any crash before the rename leaves the previous
//! manifest (and therefore the previous tip) in force.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub schema_version: u32,
    pub chain_id_hex: String,
    pub tip_hash_hex: String,
    pub tip_height: u64,
    /// Decimal string; cumulative work does not fit a fixed-width integer.
    pub tip_cumulative_work_decimal: String,
    pub last_applied_block_hash_hex: String,
    pub last_applied_height: u64,
}

impl Manifest {
    pub fn new(
        chain_id: &[u8; 32],
        tip_hash: &[u8; 32],
        tip_height: u64,
        tip_cumulative_work: &BigUint,
    ) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            chain_id_hex: hex::encode(chain_id),
            tip_hash_hex: hex::encode(tip_hash),
            tip_height,
            tip_cumulative_work_decimal: tip_cumulative_work.to_str_radix(10),
            last_applied_block_hash_hex: hex::encode(tip_hash),
            last_applied_height: tip_height,
        }
    }

    /// Load a manifest. A node MUST refuse to open a datadir written by a
    /// newer schema.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let data = fs::read_to_string(path)
            .map_err(|e| StoreError::Manifest(format!("read manifest: {e}")))?;
        let m: Manifest = serde_json::from_str(&data)
            .map_err(|e| StoreError::Manifest(format!("parse manifest: {e}")))?;
        if m.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::Manifest(format!(
                "manifest schema_version {} is newer than supported {}",
                m.schema_version, CURRENT_SCHEMA_VERSION,
            )));
        }
        Ok(m)
    }

    /// Atomically save: write temp -> fsync -> rename -> fsync dir.
    pub fn save_atomic(&self, path: &Path) -> Result<(), StoreError> {
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::Manifest("manifest path has no parent dir".into()))?;

        // Unique tmp name to avoid cross-process collisions. Uniqueness is
        // an operational property, not a consensus one.
        let pid = std::process::id();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let tmp_path = dir.join(format!(".MANIFEST.json.tmp.{pid}.{nanos}"));

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Manifest(format!("serialize manifest: {e}")))?;

        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(json.as_bytes())?;
        f.sync_all()?;
        drop(f);

        fs::rename(&tmp_path, path)?;

        // fsync parent directory for rename durability (POSIX requirement).
        if let Ok(dir_f) = fs::File::open(dir) {
            let _ = dir_f.sync_all();
        }

        Ok(())
    }

    pub fn update_tip(&mut self, block_hash: &[u8; 32], height: u64, cumulative_work: &BigUint) {
        self.tip_hash_hex = hex::encode(block_hash);
        self.tip_height = height;
        self.tip_cumulative_work_decimal = cumulative_work.to_str_radix(10);
        self.last_applied_block_hash_hex = hex::encode(block_hash);
        self.last_applied_height = height;
    }

    pub fn path_in(chain_dir: &Path) -> PathBuf {
        chain_dir.join("MANIFEST.json")
    }

    pub fn tip_hash(&self) -> Result<[u8; 32], StoreError> {
        hex_to_32(&self.tip_hash_hex)
    }

    pub fn tip_cumulative_work(&self) -> Result<BigUint, StoreError> {
        BigUint::parse_bytes(self.tip_cumulative_work_decimal.as_bytes(), 10)
            .ok_or_else(|| StoreError::Manifest("parse cumulative_work".into()))
    }
}

fn hex_to_32(s: &str) -> Result<[u8; 32], StoreError> {
    let bytes =
        hex::decode(s).map_err(|e| StoreError::Manifest(format!("hex decode: {e}")))?;
    if bytes.len() != 32 {
        return Err(StoreError::Manifest(format!(
            "expected 32-byte hex, got {} bytes",
            bytes.len()
        )));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}
