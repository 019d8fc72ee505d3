//! CORE_VAULT and CORE_MULTISIG covenant data layouts.

use crate::compactsize::encode_compact_size;
use crate::constants::{MAX_MULTISIG_KEYS, MAX_VAULT_KEYS, MAX_VAULT_WHITELIST_ENTRIES};
use crate::error::{ErrorCode, TxError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VaultCovenant {
    pub owner_lock_id: [u8; 32],
    pub threshold: u8,
    pub key_count: u8,
    pub keys: Vec<[u8; 32]>,
    pub whitelist_count: u16,
    pub whitelist: Vec<[u8; 32]>,
    /// Relative spend delay in blocks from the entry's creation height.
    pub spend_delay: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultisigCovenant {
    pub threshold: u8,
    pub key_count: u8,
    pub keys: Vec<[u8; 32]>,
}

/// Layout: owner_lock_id(32) || threshold(1) || key_count(1) ||
/// key_id(32)*key_count || whitelist_count_le(2) || desc_hash(32)*count ||
/// [spend_delay_le(8)].
pub fn parse_vault_covenant_data(covenant_data: &[u8]) -> Result<VaultCovenant, TxError> {
    if covenant_data.len() < 34 {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_VAULT covenant_data too short",
        ));
    }

    let mut owner_lock_id = [0u8; 32];
    owner_lock_id.copy_from_slice(&covenant_data[0..32]);
    let threshold = covenant_data[32];
    let key_count = covenant_data[33];
    if key_count == 0 || key_count > MAX_VAULT_KEYS {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_VAULT key_count out of range",
        ));
    }
    if threshold == 0 || threshold > key_count {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_VAULT threshold out of range",
        ));
    }

    let mut offset = 34usize;
    let mut keys = Vec::with_capacity(key_count as usize);
    for _ in 0..key_count {
        if offset + 32 > covenant_data.len() {
            return Err(TxError::new(
                ErrorCode::TxErrCovenantInvalid,
                "CORE_VAULT truncated keys",
            ));
        }
        let mut k = [0u8; 32];
        k.copy_from_slice(&covenant_data[offset..offset + 32]);
        offset += 32;
        keys.push(k);
    }
    if !strictly_sorted_unique_32(&keys) {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_VAULT keys not strictly sorted",
        ));
    }

    if offset + 2 > covenant_data.len() {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_VAULT missing whitelist_count",
        ));
    }
    let whitelist_count = u16::from_le_bytes([covenant_data[offset], covenant_data[offset + 1]]);
    offset += 2;
    if whitelist_count == 0 || whitelist_count > MAX_VAULT_WHITELIST_ENTRIES {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_VAULT whitelist_count out of range",
        ));
    }

    let base_len = 32 + 1 + 1 + (key_count as usize) * 32 + 2 + (whitelist_count as usize) * 32;
    let spend_delay = match covenant_data.len() {
        l if l == base_len => None,
        l if l == base_len + 8 => {
            let mut v = [0u8; 8];
            v.copy_from_slice(&covenant_data[base_len..base_len + 8]);
            Some(u64::from_le_bytes(v))
        }
        _ => {
            return Err(TxError::new(
                ErrorCode::TxErrCovenantInvalid,
                "CORE_VAULT covenant_data length mismatch",
            ))
        }
    };

    let mut whitelist = Vec::with_capacity(whitelist_count as usize);
    for _ in 0..whitelist_count {
        let mut h = [0u8; 32];
        h.copy_from_slice(&covenant_data[offset..offset + 32]);
        offset += 32;
        whitelist.push(h);
    }
    if !strictly_sorted_unique_32(&whitelist) {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_VAULT whitelist not strictly sorted",
        ));
    }
    if hash_in_sorted_32(&whitelist, &owner_lock_id) {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_VAULT whitelist contains owner_lock_id",
        ));
    }

    Ok(VaultCovenant {
        owner_lock_id,
        threshold,
        key_count,
        keys,
        whitelist_count,
        whitelist,
        spend_delay,
    })
}

/// Layout: threshold(1) || key_count(1) || key_id(32)*key_count.
pub fn parse_multisig_covenant_data(covenant_data: &[u8]) -> Result<MultisigCovenant, TxError> {
    if covenant_data.len() < 34 {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_MULTISIG covenant_data too short",
        ));
    }

    let threshold = covenant_data[0];
    let key_count = covenant_data[1];
    if key_count == 0 || key_count > MAX_MULTISIG_KEYS {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_MULTISIG key_count out of range",
        ));
    }
    if threshold == 0 || threshold > key_count {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_MULTISIG threshold out of range",
        ));
    }

    let expected_len = 2 + (key_count as usize) * 32;
    if covenant_data.len() != expected_len {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_MULTISIG covenant_data length mismatch",
        ));
    }

    let mut keys = Vec::with_capacity(key_count as usize);
    let mut offset = 2usize;
    for _ in 0..key_count {
        let mut k = [0u8; 32];
        k.copy_from_slice(&covenant_data[offset..offset + 32]);
        offset += 32;
        keys.push(k);
    }
    if !strictly_sorted_unique_32(&keys) {
        return Err(TxError::new(
            ErrorCode::TxErrCovenantInvalid,
            "CORE_MULTISIG keys not strictly sorted",
        ));
    }

    Ok(MultisigCovenant {
        threshold,
        key_count,
        keys,
    })
}

/// Descriptor bytes an output is identified by in vault whitelists and
/// owner locks: covenant_type_le || CompactSize(len) || covenant_data.
pub fn output_descriptor_bytes(covenant_type: u16, covenant_data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 9 + covenant_data.len());
    out.extend_from_slice(&covenant_type.to_le_bytes());
    encode_compact_size(covenant_data.len() as u64, &mut out);
    out.extend_from_slice(covenant_data);
    out
}

pub fn hash_in_sorted_32(list: &[[u8; 32]], target: &[u8; 32]) -> bool {
    list.binary_search(target).is_ok()
}

fn strictly_sorted_unique_32(xs: &[[u8; 32]]) -> bool {
    xs.windows(2).all(|w| w[0] < w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn vault_cov_data(
        owner: [u8; 32],
        threshold: u8,
        keys: &[[u8; 32]],
        whitelist: &[[u8; 32]],
        spend_delay: Option<u64>,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&owner);
        out.push(threshold);
        out.push(keys.len() as u8);
        for k in keys {
            out.extend_from_slice(k);
        }
        out.extend_from_slice(&(whitelist.len() as u16).to_le_bytes());
        for w in whitelist {
            out.extend_from_slice(w);
        }
        if let Some(d) = spend_delay {
            out.extend_from_slice(&d.to_le_bytes());
        }
        out
    }

    #[test]
    fn vault_roundtrip_with_and_without_delay() {
        let keys = [[0x01u8; 32], [0x02u8; 32]];
        let whitelist = [[0x0au8; 32], [0x0bu8; 32]];

        let data = vault_cov_data([0xEE; 32], 2, &keys, &whitelist, None);
        let v = parse_vault_covenant_data(&data).expect("parse");
        assert_eq!(v.threshold, 2);
        assert_eq!(v.spend_delay, None);

        let data = vault_cov_data([0xEE; 32], 1, &keys, &whitelist, Some(144));
        let v = parse_vault_covenant_data(&data).expect("parse");
        assert_eq!(v.spend_delay, Some(144));
        assert_eq!(v.keys, keys.to_vec());
    }

    #[test]
    fn vault_rejects_unsorted_keys_and_owner_in_whitelist() {
        let keys_bad = [[0x02u8; 32], [0x01u8; 32]];
        let whitelist = [[0x0au8; 32]];
        let data = vault_cov_data([0xEE; 32], 1, &keys_bad, &whitelist, None);
        let err = parse_vault_covenant_data(&data).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrCovenantInvalid);

        let keys = [[0x01u8; 32]];
        let owner = [0x0au8; 32];
        let data = vault_cov_data(owner, 1, &keys, &[owner], None);
        let err = parse_vault_covenant_data(&data).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrCovenantInvalid);
    }

    #[test]
    fn vault_rejects_threshold_out_of_range() {
        let keys = [[0x01u8; 32]];
        let whitelist = [[0x0au8; 32]];
        let data = vault_cov_data([0xEE; 32], 2, &keys, &whitelist, None);
        assert!(parse_vault_covenant_data(&data).is_err());
        let data = vault_cov_data([0xEE; 32], 0, &keys, &whitelist, None);
        assert!(parse_vault_covenant_data(&data).is_err());
    }

    #[test]
    fn vault_rejects_length_mismatch() {
        let keys = [[0x01u8; 32]];
        let whitelist = [[0x0au8; 32]];
        let mut data = vault_cov_data([0xEE; 32], 1, &keys, &whitelist, None);
        data.push(0x00); // neither base_len nor base_len + 8
        assert!(parse_vault_covenant_data(&data).is_err());
    }

    #[test]
    fn multisig_roundtrip_and_bounds() {
        let keys = [[0x01u8; 32], [0x02u8; 32], [0x03u8; 32]];
        let mut data = vec![2u8, 3u8];
        for k in &keys {
            data.extend_from_slice(k);
        }
        let m = parse_multisig_covenant_data(&data).expect("parse");
        assert_eq!(m.threshold, 2);
        assert_eq!(m.keys, keys.to_vec());

        data[0] = 4; // threshold > key_count
        assert!(parse_multisig_covenant_data(&data).is_err());
    }

    #[test]
    fn descriptor_bytes_are_length_prefixed() {
        let d = output_descriptor_bytes(0x0100, &[0xaa, 0xbb]);
        assert_eq!(d, vec![0x00, 0x01, 0x02, 0xaa, 0xbb]);
    }
}
