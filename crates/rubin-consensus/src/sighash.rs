use rubin_crypto::CryptoProvider;

use crate::constants::SIGHASH_DOMAIN_TAG;
use crate::encode::tx_output_bytes;
use crate::error::{ErrorCode, TxError};
use crate::hashing::sha3;
use crate::tx::Tx;

/// Sighash v1: the domain-separated signing digest for one input.
///
/// Preimage layout (order is a consensus contract):
///   "RUBINv1-sighash/" || chain_id ||
///   version_le || tx_kind || tx_nonce_le ||
///   SHA3(prevouts) || SHA3(sequences) ||
///   spent prev_txid || prev_vout_le || input_value_le ||
///   input_index_le || SHA3(outputs) || locktime_le
///
/// A signature over this digest is bound to the chain id, the spent
/// outpoint and value, the input position, and every signed field of the
/// transaction.
pub fn sighash_v1_digest(
    provider: &dyn CryptoProvider,
    chain_id: &[u8; 32],
    tx: &Tx,
    input_index: u32,
    input_value: u64,
) -> Result<[u8; 32], TxError> {
    let idx = input_index as usize;
    if idx >= tx.inputs.len() {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "sighash: input_index out of bounds",
        ));
    }

    let mut prevouts = Vec::with_capacity(tx.inputs.len() * 36);
    for input in &tx.inputs {
        prevouts.extend_from_slice(&input.prev_txid);
        prevouts.extend_from_slice(&input.prev_vout.to_le_bytes());
    }
    let hash_of_all_prevouts = sha3(provider, &prevouts)?;

    let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
    for input in &tx.inputs {
        sequences.extend_from_slice(&input.sequence.to_le_bytes());
    }
    let hash_of_all_sequences = sha3(provider, &sequences)?;

    // outputs.len() == 0 hashes the empty string.
    let mut outputs_bytes = Vec::new();
    for output in &tx.outputs {
        outputs_bytes.extend_from_slice(&tx_output_bytes(output));
    }
    let hash_of_all_outputs = sha3(provider, &outputs_bytes)?;

    let input = &tx.inputs[idx];

    let mut preimage = Vec::with_capacity(16 + 32 + 13 + 32 * 3 + 36 + 8 + 4 + 4);
    preimage.extend_from_slice(SIGHASH_DOMAIN_TAG);
    preimage.extend_from_slice(chain_id);
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.push(tx.tx_kind);
    preimage.extend_from_slice(&tx.tx_nonce.to_le_bytes());
    preimage.extend_from_slice(&hash_of_all_prevouts);
    preimage.extend_from_slice(&hash_of_all_sequences);
    preimage.extend_from_slice(&input.prev_txid);
    preimage.extend_from_slice(&input.prev_vout.to_le_bytes());
    preimage.extend_from_slice(&input_value.to_le_bytes());
    preimage.extend_from_slice(&input_index.to_le_bytes());
    preimage.extend_from_slice(&hash_of_all_outputs);
    preimage.extend_from_slice(&tx.locktime.to_le_bytes());

    sha3(provider, &preimage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{COV_TYPE_P2PK, TX_KIND_STANDARD, TX_WIRE_VERSION};
    use crate::tx::{TxInput, TxOutput};

    struct Sha3Provider;

    impl CryptoProvider for Sha3Provider {
        fn sha3_256(&self, input: &[u8]) -> Result<[u8; 32], String> {
            use sha3::Digest;
            let mut h = sha3::Sha3_256::new();
            h.update(input);
            let out = h.finalize();
            let mut r = [0u8; 32];
            r.copy_from_slice(&out);
            Ok(r)
        }
        fn verify_mldsa87(&self, _: &[u8], _: &[u8], _: &[u8; 32]) -> Result<bool, String> {
            Ok(false)
        }
        fn verify_slhdsa_shake_256f(&self, _: &[u8], _: &[u8], _: &[u8; 32]) -> Result<bool, String> {
            Ok(false)
        }
    }

    fn sample_tx() -> Tx {
        Tx {
            version: TX_WIRE_VERSION,
            tx_kind: TX_KIND_STANDARD,
            tx_nonce: 9,
            inputs: vec![
                TxInput {
                    prev_txid: [0x10; 32],
                    prev_vout: 0,
                    script_sig: Vec::new(),
                    sequence: 0,
                },
                TxInput {
                    prev_txid: [0x20; 32],
                    prev_vout: 3,
                    script_sig: Vec::new(),
                    sequence: 1,
                },
            ],
            outputs: vec![TxOutput {
                value: 50,
                covenant_type: COV_TYPE_P2PK,
                covenant_data: vec![0u8; 33],
            }],
            locktime: 0,
            witness: Vec::new(),
            da_payload: Vec::new(),
        }
    }

    #[test]
    fn digest_is_deterministic() {
        let p = Sha3Provider;
        let tx = sample_tx();
        let a = sighash_v1_digest(&p, &[0u8; 32], &tx, 0, 100).unwrap();
        let b = sighash_v1_digest(&p, &[0u8; 32], &tx, 0, 100).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn digest_separates_chain_ids() {
        let p = Sha3Provider;
        let tx = sample_tx();
        let a = sighash_v1_digest(&p, &[0u8; 32], &tx, 0, 100).unwrap();
        let b = sighash_v1_digest(&p, &[0x01; 32], &tx, 0, 100).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn digest_binds_index_value_and_fields() {
        let p = Sha3Provider;
        let tx = sample_tx();
        let base = sighash_v1_digest(&p, &[0u8; 32], &tx, 0, 100).unwrap();

        assert_ne!(base, sighash_v1_digest(&p, &[0u8; 32], &tx, 1, 100).unwrap());
        assert_ne!(base, sighash_v1_digest(&p, &[0u8; 32], &tx, 0, 101).unwrap());

        let mut tx2 = sample_tx();
        tx2.locktime = 1;
        assert_ne!(base, sighash_v1_digest(&p, &[0u8; 32], &tx2, 0, 100).unwrap());

        let mut tx3 = sample_tx();
        tx3.outputs[0].value = 51;
        assert_ne!(base, sighash_v1_digest(&p, &[0u8; 32], &tx3, 0, 100).unwrap());

        let mut tx4 = sample_tx();
        tx4.tx_nonce = 10;
        assert_ne!(base, sighash_v1_digest(&p, &[0u8; 32], &tx4, 0, 100).unwrap());
    }

    #[test]
    fn digest_rejects_out_of_bounds_index() {
        let p = Sha3Provider;
        let tx = sample_tx();
        let err = sighash_v1_digest(&p, &[0u8; 32], &tx, 2, 100).unwrap_err();
        assert_eq!(err.code, ErrorCode::TxErrParse);
    }
}
