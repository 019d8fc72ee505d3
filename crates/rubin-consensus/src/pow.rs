//! Proof-of-work checks, difficulty retarget and per-block work.
//!
//! Retarget intermediates are 320-bit (target is 256-bit, the actual/expected
//! timespan ratio is bounded by the 4x clamps); `BigUint` carries them and the
//! result is clamped to POW_LIMIT before the 32-byte serialisation, so the
//! conversion can never be asked to fit more than 256 bits.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::block::BlockHeader;
use crate::error::{ErrorCode, TxError};
use crate::profile::ChainProfile;

/// PoW check: interpret hash and target as big-endian 256-bit unsigned;
/// require `hash <= target` and `1 <= target <= pow_limit`.
pub fn pow_check(
    block_hash: &[u8; 32],
    target: &[u8; 32],
    pow_limit: &[u8; 32],
) -> Result<(), TxError> {
    check_target_range(target, pow_limit)?;
    if block_hash.as_slice() > target.as_slice() {
        return Err(TxError::new(ErrorCode::BlockErrPowInvalid, "pow invalid"));
    }
    Ok(())
}

pub fn check_target_range(target: &[u8; 32], pow_limit: &[u8; 32]) -> Result<(), TxError> {
    if target.iter().all(|&b| b == 0) {
        return Err(TxError::new(
            ErrorCode::BlockErrTargetInvalid,
            "target is zero",
        ));
    }
    if target.as_slice() > pow_limit.as_slice() {
        return Err(TxError::new(
            ErrorCode::BlockErrTargetInvalid,
            "target above pow_limit",
        ));
    }
    Ok(())
}

/// Expected target for a block at `height` given its ancestor headers
/// (ordered oldest to newest, parent last).
///
/// Off retarget boundaries the target is inherited from the parent. At a
/// boundary (`height % WINDOW_SIZE == 0`, height > 0) it is recomputed from
/// the parent window's first and last timestamps.
pub fn expected_target(
    profile: &ChainProfile,
    height: u64,
    ancestors: &[BlockHeader],
) -> Result<[u8; 32], TxError> {
    let parent = ancestors.last().ok_or_else(|| {
        TxError::new(ErrorCode::BlockErrParse, "expected_target: no ancestors")
    })?;

    if height % profile.window_size != 0 {
        return Ok(parent.target);
    }

    let window = profile.window_size as usize;
    if ancestors.len() < window {
        return Err(TxError::new(
            ErrorCode::BlockErrParse,
            "expected_target: insufficient window context",
        ));
    }
    let first = &ancestors[ancestors.len() - window];
    retarget(profile, parent.target, first.timestamp, parent.timestamp)
}

/// Recompute the target from one window's observed timespan.
///
/// `target_new = target_old * T_actual / T_expected`, clamped into
/// `[max(1, target_old/4), min(target_old*4, POW_LIMIT)]` and saturated at
/// POW_LIMIT before serialisation.
pub fn retarget(
    profile: &ChainProfile,
    target_old: [u8; 32],
    timestamp_first: u64,
    timestamp_last: u64,
) -> Result<[u8; 32], TxError> {
    let pow_limit = BigUint::from_bytes_be(&profile.pow_limit);
    let t_old = BigUint::from_bytes_be(&target_old);
    if t_old.is_zero() {
        return Err(TxError::new(
            ErrorCode::BlockErrTargetInvalid,
            "retarget: target_old is zero",
        ));
    }
    if t_old > pow_limit {
        return Err(TxError::new(
            ErrorCode::BlockErrTargetInvalid,
            "retarget: target_old above pow_limit",
        ));
    }

    let t_actual = if timestamp_last <= timestamp_first {
        1u64
    } else {
        timestamp_last - timestamp_first
    };

    let t_expected = profile
        .target_block_interval
        .checked_mul(profile.window_size)
        .ok_or_else(|| TxError::new(ErrorCode::TxErrParse, "retarget: t_expected overflow"))?;
    if t_expected == 0 {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "retarget: t_expected is zero",
        ));
    }

    // floor(target_old * T_actual / T_expected); up to 320 bits before the
    // division since T_actual is a u64.
    let mut t_new = (&t_old * BigUint::from(t_actual)) / BigUint::from(t_expected);

    let mut lower = &t_old >> 2;
    if lower < BigUint::one() {
        lower = BigUint::one();
    }
    let upper = core::cmp::min(&t_old << 2, pow_limit.clone());

    if t_new < lower {
        t_new = lower;
    }
    if t_new > upper {
        t_new = upper;
    }
    // Saturating clamp to POW_LIMIT before serialisation. The clamp above
    // already bounds t_new, but the serialisation bound must hold
    // structurally, not by arithmetic accident.
    if t_new > pow_limit {
        t_new = pow_limit;
    }

    biguint_to_bytes32(&t_new)
}

/// Per-block work: floor(2^256 / target).
pub fn work_from_target(target: &[u8; 32], pow_limit: &[u8; 32]) -> Result<BigUint, TxError> {
    check_target_range(target, pow_limit)?;
    let t = BigUint::from_bytes_be(target);
    let two256: BigUint = BigUint::one() << 256usize;
    Ok(two256 / t)
}

fn biguint_to_bytes32(x: &BigUint) -> Result<[u8; 32], TxError> {
    let b = x.to_bytes_be();
    if b.len() > 32 {
        return Err(TxError::new(ErrorCode::TxErrParse, "u256: overflow"));
    }
    let mut out = [0u8; 32];
    out[32 - b.len()..].copy_from_slice(&b);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ChainProfile {
        ChainProfile::devnet()
    }

    #[test]
    fn pow_accepts_hash_equal_to_target() {
        let target = [0x7fu8; 32];
        pow_check(&target.clone(), &target, &[0xff; 32]).expect("equal hash passes");
    }

    #[test]
    fn pow_rejects_hash_above_target() {
        let mut hash = [0u8; 32];
        hash[0] = 0x80;
        let target = [0x7fu8; 32];
        let err = pow_check(&hash, &target, &[0xff; 32]).unwrap_err();
        assert_eq!(err.code, ErrorCode::BlockErrPowInvalid);
    }

    #[test]
    fn target_range_rejects_zero_and_above_limit() {
        let err = check_target_range(&[0u8; 32], &[0xff; 32]).unwrap_err();
        assert_eq!(err.code, ErrorCode::BlockErrTargetInvalid);

        let mut limit = [0xffu8; 32];
        limit[0] = 0x0f;
        let err = check_target_range(&[0xff; 32], &limit).unwrap_err();
        assert_eq!(err.code, ErrorCode::BlockErrTargetInvalid);
    }

    #[test]
    fn retarget_saturates_at_pow_limit_near_limit() {
        // Slow window (4x expected + more) with target_old near POW_LIMIT:
        // the raw product would exceed 256 bits; the clamp must saturate
        // and serialisation must not panic.
        let p = profile();
        let mut target_old = [0xffu8; 32];
        target_old[0] = 0xfe;

        let t_expected = p.target_block_interval * p.window_size;
        let got = retarget(&p, target_old, 0, 5 * t_expected).expect("retarget");
        assert_eq!(got, p.pow_limit);
    }

    #[test]
    fn retarget_clamps_to_quarter_on_fast_window() {
        let p = profile();
        let mut target_old = [0u8; 32];
        target_old[0] = 0x40; // comfortably below limit/4

        let got = retarget(&p, target_old, 1_000, 1_001).expect("retarget");
        let want = BigUint::from_bytes_be(&target_old) >> 2;
        assert_eq!(BigUint::from_bytes_be(&got), want);
    }

    #[test]
    fn retarget_scales_proportionally_within_clamps() {
        let p = profile();
        let mut target_old = [0u8; 32];
        target_old[16] = 0x01;

        let t_expected = p.target_block_interval * p.window_size;
        // Window took exactly twice as long: target doubles.
        let got = retarget(&p, target_old, 0, 2 * t_expected).expect("retarget");
        let want = BigUint::from_bytes_be(&target_old) * 2u32;
        assert_eq!(BigUint::from_bytes_be(&got), want);
    }

    #[test]
    fn retarget_floor_is_one() {
        let p = profile();
        let mut target_old = [0u8; 32];
        target_old[31] = 0x01;
        let got = retarget(&p, target_old, 1_000, 1_001).expect("retarget");
        assert_eq!(BigUint::from_bytes_be(&got), BigUint::one());
    }

    #[test]
    fn retarget_stays_in_range_across_extremes() {
        // Property 11: for any valid target_old the result stays in
        // [1, POW_LIMIT] without intermediate overflow.
        let p = profile();
        let one = {
            let mut t = [0u8; 32];
            t[31] = 1;
            t
        };
        for target_old in [one, [0x01u8; 32], [0x7f; 32], [0xff; 32]] {
            for (first, last) in [(0u64, 0u64), (0, u64::MAX), (u64::MAX, 0)] {
                let got = retarget(&p, target_old, first, last).expect("retarget");
                check_target_range(&got, &p.pow_limit).expect("in range");
            }
        }
    }

    #[test]
    fn work_is_inverse_in_target() {
        let limit = [0xffu8; 32];
        let mut half = [0u8; 32];
        half[0] = 0x80;

        let w_half = work_from_target(&half, &limit).unwrap();
        assert_eq!(w_half, BigUint::from(2u32));

        let mut one = [0u8; 32];
        one[31] = 1;
        let w_one = work_from_target(&one, &limit).unwrap();
        assert_eq!(w_one, BigUint::one() << 256usize);
    }
}
