//! VERSION_BITS deployment state machine.
//!
//! State is a pure function of the ancestor-chain header versions, evaluated
//! window by window. Transitions happen only at window boundaries
//! (multiples of WINDOW_SIZE, height > 0), LOCKED_IN is evaluated before
//! FAILED at the same boundary, and ACTIVE / FAILED absorb.

use crate::block::BlockHeader;
use crate::error::{ErrorCode, TxError};
use crate::profile::Deployment;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeploymentState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Defined => "DEFINED",
            DeploymentState::Started => "STARTED",
            DeploymentState::LockedIn => "LOCKED_IN",
            DeploymentState::Active => "ACTIVE",
            DeploymentState::Failed => "FAILED",
        }
    }
}

fn next_state(
    prev: DeploymentState,
    boundary_height: u64,
    prev_window_signal_count: u32,
    d: &Deployment,
) -> DeploymentState {
    match prev {
        DeploymentState::Defined => {
            if boundary_height >= d.start_height {
                DeploymentState::Started
            } else {
                DeploymentState::Defined
            }
        }
        DeploymentState::Started => {
            if prev_window_signal_count >= d.activation_threshold {
                DeploymentState::LockedIn
            } else if boundary_height >= d.timeout_height {
                DeploymentState::Failed
            } else {
                DeploymentState::Started
            }
        }
        DeploymentState::LockedIn => DeploymentState::Active,
        DeploymentState::Active => DeploymentState::Active,
        DeploymentState::Failed => DeploymentState::Failed,
    }
}

/// Signals for a deployment bit within one window's worth of headers.
pub fn signals_in_window(headers: &[BlockHeader], bit: u8) -> u32 {
    let mask = 1u32 << bit;
    headers.iter().filter(|h| h.version & mask != 0).count() as u32
}

/// Deployment state governing the block at `block_height`.
///
/// `window_signal_counts[k]` is the signal count for the window covering
/// heights `(k*W, (k+1)*W]`; all of those heights are strict ancestors of
/// any block the resulting state governs. The slice must cover every full
/// window below the block's own window.
pub fn deployment_state_for_block(
    d: &Deployment,
    window_size: u64,
    block_height: u64,
    window_signal_counts: &[u32],
) -> Result<DeploymentState, TxError> {
    if d.name.is_empty() {
        return Err(TxError::new(ErrorCode::TxErrParse, "deployment name required"));
    }
    if d.bit > 28 {
        return Err(TxError::new(ErrorCode::TxErrParse, "deployment bit out of range"));
    }
    if d.timeout_height < d.start_height {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "deployment timeout_height < start_height",
        ));
    }
    if window_size == 0 {
        return Err(TxError::new(ErrorCode::TxErrParse, "window_size is zero"));
    }

    // Genesis sits before the first window; no boundary has passed.
    if block_height == 0 {
        return Ok(DeploymentState::Defined);
    }

    let window_index = (block_height - 1) / window_size;
    if window_signal_counts.len() < window_index as usize {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "insufficient window signal counts",
        ));
    }

    let mut state = DeploymentState::Defined;
    for k in 1..=window_index {
        let boundary = k * window_size;
        let prev_count = window_signal_counts[(k - 1) as usize];
        state = next_state(state, boundary, prev_count, d);
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(start: u64, timeout: u64, threshold: u32) -> Deployment {
        Deployment {
            name: "test_rule".to_string(),
            bit: 3,
            start_height: start,
            timeout_height: timeout,
            activation_threshold: threshold,
            ext_id: None,
        }
    }

    const W: u64 = 10;

    #[test]
    fn lifecycle_defined_started_locked_in_active() {
        let d = deployment(0, u64::MAX, 9);

        // Block in window 0: no boundary passed yet.
        let s = deployment_state_for_block(&d, W, 5, &[]).unwrap();
        assert_eq!(s, DeploymentState::Defined);

        // First boundary passed: STARTED.
        let s = deployment_state_for_block(&d, W, 11, &[0]).unwrap();
        assert_eq!(s, DeploymentState::Started);

        // Window 1 signalled at threshold: LOCKED_IN for window 2.
        let s = deployment_state_for_block(&d, W, 21, &[0, 9]).unwrap();
        assert_eq!(s, DeploymentState::LockedIn);

        // One more boundary: ACTIVE, and absorbing.
        let s = deployment_state_for_block(&d, W, 31, &[0, 9, 0]).unwrap();
        assert_eq!(s, DeploymentState::Active);
        let s = deployment_state_for_block(&d, W, 99, &[0, 9, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(s, DeploymentState::Active);
    }

    #[test]
    fn timeout_fails_and_absorbs() {
        let d = deployment(0, 20, 9);
        // Boundary 20 hits the timeout with insufficient signals.
        let s = deployment_state_for_block(&d, W, 21, &[0, 3]).unwrap();
        assert_eq!(s, DeploymentState::Failed);
        // Later signalling cannot revive it.
        let s = deployment_state_for_block(&d, W, 41, &[0, 3, 9, 9]).unwrap();
        assert_eq!(s, DeploymentState::Failed);
    }

    #[test]
    fn lock_in_wins_over_timeout_at_same_boundary() {
        let d = deployment(0, 20, 9);
        // Boundary 20: threshold met in window 1 and timeout reached;
        // LOCKED_IN is evaluated first.
        let s = deployment_state_for_block(&d, W, 21, &[0, 9]).unwrap();
        assert_eq!(s, DeploymentState::LockedIn);
        let s = deployment_state_for_block(&d, W, 31, &[0, 9, 0]).unwrap();
        assert_eq!(s, DeploymentState::Active);
    }

    #[test]
    fn state_constant_within_window() {
        let d = deployment(0, u64::MAX, 9);
        for h in 11..=20 {
            let s = deployment_state_for_block(&d, W, h, &[0, 9]).unwrap();
            assert_eq!(s, DeploymentState::Started, "height {h}");
        }
    }

    #[test]
    fn signal_counting_masks_single_bit() {
        let mk = |version: u32| BlockHeader {
            version,
            prev_block_hash: [0; 32],
            merkle_root: [0; 32],
            timestamp: 0,
            target: [0xff; 32],
            nonce: 0,
        };
        let headers = vec![mk(1 << 3), mk(1 << 2), mk((1 << 3) | 1), mk(0)];
        assert_eq!(signals_in_window(&headers, 3), 2);
        assert_eq!(signals_in_window(&headers, 2), 1);
    }

    #[test]
    fn rejects_bad_deployment_parameters() {
        let mut d = deployment(10, 5, 1);
        assert!(deployment_state_for_block(&d, W, 1, &[]).is_err());
        d.timeout_height = 20;
        d.bit = 29;
        assert!(deployment_state_for_block(&d, W, 1, &[]).is_err());
    }
}
