//! Deployment-state derivation.
//!
//! The FSM has no independent state: the view handed to validation
//! is derived on demand from ancestor header versions. Window signal counts
//! are rebuilt by walking the parent chain back to genesis; chains in scope
//! here are short enough that caching is a later optimisation, not a
//! correctness concern.

use rubin_consensus::{
    deployment_state_for_block, ChainProfile, DeploymentState, DeploymentView,
    SLH_DSA_P2PK_DEPLOYMENT,
};

use crate::db::Store;
use crate::error::StoreError;

/// Derive the deployment view governing a candidate block at `height` whose
/// parent is `parent_hash` (None only for genesis).
pub fn derive_deployment_view(
    store: &Store,
    profile: &ChainProfile,
    parent_hash: Option<&[u8; 32]>,
    height: u64,
) -> Result<DeploymentView, StoreError> {
    let mut view = DeploymentView::default();
    if profile.deployments.is_empty() {
        return Ok(view);
    }

    // Full windows strictly below the candidate's own window.
    let window_count = if height == 0 {
        0
    } else {
        (height - 1) / profile.window_size
    };

    // Header versions for heights 1..=window_count*W, gathered by walking
    // the parent chain. versions[h-1] is the version at height h.
    let covered = window_count * profile.window_size;
    let mut versions: Vec<u32> = vec![0; covered as usize];
    if covered > 0 {
        let mut cursor = *parent_hash.ok_or_else(|| {
            StoreError::Db("deployment derivation: missing parent".into())
        })?;
        let mut h = height - 1;
        loop {
            let header = store.get_header(&cursor)?.ok_or_else(|| {
                StoreError::Db("deployment derivation: missing ancestor header".into())
            })?;
            if h >= 1 && h <= covered {
                versions[(h - 1) as usize] = header.version;
            }
            if h == 0 {
                break;
            }
            cursor = header.prev_block_hash;
            h -= 1;
        }
    }

    for d in &profile.deployments {
        let mask = 1u32 << d.bit;
        let mut counts: Vec<u32> = Vec::with_capacity(window_count as usize);
        for k in 0..window_count {
            let start = (k * profile.window_size) as usize;
            let end = ((k + 1) * profile.window_size) as usize;
            let count = versions[start..end]
                .iter()
                .filter(|v| *v & mask != 0)
                .count() as u32;
            counts.push(count);
        }

        let state = deployment_state_for_block(d, profile.window_size, height, &counts)
            .map_err(StoreError::Consensus)?;
        if state != DeploymentState::Active {
            continue;
        }
        if d.name == SLH_DSA_P2PK_DEPLOYMENT {
            view.slh_dsa_p2pk_active = true;
        }
        if let Some(ext_id) = d.ext_id {
            view.active_ext_ids.push(ext_id);
        }
    }

    Ok(view)
}
