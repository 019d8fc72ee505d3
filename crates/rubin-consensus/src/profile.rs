//! Per-chain-instance configuration. Loaded once at node startup and treated
//! as immutable for the process lifetime; the validation engine never reads
//! anything chain-specific from any other source.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubsidySchedule {
    /// Total subsidy mineable before tail emission takes over.
    pub mineable_cap: u64,
    /// Per-block reward is `(cap - generated) >> emission_speed_factor`.
    pub emission_speed_factor: u32,
    pub tail_emission_per_block: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deployment {
    pub name: String,
    /// Header version bit, 0..=28.
    pub bit: u8,
    pub start_height: u64,
    pub timeout_height: u64,
    /// Signalling headers required within one window to lock in.
    pub activation_threshold: u32,
    /// Set when this deployment activates a CORE_EXT covenant id.
    pub ext_id: Option<u16>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainProfile {
    pub chain_id: [u8; 32],
    pub pow_limit: [u8; 32],
    pub window_size: u64,
    pub target_block_interval: u64,
    pub max_block_weight: u64,
    pub max_da_bytes_per_block: u64,
    pub max_da_batches_per_block: u64,
    pub max_future_drift: u64,
    pub coinbase_maturity: u64,
    pub subsidy: SubsidySchedule,
    pub deployments: Vec<Deployment>,
}

impl ChainProfile {
    /// Devnet profile: all-ones PoW limit so any header hash satisfies PoW,
    /// plus the two optional-rule deployments at a 90% threshold.
    pub fn devnet() -> Self {
        Self {
            chain_id: [0u8; 32],
            pow_limit: [0xff; 32],
            window_size: 10_080,
            target_block_interval: 600,
            max_block_weight: 68_000_000,
            max_da_bytes_per_block: 32_000_000,
            max_da_batches_per_block: 128,
            max_future_drift: 7_200,
            coinbase_maturity: 100,
            subsidy: SubsidySchedule {
                mineable_cap: 1_000_000_000_000_000,
                emission_speed_factor: 20,
                tail_emission_per_block: 600_000,
            },
            deployments: vec![
                Deployment {
                    name: crate::constants::SLH_DSA_P2PK_DEPLOYMENT.to_string(),
                    bit: 1,
                    start_height: 0,
                    timeout_height: u64::MAX,
                    activation_threshold: 9_072,
                    ext_id: None,
                },
                Deployment {
                    name: "core_ext_v1".to_string(),
                    bit: 2,
                    start_height: 0,
                    timeout_height: u64::MAX,
                    activation_threshold: 9_072,
                    ext_id: Some(0x0001),
                },
            ],
        }
    }

    pub fn deployment(&self, name: &str) -> Option<&Deployment> {
        self.deployments.iter().find(|d| d.name == name)
    }
}
