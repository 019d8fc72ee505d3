use crate::profile::SubsidySchedule;

/// Block subsidy at `height` given the subsidy already generated by heights
/// `1..height`. Genesis carries no subsidy; once the mineable cap is reached
/// the tail emission applies forever.
pub fn block_subsidy(s: &SubsidySchedule, height: u64, already_generated: u64) -> u64 {
    if height == 0 {
        return 0;
    }
    if already_generated >= s.mineable_cap {
        return s.tail_emission_per_block;
    }
    let remaining = s.mineable_cap - already_generated;
    let base_reward = remaining >> s.emission_speed_factor;
    if base_reward < s.tail_emission_per_block {
        s.tail_emission_per_block
    } else {
        base_reward
    }
}

/// Fold the schedule from genesis: subsidy-only total generated by heights
/// `1..height`. Deterministic in `height` alone, so chain state never has to
/// persist it.
pub fn already_generated_at(s: &SubsidySchedule, height: u64) -> u64 {
    let mut generated = 0u64;
    let mut h = 1u64;
    while h < height {
        generated = generated.saturating_add(block_subsidy(s, h, generated));
        h += 1;
    }
    generated
}
