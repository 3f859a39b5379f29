//! Height-dependent consensus parameters.
//!
//! Everything here is a pure function of the block height and must match the
//! deployed chain bit for bit. Heights are `u32`; a height of zero stands in
//! for "before genesis".

use crate::U256;

pub const INITIAL_BLOCK_TIME: u64 = 3;
pub const BLOCK_TIME_MULTIPLE: u64 = 3;
pub const BLOCK_TIME_MILESTONE: u32 = 1_100_000;

pub const INITIAL_BLOCK_SIZE: usize = 100_000; // 100 kb
pub const BASE_BLOCK_SIZE: usize = 2_100_000; // 2.1 Mb
pub const BLOCK_SIZE_FACTOR: usize = 2_100; // 2.1 kb
pub const BLOCK_SIZE_CHANGING_INTERVAL: u32 = 2_100_000;

/// 2^240, the easiest allowed target (difficulty 1).
pub const BLOCK_TARGET_MAX: U256 = U256([0, 0, 0, 1 << 48]);

pub const DIFFICULTY_BLOCK_WINDOW: u32 = 120;

/// Mainnet fork heights. A chain that is not wire compatible with mainnet may
/// pick its own, but these are the values every mainnet node agrees on.
pub const FORKING_FOR_BLOCK_DIFFICULTY_BLOCK_SIZE: u32 = 1_124_816;
pub const SECOND_FORKING_FOR_BLOCK_DIFFICULTY: u32 = 1_132_333;

/// Adjustment factors as exact `(numerator, denominator)` fractions.
pub const DIFFICULTY_MAX_ADJUSTMENT_FACTOR: (u64, u64) = (2, 1);
pub const NEW_DIFFICULTY_MAX_ADJUSTMENT_FACTOR: (u64, u64) = (13, 10);
pub const NEW_DIFFICULTY_MIN_ADJUSTMENT_FACTOR: (u64, u64) = (7, 10);
pub const SECOND_DIFFICULTY_MAX_ADJUSTMENT_FACTOR: (u64, u64) = (3, 2);
pub const SECOND_DIFFICULTY_MIN_ADJUSTMENT_FACTOR: (u64, u64) = (1, 2);

pub const TRANSACTION_VALIDITY_WINDOW: u32 = 120;

pub const SATOSHIS_PER_COIN: u128 = 100_000_000_000;
pub const INITIAL_SUPPLY: u128 = 0;
pub const INITIAL_BLOCK_REWARD: u128 = 500_000_000_000;
pub const HALVING_TARGET_MAX: u32 = 21;
pub const HALVING_INTERVAL: u32 = 2_100_000;

// NIPoPoW security parameters
pub const M: u32 = 240;
pub const K: u32 = 120;
pub const DELTA: &str = "0.15";
pub const NUM_BLOCKS_VERIFICATION: u32 = 250;

pub const NUM_SNAPSHOTS_MAX: u32 = 20;

pub const INITIAL_TX_FEE: u128 = 1_000_000;
pub const TX_FEE_CHANGING_INTERVAL: u32 = 6_300_000;
pub const TX_FEE_CHANGING_TOTAL_NUMBER: u32 = 6;

const BLOCK_MILESTONE_MAX: u64 = HALVING_INTERVAL as u64 * HALVING_TARGET_MAX as u64;
const SECOND_BLOCK_TIME: u64 = BLOCK_TIME_MULTIPLE * HALVING_TARGET_MAX as u64;

pub fn block_reward_at(block_height: u32) -> u128 {
    if block_height == 0 {
        return 0;
    }
    let halving = ((block_height - 1) / HALVING_INTERVAL).min(HALVING_TARGET_MAX - 1);
    INITIAL_BLOCK_REWARD >> halving
}

pub fn block_time(block_height: u32) -> u64 {
    let height = u64::from(block_height);
    if block_height <= BLOCK_TIME_MILESTONE || height > BLOCK_MILESTONE_MAX {
        return INITIAL_BLOCK_TIME;
    }
    let era = (height - 1) / u64::from(HALVING_INTERVAL);
    BLOCK_TIME_MULTIPLE * (u64::from(HALVING_TARGET_MAX) - era)
}

/// Expected seconds elapsed between the genesis block and `block_height`.
pub fn targeted_time(block_height: u32) -> u64 {
    let height = u64::from(block_height.max(1));
    let milestone = u64::from(BLOCK_TIME_MILESTONE);
    let interval = u64::from(HALVING_INTERVAL);
    let halvings = u64::from(HALVING_TARGET_MAX);

    if height <= milestone {
        return (height - 1) * INITIAL_BLOCK_TIME;
    }

    let initial = milestone * INITIAL_BLOCK_TIME;
    if height <= interval {
        return initial + (height - milestone - 1) * SECOND_BLOCK_TIME;
    }

    let mut target = initial + (interval - milestone) * SECOND_BLOCK_TIME;
    let mut remaining = height - interval;
    let mut count = 1;
    while remaining > interval && count < halvings {
        target += interval * BLOCK_TIME_MULTIPLE * (halvings - count);
        remaining -= interval;
        count += 1;
    }

    if count >= halvings {
        target + (remaining - 1) * INITIAL_BLOCK_TIME
    } else {
        target + (remaining - 1) * BLOCK_TIME_MULTIPLE * (halvings - count)
    }
}

/// Expected seconds elapsed between blocks `begin` and `end`.
pub fn targeted_time_block_range(begin: u32, end: u32) -> u64 {
    let begin = u64::from(begin.max(1));
    let end = u64::from(end.max(1));
    if begin >= end {
        return 0;
    }

    let milestone = u64::from(BLOCK_TIME_MILESTONE);
    let interval = u64::from(HALVING_INTERVAL);
    let halvings = u64::from(HALVING_TARGET_MAX);
    let range = end - begin;

    if end <= milestone || begin > BLOCK_MILESTONE_MAX {
        return range * INITIAL_BLOCK_TIME;
    }

    if end <= interval {
        if begin <= milestone {
            return (milestone - begin + 1) * INITIAL_BLOCK_TIME
                + (end - milestone - 1) * SECOND_BLOCK_TIME;
        }
        return range * SECOND_BLOCK_TIME;
    }

    let begin_era = (begin - 1) / interval;
    let mut end_era = (end - 1) / interval;
    if begin_era == end_era {
        return range * BLOCK_TIME_MULTIPLE * (halvings - begin_era);
    }

    let begin_time = if begin <= milestone {
        (milestone - begin + 1) * INITIAL_BLOCK_TIME + (interval - milestone) * SECOND_BLOCK_TIME
    } else {
        let era_end = (begin_era + 1) * interval;
        (era_end - begin + 1) * BLOCK_TIME_MULTIPLE * (halvings - begin_era)
    };

    let end_time = if end > BLOCK_MILESTONE_MAX {
        end_era = halvings;
        (end - BLOCK_MILESTONE_MAX - 1) * INITIAL_BLOCK_TIME
    } else {
        let era_start = end_era * interval;
        (end - era_start - 1) * BLOCK_TIME_MULTIPLE * (halvings - end_era)
    };

    let middle_time: u64 = (begin_era + 1..end_era)
        .map(|era| interval * BLOCK_TIME_MULTIPLE * (halvings - era))
        .sum();

    begin_time + middle_time + end_time
}

pub fn tx_fee(block_height: u32) -> u128 {
    if block_height <= 1 {
        return 0;
    }
    let changing = (block_height - 1) / TX_FEE_CHANGING_INTERVAL;
    if changing < TX_FEE_CHANGING_TOTAL_NUMBER {
        INITIAL_TX_FEE / 10u128.pow(changing)
    } else {
        1
    }
}

pub fn block_size(block_height: u32) -> usize {
    if block_height < FORKING_FOR_BLOCK_DIFFICULTY_BLOCK_SIZE {
        return INITIAL_BLOCK_SIZE;
    }
    BASE_BLOCK_SIZE + BLOCK_SIZE_FACTOR * (block_height / BLOCK_SIZE_CHANGING_INTERVAL) as usize
}

pub fn difficulty_block_window(block_height: u32) -> u32 {
    if block_height >= SECOND_FORKING_FOR_BLOCK_DIFFICULTY
        || block_height < FORKING_FOR_BLOCK_DIFFICULTY_BLOCK_SIZE
    {
        return DIFFICULTY_BLOCK_WINDOW;
    }
    (360 / block_time(block_height)) as u32
}

/// Bounds for the retarget adjustment factor, as `(numerator, denominator)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustmentBand {
    pub min: (u64, u64),
    pub max: (u64, u64),
}

pub fn difficulty_adjustment_band(block_height: u32) -> AdjustmentBand {
    // The factor is clamped to [1 / max_factor, 1 / min_factor] after the forks.
    let invert = |(num, den): (u64, u64)| (den, num);
    if block_height >= SECOND_FORKING_FOR_BLOCK_DIFFICULTY {
        AdjustmentBand {
            min: invert(SECOND_DIFFICULTY_MAX_ADJUSTMENT_FACTOR),
            max: invert(SECOND_DIFFICULTY_MIN_ADJUSTMENT_FACTOR),
        }
    } else if block_height >= FORKING_FOR_BLOCK_DIFFICULTY_BLOCK_SIZE {
        AdjustmentBand {
            min: invert(NEW_DIFFICULTY_MAX_ADJUSTMENT_FACTOR),
            max: invert(NEW_DIFFICULTY_MIN_ADJUSTMENT_FACTOR),
        }
    } else {
        AdjustmentBand {
            min: invert(DIFFICULTY_MAX_ADJUSTMENT_FACTOR),
            max: DIFFICULTY_MAX_ADJUSTMENT_FACTOR,
        }
    }
}
