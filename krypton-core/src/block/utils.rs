//! Compact target encoding and difficulty retargeting.

use anyhow::{anyhow, Result};
use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::BigDecimal;

use super::BlockHeader;
use crate::policy::{self, BLOCK_TARGET_MAX};
use crate::primitives::Hash;
use crate::U256;

pub fn compact_to_target(compact: u32) -> U256 {
    // The size byte is read as a signed value, so sizes of 0x80 and above
    // never shift the mantissa.
    let size = (compact as i32) >> 24;
    let shift = 8 * (size - 3).max(0) as usize;
    let mantissa = U256::from(compact & 0x00ff_ffff);
    if mantissa.is_zero() {
        return U256::zero();
    }
    if shift + mantissa.bits() > 256 {
        return U256::MAX;
    }
    mantissa << shift
}

pub fn target_to_compact(target: U256) -> u32 {
    let mut size = get_target_height(target).div_ceil(8).max(1);
    let first_byte = target >> (8 * (size as usize - 1));
    if first_byte >= U256::from(0x80) && size >= 3 {
        size += 1;
    }
    let shift = 8 * size.saturating_sub(3) as usize;
    let mantissa = (target >> shift).low_u32() & 0x00ff_ffff;
    (size << 24) | mantissa
}

/// `ceil(log2(target))`; zero for a zero target.
pub fn get_target_height(target: U256) -> u32 {
    if target.is_zero() {
        return 0;
    }
    let bits = target.bits() as u32;
    if target == U256::one() << (bits - 1) {
        bits - 1
    } else {
        bits
    }
}

pub fn get_target_depth(target: U256) -> i32 {
    get_target_height(BLOCK_TARGET_MAX) as i32 - get_target_height(target) as i32
}

pub fn compact_to_difficulty(compact: u32) -> Result<BigDecimal> {
    target_to_difficulty(compact_to_target(compact))
}

pub fn difficulty_to_compact(difficulty: &BigDecimal) -> Result<u32> {
    Ok(target_to_compact(difficulty_to_target(difficulty)?))
}

/// `BLOCK_TARGET_MAX / difficulty`, rounded down.
pub fn difficulty_to_target(difficulty: &BigDecimal) -> Result<U256> {
    if *difficulty <= BigDecimal::from(0) {
        return Err(anyhow!("Difficulty must be positive, got {}", difficulty));
    }
    Ok(decimal_to_target(
        &(u256_to_decimal(BLOCK_TARGET_MAX) / difficulty.clone()),
    ))
}

pub fn target_to_difficulty(target: U256) -> Result<BigDecimal> {
    if target.is_zero() {
        return Err(anyhow!("Cannot compute the difficulty of a zero target"));
    }
    Ok(u256_to_decimal(BLOCK_TARGET_MAX) / u256_to_decimal(target))
}

/// Reads the hash as a big-endian integer.
pub fn hash_to_target(hash: &Hash) -> U256 {
    let bytes = hash.as_bytes();
    if bytes.len() > 32 {
        return U256::MAX;
    }
    U256::from_big_endian(bytes)
}

pub fn real_difficulty(hash: &Hash) -> Result<BigDecimal> {
    target_to_difficulty(hash_to_target(hash))
}

pub fn get_hash_depth(hash: &Hash) -> i32 {
    get_target_depth(hash_to_target(hash))
}

pub fn is_proof_of_work(hash: &Hash, target: U256) -> bool {
    hash_to_target(hash) <= target
}

pub fn is_valid_compact(compact: u32) -> bool {
    is_valid_target(compact_to_target(compact))
}

pub fn is_valid_target(target: U256) -> bool {
    target >= U256::one() && target <= BLOCK_TARGET_MAX
}

/// Computes the target for the block after `head`.
///
/// `tail` must be exactly one difficulty window behind `head`, or the genesis
/// block while the chain is still shorter than a window. Blocks before the
/// genesis block are treated as if they had been mined at the initial block
/// time with difficulty 1.
pub fn get_next_target(
    head: &BlockHeader,
    tail: &BlockHeader,
    delta_total_difficulty: &BigDecimal,
) -> Result<U256> {
    let block_window = policy::difficulty_block_window(head.height);
    let apart = head.height.checked_sub(tail.height) == Some(block_window);
    if !apart && !(head.height <= block_window && tail.height == 1) {
        return Err(anyhow!(
            "Tail and head block must be {} blocks apart (head {}, tail {})",
            block_window,
            head.height,
            tail.height
        ));
    }

    let mut actual_time = i128::from(head.timestamp) - i128::from(tail.timestamp);
    let mut delta_total_difficulty = delta_total_difficulty.clone();
    if head.height <= block_window {
        let missing = block_window - head.height + 1;
        actual_time += i128::from(missing) * i128::from(policy::INITIAL_BLOCK_TIME);
        delta_total_difficulty += BigDecimal::from(missing);
    }
    if delta_total_difficulty <= BigDecimal::from(0) {
        return Err(anyhow!(
            "Total difficulty over the window must be positive, got {}",
            delta_total_difficulty
        ));
    }

    let expected_time =
        i128::from(block_window) * i128::from(policy::block_time(head.height));
    let (num, den) = clamp_adjustment(
        actual_time,
        expected_time,
        policy::difficulty_adjustment_band(head.height),
    );

    // averageTarget * adjustment, where averageTarget = MAX / (delta / window).
    let numerator = u256_to_decimal(BLOCK_TARGET_MAX)
        * BigDecimal::from(block_window)
        * BigDecimal::new(BigInt::from(num), 0);
    let denominator = delta_total_difficulty * BigDecimal::new(BigInt::from(den), 0);
    let mut next_target = numerator / denominator;

    let max = u256_to_decimal(BLOCK_TARGET_MAX);
    let one = BigDecimal::from(1);
    if next_target > max {
        next_target = max;
    }
    if next_target < one {
        next_target = one;
    }

    let n_bits = target_to_compact(decimal_to_target(&next_target));
    Ok(compact_to_target(n_bits))
}

/// Clamps `actual / expected` into `band`, returned as an exact fraction.
fn clamp_adjustment(
    actual: i128,
    expected: i128,
    band: policy::AdjustmentBand,
) -> (i128, i128) {
    let (min_num, min_den) = (i128::from(band.min.0), i128::from(band.min.1));
    let (max_num, max_den) = (i128::from(band.max.0), i128::from(band.max.1));
    if actual * min_den < min_num * expected {
        (min_num, min_den)
    } else if actual * max_den > max_num * expected {
        (max_num, max_den)
    } else {
        (actual, expected)
    }
}

pub(crate) fn u256_to_decimal(value: U256) -> BigDecimal {
    let digits = BigInt::from_bytes_be(Sign::Plus, &value.to_big_endian());
    BigDecimal::new(digits, 0)
}

/// Truncates towards zero; negative values map to zero and values too large
/// for 256 bits saturate.
pub(crate) fn decimal_to_target(value: &BigDecimal) -> U256 {
    let (digits, _) = value.with_scale(0).into_bigint_and_exponent();
    let (sign, bytes) = digits.to_bytes_be();
    if sign == Sign::Minus {
        return U256::zero();
    }
    if bytes.len() > 32 {
        return U256::MAX;
    }
    U256::from_big_endian(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{
        FORKING_FOR_BLOCK_DIFFICULTY_BLOCK_SIZE, SECOND_FORKING_FOR_BLOCK_DIFFICULTY,
    };

    fn header(height: u32, timestamp: u32) -> BlockHeader {
        BlockHeader {
            height,
            timestamp,
            ..BlockHeader::default()
        }
    }

    #[test]
    fn test_compact_conversions() {
        assert_eq!(compact_to_target(0x1f01_0000), BLOCK_TARGET_MAX);
        assert_eq!(target_to_compact(BLOCK_TARGET_MAX), 0x1f01_0000);

        assert_eq!(compact_to_target(0x0300_ffff), U256::from(0xffff));
        assert_eq!(compact_to_target(0x0100_0001), U256::from(1));
        assert_eq!(target_to_compact(U256::from(1)), 0x0100_0001);
        assert_eq!(target_to_compact(U256::from(0xff)), 0x0100_00ff);
        assert_eq!(target_to_compact(U256::from(0x1234)), 0x0200_1234);
    }

    #[test]
    fn test_compact_pads_high_mantissa_byte() {
        let target = U256::from(0x80) << 16;
        let compact = target_to_compact(target);
        assert_eq!(compact, 0x0400_8000);
        assert_eq!(compact_to_target(compact), target);

        let wide = U256::from(0x80_1234_5678u64);
        let compact = target_to_compact(wide);
        assert_eq!(compact >> 24, 6);
        assert_eq!(compact & 0x00ff_ffff, 0x0080_12);
    }

    #[test]
    fn test_compact_round_trip_is_idempotent() {
        let targets = [
            U256::from(1),
            U256::from(0x7f),
            U256::from(0x80),
            U256::from(0x8000),
            U256::from(0x80_0000),
            U256::from(0xffff_ffffu64),
            U256::from(0x1234_5678_9abcu64) << 100,
            (U256::from(0x80) << 232) - 1,
            BLOCK_TARGET_MAX,
        ];
        for target in targets {
            let once = compact_to_target(target_to_compact(target));
            assert!(once <= target, "{target:x} grew to {once:x}");
            let twice = compact_to_target(target_to_compact(once));
            assert_eq!(once, twice, "requantizing {target:x} is not stable");
        }
    }

    #[test]
    fn test_compact_overflow_is_invalid() {
        assert_eq!(compact_to_target(0x2201_0000), U256::MAX);
        assert!(!is_valid_compact(0x2201_0000));
        assert!(!is_valid_compact(0x0300_0000));
        assert!(is_valid_compact(0x1f01_0000));
        assert!(!is_valid_compact(0x1f01_0001));
    }

    #[test]
    fn test_target_height_and_depth() {
        assert_eq!(get_target_height(U256::one()), 0);
        assert_eq!(get_target_height(U256::from(2)), 1);
        assert_eq!(get_target_height(U256::from(3)), 2);
        assert_eq!(get_target_height(BLOCK_TARGET_MAX), 240);
        assert_eq!(get_target_depth(BLOCK_TARGET_MAX), 0);
        assert_eq!(get_target_depth(BLOCK_TARGET_MAX >> 10), 10);
    }

    #[test]
    fn test_difficulty_conversions() {
        let difficulty = target_to_difficulty(BLOCK_TARGET_MAX >> 4).unwrap();
        assert_eq!(difficulty, BigDecimal::from(16));
        assert_eq!(difficulty_to_target(&difficulty).unwrap(), BLOCK_TARGET_MAX >> 4);
        assert_eq!(
            difficulty_to_compact(&BigDecimal::from(1)).unwrap(),
            0x1f01_0000
        );
        assert!(target_to_difficulty(U256::zero()).is_err());
        assert!(difficulty_to_target(&BigDecimal::from(0)).is_err());
    }

    #[test]
    fn test_hash_to_target() {
        let hash = Hash::light(b"block");
        let target = hash_to_target(&hash);
        assert_eq!(target.to_big_endian().as_slice(), hash.as_bytes());
        assert!(is_proof_of_work(&hash, target));
        assert!(!is_proof_of_work(&hash, target - U256::one()));
    }

    #[test]
    fn test_next_target_stable_at_expected_pace() {
        let window = policy::DIFFICULTY_BLOCK_WINDOW;
        let head = header(1000, 10_000 + window * 3);
        let tail = header(1000 - window, 10_000);
        let target =
            get_next_target(&head, &tail, &BigDecimal::from(window * 16)).unwrap();
        assert_eq!(target, BLOCK_TARGET_MAX >> 4);
    }

    #[test]
    fn test_next_target_clamped_in_each_band() {
        // Ten times slower than expected: the target may only grow by the band maximum.
        let cases = [
            (1000u32, 2u64, 1u64),
            (FORKING_FOR_BLOCK_DIFFICULTY_BLOCK_SIZE + 1, 10, 7),
            (SECOND_FORKING_FOR_BLOCK_DIFFICULTY + 1, 2, 1),
        ];
        for (height, num, den) in cases {
            let window = policy::difficulty_block_window(height);
            let expected = u64::from(window) * policy::block_time(height);
            let head = header(height, (expected * 10) as u32);
            let tail = header(height - window, 0);
            let delta = BigDecimal::from(u64::from(window) * 1024);
            let target = get_next_target(&head, &tail, &delta).unwrap();

            let average = BLOCK_TARGET_MAX >> 10;
            let bound = average * U256::from(num) / U256::from(den);
            assert!(target <= bound, "height {height}: {target:x} > {bound:x}");
            assert_eq!(target, compact_to_target(target_to_compact(bound)));
        }
    }

    #[test]
    fn test_next_target_never_leaves_valid_range() {
        let window = policy::DIFFICULTY_BLOCK_WINDOW;
        let head = header(1000, 1_000_000);
        let tail = header(1000 - window, 0);
        let easy = get_next_target(&head, &tail, &BigDecimal::from(window)).unwrap();
        assert_eq!(easy, BLOCK_TARGET_MAX);

        let fast = header(1000, 0);
        let hard = get_next_target(&fast, &tail, &BigDecimal::from(1u64 << 62)).unwrap();
        assert!(is_valid_target(hard));
        assert!(hard >= U256::one());
    }

    #[test]
    fn test_next_target_near_genesis() {
        let head = header(10, 27);
        let genesis = header(1, 0);
        let target = get_next_target(&head, &genesis, &BigDecimal::from(9)).unwrap();
        // 27s for nine blocks plus 111 simulated blocks at 3s, all at difficulty 1.
        assert_eq!(target, BLOCK_TARGET_MAX);

        let wrong_tail = header(5, 0);
        assert!(get_next_target(&head, &wrong_tail, &BigDecimal::from(9)).is_err());
    }
}
