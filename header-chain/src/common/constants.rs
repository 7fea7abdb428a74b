//! # Common Constants
//! Bitcoin consensus constants used across the header chain checks.

use crypto_bigint::U256;

/// Size of a serialized block header in bytes.
pub const HEADER_SIZE: usize = 80;

/// Number of blocks in a difficulty adjustment epoch.
///
/// Bitcoin recalculates the difficulty target every 2016 blocks based on the time
/// it took to mine those blocks compared to the expected timespan.
pub const BLOCKS_PER_EPOCH: u64 = 2016;

/// Expected duration of a difficulty adjustment epoch in seconds.
///
/// 2 weeks = 60 * 60 * 24 * 14 = 1,209,600 seconds
pub const EXPECTED_EPOCH_TIMESPAN: u32 = 60 * 60 * 24 * 14;

/// A single retarget may move the target by at most this factor in either
/// direction.
pub const RETARGET_ADJUSTMENT_FACTOR: u32 = 4;

/// Number of preceding timestamps used by the median time past rule.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Target of a difficulty 1 block (`0x1d00ffff`).
pub const DIFF1_TARGET: U256 =
    U256::from_be_hex("00000000FFFF0000000000000000000000000000000000000000000000000000");
