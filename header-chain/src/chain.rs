//! # Header Chain Verification
//!
//! Verifies that a batch of headers forms a contiguous, proof-of-work valid
//! chain. The verifier keeps no state of its own. What the batch is expected
//! to connect to, which target it starts with and whether it may cross an
//! epoch boundary are all given by the caller.

use bitcoin::{hashes::Hash, BlockHash};
use crypto_bigint::U256;

use crate::{
    common::constants::MEDIAN_TIME_SPAN,
    errors::HeaderChainError,
    header::RelayHeader,
    pow::{bits_to_target, check_hash_valid, check_retarget_bounds},
};

/// How a target change inside a batch is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochTransition {
    /// Any new target within the retarget bound is accepted.
    Free,
    /// The new target must equal the given, already known, target.
    To(U256),
    /// The batch must stay within a single epoch.
    Forbidden,
}

/// Facts about a verified batch of headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSummary {
    pub last_hash: BlockHash,
    pub header_count: usize,
    pub starting_timestamp: u32,
    /// Index of the first header using the new target, if the target changed.
    pub retarget_index: Option<usize>,
    pub end_target: U256,
}

/// Verifies linkage, proof of work, target consistency and the median time
/// past rule for every header in `headers`.
///
/// ## Parameters
///
/// * `headers` - Headers in chain order
/// * `expected_ancestor` - Hash the first header must build on, if known
/// * `start_target` - Target the first header must use
/// * `transition` - Rule for at most one target change within the batch
///
/// The median time past rule is applied to headers that have at least 11
/// predecessors inside the batch.
pub fn verify_chain(
    headers: &[RelayHeader],
    expected_ancestor: Option<BlockHash>,
    start_target: U256,
    transition: EpochTransition,
) -> Result<ChainSummary, HeaderChainError> {
    let Some(first) = headers.first() else {
        return Err(HeaderChainError::MalformedInput(0));
    };

    let mut expected_prev = expected_ancestor.map(|hash| hash.to_byte_array());
    let mut current_target = start_target;
    let mut retarget_index = None;
    let mut last_hash = [0u8; 32];

    for (index, header) in headers.iter().enumerate() {
        if let Some(expected) = expected_prev {
            if header.prev_block_hash != expected {
                return Err(HeaderChainError::ChainDiscontinuity {
                    index,
                    expected: BlockHash::from_byte_array(expected),
                    actual: header.prev_blockhash(),
                });
            }
        }

        let target = bits_to_target(header.bits);
        if target != current_target {
            if index == 0 {
                return Err(HeaderChainError::InvalidDifficultyTransition {
                    index,
                    reason: "first header does not use the starting target",
                });
            }
            if retarget_index.is_some() {
                return Err(HeaderChainError::InvalidDifficultyTransition {
                    index,
                    reason: "target changes more than once",
                });
            }

            match transition {
                EpochTransition::Free => {
                    if !check_retarget_bounds(&current_target, &target) {
                        return Err(HeaderChainError::RetargetOutOfBounds {
                            index,
                            old_bits: headers[index - 1].bits,
                            new_bits: header.bits,
                        });
                    }
                }
                EpochTransition::To(next_target) => {
                    if target != next_target {
                        return Err(HeaderChainError::InvalidDifficultyTransition {
                            index,
                            reason: "target does not match the next epoch",
                        });
                    }
                }
                EpochTransition::Forbidden => {
                    return Err(HeaderChainError::InvalidDifficultyTransition {
                        index,
                        reason: "unexpected target change",
                    });
                }
            }

            tracing::trace!("Target changes at header {index} to bits {:#010x}", header.bits);
            retarget_index = Some(index);
            current_target = target;
        }

        let hash = header.compute_block_hash();
        if !check_hash_valid(&hash, &target) {
            return Err(HeaderChainError::InsufficientProofOfWork {
                index,
                hash: BlockHash::from_byte_array(hash),
                bits: header.bits,
            });
        }

        if index >= MEDIAN_TIME_SPAN {
            let mut prev_timestamps = [0u32; MEDIAN_TIME_SPAN];
            for (slot, prev) in prev_timestamps
                .iter_mut()
                .zip(&headers[index - MEDIAN_TIME_SPAN..index])
            {
                *slot = prev.time;
            }

            let median_time = median(prev_timestamps);
            if header.time <= median_time {
                return Err(HeaderChainError::InvalidTimestamp {
                    index,
                    time: header.time,
                    median: median_time,
                });
            }
        }

        expected_prev = Some(hash);
        last_hash = hash;
    }

    Ok(ChainSummary {
        last_hash: BlockHash::from_byte_array(last_hash),
        header_count: headers.len(),
        starting_timestamp: first.time,
        retarget_index,
        end_target: current_target,
    })
}

/// Median of 11 timestamps (6th element when sorted).
pub fn median(arr: [u32; MEDIAN_TIME_SPAN]) -> u32 {
    let mut sorted_arr = arr;
    sorted_arr.sort_unstable();
    sorted_arr[MEDIAN_TIME_SPAN / 2]
}
