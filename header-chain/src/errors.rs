//! # Errors
//!
//! Failures of header parsing and header chain verification. Every error is
//! terminal for the call that produced it.

use bitcoin::BlockHash;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum HeaderChainError {
    #[error("Header bytes must be a positive multiple of 80, got {0} bytes")]
    MalformedInput(usize),

    #[error("Header {index} does not extend {expected}: its previous block hash is {actual}")]
    ChainDiscontinuity {
        index: usize,
        expected: BlockHash,
        actual: BlockHash,
    },

    #[error("Header {index} ({hash}) does not meet its target, bits {bits:#010x}")]
    InsufficientProofOfWork {
        index: usize,
        hash: BlockHash,
        bits: u32,
    },

    #[error("Invalid difficulty transition at header {index}: {reason}")]
    InvalidDifficultyTransition { index: usize, reason: &'static str },

    #[error(
        "Retarget at header {index} from bits {old_bits:#010x} to {new_bits:#010x} exceeds the adjustment bound"
    )]
    RetargetOutOfBounds {
        index: usize,
        old_bits: u32,
        new_bits: u32,
    },

    #[error("Header {index} timestamp {time} is not after the median time past {median}")]
    InvalidTimestamp { index: usize, time: u32, median: u32 },
}
