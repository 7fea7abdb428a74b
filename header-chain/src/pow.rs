//! # Proof of Work
//!
//! Compact target encoding, work and difficulty calculations, and the
//! difficulty retarget rules.

use bitcoin::Network;
use crypto_bigint::{Encoding, U256};
use num_bigint::BigUint;

use crate::common::constants::{DIFF1_TARGET, EXPECTED_EPOCH_TIMESPAN, RETARGET_ADJUSTMENT_FACTOR};

/// Network configuration holder for Bitcoin-specific constants.
///
/// The maximum target defines the lowest possible difficulty for the network.
///
/// ## Network-Specific Values
///
/// - **Mainnet/Testnet**: `max_bits = 0x1D00FFFF` (standard Bitcoin difficulty)
/// - **Signet**: `max_bits = 0x1E0377AE`
/// - **Regtest**: `max_bits = 0x207FFFFF` (minimal difficulty for testing)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConstants {
    pub max_bits: u32,
    pub max_target: U256,
    pub expected_epoch_timespan: u32,
}

impl NetworkConstants {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Signet => NetworkConstants {
                max_bits: 0x1E0377AE,
                max_target: U256::from_be_hex(
                    "00000377AE000000000000000000000000000000000000000000000000000000",
                ),
                expected_epoch_timespan: EXPECTED_EPOCH_TIMESPAN,
            },
            Network::Regtest => NetworkConstants {
                max_bits: 0x207FFFFF,
                max_target: U256::from_be_hex(
                    "7FFFFF0000000000000000000000000000000000000000000000000000000000",
                ),
                expected_epoch_timespan: EXPECTED_EPOCH_TIMESPAN,
            },
            _ => NetworkConstants {
                max_bits: 0x1D00FFFF,
                max_target: DIFF1_TARGET,
                expected_epoch_timespan: EXPECTED_EPOCH_TIMESPAN,
            },
        }
    }
}

/// Converts compact target representation (bits) to a full 256-bit target.
///
/// The compact target uses a floating-point-like representation:
/// - Bits 24-31: Size/exponent (how many bytes the mantissa occupies)
/// - Bits 0-23: Mantissa (the significant digits)
///
/// Negative and overflowing encodings decode to zero, which no block hash can
/// meet.
pub fn bits_to_target(bits: u32) -> U256 {
    let size = (bits >> 24) as usize;
    let mantissa = bits & 0x00ffffff;

    // Mantissa is signed in Bitcoin core, if the sign bit is set, the target is set to 0.
    // https://github.com/bitcoin/bitcoin/blob/ee42d59d4de970769ebabf77b89ff4269498f61e/src/arith_uint256.cpp#L175
    if mantissa > 0x7F_FFFF || mantissa == 0 {
        return U256::ZERO;
    }

    let overflows =
        size > 34 || (mantissa > 0xff && size > 33) || (mantissa > 0xffff && size > 32);
    if overflows {
        return U256::ZERO;
    }

    if size <= 3 {
        U256::from(mantissa >> (8 * (3 - size)))
    } else {
        U256::from(mantissa) << (8 * (size - 3))
    }
}

/// Converts a full target to its compact representation (bits), as
/// `GetCompact` does in Bitcoin Core. Precision below the three most
/// significant bytes is truncated.
pub fn target_to_bits(target: &U256) -> u32 {
    let bytes = target.to_be_bytes();
    let mut size = target.bits().div_ceil(8);

    let mut mantissa = if size <= 3 {
        u32::from_be_bytes([0, bytes[29], bytes[30], bytes[31]]) << (8 * (3 - size))
    } else {
        let start = 32 - size;
        u32::from_be_bytes([0, bytes[start], bytes[start + 1], bytes[start + 2]])
    };

    // The sign bit must stay clear, move one byte into the exponent instead.
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        size += 1;
    }

    ((size as u32) << 24) | mantissa
}

/// Validates that a block hash meets the proof-of-work requirement.
///
/// The hash is in raw byte order, which is little-endian when read as a number.
pub fn check_hash_valid(hash: &[u8; 32], target: &U256) -> bool {
    U256::from_le_bytes(*hash) <= *target
}

/// Expected number of hashes needed to meet `target`, `2^256 / (target + 1)`.
///
/// Computed as `!target / (target + 1) + 1` since `2^256` does not fit in
/// 256 bits. Targets of zero and one saturate.
pub fn header_work(target: &U256) -> U256 {
    if *target <= U256::ONE {
        return U256::MAX;
    }
    if *target == U256::MAX {
        return U256::ONE;
    }

    (!*target)
        .wrapping_div(&target.wrapping_add(&U256::ONE))
        .wrapping_add(&U256::ONE)
}

/// Difficulty relative to a difficulty 1 block, `DIFF1_TARGET / target`.
///
/// Targets easier than difficulty 1 (test networks) yield 0. A zero target is
/// unreachable and yields the maximum value.
pub fn difficulty(target: &U256) -> U256 {
    if *target == U256::ZERO {
        return U256::MAX;
    }
    DIFF1_TARGET.wrapping_div(target)
}

/// Target expected for the epoch following one that started at
/// `epoch_start_time` and whose last block has `epoch_end_time`.
///
/// ## Algorithm
///
/// 1. Calculate actual timespan: `epoch_end_time - epoch_start_time`
/// 2. Clamp timespan to [expected/4, expected*4] to limit adjustment range
/// 3. New target = old target / 65536 * actual_timespan / expected_timespan * 65536
/// 4. Ensure new target doesn't exceed network maximum
///
/// The division by 65536 before multiplying drops the low 16 bits of the
/// target, so the result matches deployments that compute it in 256 bits.
pub fn retarget_algorithm(
    previous_target: &U256,
    epoch_start_time: u32,
    epoch_end_time: u32,
    network: &NetworkConstants,
) -> U256 {
    let expected = network.expected_epoch_timespan;
    let actual_timespan = epoch_end_time.saturating_sub(epoch_start_time).clamp(
        expected / RETARGET_ADJUSTMENT_FACTOR,
        expected.saturating_mul(RETARGET_ADJUSTMENT_FACTOR),
    );

    let previous = BigUint::from_bytes_be(&previous_target.to_be_bytes());
    let new_target = previous / 65536u32 * actual_timespan / expected * 65536u32;

    let max_target = BigUint::from_bytes_be(&network.max_target.to_be_bytes());
    if new_target > max_target {
        return network.max_target;
    }

    let bytes = new_target.to_bytes_be();
    let mut padded = [0u8; 32];
    padded[32 - bytes.len()..].copy_from_slice(&bytes);
    U256::from_be_bytes(padded)
}

/// Whether `new` lies within a factor of 4 of `old` in either direction.
/// Exactly 4 is allowed. The relation is symmetric, so it holds for targets
/// and difficulties alike.
pub fn check_retarget_bounds(old: &U256, new: &U256) -> bool {
    within_factor(old, new) && within_factor(new, old)
}

/// `larger <= smaller * 4`, without overflowing.
fn within_factor(smaller: &U256, larger: &U256) -> bool {
    let factor = U256::from(RETARGET_ADJUSTMENT_FACTOR);
    if *smaller > U256::MAX.wrapping_div(&factor) {
        return true;
    }
    *larger <= smaller.wrapping_mul(&factor)
}
