//! # Header Chain
//!
//! Bitcoin block header verification primitives used by the light relay:
//! header codec, compact target arithmetic, proof-of-work checks and
//! verification of a contiguous batch of headers.
//!
//! Everything in this crate is pure. No state is kept between calls, so the
//! same input always yields the same result.
//!
//! Implementation of the consensus arithmetic follows Bitcoin Core:
//! <https://github.com/bitcoin/bitcoin/blob/master/src/pow.cpp>.

pub mod chain;
pub mod common;
pub mod errors;
pub mod header;
pub mod pow;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use chain::{verify_chain, ChainSummary, EpochTransition};
pub use errors::HeaderChainError;
pub use header::{parse_headers, serialize_headers, HeaderSlice, RelayHeader};
pub use pow::NetworkConstants;

pub use crypto_bigint::U256;
