//! # Common Module
//! Constants and small helpers shared by the header codec and the
//! proof-of-work arithmetic.

pub mod constants;
pub mod hashes;
pub mod utils;
