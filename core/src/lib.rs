//! # Light Relay
//!
//! A Bitcoin SPV light relay: records Bitcoin difficulty epochs proven
//! through retarget headers and validates header chains against them.
//! [`maintainer`] keeps the relay in sync with a Bitcoin node.

pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod extended_rpc;
pub mod inspect;
pub mod ledger;
pub mod maintainer;
pub mod metrics;
pub mod permissions;
pub mod relay;
pub mod utils;

pub use alloy_primitives::Address;
pub use relay::LightRelay;
