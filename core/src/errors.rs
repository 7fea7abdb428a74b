//! # Errors
//!
//! This module defines errors, returned by the relay and its services.

use alloy_primitives::Address;
use header_chain::HeaderChainError;
use thiserror::Error;

/// Errors returned by the relay.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RelayError {
    /// Header parsing or chain verification failed
    #[error(transparent)]
    HeaderChain(#[from] HeaderChainError),

    /// An epoch is already recorded with a different target
    #[error("Epoch {epoch} is already recorded with a different difficulty")]
    DifficultyConflict { epoch: u64 },
    /// A new epoch must directly follow the latest recorded one
    #[error("Epoch {epoch} does not follow the latest recorded epoch {latest}")]
    EpochGap { latest: u64, epoch: u64 },
    /// Caller lacks the permission for the operation
    #[error("{0} is not permitted to perform this operation")]
    Unauthorized(Address),
    #[error("Genesis has already been performed")]
    AlreadyInitialized,
    #[error("Relay is not ready, genesis has not been performed")]
    NotInitialized,
    /// Epoch is before genesis, not yet proven or evicted from history
    #[error("Epoch {0} is not recorded by the relay")]
    EpochNotFound(u64),
    #[error("Epoch 0 has no previous epoch")]
    NoPreviousEpoch,
    #[error("Epoch {0} ends past the largest block height")]
    EpochOutOfRange(u64),
    /// Header timestamp precedes every epoch known to the relay
    #[error("Header timestamp {0} precedes the oldest epoch known to the relay")]
    ChainPredatesGenesis(u32),
    #[error("Invalid number of headers ({count}): {reason}")]
    InvalidHeaderCount { count: usize, reason: &'static str },
    /// Chain is valid but too short to be considered confirmed
    #[error("Chain of {actual} headers is shorter than the proof length {required}")]
    InsufficientConfirmations { required: u64, actual: usize },
    #[error("Genesis height {0} is not the first block of an epoch")]
    InvalidGenesisHeight(u64),
    #[error("Proof length {0} must be between 1 and 2015")]
    InvalidProofLength(u64),
    #[error("Proof length is already {0}")]
    ProofLengthUnchanged(u64),
    /// Retarget proofs must describe a finished epoch
    #[error("Epoch ends at {epoch_end}, which is not before the current time {now}")]
    EpochEndsInFuture { epoch_end: u32, now: u64 },

    /// ConfigError is returned when the configuration is invalid
    #[error("ConfigError: {0}")]
    ConfigError(String),
    /// Returned when an environment variable is not set
    #[error("Environment variable {1} is not set: {0}")]
    EnvVarNotSet(std::env::VarError, &'static str),
    /// Returned when an environment variable can't be parsed
    #[error("Environment variable {0} is malformed: {1}")]
    EnvVarMalformed(&'static str, String),
    /// Returned in RPC error
    #[error("BitcoinCoreRPCError: {0}")]
    BitcoinRpcError(#[from] bitcoincore_rpc::Error),

    #[error(transparent)]
    Eyre(#[from] eyre::Report),
}
