//! # Bitcoin Difficulty Maintainer
//!
//! Keeps the relay in sync with Bitcoin by proving every new difficulty epoch
//! as soon as the chain holds enough blocks after the epoch boundary.
//!
//! For a new epoch starting at height `h` and a proof length `p`, the proof
//! consists of the headers in `[h - p, h + p - 1]`.

use std::{future::Future, sync::Arc, time::Duration};

use alloy_primitives::Address;
use async_trait::async_trait;
use header_chain::RelayHeader;

use crate::{
    config::RelayConfig,
    errors::RelayError,
    relay::{last_height_of_epoch, LightRelay},
};

/// Read-only access to the Bitcoin chain.
#[async_trait]
pub trait BitcoinHeaderSource: Send + Sync {
    async fn latest_block_height(&self) -> Result<u64, RelayError>;

    async fn block_header(&self, height: u64) -> Result<RelayHeader, RelayError>;

    /// Headers in `[first, last]`, concatenated in wire format.
    async fn header_bytes(&self, first: u64, last: u64) -> Result<Vec<u8>, RelayError> {
        let mut bytes = Vec::with_capacity((last.saturating_sub(first) + 1) as usize * 80);
        for height in first..=last {
            let header = self.block_header(height).await.map_err(|e| {
                eyre::Report::new(e)
                    .wrap_err(format!("Failed to get block header at height {height}"))
            })?;
            bytes.extend_from_slice(&header.to_bytes());
        }

        Ok(bytes)
    }
}

#[derive(Debug)]
pub struct BitcoinDifficultyMaintainer<S> {
    source: S,
    relay: Arc<LightRelay>,
    submitter: Address,
    idle_backoff: Duration,
    restart_backoff: Duration,
}

impl<S: BitcoinHeaderSource> BitcoinDifficultyMaintainer<S> {
    pub fn new(source: S, relay: Arc<LightRelay>, config: &RelayConfig) -> Self {
        BitcoinDifficultyMaintainer {
            source,
            relay,
            submitter: config.submitter,
            idle_backoff: config.maintainer.idle_backoff(),
            restart_backoff: config.maintainer.restart_backoff(),
        }
    }

    pub fn relay(&self) -> &Arc<LightRelay> {
        &self.relay
    }

    /// Seeds the relay with the header at `height` unless it is already
    /// initialized.
    pub async fn genesis_from_source(
        &self,
        owner: Address,
        height: u64,
        proof_length: u64,
    ) -> Result<(), RelayError> {
        if self.relay.ready() {
            tracing::info!("Relay is already initialized, skipping genesis");
            return Ok(());
        }

        let header = self.source.block_header(height).await?;
        self.relay
            .genesis(owner, &header.to_bytes(), height, proof_length)
    }

    fn verify_submission_eligibility(&self) -> Result<(), RelayError> {
        if !self.relay.ready() {
            return Err(RelayError::NotInitialized);
        }
        if !self.relay.can_submit(&self.submitter) {
            return Err(RelayError::Unauthorized(self.submitter));
        }

        Ok(())
    }

    /// Proves the epoch after the relay's current one if the chain is long
    /// enough. Returns whether an epoch was proven.
    pub async fn prove_next_epoch(&self) -> Result<bool, RelayError> {
        let tip = self.source.latest_block_height().await?;
        let current_epoch = self.relay.current_epoch()?;
        let proof_length = self.relay.proof_length();

        let new_epoch = current_epoch + 1;
        let new_epoch_height = last_height_of_epoch(current_epoch)
            .and_then(|last| last.checked_add(1))
            .ok_or(RelayError::EpochOutOfRange(new_epoch))?;
        let first_height = new_epoch_height - proof_length;
        let last_height = new_epoch_height
            .checked_add(proof_length - 1)
            .ok_or(RelayError::EpochOutOfRange(new_epoch))?;

        if tip < last_height {
            if tip >= new_epoch_height {
                tracing::info!(
                    "Waiting for {} more blocks to prove epoch {new_epoch}",
                    last_height - tip
                );
            } else {
                tracing::debug!("Relay is up to date with Bitcoin at height {tip}");
            }
            return Ok(false);
        }

        let headers = self.source.header_bytes(first_height, last_height).await?;
        self.relay.retarget(self.submitter, &headers)?;

        tracing::info!(
            "Submitted headers [{first_height}:{last_height}], current proven epoch is {new_epoch}"
        );
        Ok(true)
    }

    /// Proves epochs until an error occurs. Sleeps for the idle back-off
    /// whenever there is nothing to prove.
    async fn prove_epochs(&self) -> Result<(), RelayError> {
        self.verify_submission_eligibility()?;

        loop {
            if !self.prove_next_epoch().await? {
                tokio::time::sleep(self.idle_backoff).await;
            }
        }
    }

    /// Runs until `shutdown` completes. Errors restart the loop after the
    /// restart back-off.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Starting Bitcoin difficulty maintainer");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                result = self.prove_epochs() => {
                    if let Err(e) = result {
                        tracing::error!(
                            "Error while proving Bitcoin epochs: {e}; restarting maintainer"
                        );
                    }
                }
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.restart_backoff) => {}
            }
        }

        tracing::info!("Stopping Bitcoin difficulty maintainer");
    }
}
