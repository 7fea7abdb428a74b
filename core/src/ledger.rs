//! # Difficulty Ledger
//!
//! Per-epoch difficulty records, keyed by epoch number. Epochs are recorded in
//! order without gaps, and a recorded epoch never changes its target.
//! With a history window only the most recent epochs are retained.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use header_chain::{common::constants::BLOCKS_PER_EPOCH, pow, U256};
use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// Start of a difficulty epoch as proven to the relay.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct EpochRecord {
    /// Timestamp of the first block of the epoch.
    pub timestamp: u32,
    /// Compact target shared by every block of the epoch.
    pub bits: u32,
}

impl EpochRecord {
    pub fn target(&self) -> U256 {
        pow::bits_to_target(self.bits)
    }

    pub fn difficulty(&self) -> U256 {
        pow::difficulty(&self.target())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyLedger {
    epochs: BTreeMap<u64, EpochRecord>,
    history_window: Option<usize>,
}

impl DifficultyLedger {
    /// Creates an empty ledger. A window keeps at least the current and the
    /// previous epoch.
    pub fn new(history_window: Option<usize>) -> Self {
        DifficultyLedger {
            epochs: BTreeMap::new(),
            history_window: history_window.map(|window| window.max(2)),
        }
    }

    /// Records `epoch`, returning whether anything was inserted.
    ///
    /// Recording an epoch again with the same target is a no-op. A different
    /// target for a recorded epoch is a conflict. A new epoch must directly
    /// follow the latest recorded one.
    pub fn record_epoch(&mut self, epoch: u64, record: EpochRecord) -> Result<bool, RelayError> {
        if let Some(existing) = self.epochs.get(&epoch) {
            if existing.target() == record.target() {
                return Ok(false);
            }
            return Err(RelayError::DifficultyConflict { epoch });
        }

        if let Some(latest) = self.current_epoch() {
            if latest.checked_add(1) != Some(epoch) {
                return Err(RelayError::EpochGap { latest, epoch });
            }
        }

        self.epochs.insert(epoch, record);

        if let Some(window) = self.history_window {
            while self.epochs.len() > window {
                if let Some((evicted, _)) = self.epochs.pop_first() {
                    tracing::debug!("Evicted epoch {evicted} from the difficulty ledger");
                }
            }
        }

        Ok(true)
    }

    pub fn record(&self, epoch: u64) -> Option<&EpochRecord> {
        self.epochs.get(&epoch)
    }

    pub fn current(&self) -> Option<(u64, &EpochRecord)> {
        self.epochs
            .last_key_value()
            .map(|(epoch, record)| (*epoch, record))
    }

    pub fn current_epoch(&self) -> Option<u64> {
        self.epochs.last_key_value().map(|(epoch, _)| *epoch)
    }

    pub fn oldest_epoch(&self) -> Option<u64> {
        self.epochs.first_key_value().map(|(epoch, _)| *epoch)
    }

    pub fn current_difficulty(&self) -> Result<U256, RelayError> {
        self.current()
            .map(|(_, record)| record.difficulty())
            .ok_or(RelayError::NotInitialized)
    }

    pub fn previous_difficulty(&self) -> Result<U256, RelayError> {
        let current = self.current_epoch().ok_or(RelayError::NotInitialized)?;
        let previous = current.checked_sub(1).ok_or(RelayError::NoPreviousEpoch)?;
        self.difficulty_at(previous)
    }

    pub fn difficulty_at(&self, epoch: u64) -> Result<U256, RelayError> {
        self.record(epoch)
            .map(EpochRecord::difficulty)
            .ok_or(RelayError::EpochNotFound(epoch))
    }

    pub fn difficulty_at_height(&self, block_height: u64) -> Result<U256, RelayError> {
        self.difficulty_at(block_height / BLOCKS_PER_EPOCH)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (u64, &EpochRecord)> {
        self.epochs.iter().map(|(epoch, record)| (*epoch, record))
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn history_window(&self) -> Option<usize> {
        self.history_window
    }
}
