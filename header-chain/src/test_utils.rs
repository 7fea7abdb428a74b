//! # Test Utilities
//!
//! Mines synthetic header chains at easy targets, so tests can exercise full
//! epochs without real Bitcoin data.

use crate::{
    header::RelayHeader,
    pow::{bits_to_target, check_hash_valid},
};

const TEST_MERKLE_ROOT: [u8; 32] = [0x4d; 32];

/// Searches nonces until the header meets its own target.
///
/// ## Panics
///
/// Panics if no nonce satisfies `bits`, e.g. for a zero target.
pub fn mine_header(prev_block_hash: [u8; 32], time: u32, bits: u32) -> RelayHeader {
    let target = bits_to_target(bits);
    let mut header = RelayHeader {
        version: 0x2000_0000,
        prev_block_hash,
        merkle_root: TEST_MERKLE_ROOT,
        time,
        bits,
        nonce: 0,
    };

    loop {
        if check_hash_valid(&header.compute_block_hash(), &target) {
            return header;
        }
        header.nonce = match header.nonce.checked_add(1) {
            Some(nonce) => nonce,
            None => panic!("No nonce meets bits {bits:#010x}"),
        };
    }
}

/// Changes the nonce until the header no longer meets its target.
pub fn spoil_proof_of_work(header: &mut RelayHeader) {
    let target = bits_to_target(header.bits);
    loop {
        header.nonce = header.nonce.wrapping_add(1);
        if !check_hash_valid(&header.compute_block_hash(), &target) {
            return;
        }
    }
}

/// Builds a linked chain of mined headers with evenly spaced timestamps.
#[derive(Debug, Clone)]
pub struct ChainMiner {
    tip: [u8; 32],
    next_time: u32,
    time_step: u32,
    headers: Vec<RelayHeader>,
}

impl ChainMiner {
    /// The first mined header builds on `anchor` and is stamped `start_time`.
    pub fn new(anchor: [u8; 32], start_time: u32, time_step: u32) -> Self {
        ChainMiner {
            tip: anchor,
            next_time: start_time,
            time_step,
            headers: Vec::new(),
        }
    }

    /// Continues an existing chain from `tip`.
    pub fn from_tip(tip: &RelayHeader, time_step: u32) -> Self {
        Self::new(tip.compute_block_hash(), tip.time + time_step, time_step)
    }

    pub fn mine(&mut self, count: usize, bits: u32) -> &mut Self {
        for _ in 0..count {
            let time = self.next_time;
            self.mine_at(time, bits);
        }
        self
    }

    /// Mines one header with an explicit timestamp. Later headers continue
    /// from this timestamp.
    pub fn mine_at(&mut self, time: u32, bits: u32) -> &mut Self {
        let header = mine_header(self.tip, time, bits);
        self.tip = header.compute_block_hash();
        self.next_time = time + self.time_step;
        self.headers.push(header);
        self
    }

    pub fn headers(&self) -> &[RelayHeader] {
        &self.headers
    }

    pub fn take_headers(&mut self) -> Vec<RelayHeader> {
        std::mem::take(&mut self.headers)
    }
}
