//! # Header Inspection
//!
//! Offline verification of a header batch, used by the `inspect` command.

use std::fmt;

use header_chain::{
    common::utils::u256_to_decimal, parse_headers, pow, verify_chain, ChainSummary,
    EpochTransition, U256,
};

use crate::errors::RelayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    /// Position of the header inside the batch.
    pub offset: usize,
    pub hash: bitcoin::BlockHash,
    pub time: u32,
    pub bits: u32,
    pub difficulty: U256,
}

impl fmt::Display for HeaderLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{:<5} {} time {} bits {:#010x} difficulty {}",
            self.offset,
            self.hash,
            self.time,
            self.bits,
            u256_to_decimal(&self.difficulty)
        )
    }
}

#[derive(Debug, Clone)]
pub struct InspectReport {
    pub headers: Vec<HeaderLine>,
    pub summary: ChainSummary,
    /// Sum of the work of every header, saturating at `U256::MAX`.
    pub chain_work: U256,
}

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.headers {
            writeln!(f, "{line}")?;
        }
        write!(
            f,
            "{} headers, first timestamp {}, last hash {}, chain work {}",
            self.summary.header_count,
            self.summary.starting_timestamp,
            self.summary.last_hash,
            u256_to_decimal(&self.chain_work)
        )?;
        if let Some(index) = self.summary.retarget_index {
            write!(
                f,
                ", retarget at +{index} to difficulty {}",
                u256_to_decimal(&pow::difficulty(&self.summary.end_target))
            )?;
        }
        Ok(())
    }
}

/// Parses and verifies `bytes` as a chain starting at its first header's
/// target. At most one bounded retarget is allowed.
pub fn inspect_headers(bytes: &[u8]) -> Result<InspectReport, RelayError> {
    let headers = parse_headers(bytes)?;
    let lines = headers
        .iter()
        .enumerate()
        .map(|(offset, header)| HeaderLine {
            offset,
            hash: header.block_hash(),
            time: header.time,
            bits: header.bits,
            difficulty: pow::difficulty(&header.target()),
        })
        .collect::<Vec<_>>();

    let headers = headers.to_vec();
    let summary = verify_chain(&headers, None, headers[0].target(), EpochTransition::Free)?;
    let chain_work = headers.iter().fold(U256::ZERO, |work, header| {
        work.saturating_add(&pow::header_work(&header.target()))
    });

    Ok(InspectReport {
        headers: lines,
        summary,
        chain_work,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use header_chain::{
        serialize_headers,
        test_utils::{spoil_proof_of_work, ChainMiner},
        HeaderChainError,
    };

    #[test]
    fn report_lists_every_header() {
        let headers = ChainMiner::new([0u8; 32], 1_700_000_000, 600)
            .mine(4, 0x207fffff)
            .take_headers();

        let report = inspect_headers(&serialize_headers(&headers)).unwrap();
        assert_eq!(report.headers.len(), 4);
        assert_eq!(report.headers[3].hash, headers[3].block_hash());
        assert_eq!(report.summary.last_hash, headers[3].block_hash());
        assert_eq!(report.summary.retarget_index, None);
        // A 0x207fffff target is just under 2^255, so each header is worth 2.
        assert_eq!(report.chain_work, U256::from(8u64));

        let printed = report.to_string();
        assert!(printed.contains("bits 0x207fffff"));
        assert!(printed.ends_with(&format!(
            "last hash {}, chain work 8",
            headers[3].block_hash()
        )));
    }

    #[test]
    fn invalid_headers_are_reported() {
        let mut headers = ChainMiner::new([0u8; 32], 1_700_000_000, 600)
            .mine(4, 0x207fffff)
            .take_headers();
        spoil_proof_of_work(&mut headers[2]);

        assert!(matches!(
            inspect_headers(&serialize_headers(&headers)),
            Err(RelayError::HeaderChain(
                HeaderChainError::InsufficientProofOfWork { index: 2, .. }
            ))
        ));
        assert!(matches!(
            inspect_headers(&[]),
            Err(RelayError::HeaderChain(HeaderChainError::MalformedInput(0)))
        ));
    }
}
