//! # Block Header Codec
//!
//! Fixed 80 byte Bitcoin block headers and a validated, lazily decoded view
//! over a concatenated header byte stream.

use bitcoin::{
    block::{Header, Version},
    hashes::Hash,
    BlockHash, CompactTarget, TxMerkleNode,
};
use borsh::{BorshDeserialize, BorshSerialize};
use crypto_bigint::U256;
use serde::{Deserialize, Serialize};
use std::slice::ChunksExact;

use crate::{
    common::{constants::HEADER_SIZE, hashes::calculate_double_sha256},
    errors::HeaderChainError,
    pow::bits_to_target,
};

/// Serializable representation of a Bitcoin block header.
///
/// Hashes are kept in their raw (internal) byte order, exactly as they appear
/// on the wire. The struct converts to and from `bitcoin::block::Header`.
///
/// ## Fields
///
/// * `version` - Block version indicating which validation rules to use
/// * `prev_block_hash` - Hash of the previous block in the chain (32 bytes)
/// * `merkle_root` - Merkle tree root of all transactions in the block (32 bytes)
/// * `time` - Block timestamp as Unix time
/// * `bits` - Compact representation of the difficulty target
/// * `nonce` - Counter used in proof-of-work mining
#[derive(
    Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Debug, BorshDeserialize, BorshSerialize,
)]
pub struct RelayHeader {
    pub version: i32,
    pub prev_block_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl RelayHeader {
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self::decode(bytes)
    }

    /// Decodes a header from a chunk that is known to be 80 bytes long.
    fn decode(chunk: &[u8]) -> Self {
        let word = |offset: usize| {
            [
                chunk[offset],
                chunk[offset + 1],
                chunk[offset + 2],
                chunk[offset + 3],
            ]
        };
        let mut prev_block_hash = [0u8; 32];
        prev_block_hash.copy_from_slice(&chunk[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&chunk[36..68]);

        RelayHeader {
            version: i32::from_le_bytes(word(0)),
            prev_block_hash,
            merkle_root,
            time: u32::from_le_bytes(word(68)),
            bits: u32::from_le_bytes(word(72)),
            nonce: u32::from_le_bytes(word(76)),
        }
    }

    /// Serializes the header in Bitcoin consensus format.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.version.to_le_bytes());
        bytes[4..36].copy_from_slice(&self.prev_block_hash);
        bytes[36..68].copy_from_slice(&self.merkle_root);
        bytes[68..72].copy_from_slice(&self.time.to_le_bytes());
        bytes[72..76].copy_from_slice(&self.bits.to_le_bytes());
        bytes[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Computes the double SHA256 hash of the block header, in raw byte order.
    pub fn compute_block_hash(&self) -> [u8; 32] {
        calculate_double_sha256(&self.to_bytes())
    }

    pub fn block_hash(&self) -> BlockHash {
        BlockHash::from_byte_array(self.compute_block_hash())
    }

    pub fn prev_blockhash(&self) -> BlockHash {
        BlockHash::from_byte_array(self.prev_block_hash)
    }

    /// Full target decoded from the header's compact `bits`.
    pub fn target(&self) -> U256 {
        bits_to_target(self.bits)
    }
}

impl From<Header> for RelayHeader {
    fn from(header: Header) -> Self {
        RelayHeader {
            version: header.version.to_consensus(),
            prev_block_hash: header.prev_blockhash.to_byte_array(),
            merkle_root: header.merkle_root.to_byte_array(),
            time: header.time,
            bits: header.bits.to_consensus(),
            nonce: header.nonce,
        }
    }
}

impl From<RelayHeader> for Header {
    fn from(val: RelayHeader) -> Self {
        Header {
            version: Version::from_consensus(val.version),
            prev_blockhash: BlockHash::from_byte_array(val.prev_block_hash),
            merkle_root: TxMerkleNode::from_byte_array(val.merkle_root),
            time: val.time,
            bits: CompactTarget::from_consensus(val.bits),
            nonce: val.nonce,
        }
    }
}

/// A header byte stream whose length has been checked to be a positive
/// multiple of 80. Headers are decoded on access, in stream order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderSlice<'a> {
    bytes: &'a [u8],
}

impl<'a> HeaderSlice<'a> {
    pub fn len(&self) -> usize {
        self.bytes.len() / HEADER_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<RelayHeader> {
        let start = index.checked_mul(HEADER_SIZE)?;
        let chunk = self.bytes.get(start..start.checked_add(HEADER_SIZE)?)?;
        Some(RelayHeader::decode(chunk))
    }

    /// Starts a fresh pass over the headers. Can be called any number of times.
    pub fn iter(&self) -> HeaderIter<'a> {
        HeaderIter {
            chunks: self.bytes.chunks_exact(HEADER_SIZE),
        }
    }

    pub fn to_vec(&self) -> Vec<RelayHeader> {
        self.iter().collect()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl<'a> IntoIterator for HeaderSlice<'a> {
    type Item = RelayHeader;
    type IntoIter = HeaderIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Clone, Debug)]
pub struct HeaderIter<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl Iterator for HeaderIter<'_> {
    type Item = RelayHeader;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().map(RelayHeader::decode)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl DoubleEndedIterator for HeaderIter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.chunks.next_back().map(RelayHeader::decode)
    }
}

impl ExactSizeIterator for HeaderIter<'_> {}

/// Checks that `bytes` is a non-empty concatenation of 80 byte headers.
pub fn parse_headers(bytes: &[u8]) -> Result<HeaderSlice<'_>, HeaderChainError> {
    if bytes.is_empty() || bytes.len() % HEADER_SIZE != 0 {
        return Err(HeaderChainError::MalformedInput(bytes.len()));
    }

    Ok(HeaderSlice { bytes })
}

/// Concatenates headers into the wire format accepted by [`parse_headers`].
pub fn serialize_headers<'a, I>(headers: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a RelayHeader>,
{
    headers
        .into_iter()
        .flat_map(|header| header.to_bytes())
        .collect()
}
