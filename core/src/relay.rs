//! # Light Relay
//!
//! Bitcoin SPV light relay. The relay is seeded with a trusted genesis header
//! at an epoch boundary and then follows Bitcoin's difficulty epochs through
//! retarget proofs: headers from the end of one epoch followed by headers
//! from the start of the next one. Proven epochs let callers check that a
//! batch of headers carries the work Bitcoin required at that time.
//!
//! ## Concurrency
//!
//! State lives behind a [`RwLock`]. Each mutating operation holds the write
//! lock for its whole verify then commit sequence and performs every fallible
//! step before changing anything, so a failed call leaves no trace. Readers
//! always observe a state from between two operations.

use std::{
    fmt,
    path::Path,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::{SystemTime, UNIX_EPOCH},
};

use alloy_primitives::Address;
use bitcoin::Network;
use header_chain::{
    common::{constants::BLOCKS_PER_EPOCH, utils::u256_to_decimal},
    parse_headers, pow, verify_chain, EpochTransition, HeaderChainError, NetworkConstants,
    RelayHeader, U256,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    config::RelayConfig,
    errors::RelayError,
    events::RelayEvent,
    ledger::{DifficultyLedger, EpochRecord},
    metrics::RELAY_METRICS,
    permissions::{AccessControl, Permissions},
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Source of the current Unix time, in seconds.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisInfo {
    pub height: u64,
    pub epoch: u64,
}

/// Everything the relay knows. Also serves as a snapshot of the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayState {
    /// `None` until genesis has been performed.
    pub genesis: Option<GenesisInfo>,
    pub proof_length: u64,
    pub permissions: Permissions,
    pub ledger: DifficultyLedger,
}

impl RelayState {
    pub fn new(permissions: Permissions, history_window: Option<usize>) -> Self {
        RelayState {
            genesis: None,
            proof_length: 0,
            permissions,
            ledger: DifficultyLedger::new(history_window),
        }
    }

    pub fn ready(&self) -> bool {
        self.genesis.is_some()
    }

    /// Reads a snapshot written by [`RelayState::save`].
    pub fn load(path: &Path) -> Result<Self, RelayError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RelayError::ConfigError(format!("Can't read snapshot {}: {e}", path.display()))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            RelayError::ConfigError(format!("Malformed snapshot {}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), RelayError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| eyre::eyre!("Failed to serialize relay snapshot: {e}"))?;

        std::fs::write(path, contents)
            .map_err(|e| eyre::eyre!("Failed to write snapshot {}: {e}", path.display()))?;
        tracing::debug!("Relay snapshot saved to {}", path.display());

        Ok(())
    }

    fn require_ready(&self) -> Result<GenesisInfo, RelayError> {
        self.genesis.ok_or(RelayError::NotInitialized)
    }

    fn require_owner(&self, caller: &Address) -> Result<(), RelayError> {
        if !self.permissions.is_owner(caller) {
            return Err(RelayError::Unauthorized(*caller));
        }
        Ok(())
    }

    fn require_authorized(&self, caller: &Address) -> Result<(), RelayError> {
        if !self.permissions.is_authorized(caller) {
            return Err(RelayError::Unauthorized(*caller));
        }
        Ok(())
    }

    fn current_record(&self) -> Result<(u64, EpochRecord), RelayError> {
        self.require_ready()?;
        self.ledger
            .current()
            .map(|(epoch, record)| (epoch, *record))
            .ok_or(RelayError::NotInitialized)
    }

    /// Latest epoch that started at or before `timestamp`.
    fn resolve_epoch(&self, timestamp: u32) -> Result<(u64, EpochRecord), RelayError> {
        self.ledger
            .iter()
            .rev()
            .find(|(_, record)| record.timestamp <= timestamp)
            .map(|(epoch, record)| (epoch, *record))
            .ok_or(RelayError::ChainPredatesGenesis(timestamp))
    }

    /// Epoch a chain starting with `first` belongs to. Timestamps are not
    /// monotonic, so a header stamped before the recorded start of the next
    /// epoch may already use that epoch's target.
    fn resolve_first_header(
        &self,
        first: &RelayHeader,
    ) -> Result<(u64, EpochRecord), RelayError> {
        let (epoch, record) = self.resolve_epoch(first.time)?;
        let target = first.target();
        if target == record.target() {
            return Ok((epoch, record));
        }

        match self.ledger.record(epoch + 1) {
            Some(next) if next.target() == target => Ok((epoch + 1, *next)),
            _ => Err(HeaderChainError::InvalidDifficultyTransition {
                index: 0,
                reason: "first header does not use a proven epoch target",
            }
            .into()),
        }
    }

    pub fn current_epoch(&self) -> Result<u64, RelayError> {
        self.current_record().map(|(epoch, _)| epoch)
    }

    pub fn genesis_epoch(&self) -> Result<u64, RelayError> {
        self.require_ready().map(|genesis| genesis.epoch)
    }

    /// First and last block height covered by proven epochs.
    pub fn relay_range(&self) -> Result<(u64, u64), RelayError> {
        let genesis = self.require_ready()?;
        let current_epoch = self.current_epoch()?;
        let last = last_height_of_epoch(current_epoch)
            .ok_or(RelayError::EpochOutOfRange(current_epoch))?;
        Ok((genesis.height, last))
    }

    pub fn block_difficulty(&self, block_height: u64) -> Result<U256, RelayError> {
        self.require_ready()?;
        self.ledger.difficulty_at_height(block_height)
    }

    pub fn epoch_difficulty(&self, epoch: u64) -> Result<U256, RelayError> {
        self.require_ready()?;
        self.ledger.difficulty_at(epoch)
    }

    pub fn current_epoch_difficulty(&self) -> Result<U256, RelayError> {
        self.require_ready()?;
        self.ledger.current_difficulty()
    }

    pub fn prev_epoch_difficulty(&self) -> Result<U256, RelayError> {
        self.require_ready()?;
        self.ledger.previous_difficulty()
    }
}

/// Verified retarget: the record of the epoch that starts at `boundary`.
#[derive(Debug, Clone, Copy)]
struct RetargetProof {
    boundary: usize,
    record: EpochRecord,
}

pub struct LightRelay {
    state: RwLock<RelayState>,
    network: NetworkConstants,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<RelayEvent>,
}

impl fmt::Debug for LightRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightRelay")
            .field("state", &self.state)
            .field("network", &self.network)
            .field("clock", &self.clock)
            .finish()
    }
}

impl LightRelay {
    /// Creates an uninitialized relay owned by `owner`.
    pub fn new(owner: Address, network: Network, history_window: Option<usize>) -> Self {
        Self::from_snapshot(
            RelayState::new(Permissions::new(owner), history_window),
            network,
        )
    }

    /// Creates an uninitialized relay with the owner and submitters from
    /// `config`.
    pub fn from_config(config: &RelayConfig) -> Self {
        let permissions = Permissions {
            owner: Some(config.owner),
            authorization_required: config.authorization_required,
            authorized: config.authorized_submitters.iter().copied().collect(),
        };

        Self::from_snapshot(
            RelayState::new(permissions, config.history_window),
            config.network,
        )
    }

    /// Restores a relay from a previously taken snapshot.
    pub fn from_snapshot(state: RelayState, network: Network) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        LightRelay {
            state: RwLock::new(state),
            network: NetworkConstants::for_network(network),
            clock: Arc::new(SystemClock),
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Consistent copy of the whole relay state.
    pub fn snapshot(&self) -> RelayState {
        self.read().clone()
    }

    pub fn network(&self) -> &NetworkConstants {
        &self.network
    }

    fn read(&self) -> RwLockReadGuard<'_, RelayState> {
        // Every mutation validates before writing, so a panicking writer
        // cannot leave a half applied state behind.
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RelayState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RelayEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("No subscribers for relay events");
        }
    }

    /// Counts and logs rejected submissions.
    fn observe<T>(&self, operation: &str, result: Result<T, RelayError>) -> Result<T, RelayError> {
        if let Err(e) = &result {
            RELAY_METRICS.submissions_rejected.increment(1);
            tracing::warn!("Rejected {operation}: {e}");
        }
        result
    }

    /// Seeds the relay with a trusted header at the start of an epoch.
    ///
    /// # Parameters
    ///
    /// - `header_bytes`: exactly one 80 byte header
    /// - `block_height`: height of that header, a multiple of 2016
    /// - `proof_length`: headers required on each side of a retarget
    pub fn genesis(
        &self,
        caller: Address,
        header_bytes: &[u8],
        block_height: u64,
        proof_length: u64,
    ) -> Result<(), RelayError> {
        let mut state = self.write();
        state.require_owner(&caller)?;
        if state.ready() {
            return Err(RelayError::AlreadyInitialized);
        }

        let headers = parse_headers(header_bytes)?.to_vec();
        if headers.len() != 1 {
            return Err(RelayError::InvalidHeaderCount {
                count: headers.len(),
                reason: "genesis takes exactly one header",
            });
        }
        let epoch = block_height / BLOCKS_PER_EPOCH;
        if block_height % BLOCKS_PER_EPOCH != 0 || last_height_of_epoch(epoch).is_none() {
            return Err(RelayError::InvalidGenesisHeight(block_height));
        }
        validate_proof_length(proof_length)?;

        let header = headers[0];
        verify_chain(&headers, None, header.target(), EpochTransition::Forbidden)?;

        state.ledger.record_epoch(
            epoch,
            EpochRecord {
                timestamp: header.time,
                bits: header.bits,
            },
        )?;
        state.genesis = Some(GenesisInfo {
            height: block_height,
            epoch,
        });
        state.proof_length = proof_length;
        drop(state);

        RELAY_METRICS.current_epoch.set(epoch as f64);
        RELAY_METRICS.proof_length.set(proof_length as f64);
        tracing::info!(
            "Relay genesis at height {block_height} ({}), epoch {epoch}",
            header.block_hash()
        );
        self.emit(RelayEvent::Genesis { block_height });

        Ok(())
    }

    /// Proves the epoch following the current one.
    ///
    /// `header_bytes` holds at least `proof_length` headers from the end of
    /// the current epoch followed by at least `proof_length` headers of the
    /// next epoch.
    pub fn retarget(&self, caller: Address, header_bytes: &[u8]) -> Result<(), RelayError> {
        let result = self.apply_retarget(caller, header_bytes);
        self.observe("retarget", result)
    }

    fn apply_retarget(&self, caller: Address, header_bytes: &[u8]) -> Result<(), RelayError> {
        let mut state = self.write();
        state.require_ready()?;
        state.require_authorized(&caller)?;

        let headers = parse_headers(header_bytes)?.to_vec();
        let (current_epoch, current) = state.current_record()?;
        let new_epoch = next_epoch(current_epoch)?;
        let proof = self.verify_retarget(&headers, &current, state.proof_length)?;

        state.ledger.record_epoch(new_epoch, proof.record)?;
        drop(state);

        self.after_new_epoch(new_epoch, &current, &proof);
        Ok(())
    }

    /// Like [`Self::retarget`], but the epoch the headers start in is looked
    /// up by timestamp instead of assumed to be the current one.
    ///
    /// Proving an already recorded epoch again with the same target is a
    /// no-op. Returns whether a new epoch was recorded.
    pub fn set_difficulty_from_headers(
        &self,
        caller: Address,
        header_bytes: &[u8],
    ) -> Result<bool, RelayError> {
        let result = self.apply_difficulty_from_headers(caller, header_bytes);
        self.observe("difficulty proof", result)
    }

    fn apply_difficulty_from_headers(
        &self,
        caller: Address,
        header_bytes: &[u8],
    ) -> Result<bool, RelayError> {
        let mut state = self.write();
        state.require_ready()?;
        state.require_authorized(&caller)?;

        let headers = parse_headers(header_bytes)?.to_vec();
        let (epoch, record) = state.resolve_first_header(&headers[0])?;
        let new_epoch = next_epoch(epoch)?;
        let proof = self.verify_retarget(&headers, &record, state.proof_length)?;

        let inserted = state.ledger.record_epoch(new_epoch, proof.record)?;
        drop(state);

        if inserted {
            self.after_new_epoch(new_epoch, &record, &proof);
        } else {
            tracing::debug!("Epoch {new_epoch} is already recorded with the same difficulty");
        }
        Ok(inserted)
    }

    fn after_new_epoch(&self, new_epoch: u64, old: &EpochRecord, proof: &RetargetProof) {
        let old_difficulty = old.difficulty();
        let new_difficulty = proof.record.difficulty();

        RELAY_METRICS.current_epoch.set(new_epoch as f64);
        RELAY_METRICS.retargets_accepted.increment(1);
        tracing::info!(
            "Epoch {new_epoch} proven at header {}: difficulty {} -> {}",
            proof.boundary,
            u256_to_decimal(&old_difficulty),
            u256_to_decimal(&new_difficulty)
        );

        self.emit(RelayEvent::Retarget {
            old_difficulty,
            new_difficulty,
        });
    }

    /// Checks a retarget proof against the epoch `old` it starts in.
    fn verify_retarget(
        &self,
        headers: &[RelayHeader],
        old: &EpochRecord,
        proof_length: u64,
    ) -> Result<RetargetProof, RelayError> {
        let old_target = old.target();
        let summary = verify_chain(headers, None, old_target, EpochTransition::Free)?;

        let boundary = match summary.retarget_index {
            Some(index) => index,
            // The target may stay the same across a retarget, in which case
            // the boundary can only be known from the proof layout.
            None if headers.len() as u64 == 2 * proof_length => proof_length as usize,
            None => {
                return Err(HeaderChainError::InvalidDifficultyTransition {
                    index: headers.len() - 1,
                    reason: "headers do not cross an epoch boundary",
                }
                .into())
            }
        };

        let before = boundary as u64;
        let after = (headers.len() - boundary) as u64;
        if before < proof_length || after < proof_length {
            return Err(RelayError::InvalidHeaderCount {
                count: headers.len(),
                reason: "retarget needs proof length headers on each side of the boundary",
            });
        }

        let epoch_end = headers[boundary - 1].time;
        let now = self.clock.now();
        if u64::from(epoch_end) >= now {
            return Err(RelayError::EpochEndsInFuture { epoch_end, now });
        }

        let first_of_epoch = &headers[boundary];
        let mined_target = first_of_epoch.target();
        let expected_target =
            pow::retarget_algorithm(&old_target, old.timestamp, epoch_end, &self.network);
        // Compact encoding truncates, so the mined target may only clear bits
        // of the expected one.
        if expected_target & mined_target != mined_target {
            return Err(HeaderChainError::InvalidDifficultyTransition {
                index: boundary,
                reason: "target does not follow the retarget algorithm",
            }
            .into());
        }

        Ok(RetargetProof {
            boundary,
            record: EpochRecord {
                timestamp: first_of_epoch.time,
                bits: first_of_epoch.bits,
            },
        })
    }

    /// Checks that `header_bytes` is a valid chain within proven epochs.
    ///
    /// Returns the first header's timestamp and the number of headers.
    pub fn validate_chain(&self, header_bytes: &[u8]) -> Result<(u32, usize), RelayError> {
        let state = self.read();
        state.require_ready()?;

        let headers = parse_headers(header_bytes)?;
        let count = headers.len();
        if count < 2 || count as u64 >= BLOCKS_PER_EPOCH {
            return Err(RelayError::InvalidHeaderCount {
                count,
                reason: "chain must hold between 2 and 2015 headers",
            });
        }
        let headers = headers.to_vec();

        let (epoch, record) = state.resolve_first_header(&headers[0])?;
        let transition = match state.ledger.record(epoch + 1) {
            Some(next) => EpochTransition::To(next.target()),
            None => EpochTransition::Forbidden,
        };
        let summary = verify_chain(&headers, None, record.target(), transition)?;

        if (summary.header_count as u64) < state.proof_length {
            return Err(RelayError::InsufficientConfirmations {
                required: state.proof_length,
                actual: summary.header_count,
            });
        }

        Ok((summary.starting_timestamp, summary.header_count))
    }

    pub fn get_block_difficulty(&self, block_height: u64) -> Result<U256, RelayError> {
        self.read().block_difficulty(block_height)
    }

    pub fn get_epoch_difficulty(&self, epoch: u64) -> Result<U256, RelayError> {
        self.read().epoch_difficulty(epoch)
    }

    pub fn get_current_epoch_difficulty(&self) -> Result<U256, RelayError> {
        self.read().current_epoch_difficulty()
    }

    pub fn get_prev_epoch_difficulty(&self) -> Result<U256, RelayError> {
        self.read().prev_epoch_difficulty()
    }

    pub fn get_current_and_prev_epoch_difficulty(&self) -> Result<(U256, U256), RelayError> {
        let state = self.read();
        Ok((
            state.current_epoch_difficulty()?,
            state.prev_epoch_difficulty()?,
        ))
    }

    pub fn get_relay_range(&self) -> Result<(u64, u64), RelayError> {
        self.read().relay_range()
    }

    pub fn current_epoch(&self) -> Result<u64, RelayError> {
        self.read().current_epoch()
    }

    pub fn genesis_epoch(&self) -> Result<u64, RelayError> {
        self.read().genesis_epoch()
    }

    pub fn proof_length(&self) -> u64 {
        self.read().proof_length
    }

    pub fn ready(&self) -> bool {
        self.read().ready()
    }

    pub fn authorization_required(&self) -> bool {
        self.read().permissions.authorization_required
    }

    /// Whether `submitter` is on the authorized list.
    pub fn is_authorized(&self, submitter: &Address) -> bool {
        self.read().permissions.is_listed(submitter)
    }

    /// Whether `caller` may currently submit proofs.
    pub fn can_submit(&self, caller: &Address) -> bool {
        self.read().permissions.is_authorized(caller)
    }

    pub fn owner(&self) -> Option<Address> {
        self.read().permissions.owner
    }

    pub fn set_proof_length(&self, caller: Address, new_length: u64) -> Result<(), RelayError> {
        let mut state = self.write();
        state.require_owner(&caller)?;
        state.require_ready()?;
        validate_proof_length(new_length)?;
        if state.proof_length == new_length {
            return Err(RelayError::ProofLengthUnchanged(new_length));
        }

        state.proof_length = new_length;
        drop(state);

        RELAY_METRICS.proof_length.set(new_length as f64);
        tracing::info!("Proof length changed to {new_length}");
        self.emit(RelayEvent::ProofLengthChanged { new_length });
        Ok(())
    }

    pub fn set_authorization_status(
        &self,
        caller: Address,
        status: bool,
    ) -> Result<(), RelayError> {
        let mut state = self.write();
        state.require_owner(&caller)?;
        state.permissions.authorization_required = status;
        drop(state);

        tracing::info!("Submitter authorization required: {status}");
        self.emit(RelayEvent::AuthorizationRequirementChanged { new_status: status });
        Ok(())
    }

    pub fn authorize(&self, caller: Address, submitter: Address) -> Result<(), RelayError> {
        let mut state = self.write();
        state.require_owner(&caller)?;
        state.permissions.authorized.insert(submitter);
        drop(state);

        tracing::info!("Authorized submitter {submitter}");
        self.emit(RelayEvent::SubmitterAuthorized { submitter });
        Ok(())
    }

    pub fn deauthorize(&self, caller: Address, submitter: Address) -> Result<(), RelayError> {
        let mut state = self.write();
        state.require_owner(&caller)?;
        state.permissions.authorized.remove(&submitter);
        drop(state);

        tracing::info!("Deauthorized submitter {submitter}");
        self.emit(RelayEvent::SubmitterDeauthorized { submitter });
        Ok(())
    }

    pub fn transfer_ownership(
        &self,
        caller: Address,
        new_owner: Address,
    ) -> Result<(), RelayError> {
        self.replace_owner(caller, Some(new_owner))
    }

    /// Leaves the relay without an owner. Owner operations fail afterwards.
    pub fn renounce_ownership(&self, caller: Address) -> Result<(), RelayError> {
        self.replace_owner(caller, None)
    }

    fn replace_owner(&self, caller: Address, new_owner: Option<Address>) -> Result<(), RelayError> {
        let mut state = self.write();
        state.require_owner(&caller)?;
        let previous_owner = std::mem::replace(&mut state.permissions.owner, new_owner);
        drop(state);

        tracing::info!("Ownership transferred from {previous_owner:?} to {new_owner:?}");
        self.emit(RelayEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
        });
        Ok(())
    }
}

/// Height of the last block of `epoch`, if it fits in a `u64`.
pub fn last_height_of_epoch(epoch: u64) -> Option<u64> {
    epoch
        .checked_add(1)?
        .checked_mul(BLOCKS_PER_EPOCH)
        .map(|end| end - 1)
}

/// Epoch after `epoch`, as long as its blocks have representable heights.
fn next_epoch(epoch: u64) -> Result<u64, RelayError> {
    let next = epoch.saturating_add(1);
    last_height_of_epoch(next)
        .map(|_| next)
        .ok_or(RelayError::EpochOutOfRange(next))
}

fn validate_proof_length(proof_length: u64) -> Result<(), RelayError> {
    if proof_length == 0 || proof_length >= BLOCKS_PER_EPOCH {
        return Err(RelayError::InvalidProofLength(proof_length));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use header_chain::{
        common::constants::DIFF1_TARGET,
        pow::{bits_to_target, target_to_bits},
        serialize_headers,
        test_utils::{mine_header, spoil_proof_of_work, ChainMiner},
    };
    use hex_literal::hex;
    use tokio::sync::broadcast::error::TryRecvError;

    const OWNER: Address = Address::repeat_byte(0x01);
    const SUBMITTER: Address = Address::repeat_byte(0x02);
    const STRANGER: Address = Address::repeat_byte(0x03);

    const EASY_BITS: u32 = 0x207fffff;
    const T0: u32 = 1_700_000_000;
    const PROOF_LENGTH: u64 = 6;

    #[derive(Debug)]
    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    /// A relay seeded at height 0 plus the remaining 2015 headers of epoch 0.
    struct Fixture {
        relay: LightRelay,
        genesis: RelayHeader,
        epoch: Vec<RelayHeader>,
        step: u32,
    }

    impl Fixture {
        fn new(bits: u32, step: u32) -> Self {
            Self::with_history_window(bits, step, None)
        }

        fn with_history_window(bits: u32, step: u32, history_window: Option<usize>) -> Self {
            let genesis = mine_header([0u8; 32], T0, bits);
            let relay = LightRelay::new(OWNER, Network::Regtest, history_window);
            relay
                .genesis(OWNER, &genesis.to_bytes(), 0, PROOF_LENGTH)
                .unwrap();
            let epoch = ChainMiner::from_tip(&genesis, step)
                .mine(2015, bits)
                .take_headers();

            Fixture {
                relay,
                genesis,
                epoch,
                step,
            }
        }

        fn last_of_epoch(&self) -> &RelayHeader {
            &self.epoch[2014]
        }

        /// Bits the next epoch should use according to the retarget rules.
        fn next_bits(&self) -> u32 {
            let expected = pow::retarget_algorithm(
                &self.genesis.target(),
                self.genesis.time,
                self.last_of_epoch().time,
                self.relay.network(),
            );
            target_to_bits(&expected)
        }

        fn mine_next_epoch(&self, count: usize, bits: u32) -> Vec<RelayHeader> {
            ChainMiner::from_tip(self.last_of_epoch(), self.step)
                .mine(count, bits)
                .take_headers()
        }

        /// Last `before` headers of epoch 0 followed by `after` next epoch headers.
        fn proof(&self, before: usize, after: &[RelayHeader]) -> Vec<u8> {
            serialize_headers(self.epoch[2015 - before..].iter().chain(after))
        }

        /// Proves epoch 1 and returns all of its 2016 headers.
        fn prove_epoch_1(&self) -> Vec<RelayHeader> {
            let epoch_1 = self.mine_next_epoch(2016, self.next_bits());
            self.relay
                .retarget(
                    SUBMITTER,
                    &self.proof(PROOF_LENGTH as usize, &epoch_1[..PROOF_LENGTH as usize]),
                )
                .unwrap();
            epoch_1
        }
    }

    fn bitcoin_genesis_header() -> RelayHeader {
        RelayHeader {
            version: 1,
            prev_block_hash: [0u8; 32],
            merkle_root: hex!("3ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a"),
            time: 1231006505,
            bits: 0x1d00ffff,
            nonce: 2083236893,
        }
    }

    #[test]
    fn genesis_initializes_relay() {
        let relay = LightRelay::new(OWNER, Network::Bitcoin, None);
        let mut events = relay.subscribe();
        assert!(!relay.ready());

        relay
            .genesis(OWNER, &bitcoin_genesis_header().to_bytes(), 0, 6)
            .unwrap();

        assert!(relay.ready());
        assert_eq!(relay.genesis_epoch().unwrap(), 0);
        assert_eq!(relay.current_epoch().unwrap(), 0);
        assert_eq!(relay.proof_length(), 6);
        assert_eq!(relay.get_current_epoch_difficulty().unwrap(), U256::ONE);
        assert_eq!(relay.get_block_difficulty(2015).unwrap(), U256::ONE);
        assert_eq!(relay.get_relay_range().unwrap(), (0, 2015));
        assert_eq!(
            events.try_recv().unwrap(),
            RelayEvent::Genesis { block_height: 0 }
        );
    }

    #[test]
    fn genesis_preconditions() {
        let relay = LightRelay::new(OWNER, Network::Bitcoin, None);
        let header = bitcoin_genesis_header();

        assert!(matches!(
            relay.genesis(STRANGER, &header.to_bytes(), 0, 6),
            Err(RelayError::Unauthorized(addr)) if addr == STRANGER
        ));
        assert!(matches!(
            relay.genesis(OWNER, &header.to_bytes(), 2015, 6),
            Err(RelayError::InvalidGenesisHeight(2015))
        ));
        assert!(matches!(
            relay.genesis(OWNER, &header.to_bytes(), 0, 0),
            Err(RelayError::InvalidProofLength(0))
        ));
        assert!(matches!(
            relay.genesis(OWNER, &header.to_bytes(), 0, 2016),
            Err(RelayError::InvalidProofLength(2016))
        ));
        assert!(matches!(
            relay.genesis(OWNER, &serialize_headers(&[header, header]), 0, 6),
            Err(RelayError::InvalidHeaderCount { count: 2, .. })
        ));
        assert!(matches!(
            relay.genesis(OWNER, &header.to_bytes()[..79], 0, 6),
            Err(RelayError::HeaderChain(HeaderChainError::MalformedInput(79)))
        ));

        let mut spoiled = header;
        spoil_proof_of_work(&mut spoiled);
        assert!(matches!(
            relay.genesis(OWNER, &spoiled.to_bytes(), 0, 6),
            Err(RelayError::HeaderChain(
                HeaderChainError::InsufficientProofOfWork { index: 0, .. }
            ))
        ));
        assert!(!relay.ready());

        relay.genesis(OWNER, &header.to_bytes(), 4032, 6).unwrap();
        assert_eq!(relay.genesis_epoch().unwrap(), 2);
        assert_eq!(relay.get_relay_range().unwrap(), (4032, 6047));
        assert!(matches!(
            relay.genesis(OWNER, &header.to_bytes(), 0, 6),
            Err(RelayError::AlreadyInitialized)
        ));
    }

    #[test]
    fn genesis_rejects_epochs_ending_past_the_height_limit() {
        let header = bitcoin_genesis_header();
        let relay = LightRelay::new(OWNER, Network::Bitcoin, None);

        let overflowing = u64::MAX - u64::MAX % BLOCKS_PER_EPOCH;
        assert!(matches!(
            relay.genesis(OWNER, &header.to_bytes(), overflowing, 6),
            Err(RelayError::InvalidGenesisHeight(height)) if height == overflowing
        ));
        assert!(!relay.ready());

        // The last epoch whose blocks all have a height.
        let last_start = overflowing - BLOCKS_PER_EPOCH;
        let last_epoch = last_start / BLOCKS_PER_EPOCH;
        relay.genesis(OWNER, &header.to_bytes(), last_start, 6).unwrap();
        assert_eq!(relay.get_relay_range().unwrap(), (last_start, overflowing - 1));

        let before = relay.snapshot();
        assert!(matches!(
            relay.retarget(SUBMITTER, &serialize_headers(&[header, header])),
            Err(RelayError::EpochOutOfRange(epoch)) if epoch == last_epoch + 1
        ));
        assert!(matches!(
            relay.set_difficulty_from_headers(SUBMITTER, &header.to_bytes()),
            Err(RelayError::EpochOutOfRange(epoch)) if epoch == last_epoch + 1
        ));
        assert_eq!(relay.snapshot(), before);
        assert_eq!(last_height_of_epoch(last_epoch), Some(overflowing - 1));
        assert_eq!(last_height_of_epoch(last_epoch + 1), None);
    }

    #[test]
    fn operations_require_genesis() {
        let relay = LightRelay::new(OWNER, Network::Regtest, None);

        assert!(matches!(
            relay.retarget(OWNER, &[0u8; 80]),
            Err(RelayError::NotInitialized)
        ));
        assert!(matches!(
            relay.validate_chain(&[0u8; 160]),
            Err(RelayError::NotInitialized)
        ));
        assert!(matches!(
            relay.get_current_epoch_difficulty(),
            Err(RelayError::NotInitialized)
        ));
        assert!(matches!(
            relay.get_relay_range(),
            Err(RelayError::NotInitialized)
        ));
        assert!(matches!(
            relay.set_proof_length(OWNER, 10),
            Err(RelayError::NotInitialized)
        ));
    }

    #[test]
    fn retarget_advances_epoch() {
        let fixture = Fixture::new(EASY_BITS, 300);
        let relay = &fixture.relay;
        let mut events = relay.subscribe();

        let next_bits = fixture.next_bits();
        assert_ne!(next_bits, EASY_BITS);
        let next = fixture.mine_next_epoch(PROOF_LENGTH as usize, next_bits);

        relay
            .retarget(SUBMITTER, &fixture.proof(PROOF_LENGTH as usize, &next))
            .unwrap();

        assert_eq!(relay.current_epoch().unwrap(), 1);
        assert_eq!(relay.get_relay_range().unwrap(), (0, 4031));
        let snapshot = relay.snapshot();
        assert_eq!(
            snapshot.ledger.record(1),
            Some(&EpochRecord {
                timestamp: next[0].time,
                bits: next_bits,
            })
        );
        assert_eq!(
            relay.get_block_difficulty(2016).unwrap(),
            pow::difficulty(&bits_to_target(next_bits))
        );
        assert_eq!(
            events.try_recv().unwrap(),
            RelayEvent::Retarget {
                old_difficulty: pow::difficulty(&bits_to_target(EASY_BITS)),
                new_difficulty: pow::difficulty(&bits_to_target(next_bits)),
            }
        );
        assert!(matches!(
            relay.get_epoch_difficulty(2),
            Err(RelayError::EpochNotFound(2))
        ));
    }

    #[test]
    fn consecutive_retargets_use_each_epoch_start() {
        let fixture = Fixture::new(EASY_BITS, 300);
        let relay = &fixture.relay;
        let epoch_1 = fixture.prove_epoch_1();
        let epoch_1_bits = epoch_1[0].bits;

        // Epoch 2 retargets from the recorded start of epoch 1, not from genesis.
        let expected = pow::retarget_algorithm(
            &bits_to_target(epoch_1_bits),
            epoch_1[0].time,
            epoch_1[2015].time,
            relay.network(),
        );
        let epoch_2_bits = target_to_bits(&expected);
        let from_genesis = pow::retarget_algorithm(
            &bits_to_target(epoch_1_bits),
            T0,
            epoch_1[2015].time,
            relay.network(),
        );
        assert_ne!(target_to_bits(&from_genesis), epoch_2_bits);

        let epoch_2 = ChainMiner::from_tip(&epoch_1[2015], 300)
            .mine(PROOF_LENGTH as usize, epoch_2_bits)
            .take_headers();
        let proof = serialize_headers(epoch_1[2010..].iter().chain(&epoch_2));
        relay.retarget(SUBMITTER, &proof).unwrap();

        assert_eq!(relay.current_epoch().unwrap(), 2);
        assert_eq!(relay.get_relay_range().unwrap(), (0, 6047));
        assert_eq!(
            relay.snapshot().ledger.record(2),
            Some(&EpochRecord {
                timestamp: epoch_2[0].time,
                bits: epoch_2_bits,
            })
        );
        assert_eq!(
            relay.get_current_and_prev_epoch_difficulty().unwrap(),
            (
                pow::difficulty(&bits_to_target(epoch_2_bits)),
                pow::difficulty(&bits_to_target(epoch_1_bits))
            )
        );
        for epoch in 0..3 {
            assert!(relay.get_epoch_difficulty(epoch).is_ok());
        }
        assert_eq!(relay.validate_chain(&proof).unwrap(), (epoch_1[2010].time, 12));
    }

    #[test]
    fn history_window_evicts_old_epochs() {
        let fixture = Fixture::with_history_window(EASY_BITS, 300, Some(2));
        let relay = &fixture.relay;
        let epoch_1 = fixture.prove_epoch_1();

        let epoch_2_bits = target_to_bits(&pow::retarget_algorithm(
            &bits_to_target(epoch_1[0].bits),
            epoch_1[0].time,
            epoch_1[2015].time,
            relay.network(),
        ));
        let epoch_2 = ChainMiner::from_tip(&epoch_1[2015], 300)
            .mine(PROOF_LENGTH as usize, epoch_2_bits)
            .take_headers();
        relay
            .retarget(
                SUBMITTER,
                &serialize_headers(epoch_1[2010..].iter().chain(&epoch_2)),
            )
            .unwrap();

        assert_eq!(relay.current_epoch().unwrap(), 2);
        assert_eq!(relay.snapshot().ledger.len(), 2);
        assert!(matches!(
            relay.get_epoch_difficulty(0),
            Err(RelayError::EpochNotFound(0))
        ));
        assert!(matches!(
            relay.get_block_difficulty(100),
            Err(RelayError::EpochNotFound(0))
        ));
        assert_eq!(
            relay.get_prev_epoch_difficulty().unwrap(),
            pow::difficulty(&bits_to_target(epoch_1[0].bits))
        );

        // Epoch 0 headers can no longer be checked.
        let evicted = &fixture.epoch[100..108];
        assert!(matches!(
            relay.validate_chain(&serialize_headers(evicted)),
            Err(RelayError::ChainPredatesGenesis(time)) if time == evicted[0].time
        ));
        assert!(matches!(
            relay.set_difficulty_from_headers(
                SUBMITTER,
                &fixture.proof(PROOF_LENGTH as usize, &epoch_1[..PROOF_LENGTH as usize])
            ),
            Err(RelayError::ChainPredatesGenesis(_))
        ));
        assert_eq!(
            relay
                .validate_chain(&serialize_headers(&epoch_1[100..108]))
                .unwrap(),
            (epoch_1[100].time, 8)
        );
    }

    #[test]
    fn retarget_accepts_four_fold_difficulty_increase() {
        // Blocks 150 seconds apart make the epoch four times too fast.
        let fixture = Fixture::new(0x207ffffc, 150);
        let relay = &fixture.relay;

        let next_bits = fixture.next_bits();
        assert_eq!(next_bits, 0x201fffff);
        assert_eq!(
            bits_to_target(0x207ffffc),
            bits_to_target(next_bits).wrapping_mul(&U256::from(4u64))
        );

        let next = fixture.mine_next_epoch(PROOF_LENGTH as usize, next_bits);
        relay
            .retarget(SUBMITTER, &fixture.proof(PROOF_LENGTH as usize, &next))
            .unwrap();
        assert_eq!(relay.current_epoch().unwrap(), 1);
    }

    #[test]
    fn retarget_out_of_bounds_is_rejected() {
        let fixture = Fixture::new(EASY_BITS, 600);
        let relay = &fixture.relay;
        let before = relay.snapshot();

        // Whole epoch 0 plus one header that is 128 times harder.
        let next = fixture.mine_next_epoch(1, 0x2000ffff);
        let mut headers = vec![fixture.genesis];
        headers.extend_from_slice(&fixture.epoch);
        headers.extend_from_slice(&next);

        let err = relay
            .retarget(SUBMITTER, &serialize_headers(&headers))
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::HeaderChain(HeaderChainError::RetargetOutOfBounds { index: 2016, .. })
        ));
        assert_eq!(relay.current_epoch().unwrap(), 0);
        assert_eq!(relay.snapshot(), before);

        // Just over four times harder.
        let next = fixture.mine_next_epoch(PROOF_LENGTH as usize, 0x201fffff);
        let err = relay
            .retarget(SUBMITTER, &fixture.proof(PROOF_LENGTH as usize, &next))
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::HeaderChain(HeaderChainError::RetargetOutOfBounds { .. })
        ));
    }

    #[test]
    fn retarget_requires_expected_target() {
        let fixture = Fixture::new(EASY_BITS, 300);
        let relay = &fixture.relay;

        // Only half as hard as the retarget rules demand.
        let next = fixture.mine_next_epoch(PROOF_LENGTH as usize, 0x203fffff);
        assert!(bits_to_target(0x203fffff) > bits_to_target(fixture.next_bits()));

        let err = relay
            .retarget(SUBMITTER, &fixture.proof(PROOF_LENGTH as usize, &next))
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::HeaderChain(HeaderChainError::InvalidDifficultyTransition {
                index: 6,
                ..
            })
        ));
        assert_eq!(relay.current_epoch().unwrap(), 0);
    }

    #[test]
    fn retarget_with_unchanged_target() {
        let genesis = mine_header([0u8; 32], T0, EASY_BITS);
        let relay = LightRelay::new(OWNER, Network::Regtest, None);
        relay
            .genesis(OWNER, &genesis.to_bytes(), 0, PROOF_LENGTH)
            .unwrap();

        // Exactly two weeks from the first to the last block of the epoch.
        let mut miner = ChainMiner::from_tip(&genesis, 600);
        miner.mine(2014, EASY_BITS);
        miner.mine_at(T0 + 1_209_600, EASY_BITS);
        miner.mine(PROOF_LENGTH as usize, EASY_BITS);
        let headers = miner.take_headers();
        let proof = &headers[2015 - PROOF_LENGTH as usize..];

        // Without a target change the layout must be exact.
        let err = relay
            .retarget(SUBMITTER, &serialize_headers(&proof[1..]))
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::HeaderChain(HeaderChainError::InvalidDifficultyTransition { .. })
        ));

        relay.retarget(SUBMITTER, &serialize_headers(proof)).unwrap();
        assert_eq!(relay.current_epoch().unwrap(), 1);
        assert_eq!(
            relay.snapshot().ledger.record(1),
            Some(&EpochRecord {
                timestamp: proof[PROOF_LENGTH as usize].time,
                bits: EASY_BITS,
            })
        );
    }

    #[test]
    fn retarget_needs_proof_length_headers_on_each_side() {
        let fixture = Fixture::new(EASY_BITS, 300);
        let relay = &fixture.relay;
        let next = fixture.mine_next_epoch(PROOF_LENGTH as usize, fixture.next_bits());

        let err = relay
            .retarget(SUBMITTER, &fixture.proof(3, &next))
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidHeaderCount { count: 9, .. }));

        let err = relay
            .retarget(SUBMITTER, &fixture.proof(PROOF_LENGTH as usize, &next[..2]))
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidHeaderCount { count: 8, .. }));

        // Longer proofs are fine.
        relay
            .retarget(SUBMITTER, &fixture.proof(10, &next))
            .unwrap();
        assert_eq!(relay.current_epoch().unwrap(), 1);
    }

    #[test]
    fn retarget_rejects_epoch_ending_in_the_future() {
        let fixture = Fixture::new(EASY_BITS, 300);
        let now = u64::from(fixture.last_of_epoch().time);
        let relay = LightRelay::from_snapshot(fixture.relay.snapshot(), Network::Regtest)
            .with_clock(Arc::new(FixedClock(now)));
        let next = fixture.mine_next_epoch(PROOF_LENGTH as usize, fixture.next_bits());

        let err = relay
            .retarget(SUBMITTER, &fixture.proof(PROOF_LENGTH as usize, &next))
            .unwrap_err();
        assert!(matches!(err, RelayError::EpochEndsInFuture { .. }));
        assert_eq!(relay.current_epoch().unwrap(), 0);
    }

    #[test]
    fn unauthorized_retarget_fails_before_parsing() {
        let fixture = Fixture::new(EASY_BITS, 600);
        let relay = &fixture.relay;
        relay.set_authorization_status(OWNER, true).unwrap();

        assert!(matches!(
            relay.retarget(STRANGER, &[0u8; 7]),
            Err(RelayError::Unauthorized(addr)) if addr == STRANGER
        ));
        assert!(matches!(
            relay.set_difficulty_from_headers(STRANGER, &[0u8; 7]),
            Err(RelayError::Unauthorized(_))
        ));

        relay.authorize(OWNER, SUBMITTER).unwrap();
        assert!(matches!(
            relay.retarget(SUBMITTER, &[0u8; 7]),
            Err(RelayError::HeaderChain(HeaderChainError::MalformedInput(7)))
        ));
    }

    #[test]
    fn set_difficulty_from_headers_is_idempotent() {
        let fixture = Fixture::new(EASY_BITS, 300);
        let relay = &fixture.relay;
        let next = fixture.mine_next_epoch(PROOF_LENGTH as usize, fixture.next_bits());
        let proof = fixture.proof(PROOF_LENGTH as usize, &next);

        assert!(relay.set_difficulty_from_headers(SUBMITTER, &proof).unwrap());
        assert_eq!(relay.current_epoch().unwrap(), 1);

        let before = relay.snapshot();
        let mut events = relay.subscribe();
        assert!(!relay.set_difficulty_from_headers(SUBMITTER, &proof).unwrap());
        assert_eq!(relay.snapshot(), before);
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));

        // The same proof no longer starts in the current epoch.
        assert!(relay.retarget(SUBMITTER, &proof).is_err());
    }

    #[test]
    fn set_difficulty_from_headers_detects_conflicts() {
        let fixture = Fixture::new(EASY_BITS, 300);
        let relay = &fixture.relay;
        let next_bits = fixture.next_bits();
        let next = fixture.mine_next_epoch(PROOF_LENGTH as usize, next_bits);
        relay
            .retarget(SUBMITTER, &fixture.proof(PROOF_LENGTH as usize, &next))
            .unwrap();

        // Clearing the lowest mantissa bit still satisfies the retarget rules.
        let mantissa = next_bits & 0x007fffff;
        let competing_bits = (next_bits & 0xff000000) | (mantissa & (mantissa - 1));
        assert_ne!(competing_bits, next_bits);
        let competing = fixture.mine_next_epoch(PROOF_LENGTH as usize, competing_bits);

        let before = relay.snapshot();
        let err = relay
            .set_difficulty_from_headers(
                SUBMITTER,
                &fixture.proof(PROOF_LENGTH as usize, &competing),
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::DifficultyConflict { epoch: 1 }));
        assert_eq!(relay.snapshot(), before);
    }

    #[test]
    fn set_difficulty_from_headers_accepts_early_stamped_first_header() {
        let fixture = Fixture::new(EASY_BITS, 300);
        let relay = &fixture.relay;
        let epoch_1_bits = fixture.next_bits();
        let next = fixture.mine_next_epoch(PROOF_LENGTH as usize, epoch_1_bits);
        relay
            .retarget(SUBMITTER, &fixture.proof(PROOF_LENGTH as usize, &next))
            .unwrap();

        // The first header uses epoch 1 bits but predates its recorded start.
        let epoch_1_start = next[0].time;
        let epoch_1_end = epoch_1_start + 2015 * 300;
        let epoch_2_bits = target_to_bits(&pow::retarget_algorithm(
            &bits_to_target(epoch_1_bits),
            epoch_1_start,
            epoch_1_end,
            relay.network(),
        ));
        let mut miner = ChainMiner::new([7u8; 32], epoch_1_start - 1_000, 300);
        miner.mine(1, epoch_1_bits);
        miner.mine_at(epoch_1_end - 4 * 300, epoch_1_bits);
        miner.mine(4, epoch_1_bits);
        miner.mine(PROOF_LENGTH as usize, epoch_2_bits);
        let headers = miner.take_headers();
        assert_eq!(headers[5].time, epoch_1_end);

        let proof = serialize_headers(&headers);
        assert!(relay.set_difficulty_from_headers(SUBMITTER, &proof).unwrap());
        assert_eq!(relay.current_epoch().unwrap(), 2);
        assert_eq!(
            relay.snapshot().ledger.record(2),
            Some(&EpochRecord {
                timestamp: headers[6].time,
                bits: epoch_2_bits,
            })
        );
        assert_eq!(relay.validate_chain(&proof).unwrap(), (epoch_1_start - 1_000, 12));
    }

    #[test]
    fn validate_chain_within_epoch() {
        let fixture = Fixture::new(EASY_BITS, 600);
        let relay = &fixture.relay;
        let headers = &fixture.epoch[100..108];

        assert_eq!(
            relay.validate_chain(&serialize_headers(headers)).unwrap(),
            (headers[0].time, 8)
        );
        // Reads do not change anything.
        assert_eq!(
            relay.validate_chain(&serialize_headers(headers)).unwrap(),
            (headers[0].time, 8)
        );
    }

    #[test]
    fn validate_chain_reports_failing_header() {
        let fixture = Fixture::new(EASY_BITS, 600);
        let relay = &fixture.relay;
        let before = relay.snapshot();

        let mut headers = fixture.epoch[100..108].to_vec();
        spoil_proof_of_work(&mut headers[3]);

        let err = relay
            .validate_chain(&serialize_headers(&headers))
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::HeaderChain(HeaderChainError::InsufficientProofOfWork { index: 3, .. })
        ));
        assert_eq!(relay.snapshot(), before);
    }

    #[test]
    fn validate_chain_header_count_rules() {
        let fixture = Fixture::new(EASY_BITS, 600);
        let relay = &fixture.relay;

        assert!(matches!(
            relay.validate_chain(&fixture.epoch[10].to_bytes()),
            Err(RelayError::InvalidHeaderCount { count: 1, .. })
        ));
        assert!(matches!(
            relay.validate_chain(&serialize_headers(&fixture.epoch[10..14])),
            Err(RelayError::InsufficientConfirmations {
                required: 6,
                actual: 4
            })
        ));

        let mut whole_epoch = vec![fixture.genesis];
        whole_epoch.extend_from_slice(&fixture.epoch);
        assert!(matches!(
            relay.validate_chain(&serialize_headers(&whole_epoch)),
            Err(RelayError::InvalidHeaderCount { count: 2016, .. })
        ));
    }

    #[test]
    fn validate_chain_across_epochs() {
        let fixture = Fixture::new(EASY_BITS, 300);
        let relay = &fixture.relay;
        let next_bits = fixture.next_bits();
        let next = fixture.mine_next_epoch(10, next_bits);
        let crossing = fixture.proof(4, &next[..4]);

        // The next epoch is not proven yet.
        assert!(matches!(
            relay.validate_chain(&crossing),
            Err(RelayError::HeaderChain(
                HeaderChainError::InvalidDifficultyTransition { index: 4, .. }
            ))
        ));

        relay
            .retarget(SUBMITTER, &fixture.proof(PROOF_LENGTH as usize, &next))
            .unwrap();
        assert_eq!(
            relay.validate_chain(&crossing).unwrap(),
            (fixture.epoch[2011].time, 8)
        );
        assert_eq!(
            relay.validate_chain(&serialize_headers(&next[2..])).unwrap(),
            (next[2].time, 8)
        );

        // A header of epoch 1 stamped before the epoch started.
        let early = ChainMiner::new([9u8; 32], next[0].time - 1_000, 300)
            .mine(6, next_bits)
            .take_headers();
        assert_eq!(
            relay.validate_chain(&serialize_headers(&early)).unwrap(),
            (early[0].time, 6)
        );
    }

    #[test]
    fn validate_chain_rejects_unknown_epochs() {
        let fixture = Fixture::new(EASY_BITS, 600);
        let relay = &fixture.relay;

        let before_genesis = ChainMiner::new([9u8; 32], T0 - 100_000, 600)
            .mine(6, EASY_BITS)
            .take_headers();
        assert!(matches!(
            relay.validate_chain(&serialize_headers(&before_genesis)),
            Err(RelayError::ChainPredatesGenesis(time)) if time == T0 - 100_000
        ));

        let other_target = ChainMiner::new([9u8; 32], T0 + 1_000, 600)
            .mine(6, 0x203fffff)
            .take_headers();
        assert!(matches!(
            relay.validate_chain(&serialize_headers(&other_target)),
            Err(RelayError::HeaderChain(
                HeaderChainError::InvalidDifficultyTransition { index: 0, .. }
            ))
        ));
    }

    #[test]
    fn owner_operations() {
        let fixture = Fixture::new(EASY_BITS, 600);
        let relay = &fixture.relay;
        let mut events = relay.subscribe();

        assert!(matches!(
            relay.set_proof_length(STRANGER, 10),
            Err(RelayError::Unauthorized(_))
        ));
        assert!(matches!(
            relay.set_proof_length(OWNER, PROOF_LENGTH),
            Err(RelayError::ProofLengthUnchanged(6))
        ));
        assert!(matches!(
            relay.set_proof_length(OWNER, 2016),
            Err(RelayError::InvalidProofLength(2016))
        ));
        relay.set_proof_length(OWNER, 10).unwrap();
        assert_eq!(relay.proof_length(), 10);
        assert_eq!(
            events.try_recv().unwrap(),
            RelayEvent::ProofLengthChanged { new_length: 10 }
        );

        assert!(!relay.authorization_required());
        relay.set_authorization_status(OWNER, true).unwrap();
        assert!(relay.authorization_required());
        assert!(!relay.can_submit(&SUBMITTER));
        relay.authorize(OWNER, SUBMITTER).unwrap();
        assert!(relay.is_authorized(&SUBMITTER));
        assert!(relay.can_submit(&SUBMITTER));
        relay.deauthorize(OWNER, SUBMITTER).unwrap();
        assert!(!relay.is_authorized(&SUBMITTER));
        assert_eq!(
            events.try_recv().unwrap(),
            RelayEvent::AuthorizationRequirementChanged { new_status: true }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            RelayEvent::SubmitterAuthorized {
                submitter: SUBMITTER
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            RelayEvent::SubmitterDeauthorized {
                submitter: SUBMITTER
            }
        );

        relay.transfer_ownership(OWNER, STRANGER).unwrap();
        assert_eq!(relay.owner(), Some(STRANGER));
        assert!(matches!(
            relay.authorize(OWNER, SUBMITTER),
            Err(RelayError::Unauthorized(_))
        ));
        relay.renounce_ownership(STRANGER).unwrap();
        assert_eq!(relay.owner(), None);
        assert!(matches!(
            relay.set_authorization_status(STRANGER, false),
            Err(RelayError::Unauthorized(_))
        ));
        assert_eq!(
            events.try_recv().unwrap(),
            RelayEvent::OwnershipTransferred {
                previous_owner: Some(OWNER),
                new_owner: Some(STRANGER),
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            RelayEvent::OwnershipTransferred {
                previous_owner: Some(STRANGER),
                new_owner: None,
            }
        );
    }

    #[test]
    fn difficulty_getters_use_diff1_scale() {
        let relay = LightRelay::new(OWNER, Network::Bitcoin, None);
        relay
            .genesis(OWNER, &bitcoin_genesis_header().to_bytes(), 0, 6)
            .unwrap();

        assert_eq!(
            relay.get_epoch_difficulty(0).unwrap(),
            DIFF1_TARGET.wrapping_div(&bits_to_target(0x1d00ffff))
        );
        assert!(matches!(
            relay.get_prev_epoch_difficulty(),
            Err(RelayError::NoPreviousEpoch)
        ));
        assert!(matches!(
            relay.get_current_and_prev_epoch_difficulty(),
            Err(RelayError::NoPreviousEpoch)
        ));
        assert!(matches!(
            relay.get_block_difficulty(2016),
            Err(RelayError::EpochNotFound(1))
        ));
    }

    #[test]
    fn snapshot_survives_restart() {
        let fixture = Fixture::new(EASY_BITS, 300);
        let relay = &fixture.relay;
        relay.set_authorization_status(OWNER, true).unwrap();
        relay.authorize(OWNER, SUBMITTER).unwrap();
        let next = fixture.mine_next_epoch(PROOF_LENGTH as usize, fixture.next_bits());
        relay
            .retarget(SUBMITTER, &fixture.proof(PROOF_LENGTH as usize, &next))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.json");
        relay.snapshot().save(&path).unwrap();

        let restored =
            LightRelay::from_snapshot(RelayState::load(&path).unwrap(), Network::Regtest);
        assert_eq!(restored.snapshot(), relay.snapshot());
        assert_eq!(restored.current_epoch().unwrap(), 1);
        assert!(restored.can_submit(&SUBMITTER));

        std::fs::write(&path, "{").unwrap();
        assert!(matches!(
            RelayState::load(&path),
            Err(RelayError::ConfigError(_))
        ));
    }

    #[test]
    fn readers_see_whole_epochs() {
        let fixture = Fixture::new(EASY_BITS, 300);
        let relay = &fixture.relay;
        let next = fixture.mine_next_epoch(PROOF_LENGTH as usize, fixture.next_bits());
        let proof = fixture.proof(PROOF_LENGTH as usize, &next);

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                for _ in 0..200 {
                    let snapshot = relay.snapshot();
                    let epoch = snapshot.current_epoch().unwrap();
                    assert_eq!(snapshot.ledger.len() as u64, epoch + 1);
                    assert_eq!(snapshot.relay_range().unwrap().1, (epoch + 1) * 2016 - 1);
                }
            });
            relay.retarget(SUBMITTER, &proof).unwrap();
            reader.join().unwrap();
        });

        assert_eq!(relay.current_epoch().unwrap(), 1);
    }
}
