//! # Events
//!
//! Notifications emitted after successful state changes. Delivery is fire and
//! forget: the relay never waits for, or fails because of, subscribers.

use alloy_primitives::Address;
use header_chain::U256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Genesis {
        block_height: u64,
    },
    Retarget {
        old_difficulty: U256,
        new_difficulty: U256,
    },
    ProofLengthChanged {
        new_length: u64,
    },
    AuthorizationRequirementChanged {
        new_status: bool,
    },
    SubmitterAuthorized {
        submitter: Address,
    },
    SubmitterDeauthorized {
        submitter: Address,
    },
    OwnershipTransferred {
        previous_owner: Option<Address>,
        new_owner: Option<Address>,
    },
}
