//! # Permissions
//!
//! Owner and submitter authorization for relay operations.

use std::collections::BTreeSet;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Answers who may administer the relay and who may submit proofs.
pub trait AccessControl {
    fn is_owner(&self, caller: &Address) -> bool;

    /// Whether `caller` may submit difficulty proofs.
    fn is_authorized(&self, caller: &Address) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// `None` once ownership is renounced.
    pub owner: Option<Address>,
    pub authorization_required: bool,
    pub authorized: BTreeSet<Address>,
}

impl Permissions {
    pub fn new(owner: Address) -> Self {
        Permissions {
            owner: Some(owner),
            ..Default::default()
        }
    }

    /// Whether `submitter` is in the authorized set, regardless of whether
    /// authorization is currently required.
    pub fn is_listed(&self, submitter: &Address) -> bool {
        self.authorized.contains(submitter)
    }
}

impl AccessControl for Permissions {
    fn is_owner(&self, caller: &Address) -> bool {
        self.owner.as_ref() == Some(caller)
    }

    fn is_authorized(&self, caller: &Address) -> bool {
        !self.authorization_required || self.authorized.contains(caller)
    }
}
