//! Replicated Fields
//!
//! A replicated field owns one live value (a property, list, map or set),
//! mutates it immediately on local calls while emitting a [`StateChange`],
//! and replays remote changes through [`ReplicatedState::apply_change`].
//!
//! ## Ownership
//!
//! Each field is split into two halves:
//!
//! - a shared *cell* holding the value, registered with the component's
//!   [`StateHolder`] so that remote changes can reach it;
//! - a user-facing *handle* holding the cell plus a [`FieldLink`] back to the
//!   [`StateManager`] for outgoing changes.
//!
//! Cells never point back at the manager, so the manager's registry does
//! not form a reference cycle with the fields it routes to.
//!
//! Collections have no mutating iterators: every structural change goes
//! through a tracked method so it can be replicated.

pub mod property;
pub mod list;
pub mod map;
pub mod set;
pub mod holder;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::core::{NetworkValue, OpCategory, StateChange, StateKey};
use crate::error::ReplicaError;
use crate::network::manager::StateManager;
use crate::network::protocol::SyncPolicy;
use crate::network::synchronizer::SyncMode;

pub use property::Property;
pub use list::ReplicatedList;
pub use map::ReplicatedMap;
pub use set::ReplicatedSet;
pub use holder::StateHolder;

/// Values that can live in a replicated field.
pub trait Replicable: Serialize + DeserializeOwned + Clone + Send + 'static {}

impl<T> Replicable for T where T: Serialize + DeserializeOwned + Clone + Send + 'static {}

/// The registered half of a replicated field.
pub trait ReplicatedState: Send + Sync {
    /// Op-category this field accepts.
    fn category(&self) -> OpCategory;

    /// Replay a remote change against the live value.
    ///
    /// Changes of a foreign op-category are logged and ignored. Decode
    /// failures and out-of-range indices are returned.
    fn apply_change(&self, change: &StateChange) -> Result<(), ReplicaError>;

    /// Encode the whole live value, for digests.
    fn snapshot(&self) -> Result<NetworkValue, ReplicaError>;
}

/// Outgoing half of a field: where its changes go and who may see them.
#[derive(Clone)]
pub struct FieldLink {
    key: StateKey,
    manager: Arc<StateManager>,
    policy: SyncPolicy,
}

impl FieldLink {
    /// Link a field key to the manager that sends its changes.
    pub fn new(key: StateKey, manager: Arc<StateManager>) -> Self {
        Self {
            key,
            manager,
            policy: SyncPolicy::default(),
        }
    }

    /// Field address.
    pub fn key(&self) -> &StateKey {
        &self.key
    }

    /// Manager that owns the field's component.
    pub fn manager(&self) -> &Arc<StateManager> {
        &self.manager
    }

    /// Visibility of outgoing changes.
    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    pub(crate) fn set_policy(&mut self, policy: SyncPolicy) {
        self.policy = policy;
    }

    /// Refuse shared changes on a participant that only mirrors remote state.
    ///
    /// Checked before a field mutates, so a refused call leaves it as it was.
    pub(crate) fn check_writable(&self) -> Result<(), ReplicaError> {
        if self.policy.is_shared() && self.manager.synchronizer().mode() == SyncMode::ReadOnly {
            return Err(ReplicaError::MutationNotAllowed);
        }
        Ok(())
    }

    /// Hand one change to the manager for delivery.
    pub(crate) fn send(&self, change: StateChange) -> Result<(), ReplicaError> {
        self.manager.send_update(&self.key, change, self.policy)
    }
}

/// Log a change that was delivered to a field of the wrong kind.
pub(crate) fn warn_mismatched_change(key: &StateKey, change: &StateChange, held: OpCategory) {
    warn!(
        "Mismatching sender and receiver for '{}': sender attempted {} but this participant holds a {}; change ignored",
        key,
        change.name(),
        held.label(),
    );
}

/// Bounds check shared by local and remote list operations.
pub(crate) fn check_index(index: usize, len: usize) -> Result<(), ReplicaError> {
    if index < len {
        Ok(())
    } else {
        Err(ReplicaError::IndexOutOfBounds { index, len })
    }
}
