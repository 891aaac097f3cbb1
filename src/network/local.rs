//! Local Multiplayer
//!
//! In-process full mesh of N participants. Every outgoing batch is applied
//! synchronously to the other N-1 managers, simulating zero latency and
//! perfect connectivity. Meant for exercising replication semantics in
//! tests and demos.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::core::StateDigest;
use crate::error::ReplicaError;
use crate::network::manager::StateManager;
use crate::network::protocol::StateUpdate;
use crate::network::synchronizer::BlockingSynchronizer;

/// N state managers relaying to each other.
pub struct LocalMultiplayer {
    managers: Vec<Arc<StateManager>>,
}

impl LocalMultiplayer {
    /// Create `participants` fully connected managers.
    pub fn new(participants: usize) -> Self {
        // Transports hold weak references so managers can be dropped.
        let mesh: Arc<RwLock<Vec<Weak<StateManager>>>> = Arc::new(RwLock::new(Vec::new()));

        let managers: Vec<Arc<StateManager>> = (0..participants)
            .map(|index| {
                let mesh = mesh.clone();
                StateManager::new(
                    format!("participant-{}", index),
                    BlockingSynchronizer::new(move |batch: Vec<StateUpdate>| {
                        relay(&mesh, index, batch)
                    }),
                )
            })
            .collect();

        *mesh.write() = managers.iter().map(Arc::downgrade).collect();
        debug!("Local multiplayer session with {} participants", participants);

        Self { managers }
    }

    /// Every participant, in creation order.
    pub fn managers(&self) -> &[Arc<StateManager>] {
        &self.managers
    }

    /// Participant at `index`.
    pub fn manager(&self, index: usize) -> Option<&Arc<StateManager>> {
        self.managers.get(index)
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    /// Whether the session has no participants.
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// State digest of every participant, in order.
    pub fn digests(&self) -> Result<Vec<StateDigest>, ReplicaError> {
        self.managers.iter().map(|m| m.state_digest()).collect()
    }

    /// Whether every participant holds the same registered state.
    pub fn converged(&self) -> Result<bool, ReplicaError> {
        let digests = self.digests()?;
        Ok(digests.windows(2).all(|pair| pair[0] == pair[1]))
    }
}

/// Apply `batch` from participant `origin` to every other live participant.
///
/// A peer that rejects an update does not stop delivery to the others.
/// The first rejection is returned once the whole batch went out.
fn relay(
    mesh: &RwLock<Vec<Weak<StateManager>>>,
    origin: usize,
    batch: Vec<StateUpdate>,
) -> Result<(), ReplicaError> {
    let peers: Vec<Arc<StateManager>> = mesh
        .read()
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != origin)
        .filter_map(|(_, peer)| peer.upgrade())
        .collect();

    let mut first_error = None;
    for update in batch {
        for peer in &peers {
            if let Err(e) = peer.receive_update(&update.key, update.change.clone()) {
                warn!("[{}] Rejected {} for '{}': {}", peer.name(), update.change.name(), update.key, e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
