//! State Manager
//!
//! One [`StateManager`] per participant. It owns a [`StateHolder`] per
//! registered component and is the single entry and exit point for that
//! participant's replicated state traffic.
//!
//! [`Component`] is the handle owning subsystems hold: it registers the
//! component on construction, builds its replicated fields, and removes the
//! holder again when dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::core::{
    Codec, ComponentId, JsonCodec, StateChange, StateDigest, StateHasher, StateKey,
};
use crate::error::ReplicaError;
use crate::network::protocol::{StateUpdate, SyncPolicy};
use crate::network::synchronizer::{SyncConfig, Synchronizer, Transport};
use crate::state::{
    FieldLink, Property, Replicable, ReplicatedList, ReplicatedMap, ReplicatedSet,
    ReplicatedState, StateHolder,
};

/// Registry of one participant's replicated components.
pub struct StateManager {
    /// Participant name, for logs.
    name: String,
    /// Holders by component id.
    holders: Mutex<BTreeMap<ComponentId, Arc<StateHolder>>>,
    /// Outgoing delivery strategy.
    synchronizer: Arc<dyn Synchronizer>,
}

impl StateManager {
    /// Create a manager sending through `synchronizer`.
    pub fn new(name: impl Into<String>, synchronizer: impl Synchronizer + 'static) -> Arc<Self> {
        Self::with_synchronizer(name, Arc::new(synchronizer))
    }

    /// Create a manager sending through a shared synchronizer.
    pub fn with_synchronizer(
        name: impl Into<String>,
        synchronizer: Arc<dyn Synchronizer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            holders: Mutex::new(BTreeMap::new()),
            synchronizer,
        })
    }

    /// Create a manager from configuration.
    pub fn from_config(config: &SyncConfig, transport: Transport) -> Result<Arc<Self>, ReplicaError> {
        let synchronizer = config.build(transport)?;
        Ok(Self::with_synchronizer(config.name.clone(), synchronizer))
    }

    /// Participant name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delivery strategy in use.
    pub fn synchronizer(&self) -> &Arc<dyn Synchronizer> {
        &self.synchronizer
    }

    /// Register a component and return its fresh holder.
    pub fn register(&self, id: ComponentId) -> Result<Arc<StateHolder>, ReplicaError> {
        let mut holders = self.holders.lock();
        if holders.contains_key(&id) {
            return Err(ReplicaError::DuplicateComponent(id));
        }

        let holder = Arc::new(StateHolder::new(id.clone()));
        holders.insert(id.clone(), holder.clone());
        debug!("[{}] Registered component '{}'", self.name, id);
        Ok(holder)
    }

    /// Forget a component. No message is sent.
    ///
    /// Returns whether the component was registered.
    pub fn discard(&self, id: &ComponentId) -> bool {
        let removed = self.holders.lock().remove(id).is_some();
        if removed {
            debug!("[{}] Discarded component '{}'", self.name, id);
        }
        removed
    }

    /// Remove `holder` only if it is still the one registered under `id`.
    fn discard_holder(&self, id: &ComponentId, holder: &Arc<StateHolder>) {
        let mut holders = self.holders.lock();
        if holders.get(id).is_some_and(|current| Arc::ptr_eq(current, holder)) {
            holders.remove(id);
            debug!("[{}] Discarded component '{}'", self.name, id);
        }
    }

    /// Holder of a registered component.
    pub fn holder(&self, id: &ComponentId) -> Option<Arc<StateHolder>> {
        self.holders.lock().get(id).cloned()
    }

    /// Ids of every registered component, in order.
    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.holders.lock().keys().cloned().collect()
    }

    /// Holder of the component `key` belongs to.
    pub fn holder_for(&self, key: &StateKey) -> Result<Arc<StateHolder>, ReplicaError> {
        self.holder(&key.component)
            .ok_or_else(|| ReplicaError::UnknownComponent {
                component: key.component.clone(),
                property: key.property.clone(),
            })
    }

    /// Register a field with its component's holder.
    pub fn register_state(
        &self,
        key: &StateKey,
        state: Arc<dyn ReplicatedState>,
    ) -> Result<(), ReplicaError> {
        self.holder_for(key)?.register_state(&key.property, state)
    }

    /// Apply the value buffered for `key`, if any, to `state`.
    pub fn set_pending_value(
        &self,
        key: &StateKey,
        state: &dyn ReplicatedState,
    ) -> Result<bool, ReplicaError> {
        self.holder_for(key)?.set_pending_value(&key.property, state)
    }

    /// Package a local change and hand it to the synchronizer.
    ///
    /// [`SyncPolicy::Private`] changes stop here.
    pub fn send_update(
        &self,
        key: &StateKey,
        change: StateChange,
        policy: SyncPolicy,
    ) -> Result<(), ReplicaError> {
        if !policy.is_shared() {
            debug!("[{}] Keeping private {} for '{}'", self.name, change.name(), key);
            return Ok(());
        }

        debug!("[{}] Sending {} for '{}'", self.name, change.name(), key);
        self.synchronizer
            .send(vec![StateUpdate::new(key.clone(), change, policy)])
    }

    /// Apply a change that arrived from another participant.
    ///
    /// Updates for components this participant does not have are logged
    /// and dropped.
    #[instrument(skip(self, change), fields(participant = %self.name))]
    pub fn receive_update(&self, key: &StateKey, change: StateChange) -> Result<(), ReplicaError> {
        match self.holder(&key.component) {
            Some(holder) => holder.apply_change(&key.property, change),
            None => {
                warn!(
                    "Dropping {} for '{}': component is not present on this participant",
                    change.name(),
                    key,
                );
                Ok(())
            }
        }
    }

    /// Apply a received [`StateUpdate`].
    pub fn receive(&self, update: StateUpdate) -> Result<(), ReplicaError> {
        self.receive_update(&update.key, update.change)
    }

    /// Digest of one component's registered fields.
    pub fn digest(&self, id: &ComponentId) -> Result<Option<StateDigest>, ReplicaError> {
        self.holder(id).map(|holder| holder.digest()).transpose()
    }

    /// Digest of every registered component, in id order.
    pub fn state_digest(&self) -> Result<StateDigest, ReplicaError> {
        let holders: Vec<Arc<StateHolder>> = self.holders.lock().values().cloned().collect();

        let mut hasher = StateHasher::for_participant();
        hasher.update_u64(holders.len() as u64);
        for holder in &holders {
            hasher.update_digest(&holder.digest()?);
        }
        Ok(hasher.finalize())
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("name", &self.name)
            .field("components", &self.component_ids())
            .field("mode", &self.synchronizer.mode())
            .finish()
    }
}

/// A registered component and the factory for its replicated fields.
///
/// Dropping the handle discards the component from its manager.
pub struct Component {
    id: ComponentId,
    manager: Arc<StateManager>,
    holder: Arc<StateHolder>,
}

impl Component {
    /// Register component `id` with `manager`.
    pub fn new(id: impl Into<ComponentId>, manager: &Arc<StateManager>) -> Result<Self, ReplicaError> {
        let id = id.into();
        let holder = manager.register(id.clone())?;
        Ok(Self {
            id,
            manager: manager.clone(),
            holder,
        })
    }

    /// Register a component under a fresh random id.
    pub fn random(manager: &Arc<StateManager>) -> Result<Self, ReplicaError> {
        Self::new(ComponentId::random(), manager)
    }

    /// Component id.
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// Owning manager.
    pub fn manager(&self) -> &Arc<StateManager> {
        &self.manager
    }

    /// This component's holder.
    pub fn holder(&self) -> &Arc<StateHolder> {
        &self.holder
    }

    fn link(&self, property: &str) -> FieldLink {
        FieldLink::new(StateKey::new(self.id.clone(), property), self.manager.clone())
    }

    /// JSON-encoded property. Registers on first access.
    pub fn property<T: Replicable>(&self, key: &str, initial: T) -> Property<T> {
        self.property_with::<T, JsonCodec>(key, initial)
    }

    /// Property with an explicit codec.
    pub fn property_with<T: Replicable, C: Codec>(&self, key: &str, initial: T) -> Property<T, C> {
        Property::new(self.link(key), initial)
    }

    /// JSON-encoded list, registered immediately.
    pub fn list<T: Replicable + PartialEq>(&self, key: &str, initial: Vec<T>) -> Result<ReplicatedList<T>, ReplicaError> {
        self.list_with::<T, JsonCodec>(key, initial)
    }

    /// List with an explicit codec.
    pub fn list_with<T: Replicable + PartialEq, C: Codec>(
        &self,
        key: &str,
        initial: Vec<T>,
    ) -> Result<ReplicatedList<T, C>, ReplicaError> {
        ReplicatedList::new(self.link(key), initial)
    }

    /// JSON-encoded map, registered immediately.
    pub fn map<K: Replicable + Ord, V: Replicable>(
        &self,
        key: &str,
        initial: BTreeMap<K, V>,
    ) -> Result<ReplicatedMap<K, V>, ReplicaError> {
        self.map_with::<K, V, JsonCodec>(key, initial)
    }

    /// Map with an explicit codec.
    pub fn map_with<K: Replicable + Ord, V: Replicable, C: Codec>(
        &self,
        key: &str,
        initial: BTreeMap<K, V>,
    ) -> Result<ReplicatedMap<K, V, C>, ReplicaError> {
        ReplicatedMap::new(self.link(key), initial)
    }

    /// JSON-encoded set, registered immediately.
    pub fn set<T: Replicable + Ord>(
        &self,
        key: &str,
        initial: BTreeSet<T>,
    ) -> Result<ReplicatedSet<T>, ReplicaError> {
        self.set_with::<T, JsonCodec>(key, initial)
    }

    /// Set with an explicit codec.
    pub fn set_with<T: Replicable + Ord, C: Codec>(
        &self,
        key: &str,
        initial: BTreeSet<T>,
    ) -> Result<ReplicatedSet<T, C>, ReplicaError> {
        ReplicatedSet::new(self.link(key), initial)
    }

    /// Digest of this component's registered fields.
    pub fn digest(&self) -> Result<StateDigest, ReplicaError> {
        self.holder.digest()
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        self.manager.discard_holder(&self.id, &self.holder);
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("participant", &self.manager.name())
            .finish()
    }
}
