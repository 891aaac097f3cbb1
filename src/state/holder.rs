//! State Holder
//!
//! Per-component registry of replicated fields, plus a buffer of
//! `SetProperty` changes that arrived before their property registered.
//!
//! Collections register when they are built, so only properties can ever
//! be pending. A collection change for an unknown key means the sender and
//! receiver disagree about the component's layout and is a hard error.
//!
//! Changes reach the fields of one holder one at a time. A pending flush and
//! a direct update for the same key can therefore never land out of order.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, warn};

use super::ReplicatedState;
use crate::core::{ComponentId, OpCategory, StateChange, StateDigest, StateHasher, StateKey};
use crate::error::ReplicaError;

#[derive(Default)]
struct HolderInner {
    /// Live fields by property key.
    registered: BTreeMap<String, Arc<dyn ReplicatedState>>,
    /// Latest unapplied `SetProperty` per unregistered property key.
    pending: BTreeMap<String, StateChange>,
}

/// Fields of one component on one participant.
pub struct StateHolder {
    component: ComponentId,
    inner: Mutex<HolderInner>,
    /// Held while a change is applied to a field. Reentrant so listeners
    /// may read or register fields of the same component.
    delivery: ReentrantMutex<()>,
}

impl StateHolder {
    /// Create an empty holder for `component`.
    pub fn new(component: ComponentId) -> Self {
        Self {
            component,
            inner: Mutex::new(HolderInner::default()),
            delivery: ReentrantMutex::new(()),
        }
    }

    /// Owning component.
    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    fn key(&self, property: &str) -> StateKey {
        StateKey::new(self.component.clone(), property)
    }

    /// Run `f` with no change being delivered to this holder's fields.
    ///
    /// Other threads delivering changes wait until `f` returns.
    pub fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _delivery = self.delivery.lock();
        f()
    }

    /// Register a field under `property`.
    ///
    /// A pending value for the key is left in place; the field consumes it
    /// with [`set_pending_value`](Self::set_pending_value).
    pub fn register_state(
        &self,
        property: &str,
        state: Arc<dyn ReplicatedState>,
    ) -> Result<(), ReplicaError> {
        let mut inner = self.inner.lock();
        if inner.registered.contains_key(property) {
            return Err(ReplicaError::DuplicateProperty(self.key(property)));
        }

        if state.category() != OpCategory::Property && inner.pending.remove(property).is_some() {
            warn!(
                "Dropping pending SetProperty for '{}': a {} registered under that key",
                self.key(property),
                state.category().label(),
            );
        }

        inner.registered.insert(property.to_string(), state);
        Ok(())
    }

    /// Apply and discard the pending value for `property`, if any.
    ///
    /// Returns whether a value was applied. A second call finds nothing.
    pub fn set_pending_value(
        &self,
        property: &str,
        state: &dyn ReplicatedState,
    ) -> Result<bool, ReplicaError> {
        let _delivery = self.delivery.lock();
        let pending = self.inner.lock().pending.remove(property);
        match pending {
            Some(change) => {
                debug!("Applying pending value for '{}'", self.key(property));
                state.apply_change(&change)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Route a remote change to the field registered under `property`.
    ///
    /// `SetProperty` for an unregistered key is buffered, replacing any
    /// older pending value. Any other change for an unregistered key fails
    /// with [`ReplicaError::UnregisteredCollection`].
    pub fn apply_change(&self, property: &str, change: StateChange) -> Result<(), ReplicaError> {
        let _delivery = self.delivery.lock();
        let target = {
            let mut inner = self.inner.lock();
            match inner.registered.get(property).cloned() {
                Some(state) => {
                    // a direct update supersedes anything still buffered
                    inner.pending.remove(property);
                    state
                }
                None => {
                    if let StateChange::SetProperty { .. } = change {
                        debug!("Buffering pending value for '{}'", self.key(property));
                        inner.pending.insert(property.to_string(), change);
                        return Ok(());
                    }
                    return Err(ReplicaError::UnregisteredCollection {
                        key: self.key(property),
                        change: change.name(),
                    });
                }
            }
        };

        target.apply_change(&change)
    }

    /// Property keys of every registered field, in order.
    pub fn registered_keys(&self) -> Vec<String> {
        self.inner.lock().registered.keys().cloned().collect()
    }

    /// Whether a value is waiting for `property` to register.
    pub fn has_pending(&self, property: &str) -> bool {
        self.inner.lock().pending.contains_key(property)
    }

    /// Number of buffered values.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// SHA-256 over every registered field's snapshot, in key order.
    ///
    /// Pending values are not part of the digest.
    pub fn digest(&self) -> Result<StateDigest, ReplicaError> {
        let fields: Vec<(String, Arc<dyn ReplicatedState>)> = self
            .inner
            .lock()
            .registered
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut hasher = StateHasher::for_component();
        hasher.update_str(self.component.as_str());
        hasher.update_u64(fields.len() as u64);
        for (property, state) in &fields {
            hasher.update_str(property);
            hasher.update_value(&state.snapshot()?);
        }
        Ok(hasher.finalize())
    }
}

impl std::fmt::Debug for StateHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StateHolder")
            .field("component", &self.component)
            .field("registered", &inner.registered.keys().collect::<Vec<_>>())
            .field("pending", &inner.pending.keys().collect::<Vec<_>>())
            .finish()
    }
}
